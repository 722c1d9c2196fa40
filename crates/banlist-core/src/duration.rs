//! Compact duration expressions such as `1d2h30m` or `90`.
//!
//! Grammar: `D? H? M? S?` with `D = <digits>d`, `H = <digits>h`,
//! `M = <digits>m`, `S = <digits>` optionally followed by `s`. Components
//! appear at most once, in that order, and at least one must be present.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AclError, AclResult};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Raw argument that callers use to mean "permanent" (for add) or
/// "remove outright" (for decrement).
pub const PERMANENT_SENTINEL: &str = "0";

static PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern() -> &'static Regex {
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:(?P<d>[0-9]+)d)?(?:(?P<h>[0-9]+)h)?",
            r"(?:(?P<m>[0-9]+)m)?(?:(?P<s>[0-9]+)s?)?$",
        ))
        .expect("duration pattern is valid")
    })
}

/// Parse a duration expression into seconds.
pub fn parse_duration(expr: &str) -> AclResult<u64> {
    let invalid = || AclError::InvalidFormat {
        input: expr.to_string(),
    };
    if !expr.bytes().any(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let caps = pattern().captures(expr).ok_or_else(invalid)?;

    let mut total: u64 = 0;
    for (group, unit) in [("d", DAY), ("h", HOUR), ("m", MINUTE), ("s", 1)] {
        if let Some(m) = caps.name(group) {
            let n: u64 = m.as_str().parse().map_err(|_| invalid())?;
            total = n
                .checked_mul(unit)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(invalid)?;
        }
    }
    Ok(total)
}

/// Resolve a raw duration argument. The literal `"0"` short-circuits to
/// zero without consulting the grammar; anything else goes through
/// [`parse_duration`].
pub fn parse_span(raw: &str) -> AclResult<u64> {
    if raw == PERMANENT_SENTINEL {
        return Ok(0);
    }
    parse_duration(raw)
}

/// Render seconds in the same compact form the parser accepts.
pub fn format_duration(secs: u64) -> String {
    if secs == 0 {
        return "0s".to_string();
    }
    [
        (secs / DAY, 'd'),
        (secs % DAY / HOUR, 'h'),
        (secs % HOUR / MINUTE, 'm'),
        (secs % MINUTE, 's'),
    ]
    .iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, unit)| format!("{n}{unit}"))
    .collect()
}

/// Time left on a record relative to a reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seconds", rename_all = "snake_case")]
pub enum Remaining {
    Permanent,
    Expired,
    Left(u64),
}

impl Remaining {
    pub fn from_expiry(expires_at: i64, now: i64) -> Self {
        if expires_at == 0 {
            return Remaining::Permanent;
        }
        match u64::try_from(expires_at.saturating_sub(now)) {
            Ok(left) => Remaining::Left(left),
            Err(_) => Remaining::Expired,
        }
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Permanent => f.write_str("permanent"),
            Remaining::Expired => f.write_str("expired"),
            Remaining::Left(secs) => write!(f, "{} left", format_duration(*secs)),
        }
    }
}
