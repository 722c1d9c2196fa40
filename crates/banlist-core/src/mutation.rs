//! Record mutations: add time, subtract time, reset.
//!
//! These are pure functions over an already reconciled [`AccessState`];
//! [`crate::AccessControl`] wraps them with locking, reconciliation and
//! persistence. A duration of zero has a special meaning for both add
//! (make permanent) and decrement (remove outright).

use std::fmt;

use banlist_state::{AccessState, CollectionKind, Record, RecordList};
use serde::{Deserialize, Serialize};

use crate::error::{AclError, AclResult};

/// Which collection, and for scoped collections which conversation, a
/// mutation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "collection", content = "conversation", rename_all = "snake_case")]
pub enum Target {
    Deny(String),
    Allow(String),
    DenyAll,
    AllowAll,
}

impl Target {
    pub fn kind(&self) -> CollectionKind {
        match self {
            Target::Deny(_) => CollectionKind::Deny,
            Target::Allow(_) => CollectionKind::Allow,
            Target::DenyAll => CollectionKind::DenyAll,
            Target::AllowAll => CollectionKind::AllowAll,
        }
    }

    pub fn conversation(&self) -> Option<&str> {
        match self {
            Target::Deny(c) | Target::Allow(c) => Some(c),
            Target::DenyAll | Target::AllowAll => None,
        }
    }

    /// Records for this target, creating the conversation if needed.
    fn list_mut<'a>(&self, state: &'a mut AccessState) -> &'a mut RecordList {
        match self {
            Target::Deny(c) => state.deny.entry(c),
            Target::Allow(c) => state.allow.entry(c),
            Target::DenyAll => &mut state.deny_all,
            Target::AllowAll => &mut state.allow_all,
        }
    }

    /// Records for this target if present.
    fn existing_mut<'a>(&self, state: &'a mut AccessState) -> Option<&'a mut RecordList> {
        match self {
            Target::Deny(c) => state.deny.get_mut(c),
            Target::Allow(c) => state.allow.get_mut(c),
            Target::DenyAll => Some(&mut state.deny_all),
            Target::AllowAll => Some(&mut state.allow_all),
        }
    }

    fn prune_empty(&self, state: &mut AccessState) {
        match self {
            Target::Deny(_) => {
                state.deny.remove_empty();
            }
            Target::Allow(_) => {
                state.allow.remove_empty();
            }
            Target::DenyAll | Target::AllowAll => {}
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.conversation() {
            Some(c) => write!(f, "{}[{}]", self.kind(), c),
            None => write!(f, "{}", self.kind()),
        }
    }
}

/// What [`upsert_add`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum AddOutcome {
    Created(Record),
    Extended(Record),
    MadePermanent(Record),
}

impl AddOutcome {
    pub fn record(&self) -> &Record {
        match self {
            AddOutcome::Created(r) | AddOutcome::Extended(r) | AddOutcome::MadePermanent(r) => r,
        }
    }
}

/// What [`decrement`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum DecrementOutcome {
    /// Zero duration: the record was deleted. Carries the deleted record.
    Removed(Record),
    /// The expiry moved earlier. Carries the updated record.
    Shortened(Record),
}

impl DecrementOutcome {
    pub fn record(&self) -> &Record {
        match self {
            DecrementOutcome::Removed(r) | DecrementOutcome::Shortened(r) => r,
        }
    }
}

/// Stored instead of `0` when subtracting time lands exactly on the
/// permanent marker; any non-zero instant in the past expires the record.
const LONG_EXPIRED: i64 = 1;

fn as_offset(duration_seconds: u64) -> i64 {
    i64::try_from(duration_seconds).unwrap_or(i64::MAX)
}

/// Create a record or add time to an existing one.
///
/// - new record: expires `duration_seconds` from `now`, or never when zero
/// - existing permanent record: [`AclError::AlreadyPermanent`]
/// - existing timed record: zero makes it permanent, otherwise the expiry
///   moves later by `duration_seconds`
///
/// The reason is always overwritten.
pub fn upsert_add(
    state: &mut AccessState,
    target: &Target,
    user_id: &str,
    duration_seconds: u64,
    reason: &str,
    now: i64,
) -> AclResult<AddOutcome> {
    let offset = as_offset(duration_seconds);
    let list = target.list_mut(state);

    let Some(existing) = list.get_mut(user_id) else {
        let expires_at = if duration_seconds == 0 {
            0
        } else {
            now.saturating_add(offset)
        };
        let record = Record::new(user_id, expires_at, reason);
        list.push(record.clone());
        return Ok(AddOutcome::Created(record));
    };

    if existing.is_permanent() {
        // `list_mut` may have created an empty conversation; drop it again.
        target.prune_empty(state);
        return Err(AclError::AlreadyPermanent {
            user_id: user_id.to_string(),
        });
    }

    if duration_seconds == 0 {
        existing.update(Some(0), Some(reason.to_string()));
        Ok(AddOutcome::MadePermanent(existing.clone()))
    } else {
        let expires_at = existing.expires_at().saturating_add(offset);
        existing.update(Some(expires_at), Some(reason.to_string()));
        Ok(AddOutcome::Extended(existing.clone()))
    }
}

/// Subtract time from an existing record, or delete it when
/// `duration_seconds` is zero.
///
/// The expiry may move into the past; the next sweep removes the record.
/// It never becomes `0`, which would make the record permanent.
pub fn decrement(
    state: &mut AccessState,
    target: &Target,
    user_id: &str,
    duration_seconds: u64,
    reason: &str,
) -> AclResult<DecrementOutcome> {
    let not_found = || AclError::NotFound {
        user_id: user_id.to_string(),
    };
    let list = target.existing_mut(state).ok_or_else(not_found)?;

    if duration_seconds == 0 {
        let removed = list.remove(user_id).ok_or_else(not_found)?;
        target.prune_empty(state);
        return Ok(DecrementOutcome::Removed(removed));
    }

    let existing = list.get_mut(user_id).ok_or_else(not_found)?;
    if existing.is_permanent() {
        return Err(AclError::CannotDecrementPermanent {
            user_id: user_id.to_string(),
        });
    }
    let expires_at = match existing
        .expires_at()
        .saturating_sub(as_offset(duration_seconds))
    {
        0 => LONG_EXPIRED,
        t => t,
    };
    existing.update(Some(expires_at), Some(reason.to_string()));
    Ok(DecrementOutcome::Shortened(existing.clone()))
}

/// Remove `user_id` from every collection. Returns how many records were
/// removed; zero is not an error.
pub fn reset(state: &mut AccessState, user_id: &str) -> usize {
    state.remove_user(user_id)
}
