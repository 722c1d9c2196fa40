//! Human-readable view of the records relevant to one conversation.

use std::fmt;

use banlist_state::{AccessState, Record, RecordList};
use serde::{Deserialize, Serialize};

use crate::duration::Remaining;

/// One record as shown to an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub user_id: String,
    pub expires_at: i64,
    pub remaining: Remaining,
    pub reason: String,
}

impl ListingEntry {
    fn from_record(record: &Record, now: i64) -> Self {
        Self {
            user_id: record.user_id().to_string(),
            expires_at: record.expires_at(),
            remaining: Remaining::from_expiry(record.expires_at(), now),
            reason: record.reason().to_string(),
        }
    }
}

/// Deny and allow records for a conversation plus the global lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub conversation: Option<String>,
    pub conversation_deny: Vec<ListingEntry>,
    pub global_deny: Vec<ListingEntry>,
    pub conversation_allow: Vec<ListingEntry>,
    pub global_allow: Vec<ListingEntry>,
}

fn entries(list: Option<&RecordList>, now: i64) -> Vec<ListingEntry> {
    list.map(|l| l.iter().map(|r| ListingEntry::from_record(r, now)).collect())
        .unwrap_or_default()
}

impl Listing {
    /// Build from reconciled state. Without a conversation only the global
    /// lists are filled.
    pub fn build(state: &AccessState, conversation: Option<&str>, now: i64) -> Self {
        Self {
            conversation: conversation.map(str::to_string),
            conversation_deny: entries(conversation.and_then(|c| state.deny.get(c)), now),
            global_deny: entries(Some(&state.deny_all), now),
            conversation_allow: entries(conversation.and_then(|c| state.allow.get(c)), now),
            global_allow: entries(Some(&state.allow_all), now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conversation_deny.is_empty()
            && self.global_deny.is_empty()
            && self.conversation_allow.is_empty()
            && self.global_allow.is_empty()
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, rows: &[ListingEntry]) -> fmt::Result {
    writeln!(f, "{title}:")?;
    if rows.is_empty() {
        return writeln!(f, "  (none)");
    }
    for row in rows {
        let reason = if row.reason.is_empty() {
            "no reason"
        } else {
            row.reason.as_str()
        };
        writeln!(f, "  {} ({}) {}", row.user_id, row.remaining, reason)?;
    }
    Ok(())
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = &self.conversation {
            write_section(f, &format!("denied in {c}"), &self.conversation_deny)?;
        }
        write_section(f, "denied globally", &self.global_deny)?;
        if let Some(c) = &self.conversation {
            write_section(f, &format!("allowed in {c}"), &self.conversation_allow)?;
        }
        write_section(f, "allowed globally", &self.global_allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_for_conversation() {
        let mut state = AccessState::new();
        state.deny.entry("g1").push(Record::new("a", 160, "spam"));
        state.deny.entry("g2").push(Record::permanent("b", ""));
        state.deny_all.push(Record::permanent("c", ""));

        let listing = Listing::build(&state, Some("g1"), 100);
        assert_eq!(listing.conversation_deny.len(), 1);
        assert_eq!(listing.conversation_deny[0].remaining, Remaining::Left(60));
        assert_eq!(listing.global_deny[0].remaining, Remaining::Permanent);
        assert!(listing.conversation_allow.is_empty());
    }

    #[test]
    fn test_display_marks_empty_sections() {
        let mut state = AccessState::new();
        state.deny.entry("g1").push(Record::new("a", 160, "spam"));
        let text = Listing::build(&state, Some("g1"), 100).to_string();
        assert!(text.contains("denied in g1:\n  a (1m left) spam\n"));
        assert!(text.contains("allowed globally:\n  (none)\n"));
    }

    #[test]
    fn test_global_only_listing() {
        let listing = Listing::build(&AccessState::new(), None, 0);
        assert!(listing.is_empty());
        assert!(!listing.to_string().contains("denied in"));
    }
}
