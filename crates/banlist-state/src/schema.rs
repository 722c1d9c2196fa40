//! Schema definitions for banlist state
//!
//! Collections:
//! - deny: conversation -> records blocked in that conversation
//! - allow: conversation -> records whose block is lifted in that conversation
//! - deny_all: records blocked in every conversation
//! - allow_all: records whose global block is lifted

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifies one of the four persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Deny,
    Allow,
    DenyAll,
    AllowAll,
}

impl CollectionKind {
    /// All collections in persistence order.
    pub const ALL: [CollectionKind; 4] = [
        CollectionKind::Deny,
        CollectionKind::Allow,
        CollectionKind::DenyAll,
        CollectionKind::AllowAll,
    ];

    /// Stable storage key.
    pub fn key(&self) -> &'static str {
        match self {
            CollectionKind::Deny => "deny",
            CollectionKind::Allow => "allow",
            CollectionKind::DenyAll => "deny_all",
            CollectionKind::AllowAll => "allow_all",
        }
    }

    /// Scoped collections map conversation ids to record lists.
    pub fn is_scoped(&self) -> bool {
        matches!(self, CollectionKind::Deny | CollectionKind::Allow)
    }

    /// Serialized form of an empty collection of this kind.
    pub fn empty_document(&self) -> &'static str {
        if self.is_scoped() {
            "{}"
        } else {
            "[]"
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single allow or deny entry.
///
/// `expires_at` is a unix timestamp in seconds; `0` marks a permanent
/// record. The user id is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "uid")]
    user_id: String,
    #[serde(rename = "time")]
    expires_at: i64,
    #[serde(
        default,
        serialize_with = "empty_as_null",
        deserialize_with = "null_as_empty"
    )]
    reason: String,
}

impl Record {
    pub fn new(user_id: impl Into<String>, expires_at: i64, reason: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            expires_at,
            reason: reason.into(),
        }
    }

    /// Create a record that never expires.
    pub fn permanent(user_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(user_id, 0, reason)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_permanent(&self) -> bool {
        self.expires_at == 0
    }

    /// True once a non-permanent record's expiry lies strictly before `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }

    /// Overwrite the expiry and/or reason. `None` leaves a field untouched.
    pub fn update(&mut self, time: Option<i64>, reason: Option<String>) {
        if let Some(time) = time {
            self.expires_at = time;
        }
        if let Some(reason) = reason {
            self.reason = reason;
        }
    }
}

fn empty_as_null<S>(reason: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if reason.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.serialize_some(reason)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered records, unique by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordList(Vec<Record>);

impl RecordList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list keeping the first record seen for each user id.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut list = Self::new();
        for record in records {
            if !list.contains(record.user_id()) {
                list.0.push(record);
            }
        }
        list
    }

    pub fn get(&self, user_id: &str) -> Option<&Record> {
        self.0.iter().find(|r| r.user_id == user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut Record> {
        self.0.iter_mut().find(|r| r.user_id == user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.get(user_id).is_some()
    }

    /// Append a record, replacing in place any record for the same user.
    pub fn push(&mut self, record: Record) {
        match self.get_mut(&record.user_id) {
            Some(existing) => *existing = record,
            None => self.0.push(record),
        }
    }

    pub fn remove(&mut self, user_id: &str) -> Option<Record> {
        let idx = self.0.iter().position(|r| r.user_id == user_id)?;
        Some(self.0.remove(idx))
    }

    /// Keep only records matching `keep`; returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&Record) -> bool) -> usize {
        let before = self.0.len();
        self.0.retain(|r| keep(r));
        before - self.0.len()
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|r| r.user_id.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a RecordList {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Conversation id -> records. Conversations with no records are never kept
/// once [`ScopedCollection::remove_empty`] has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopedCollection(BTreeMap<String, RecordList>);

impl ScopedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation: &str) -> Option<&RecordList> {
        self.0.get(conversation)
    }

    pub fn get_mut(&mut self, conversation: &str) -> Option<&mut RecordList> {
        self.0.get_mut(conversation)
    }

    /// Records for `conversation`, created empty if absent.
    pub fn entry(&mut self, conversation: &str) -> &mut RecordList {
        self.0.entry(conversation.to_string()).or_default()
    }

    /// Replace a conversation's records wholesale.
    pub fn insert(&mut self, conversation: impl Into<String>, records: RecordList) {
        self.0.insert(conversation.into(), records);
    }

    /// Look up a record for `user_id` in `conversation`.
    pub fn find(&self, conversation: &str, user_id: &str) -> Option<&Record> {
        self.get(conversation).and_then(|list| list.get(user_id))
    }

    /// Drop conversations with no remaining records.
    pub fn remove_empty(&mut self) -> usize {
        let before = self.0.len();
        self.0.retain(|_, list| !list.is_empty());
        before - self.0.len()
    }

    /// Apply `keep(conversation, record)` to every record; returns how many
    /// were dropped. Empty conversations are left for `remove_empty`.
    pub fn retain_records(&mut self, mut keep: impl FnMut(&str, &Record) -> bool) -> usize {
        self.0
            .iter_mut()
            .map(|(conversation, list)| list.retain(|r| keep(conversation.as_str(), r)))
            .sum()
    }

    /// Every user id present in any conversation.
    pub fn user_ids(&self) -> BTreeSet<&str> {
        self.0.values().flat_map(|list| list.user_ids()).collect()
    }

    pub fn conversations(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordList)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn record_count(&self) -> usize {
        self.0.values().map(RecordList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The complete access-control state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessState {
    pub deny: ScopedCollection,
    pub allow: ScopedCollection,
    pub deny_all: RecordList,
    pub allow_all: RecordList,
}

impl AccessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove `user_id` from all four collections. Returns the number of
    /// records removed.
    pub fn remove_user(&mut self, user_id: &str) -> usize {
        let mut removed = self.deny.retain_records(|_, r| r.user_id() != user_id);
        removed += self.allow.retain_records(|_, r| r.user_id() != user_id);
        self.deny.remove_empty();
        self.allow.remove_empty();
        removed += usize::from(self.deny_all.remove(user_id).is_some());
        removed += usize::from(self.allow_all.remove(user_id).is_some());
        removed
    }

    /// Total records across all collections.
    pub fn record_count(&self) -> usize {
        self.deny.record_count()
            + self.allow.record_count()
            + self.deny_all.len()
            + self.allow_all.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_format() {
        let record = Record::new("10001", 1_700_000_000, "spam");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"uid": "10001", "time": 1_700_000_000, "reason": "spam"})
        );
    }

    #[test]
    fn test_empty_reason_serializes_as_null() {
        let json = serde_json::to_value(Record::permanent("u", "")).unwrap();
        assert!(json["reason"].is_null());
    }

    #[test]
    fn test_missing_or_null_reason_reads_as_empty() {
        let a: Record = serde_json::from_str(r#"{"uid":"u","time":0}"#).unwrap();
        let b: Record = serde_json::from_str(r#"{"uid":"u","time":0,"reason":null}"#).unwrap();
        assert_eq!(a.reason(), "");
        assert_eq!(b.reason(), "");
        assert!(a.is_permanent());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let r: Record =
            serde_json::from_str(r#"{"uid":"u","time":5,"reason":"x","extra":true}"#).unwrap();
        assert_eq!(r.expires_at(), 5);
    }

    #[test]
    fn test_is_expired() {
        assert!(!Record::permanent("u", "").is_expired(i64::MAX));
        assert!(Record::new("u", 99, "").is_expired(100));
        assert!(!Record::new("u", 100, "").is_expired(100));
    }

    #[test]
    fn test_update_partial() {
        let mut r = Record::new("u", 10, "old");
        r.update(None, Some("new".into()));
        assert_eq!((r.expires_at(), r.reason()), (10, "new"));
        r.update(Some(0), None);
        assert!(r.is_permanent());
        assert_eq!(r.user_id(), "u");
    }

    #[test]
    fn test_record_list_unique_by_user() {
        let mut list = RecordList::new();
        list.push(Record::new("a", 1, "first"));
        list.push(Record::new("b", 2, ""));
        list.push(Record::new("a", 3, "second"));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get("a").unwrap().reason(), "second");
        assert_eq!(list.user_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_from_records_keeps_first_duplicate() {
        let list = RecordList::from_records(vec![
            Record::new("a", 1, "first"),
            Record::new("a", 2, "second"),
        ]);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get("a").unwrap().reason(), "first");
    }

    #[test]
    fn test_scoped_remove_empty() {
        let mut scoped = ScopedCollection::new();
        scoped.entry("g1").push(Record::permanent("a", ""));
        scoped.entry("g2");
        assert_eq!(scoped.remove_empty(), 1);
        assert_eq!(scoped.conversations().collect::<Vec<_>>(), vec!["g1"]);
    }

    #[test]
    fn test_remove_user_everywhere() {
        let mut state = AccessState::new();
        state.deny.entry("g1").push(Record::permanent("a", ""));
        state.allow.entry("g2").push(Record::permanent("a", ""));
        state.deny_all.push(Record::permanent("a", ""));
        state.allow_all.push(Record::permanent("b", ""));
        assert_eq!(state.remove_user("a"), 3);
        assert!(state.deny.is_empty());
        assert!(state.allow.is_empty());
        assert_eq!(state.record_count(), 1);
    }
}
