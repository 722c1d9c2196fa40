//! JSON codec for the four collections.
//!
//! Documents are validated on the way in. A document whose top-level shape
//! is wrong, or that is not JSON at all, is reported as
//! [`StateError::Corrupt`]; [`decode_or_empty`] turns that into an empty
//! collection for the offending key only. Inside a document, malformed
//! conversations and entries are skipped individually.

use serde_json::Value;
use tracing::{error, warn};

use crate::error::StateError;
use crate::schema::{AccessState, CollectionKind, Record, RecordList, ScopedCollection};
use crate::Result;

/// A decoded collection of either shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    Scoped(ScopedCollection),
    Global(RecordList),
}

impl Collection {
    /// The empty shape for `kind`.
    pub fn empty(kind: CollectionKind) -> Self {
        if kind.is_scoped() {
            Collection::Scoped(ScopedCollection::new())
        } else {
            Collection::Global(RecordList::new())
        }
    }
}

/// Serialize one collection of `state` as pretty-printed JSON.
pub fn encode(kind: CollectionKind, state: &AccessState) -> Result<Vec<u8>> {
    let mut bytes = match kind {
        CollectionKind::Deny => serde_json::to_vec_pretty(&state.deny)?,
        CollectionKind::Allow => serde_json::to_vec_pretty(&state.allow)?,
        CollectionKind::DenyAll => serde_json::to_vec_pretty(&state.deny_all)?,
        CollectionKind::AllowAll => serde_json::to_vec_pretty(&state.allow_all)?,
    };
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode and validate a document for `kind`.
pub fn decode(kind: CollectionKind, bytes: &[u8]) -> Result<Collection> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt {
        key: kind,
        reason: format!("invalid JSON: {e}"),
    })?;
    if kind.is_scoped() {
        decode_scoped(kind, value).map(Collection::Scoped)
    } else {
        decode_global(kind, value).map(Collection::Global)
    }
}

fn decode_scoped(kind: CollectionKind, value: Value) -> Result<ScopedCollection> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(StateError::Corrupt {
                key: kind,
                reason: format!("expected an object, found {}", type_name(&other)),
            })
        }
    };
    let mut scoped = ScopedCollection::new();
    for (conversation, entries) in map {
        let entries = match entries {
            Value::Array(entries) => entries,
            other => {
                warn!(
                    collection = %kind,
                    conversation = %conversation,
                    found = type_name(&other),
                    "conversation is not an array, skipping"
                );
                continue;
            }
        };
        let records = decode_records(kind, entries);
        if !records.is_empty() {
            scoped.insert(conversation, records);
        }
    }
    Ok(scoped)
}

fn decode_global(kind: CollectionKind, value: Value) -> Result<RecordList> {
    match value {
        Value::Array(entries) => Ok(decode_records(kind, entries)),
        other => Err(StateError::Corrupt {
            key: kind,
            reason: format!("expected an array, found {}", type_name(&other)),
        }),
    }
}

fn decode_records(kind: CollectionKind, entries: Vec<Value>) -> RecordList {
    let records = entries.into_iter().filter_map(|entry| {
        match serde_json::from_value::<Record>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(collection = %kind, error = %e, "malformed record, skipping");
                None
            }
        }
    });
    RecordList::from_records(records)
}

/// Decode `bytes`, substituting the empty shape when the document is
/// missing or corrupt. Never fails.
pub fn decode_or_empty(kind: CollectionKind, bytes: Option<&[u8]>) -> Collection {
    let Some(bytes) = bytes else {
        return Collection::empty(kind);
    };
    match decode(kind, bytes) {
        Ok(collection) => collection,
        Err(e) => {
            error!(collection = %kind, error = %e, "corrupt collection replaced with empty");
            Collection::empty(kind)
        }
    }
}

/// Place a decoded collection into `state`. Shape mismatches leave the
/// target empty.
pub fn assign(state: &mut AccessState, kind: CollectionKind, collection: Collection) {
    match (kind, collection) {
        (CollectionKind::Deny, Collection::Scoped(c)) => state.deny = c,
        (CollectionKind::Allow, Collection::Scoped(c)) => state.allow = c,
        (CollectionKind::DenyAll, Collection::Global(c)) => state.deny_all = c,
        (CollectionKind::AllowAll, Collection::Global(c)) => state.allow_all = c,
        (kind, _) => warn!(collection = %kind, "collection shape mismatch, left empty"),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scoped_document() {
        let doc = br#"{"g1": [{"uid": "a", "time": 0, "reason": "spam"}]}"#;
        let Collection::Scoped(scoped) = decode(CollectionKind::Deny, doc).unwrap() else {
            panic!("expected scoped collection");
        };
        assert_eq!(scoped.find("g1", "a").unwrap().reason(), "spam");
    }

    #[test]
    fn test_wrong_top_level_shape_is_corrupt() {
        let err = decode(CollectionKind::DenyAll, b"{}").unwrap_err();
        assert!(matches!(
            err,
            StateError::Corrupt {
                key: CollectionKind::DenyAll,
                ..
            }
        ));
        assert!(decode(CollectionKind::Allow, b"[]").is_err());
    }

    #[test]
    fn test_invalid_json_is_corrupt() {
        assert!(matches!(
            decode(CollectionKind::Deny, b"{not json"),
            Err(StateError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_non_array_conversation_skipped() {
        let doc = br#"{"bad": 5, "good": [{"uid": "a", "time": 0}]}"#;
        let Collection::Scoped(scoped) = decode(CollectionKind::Allow, doc).unwrap() else {
            panic!("expected scoped collection");
        };
        assert_eq!(scoped.conversations().collect::<Vec<_>>(), vec!["good"]);
    }

    #[test]
    fn test_malformed_entry_skipped() {
        let doc = br#"[{"uid": "a", "time": 0}, {"time": 3}, "junk", {"uid": "b", "time": 9}]"#;
        let Collection::Global(list) = decode(CollectionKind::AllowAll, doc).unwrap() else {
            panic!("expected global collection");
        };
        assert_eq!(list.user_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_decode_or_empty_substitutes_shape() {
        assert_eq!(
            decode_or_empty(CollectionKind::Deny, Some(&b"[]"[..])),
            Collection::Scoped(ScopedCollection::new())
        );
        assert_eq!(
            decode_or_empty(CollectionKind::AllowAll, None),
            Collection::Global(RecordList::new())
        );
    }

    #[test]
    fn test_encode_is_stable() {
        let mut state = AccessState::new();
        state.deny.entry("g2").push(Record::new("b", 100, ""));
        state.deny.entry("g1").push(Record::permanent("a", "r"));
        let first = encode(CollectionKind::Deny, &state).unwrap();
        let second = encode(CollectionKind::Deny, &state.clone()).unwrap();
        assert_eq!(first, second);
        let Collection::Scoped(back) = decode(CollectionKind::Deny, &first).unwrap() else {
            panic!("expected scoped collection");
        };
        assert_eq!(back, state.deny);
    }
}
