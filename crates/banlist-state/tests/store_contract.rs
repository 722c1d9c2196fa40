//! The `RecordStore` contract, run against every implementation, plus
//! `StateHandle` behaviour over the filesystem store.

use std::time::Duration;

use banlist_state::fakes::MemoryRecordStore;
use banlist_state::{
    AccessState, CollectionKind, FsRecordStore, Record, RecordStore, StateCache, StateHandle,
};

const TIMEOUT: Duration = Duration::from_secs(1);

async fn check_put_get_roundtrip<S: RecordStore>(store: &S) {
    store.put(CollectionKind::Deny, b"{\"g1\": []}").await.unwrap();
    let got = store.get(CollectionKind::Deny).await.unwrap();
    assert_eq!(got.as_deref(), Some(&b"{\"g1\": []}"[..]));
}

async fn check_put_replaces<S: RecordStore>(store: &S) {
    store.put(CollectionKind::AllowAll, b"[1]").await.unwrap();
    store.put(CollectionKind::AllowAll, b"[]").await.unwrap();
    let got = store.get(CollectionKind::AllowAll).await.unwrap();
    assert_eq!(got.as_deref(), Some(&b"[]"[..]));
}

async fn check_keys_are_independent<S: RecordStore>(store: &S) {
    store.put(CollectionKind::DenyAll, b"[\"a\"]").await.unwrap();
    store.put(CollectionKind::Allow, b"{}").await.unwrap();
    let deny_all = store.get(CollectionKind::DenyAll).await.unwrap();
    assert_eq!(deny_all.as_deref(), Some(&b"[\"a\"]"[..]));
}

async fn check_revision_advances_under_lock<S: RecordStore>(store: &S) {
    let mut lock = store.lock(TIMEOUT).await.unwrap();
    let before = lock.revision();
    store.advance_revision(&mut lock).await.unwrap();
    assert_eq!(lock.revision(), before + 1);
    drop(lock);

    let lock = store.lock(TIMEOUT).await.unwrap();
    assert_eq!(lock.revision(), before + 1);
}

async fn run_contract<S: RecordStore>(store: &S) {
    check_put_get_roundtrip(store).await;
    check_put_replaces(store).await;
    check_keys_are_independent(store).await;
    check_revision_advances_under_lock(store).await;
}

#[tokio::test]
async fn test_memory_store_contract() {
    run_contract(&MemoryRecordStore::new()).await;
}

#[tokio::test]
async fn test_fs_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    run_contract(&FsRecordStore::open(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn test_fs_handle_roundtrip_and_write_skipping() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let mut handle = StateHandle::new(store, StateCache::disabled());
    let mut lock = handle.lock(TIMEOUT).await.unwrap();

    let mut state = handle.load(&lock).await.unwrap();
    assert_eq!(state, AccessState::new());

    state.deny.entry("g1").push(Record::new("u", 1_700_000_060, "spam"));
    state.deny_all.push(Record::permanent("v", ""));
    let written = handle.save(&mut lock, &state).await.unwrap();
    // The seeded empty documents lack the trailing newline the codec emits.
    assert_eq!(written, 4);
    assert_eq!(handle.save(&mut lock, &state).await.unwrap(), 0);
    drop(lock);

    let reopened = FsRecordStore::open(dir.path()).unwrap();
    let mut fresh = StateHandle::new(reopened, StateCache::new(Duration::from_secs(60)));
    let lock = fresh.lock(TIMEOUT).await.unwrap();
    assert_eq!(fresh.load(&lock).await.unwrap(), state);
    drop(lock);

    let raw = std::fs::read_to_string(dir.path().join("deny.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["g1"][0]["uid"], "u");
    assert_eq!(json["g1"][0]["time"], 1_700_000_060);
    assert_eq!(json["g1"][0]["reason"], "spam");

    let raw = std::fs::read_to_string(dir.path().join("deny_all.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(json[0]["reason"].is_null());
}

#[tokio::test]
async fn test_fs_handle_tolerates_malformed_records() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("allow.json"),
        r#"{"g1": [{"uid": "ok", "time": 0}, {"time": 5}], "g2": "oops"}"#,
    )
    .unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let mut handle = StateHandle::new(store, StateCache::disabled());

    let lock = handle.lock(TIMEOUT).await.unwrap();
    let state = handle.load(&lock).await.unwrap();
    assert_eq!(state.allow.record_count(), 1);
    assert!(state.allow.find("g1", "ok").is_some());
    assert!(state.allow.get("g2").is_none());
}
