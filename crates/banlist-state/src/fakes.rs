//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryRecordStore` satisfies the `RecordStore` contract without touching
//! the filesystem and counts reads and writes so cache behaviour can be
//! asserted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::lock::StoreLock;
use crate::schema::CollectionKind;
use crate::storage_traits::*;

/// In-memory record store backed by a `HashMap<kind, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    store: Mutex<HashMap<CollectionKind, Vec<u8>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    revision: AtomicU64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with raw bytes, bypassing the counters.
    pub fn with_document(self, kind: CollectionKind, data: impl Into<Vec<u8>>) -> Self {
        self.store.lock().unwrap().insert(kind, data.into());
        self
    }

    /// Raw bytes currently stored for `kind`.
    pub fn document(&self, kind: CollectionKind) -> Option<Vec<u8>> {
        self.store.lock().unwrap().get(&kind).cloned()
    }

    /// Number of `get` calls served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `put` calls served.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Simulate a write by some other holder of the store.
    pub fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, kind: CollectionKind) -> StorageResult<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let store = self.store.lock().unwrap();
        Ok(store.get(&kind).cloned())
    }

    async fn put(&self, kind: CollectionKind, data: &[u8]) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        store.insert(kind, data.to_vec());
        Ok(())
    }

    // Exclusion within the process is the caller's job; nothing to wait on.
    async fn lock(&self, _timeout: Duration) -> StorageResult<StoreLock> {
        Ok(StoreLock::in_process(self.revision()))
    }

    async fn advance_revision(&self, lock: &mut StoreLock) -> StorageResult<()> {
        let next = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        lock.set_revision(next);
        Ok(())
    }
}
