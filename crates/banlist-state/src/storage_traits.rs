//! Storage trait definitions for banlist
//!
//! `RecordStore` is a key-based blob store with exactly four keys, one per
//! [`CollectionKind`]. It knows nothing about the record schema; decoding
//! and validation live in [`crate::codec`].
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::lock::StoreLock;
use crate::schema::CollectionKind;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StateError>;

/// Key-based collection store.
///
/// Guarantees:
/// - `get(kind)` returns exactly the bytes of the last successful `put(kind, ..)`.
/// - `put` replaces the whole document or leaves the previous one intact.
/// - `lock` excludes every other holder of the same store, including other
///   processes, until the returned [`StoreLock`] is dropped.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the serialized collection. `Ok(None)` if it was never written.
    async fn get(&self, kind: CollectionKind) -> StorageResult<Option<Vec<u8>>>;

    /// Replace the serialized collection.
    async fn put(&self, kind: CollectionKind, data: &[u8]) -> StorageResult<()>;

    /// Take the store-wide lock, waiting at most `timeout`.
    /// Fails with `StateError::LockTimeout` when the wait runs out.
    async fn lock(&self, timeout: Duration) -> StorageResult<StoreLock>;

    /// Record that the store changed under `lock`: persist the next
    /// revision and update `lock` to it.
    async fn advance_revision(&self, lock: &mut StoreLock) -> StorageResult<()>;
}
