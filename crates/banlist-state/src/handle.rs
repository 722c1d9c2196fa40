//! `StateHandle`: the single path between the domain layer and storage.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::cache::StateCache;
use crate::codec;
use crate::lock::StoreLock;
use crate::schema::{AccessState, CollectionKind};
use crate::storage_traits::RecordStore;
use crate::Result;

/// SHA-256 digest of an encoded collection (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateDigest(String);

impl StateDigest {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        StateDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for StateDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store + codec + cache.
///
/// `load` serves from the cache while it is fresh and otherwise reads all
/// four collections, substituting an empty collection for any corrupt one.
/// `save` encodes all four collections, skips the write for any collection
/// whose digest matches what is already stored, then rebuilds the cache
/// from the saved state.
///
/// Both take the [`StoreLock`] of the current critical section. When the
/// lock reports a store revision this handle did not produce, the cache and
/// the known digests are dropped before anything is read or written.
pub struct StateHandle<S> {
    store: S,
    cache: StateCache,
    stored: HashMap<CollectionKind, StateDigest>,
    seen_revision: Option<u64>,
}

impl<S: RecordStore> StateHandle<S> {
    pub fn new(store: S, cache: StateCache) -> Self {
        Self {
            store,
            cache,
            stored: HashMap::new(),
            seen_revision: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// Digest of the document last read from or written to the store.
    pub fn stored_digest(&self, kind: CollectionKind) -> Option<&StateDigest> {
        self.stored.get(&kind)
    }

    /// Drop the cached snapshot so the next `load` reads the store.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    /// Take the store lock, waiting at most `timeout`.
    pub async fn lock(&mut self, timeout: Duration) -> Result<StoreLock> {
        let lock = self.store.lock(timeout).await?;
        self.observe(&lock);
        Ok(lock)
    }

    fn observe(&mut self, lock: &StoreLock) {
        if self.seen_revision == Some(lock.revision()) {
            return;
        }
        if self.seen_revision.is_some() {
            debug!(
                seen = ?self.seen_revision,
                current = lock.revision(),
                "store changed by another writer"
            );
        }
        self.cache.invalidate();
        self.stored.clear();
        self.seen_revision = Some(lock.revision());
    }

    #[instrument(skip(self, lock))]
    pub async fn load(&mut self, lock: &StoreLock) -> Result<AccessState> {
        self.observe(lock);
        let now = Instant::now();
        if let Some(state) = self.cache.get(now) {
            debug!(generation = self.cache.generation(), "state cache hit");
            return Ok(state.clone());
        }

        let mut state = AccessState::new();
        for kind in CollectionKind::ALL {
            let bytes = self.store.get(kind).await?;
            match &bytes {
                Some(bytes) => {
                    self.stored.insert(kind, StateDigest::of(bytes));
                }
                None => {
                    self.stored.remove(&kind);
                }
            }
            let collection = codec::decode_or_empty(kind, bytes.as_deref());
            codec::assign(&mut state, kind, collection);
        }
        self.cache.fill(state.clone(), now);
        Ok(state)
    }

    /// Persist all four collections. Returns how many documents were
    /// actually rewritten.
    #[instrument(skip(self, lock, state))]
    pub async fn save(&mut self, lock: &mut StoreLock, state: &AccessState) -> Result<usize> {
        self.observe(lock);
        self.cache.invalidate();

        let mut written = 0;
        for kind in CollectionKind::ALL {
            let bytes = codec::encode(kind, state)?;
            let digest = StateDigest::of(&bytes);
            if self.stored.get(&kind) == Some(&digest) {
                continue;
            }
            self.store.put(kind, &bytes).await?;
            debug!(collection = %kind, digest = %digest.short(), "collection written");
            self.stored.insert(kind, digest);
            written += 1;
        }
        if written > 0 {
            self.store.advance_revision(lock).await?;
            self.seen_revision = Some(lock.revision());
        }

        self.cache.fill(state.clone(), Instant::now());
        Ok(written)
    }
}
