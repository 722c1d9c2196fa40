//! Store-wide exclusive lock.
//!
//! A [`StoreLock`] is held for a whole read-reconcile-act-persist sequence.
//! It carries the store revision observed when it was taken; every write
//! under the lock advances the revision, so a handle that sees a revision it
//! did not produce knows another writer touched the store.

use std::fs::File;

use fs2::FileExt;
use tracing::warn;

/// Exclusive hold on a [`crate::RecordStore`]. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: Option<File>,
    revision: u64,
}

impl StoreLock {
    /// A lock backed by an flock'd file.
    pub fn with_file(file: File, revision: u64) -> Self {
        Self {
            file: Some(file),
            revision,
        }
    }

    /// A lock for stores that are never shared between processes.
    pub fn in_process(revision: u64) -> Self {
        Self {
            file: None,
            revision,
        }
    }

    /// Store revision as of acquisition, or as last advanced under this lock.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Err(e) = FileExt::unlock(file) {
                warn!(error = %e, "failed to release store lock");
            }
        }
    }
}
