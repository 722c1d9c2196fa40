use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use tempfile::NamedTempFile;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::lock::StoreLock;
use crate::schema::CollectionKind;
use crate::storage_traits::{RecordStore, StorageResult};

const LOCK_FILE: &str = ".lock";
const LOCK_POLL: Duration = Duration::from_millis(10);

/// Filesystem-backed record store: one JSON document per collection.
///
/// Layout: `<root>/deny.json`, `<root>/allow.json`, `<root>/deny_all.json`,
/// `<root>/allow_all.json`, plus `<root>/.lock`, which is flock'd by the
/// current writer and holds the store revision.
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    /// Open a store rooted at `root`. Creates the directory if needed and
    /// seeds missing or zero-length documents with an empty collection.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let store = Self { root };
        for kind in CollectionKind::ALL {
            let path = store.document_path(kind);
            let empty = match fs::metadata(&path) {
                Ok(meta) => meta.len() == 0,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                Err(e) => return Err(e.into()),
            };
            if empty {
                debug!(path = %path.display(), "seeding empty collection");
                replace(&store.root, &path, kind.empty_document().as_bytes())?;
            }
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document holding `kind`.
    pub fn document_path(&self, kind: CollectionKind) -> PathBuf {
        self.root.join(format!("{}.json", kind.key()))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }
}

// Atomic write: write to temp file in the same directory, then rename.
fn replace(root: &Path, path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut tmp = NamedTempFile::new_in(root)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_revision(path: &Path) -> StorageResult<u64> {
    let text = fs::read_to_string(path)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    match text.parse() {
        Ok(revision) => Ok(revision),
        Err(_) => {
            warn!(path = %path.display(), content = %text, "unreadable store revision, treating as 0");
            Ok(0)
        }
    }
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn get(&self, kind: CollectionKind) -> StorageResult<Option<Vec<u8>>> {
        let path = self.document_path(kind);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, kind: CollectionKind, data: &[u8]) -> StorageResult<()> {
        let root = self.root.clone();
        let path = self.document_path(kind);
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || replace(&root, &path, &data)).await?
    }

    async fn lock(&self, timeout: Duration) -> StorageResult<StoreLock> {
        let path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)
        })
        .await??;

        let started = Instant::now();
        let contended = fs2::lock_contended_error().raw_os_error();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.raw_os_error() == contended => {}
                Err(e) => return Err(e.into()),
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(StateError::LockTimeout {
                    waited_ms: as_millis(timeout),
                });
            }
            tokio::time::sleep(LOCK_POLL.min(timeout - waited)).await;
        }

        let path = self.lock_path();
        let revision = tokio::task::spawn_blocking(move || read_revision(&path)).await??;
        Ok(StoreLock::with_file(file, revision))
    }

    async fn advance_revision(&self, lock: &mut StoreLock) -> StorageResult<()> {
        let next = lock.revision().wrapping_add(1);
        let path = self.lock_path();
        tokio::task::spawn_blocking(move || fs::write(path, next.to_string())).await??;
        lock.set_revision(next);
        Ok(())
    }
}
