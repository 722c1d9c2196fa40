//! Banlist-State: persistence layer for banlist access control
//!
//! This crate owns every allow/deny record. It stores the four named
//! collections behind a key-based [`RecordStore`], validates them on load,
//! and keeps a short-lived read cache that is rebuilt on every write.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: schema validation, atomic replacement, and cache coherence.
//!
//! ## Key Components
//!
//! - `Record`: a single allow/deny entry (`{uid, time, reason}` on disk)
//! - `AccessState`: the four collections (`deny`, `allow`, `deny_all`, `allow_all`)
//! - `StateHandle`: store + codec + cache, the only path to persisted state
//! - `FsRecordStore`: one JSON file per collection, replaced atomically
//! - `StoreLock`: cross-process exclusion plus a revision stamp

pub mod cache;
pub mod codec;
mod error;
pub mod fakes;
pub mod fs;
mod handle;
mod lock;
mod schema;
pub mod storage_traits;

pub use cache::StateCache;
pub use error::StateError;
pub use fs::FsRecordStore;
pub use handle::{StateDigest, StateHandle};
pub use lock::StoreLock;
pub use schema::{AccessState, CollectionKind, Record, RecordList, ScopedCollection};
pub use storage_traits::{RecordStore, StorageResult};

/// Result type for banlist-state operations
pub type Result<T> = std::result::Result<T, StateError>;
