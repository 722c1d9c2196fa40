//! Banlist Core Library
//!
//! Access control for chat bots: per-conversation and global allow/deny
//! records with expirations, reconciled under a fixed precedence rule.
//!
//! - [`duration`]: compact duration expressions (`1d2h30m`)
//! - [`reconcile`]: expiry sweep and redundancy pruning
//! - [`decision`]: block/allow verdicts
//! - [`mutation`]: add time, subtract time, reset
//! - [`AccessControl`]: serialized lock -> reconcile -> act -> persist

pub mod clock;
pub mod config;
pub mod decision;
pub mod duration;
pub mod error;
pub mod listing;
pub mod mutation;
pub mod obs;
pub mod reconcile;
pub mod service;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AclConfig, ConfigError};
pub use decision::{decide, Layer, Verdict};
pub use duration::{format_duration, parse_duration, parse_span, Remaining};
pub use error::{AclError, AclResult};
pub use listing::{Listing, ListingEntry};
pub use mutation::{AddOutcome, DecrementOutcome, Target};
pub use reconcile::{
    allow_overrides, prune_redundant, reconcile, sweep_expired, PruneReport, ReconcileReport,
};
pub use service::AccessControl;
pub use telemetry::init_tracing;

pub use banlist_state::{AccessState, CollectionKind, Record, RecordList, ScopedCollection};
