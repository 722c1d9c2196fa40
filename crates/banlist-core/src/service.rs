//! `AccessControl`: the single owner of the access state.
//!
//! Every public operation is one critical section:
//! lock -> load -> reconcile -> act -> persist.
//! The lock has two layers: a `tokio::sync::Mutex` for tasks in this
//! process, then the store lock for other processes sharing the store. Both
//! are acquired within one bounded wait, so a stuck holder surfaces as
//! [`AclError::LockTimeout`] instead of a hang.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use banlist_state::{
    AccessState, FsRecordStore, RecordStore, StateCache, StateError, StateHandle, StoreLock,
};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::instrument;

use crate::clock::{Clock, SystemClock};
use crate::config::AclConfig;
use crate::decision::{decide, Verdict};
use crate::duration::parse_span;
use crate::error::{AclError, AclResult};
use crate::listing::Listing;
use crate::mutation::{self, AddOutcome, DecrementOutcome, Target};
use crate::obs;
use crate::reconcile::{reconcile, ReconcileReport};

/// One critical section: the in-process guard and the store lock, released
/// together on drop.
struct Session<'a, S> {
    handle: MutexGuard<'a, StateHandle<S>>,
    lock: StoreLock,
}

impl<S: RecordStore> Session<'_, S> {
    async fn load(&mut self) -> AclResult<AccessState> {
        Ok(self.handle.load(&self.lock).await?)
    }

    async fn save(&mut self, state: &AccessState) -> AclResult<usize> {
        Ok(self.handle.save(&mut self.lock, state).await?)
    }
}

/// Serialized access to allow/deny state.
pub struct AccessControl<S, C = SystemClock> {
    state: Mutex<StateHandle<S>>,
    clock: C,
    enabled: AtomicBool,
    lock_timeout: Duration,
}

impl AccessControl<FsRecordStore> {
    /// Open the filesystem store named by `config` with the system clock.
    pub fn open(config: &AclConfig) -> AclResult<Self> {
        let store = FsRecordStore::open(&config.data_dir)?;
        Ok(Self::new(store, SystemClock, config))
    }
}

impl<S: RecordStore, C: Clock> AccessControl<S, C> {
    pub fn new(store: S, clock: C, config: &AclConfig) -> Self {
        let handle = StateHandle::new(store, StateCache::new(config.cache_ttl()));
        Self {
            state: Mutex::new(handle),
            clock,
            enabled: AtomicBool::new(config.enabled),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Toggle checks at runtime. Stored records are untouched.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            obs::emit_enabled_changed(enabled);
        }
    }

    async fn lock(&self, op: &'static str) -> AclResult<Session<'_, S>> {
        let started = Instant::now();
        let mut handle = match tokio::time::timeout(self.lock_timeout, self.state.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Err(self.timed_out(op)),
        };
        let remaining = self.lock_timeout.saturating_sub(started.elapsed());
        let acquired = handle.lock(remaining).await;
        match acquired {
            Ok(lock) => Ok(Session { handle, lock }),
            Err(StateError::LockTimeout { .. }) => Err(self.timed_out(op)),
            Err(e) => Err(e.into()),
        }
    }

    fn timed_out(&self, op: &'static str) -> AclError {
        let waited_ms = u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX);
        obs::emit_lock_timeout(op, waited_ms);
        AclError::LockTimeout { waited_ms }
    }

    /// Load, reconcile against the clock, and persist. Returns the
    /// reconciled state and the instant it was reconciled at.
    async fn load_reconciled(
        &self,
        session: &mut Session<'_, S>,
    ) -> AclResult<(AccessState, i64, ReconcileReport)> {
        let now = self.clock.now();
        let mut state = session.load().await?;
        let report = reconcile(&mut state, now);
        let written = session.save(&state).await?;
        obs::emit_reconciled(&report, written);
        Ok((state, now, report))
    }

    /// Run expiry sweep and redundancy pruning, persisting the result.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> AclResult<ReconcileReport> {
        let mut session = self.lock("reconcile").await?;
        let (_, _, report) = self.load_reconciled(&mut session).await?;
        Ok(report)
    }

    /// Whether `user_id` is blocked in `conversation`. When the feature is
    /// disabled this returns the default verdict without touching storage.
    #[instrument(skip(self))]
    pub async fn check(&self, conversation: &str, user_id: &str) -> AclResult<Verdict> {
        if !self.is_enabled() {
            return Ok(Verdict::allowed());
        }
        let mut session = self.lock("check").await?;
        let (state, _, _) = self.load_reconciled(&mut session).await?;
        let verdict = decide(&state, conversation, user_id);
        obs::emit_verdict(conversation, user_id, &verdict);
        Ok(verdict)
    }

    /// Create a record or extend it by `duration_seconds` (0 = permanent).
    #[instrument(skip(self, target), fields(collection = %target))]
    pub async fn add(
        &self,
        target: &Target,
        user_id: &str,
        duration_seconds: u64,
        reason: &str,
    ) -> AclResult<AddOutcome> {
        let mut session = self.lock("add").await?;
        let (mut state, now, _) = self.load_reconciled(&mut session).await?;
        let outcome =
            mutation::upsert_add(&mut state, target, user_id, duration_seconds, reason, now)?;
        session.save(&state).await?;
        obs::emit_mutation("add", target, user_id, outcome.record().expires_at());
        Ok(outcome)
    }

    /// Shorten a record by `duration_seconds`, or delete it when zero.
    #[instrument(skip(self, target), fields(collection = %target))]
    pub async fn decrement(
        &self,
        target: &Target,
        user_id: &str,
        duration_seconds: u64,
        reason: &str,
    ) -> AclResult<DecrementOutcome> {
        let mut session = self.lock("decrement").await?;
        let (mut state, _, _) = self.load_reconciled(&mut session).await?;
        let outcome = mutation::decrement(&mut state, target, user_id, duration_seconds, reason)?;
        session.save(&state).await?;
        let op = match outcome {
            DecrementOutcome::Removed(_) => "remove",
            DecrementOutcome::Shortened(_) => "decrement",
        };
        obs::emit_mutation(op, target, user_id, outcome.record().expires_at());
        Ok(outcome)
    }

    /// [`Self::add`] with a raw duration argument (`"0"` = permanent).
    pub async fn add_raw(
        &self,
        target: &Target,
        user_id: &str,
        duration: &str,
        reason: &str,
    ) -> AclResult<AddOutcome> {
        let secs = parse_span(duration)?;
        self.add(target, user_id, secs, reason).await
    }

    /// [`Self::decrement`] with a raw duration argument (`"0"` = remove).
    pub async fn decrement_raw(
        &self,
        target: &Target,
        user_id: &str,
        duration: &str,
        reason: &str,
    ) -> AclResult<DecrementOutcome> {
        let secs = parse_span(duration)?;
        self.decrement(target, user_id, secs, reason).await
    }

    /// Remove every record for `user_id`. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn reset(&self, user_id: &str) -> AclResult<usize> {
        let mut session = self.lock("reset").await?;
        let (mut state, _, _) = self.load_reconciled(&mut session).await?;
        let removed = mutation::reset(&mut state, user_id);
        session.save(&state).await?;
        obs::emit_reset(user_id, removed);
        Ok(removed)
    }

    /// Reconciled copy of the full state.
    pub async fn snapshot(&self) -> AclResult<AccessState> {
        let mut session = self.lock("snapshot").await?;
        let (state, _, _) = self.load_reconciled(&mut session).await?;
        Ok(state)
    }

    /// Records relevant to `conversation` (or only the global lists).
    pub async fn listing(&self, conversation: Option<&str>) -> AclResult<Listing> {
        let mut session = self.lock("listing").await?;
        let (state, now, _) = self.load_reconciled(&mut session).await?;
        Ok(Listing::build(&state, conversation, now))
    }
}
