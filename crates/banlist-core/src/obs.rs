//! Structured observability hooks for access-control operations.
//!
//! Every emission carries an `event` field so log pipelines can filter on
//! it. Verbosity follows `RUST_LOG`; see [`crate::telemetry`].

use tracing::{debug, info, warn};

use crate::decision::Verdict;
use crate::mutation::Target;
use crate::reconcile::ReconcileReport;

/// Emit event: reconciliation pass finished. Silent passes log at debug.
pub fn emit_reconciled(report: &ReconcileReport, written: usize) {
    if report.is_noop() {
        debug!(event = "acl.reconciled", written = written, "nothing to reconcile");
        return;
    }
    info!(
        event = "acl.reconciled",
        expired = report.expired,
        overridden_deny = report.pruned.overridden_deny,
        overridden_deny_all = report.pruned.overridden_deny_all,
        orphaned_allow_all = report.pruned.orphaned_allow_all,
        orphaned_allow = report.pruned.orphaned_allow,
        written = written,
    );
}

/// Emit event: a verdict was produced for a message.
pub fn emit_verdict(conversation: &str, user_id: &str, verdict: &Verdict) {
    debug!(
        event = "acl.verdict",
        conversation = %conversation,
        user_id = %user_id,
        blocked = verdict.blocked,
        source = ?verdict.source,
    );
}

/// Emit event: a record was added, extended, shortened, or removed.
pub fn emit_mutation(op: &str, target: &Target, user_id: &str, expires_at: i64) {
    info!(
        event = "acl.mutated",
        op = %op,
        collection = %target,
        user_id = %user_id,
        expires_at = expires_at,
    );
}

/// Emit event: every record for a user was removed.
pub fn emit_reset(user_id: &str, removed: usize) {
    info!(event = "acl.reset", user_id = %user_id, removed = removed);
}

/// Emit event: the feature flag changed at runtime.
pub fn emit_enabled_changed(enabled: bool) {
    warn!(event = "acl.enabled_changed", enabled = enabled);
}

/// Emit event: the state lock could not be acquired in time (warning level).
pub fn emit_lock_timeout(op: &str, waited_ms: u64) {
    warn!(event = "acl.lock_timeout", op = %op, waited_ms = waited_ms);
}
