//! Reconciliation: expiry sweep followed by redundancy pruning.
//!
//! Both passes run as a pair before any read or write of the state. The
//! pruning steps are ordered; each one sees the output of the previous:
//!
//! 1. conversation allow removes a conversation deny it overrides
//! 2. global allow removes a global deny it overrides
//! 3. global allow records without a global deny are dropped
//! 4. conversation allow records without any deny (scoped or global) are dropped
//! 5. empty conversations are dropped

use std::collections::{BTreeSet, HashMap};

use banlist_state::{AccessState, RecordList};
use serde::{Deserialize, Serialize};

/// Counts produced by [`prune_redundant`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub overridden_deny: usize,
    pub overridden_deny_all: usize,
    pub orphaned_allow_all: usize,
    pub orphaned_allow: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.overridden_deny + self.overridden_deny_all + self.orphaned_allow_all + self.orphaned_allow
    }
}

/// Result of a full reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub expired: usize,
    pub pruned: PruneReport,
}

impl ReconcileReport {
    /// True when the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.expired == 0 && self.pruned.total() == 0
    }
}

/// Whether an allow expiring at `allow` overrides a deny expiring at `deny`.
///
/// A permanent allow overrides everything. A timed allow overrides a timed
/// deny that ends no later than it does, and never a permanent deny.
pub fn allow_overrides(allow: i64, deny: i64) -> bool {
    allow == 0 || (deny != 0 && allow >= deny)
}

/// Remove every non-permanent record whose expiry is strictly before `now`.
/// Returns the number of records removed.
pub fn sweep_expired(state: &mut AccessState, now: i64) -> usize {
    let mut removed = 0;
    for scoped in [&mut state.deny, &mut state.allow] {
        removed += scoped.retain_records(|_, r| !r.is_expired(now));
        scoped.remove_empty();
    }
    for list in [&mut state.deny_all, &mut state.allow_all] {
        removed += list.retain(|r| !r.is_expired(now));
    }
    removed
}

fn expiry_map(list: &RecordList) -> HashMap<&str, i64> {
    list.iter().map(|r| (r.user_id(), r.expires_at())).collect()
}

/// Drop records made meaningless by an overriding allow or by the absence
/// of any deny to override.
pub fn prune_redundant(state: &mut AccessState) -> PruneReport {
    let mut report = PruneReport::default();

    let AccessState {
        deny,
        allow,
        deny_all,
        allow_all,
    } = state;

    // 1. conversation allow > conversation deny
    report.overridden_deny = deny.retain_records(|conversation, record| {
        let Some(allows) = allow.get(conversation) else {
            return true;
        };
        match allows.get(record.user_id()) {
            Some(a) => !allow_overrides(a.expires_at(), record.expires_at()),
            None => true,
        }
    });

    // 2. global allow > global deny
    let global_allows = expiry_map(allow_all);
    report.overridden_deny_all = deny_all.retain(|record| {
        match global_allows.get(record.user_id()) {
            Some(&a) => !allow_overrides(a, record.expires_at()),
            None => true,
        }
    });

    // 3. global allow needs a global deny
    let denied_globally: BTreeSet<String> = deny_all.user_ids().map(str::to_string).collect();
    report.orphaned_allow_all = allow_all.retain(|r| denied_globally.contains(r.user_id()));

    // 4. conversation allow needs any deny
    let mut denied_anywhere: BTreeSet<String> =
        deny.user_ids().into_iter().map(str::to_string).collect();
    denied_anywhere.extend(denied_globally);
    report.orphaned_allow = allow.retain_records(|_, r| denied_anywhere.contains(r.user_id()));

    // 5.
    deny.remove_empty();
    allow.remove_empty();

    report
}

/// Sweep then prune.
pub fn reconcile(state: &mut AccessState, now: i64) -> ReconcileReport {
    let expired = sweep_expired(state, now);
    let pruned = prune_redundant(state);
    ReconcileReport { expired, pruned }
}
