//! Short-lived read cache for the full access state.
//!
//! The cache is owned by [`crate::StateHandle`] and is part of its
//! constructor contract: a TTL of zero disables it, and every write through
//! the handle invalidates it and refills it with the state just written.
//! Each fill bumps `generation`, so readers can tell two snapshots apart.

use std::time::Duration;

use tokio::time::Instant;

use crate::schema::AccessState;

#[derive(Debug)]
struct Slot {
    state: AccessState,
    filled_at: Instant,
}

/// TTL cache holding at most one `AccessState` snapshot.
#[derive(Debug)]
pub struct StateCache {
    ttl: Duration,
    slot: Option<Slot>,
    generation: u64,
}

impl StateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: None,
            generation: 0,
        }
    }

    /// A cache that never serves a hit.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of fills so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached state if filled less than `ttl` before `now`.
    pub fn get(&self, now: Instant) -> Option<&AccessState> {
        let slot = self.slot.as_ref()?;
        if now.saturating_duration_since(slot.filled_at) < self.ttl {
            Some(&slot.state)
        } else {
            None
        }
    }

    pub fn fill(&mut self, state: AccessState, now: Instant) {
        if self.ttl.is_zero() {
            self.slot = None;
            return;
        }
        self.generation += 1;
        self.slot = Some(Slot {
            state,
            filled_at: now,
        });
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    pub fn is_filled(&self) -> bool {
        self.slot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Record;

    fn state_with(uid: &str) -> AccessState {
        let mut state = AccessState::new();
        state.deny_all.push(Record::permanent(uid, ""));
        state
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = StateCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.fill(state_with("a"), t0);
        assert!(cache.get(t0 + Duration::from_secs(59)).is_some());
        assert!(cache.get(t0 + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_invalidate_clears_slot() {
        let mut cache = StateCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.fill(state_with("a"), t0);
        cache.invalidate();
        assert!(cache.get(t0).is_none());
        assert!(!cache.is_filled());
    }

    #[test]
    fn test_refill_bumps_generation() {
        let mut cache = StateCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.fill(state_with("a"), t0);
        cache.fill(state_with("b"), t0);
        assert_eq!(cache.generation(), 2);
        assert!(cache.get(t0).unwrap().deny_all.contains("b"));
    }

    #[test]
    fn test_disabled_never_hits() {
        let mut cache = StateCache::disabled();
        let t0 = Instant::now();
        cache.fill(state_with("a"), t0);
        assert!(cache.get(t0).is_none());
        assert_eq!(cache.generation(), 0);
    }
}
