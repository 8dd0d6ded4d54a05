//! Write-rate limiting for durable state.
//!
//! An estimator is committed to storage only when it is dirty and either its
//! last commit is older than the policy interval or its tracked quantity has
//! drifted by at least the policy threshold from the committed value.

use std::sync::Arc;
use std::time::Instant;

use chalet_traits::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchivePolicy {
    /// Maximum staleness of a dirty record.
    pub interval_ms: u64,
    /// Drift from the committed baseline that forces a commit; `None` disables.
    pub drift_threshold: Option<f32>,
    /// Extra attempts after a failed write.
    pub write_retries: u8,
}

impl ArchivePolicy {
    /// Battery state: 10 minutes or 1 Ah.
    pub const BATTERY: Self = Self {
        interval_ms: 600_000,
        drift_threshold: Some(1.0),
        write_retries: 2,
    };

    /// Tank state: 10 minutes after flow stops.
    pub const TANK: Self = Self {
        interval_ms: 600_000,
        drift_threshold: None,
        write_retries: 2,
    };
}

/// Dirty flag, commit timer and committed baseline of one persisted entity.
pub struct ArchiveGate {
    policy: ArchivePolicy,
    dirty: bool,
    since: Instant,
    baseline: f32,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for ArchiveGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveGate")
            .field("policy", &self.policy)
            .field("dirty", &self.dirty)
            .field("elapsed_ms", &self.elapsed_ms())
            .field("baseline", &self.baseline)
            .finish()
    }
}

impl ArchiveGate {
    pub fn new(policy: ArchivePolicy, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let since = clock.now();
        Self {
            policy,
            dirty: false,
            since,
            baseline: 0.0,
            clock,
        }
    }

    pub fn policy(&self) -> &ArchivePolicy {
        &self.policy
    }

    /// Record that in-memory state now differs from storage.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Restart the staleness timer without committing.
    pub fn restart_timer(&mut self) {
        self.since = self.clock.now();
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.clock.ms_since(self.since)
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Accept `current` as the committed value without marking anything.
    pub fn set_baseline(&mut self, current: f32) {
        self.baseline = current;
    }

    pub fn drift(&self, current: f32) -> f32 {
        (self.baseline - current).abs()
    }

    pub fn should_archive(&self, current: f32) -> bool {
        if !self.dirty {
            return false;
        }
        let stale = self.elapsed_ms() >= self.policy.interval_ms;
        let drifted = self
            .policy
            .drift_threshold
            .is_some_and(|threshold| self.drift(current) >= threshold);
        stale || drifted
    }

    /// A write of `current` succeeded: clear dirty and restart the timer.
    pub fn committed(&mut self, current: f32) {
        self.baseline = current;
        self.dirty = false;
        self.since = self.clock.now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chalet_traits::clock::test_clock::TestClock;

    fn gate(clock: &TestClock) -> ArchiveGate {
        ArchiveGate::new(ArchivePolicy::BATTERY, Arc::new(clock.clone()))
    }

    #[test]
    fn clean_gate_never_archives() {
        let clock = TestClock::new();
        let g = gate(&clock);
        clock.advance_ms(10_000_000);
        assert!(!g.should_archive(50.0));
    }

    #[test]
    fn dirty_gate_waits_for_interval() {
        let clock = TestClock::new();
        let mut g = gate(&clock);
        g.mark_dirty();
        clock.advance_ms(599_999);
        assert!(!g.should_archive(0.5));
        clock.advance_ms(1);
        assert!(g.should_archive(0.5));
    }

    #[test]
    fn drift_forces_archive_early() {
        let clock = TestClock::new();
        let mut g = gate(&clock);
        g.mark_dirty();
        assert!(!g.should_archive(-0.99));
        assert!(g.should_archive(-1.0));
        assert!(g.should_archive(1.25));
    }

    #[test]
    fn commit_clears_and_rebases() {
        let clock = TestClock::new();
        let mut g = gate(&clock);
        g.mark_dirty();
        clock.advance_ms(700_000);
        assert!(g.should_archive(3.0));
        g.committed(3.0);
        assert!(!g.should_archive(3.0));
        g.mark_dirty();
        assert!(!g.should_archive(3.5));
        assert!(g.should_archive(4.0));
    }

    #[test]
    fn tank_policy_ignores_drift() {
        let clock = TestClock::new();
        let mut g = ArchiveGate::new(ArchivePolicy::TANK, Arc::new(clock.clone()));
        g.mark_dirty();
        assert!(!g.should_archive(1_000.0));
        clock.advance_ms(300_000);
        g.restart_timer();
        clock.advance_ms(300_000);
        assert!(!g.should_archive(0.0));
        clock.advance_ms(300_000);
        assert!(g.should_archive(0.0));
    }
}
