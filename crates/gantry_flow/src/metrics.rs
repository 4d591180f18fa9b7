//! Instrumentation counters for the execution kernel.
//!
//! Cheap atomics bumped on the scheduling path; tests observe them to
//! verify the structural invariants (notably that no thread-state ever
//! has two jobs executing at once).

use std::sync::atomic::{AtomicU64, Ordering};

/// Kernel-wide counters
#[derive(Debug, Default)]
pub struct KernelMetrics {
    /// Jobs handed to teams
    pub jobs_dispatched: AtomicU64,
    /// Jobs that ran to an outcome
    pub jobs_completed: AtomicU64,
    /// Jobs parked on assets
    pub jobs_suspended: AtomicU64,
    /// Escalations entered
    pub escalations: AtomicU64,
    /// Asset timeouts fired
    pub timeouts: AtomicU64,
    /// Team refusals escalated
    pub refusals: AtomicU64,
    /// Processes instigated
    pub processes_started: AtomicU64,
    /// Processes finishing resolved
    pub processes_resolved: AtomicU64,
    /// Processes finishing fatal
    pub processes_fatal: AtomicU64,
    /// Observed violations of the single-active-job discipline
    pub overlap_violations: AtomicU64,
}

impl KernelMetrics {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_suspended: self.jobs_suspended.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            refusals: self.refusals.load(Ordering::Relaxed),
            processes_started: self.processes_started.load(Ordering::Relaxed),
            processes_resolved: self.processes_resolved.load(Ordering::Relaxed),
            processes_fatal: self.processes_fatal.load(Ordering::Relaxed),
            overlap_violations: self.overlap_violations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct MetricsSnapshot {
    pub jobs_dispatched: u64,
    pub jobs_completed: u64,
    pub jobs_suspended: u64,
    pub escalations: u64,
    pub timeouts: u64,
    pub refusals: u64,
    pub processes_started: u64,
    pub processes_resolved: u64,
    pub processes_fatal: u64,
    pub overlap_violations: u64,
}
