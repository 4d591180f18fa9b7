//! Kernel time for GANTRY.
//!
//! Timeout monitoring is cooperative and centrally ticked, so the kernel
//! never reads wall-clock time directly. Everything that needs "now" is
//! handed a [`Clock`], which tests replace with a [`ManualClock`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Kernel time - monotonic milliseconds since the clock's origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KernelTime(u64);

impl KernelTime {
    /// Time zero
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from raw milliseconds
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Get raw milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Saturating addition of a millisecond offset
    #[must_use]
    pub const fn saturating_add(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Milliseconds elapsed since an earlier time (zero if `earlier` is later)
    #[must_use]
    pub const fn since(&self, earlier: KernelTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Default for KernelTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for KernelTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}ms", self.0)
    }
}

/// Source of kernel time
pub trait Clock: Send + Sync {
    /// Current kernel time
    fn now(&self) -> KernelTime;
}

/// Clock backed by a monotonic OS instant
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock anchored at the moment of construction
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> KernelTime {
        KernelTime::from_millis(self.origin.elapsed().as_millis() as u64)
    }
}

/// Hand-driven clock for tests
///
/// Shared freely; `advance` moves every reader forward.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock at time zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by `millis`
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock to an absolute time
    pub fn set(&self, time: KernelTime) {
        self.now.store(time.as_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> KernelTime {
        KernelTime::from_millis(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_time() {
        let t = KernelTime::zero();
        assert_eq!(t.as_millis(), 0);

        let t2 = t.saturating_add(150);
        assert_eq!(t2.as_millis(), 150);
        assert_eq!(t2.since(t), 150);
        assert_eq!(t.since(t2), 0);
    }

    #[test]
    fn test_kernel_time_ord() {
        assert!(KernelTime::from_millis(1) < KernelTime::from_millis(2));
        assert_eq!(KernelTime::from_millis(2), KernelTime::from_millis(2));
    }

    #[test]
    fn test_kernel_time_display() {
        assert_eq!(format!("{}", KernelTime::from_millis(42)), "T42ms");
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now().as_millis(), 0);

        clock.advance(50);
        assert_eq!(clock.now().as_millis(), 50);

        let shared = clock.clone();
        shared.advance(25);
        assert_eq!(clock.now().as_millis(), 75);

        clock.set(KernelTime::from_millis(10));
        assert_eq!(clock.now().as_millis(), 10);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
