//! Completion latch: the hand-off cell between an external completion
//! and the kernel committing to suspension.
//!
//! An external thread may resolve before the kernel has parked its
//! continuation, or after; the latch collapses both orders into "the
//! continuation runs exactly once".

use gantry_core::Fault;
use std::sync::{Arc, Mutex};

/// Continuation parked on an external completion
pub type Completer = Box<dyn FnOnce(Result<(), Fault>) + Send>;

enum LatchState {
    /// Nothing happened yet
    Pending,
    /// Resolved before anything parked
    Resolved(Result<(), Fault>),
    /// Continuation parked, waiting for resolution
    Parked(Completer),
    /// Continuation handed off; further resolves are late
    Consumed,
}

/// Result of parking a continuation on a latch
pub enum LatchPark {
    /// Continuation stored; resolution will run it
    Parked,
    /// Resolution raced ahead; the caller proceeds with the result
    AlreadyResolved(Result<(), Fault>),
}

/// Kernel-side end of the hand-off
pub struct CompletionLatch {
    inner: Arc<Mutex<LatchState>>,
}

impl CompletionLatch {
    /// Create a pending latch
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LatchState::Pending)),
        }
    }

    /// Cloneable handle for the external resolver
    #[must_use]
    pub fn handle(&self) -> LatchHandle {
        LatchHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Park the continuation
    #[allow(clippy::missing_panics_doc)]
    pub fn park(&self, completer: Completer) -> LatchPark {
        let mut state = self.inner.lock().expect("latch lock poisoned");
        match std::mem::replace(&mut *state, LatchState::Consumed) {
            LatchState::Pending => {
                *state = LatchState::Parked(completer);
                LatchPark::Parked
            }
            LatchState::Resolved(result) => LatchPark::AlreadyResolved(result),
            other => {
                // Double park is a contract violation; restore and fail fast
                *state = other;
                LatchPark::AlreadyResolved(Err(Fault::contract("latch parked twice")))
            }
        }
    }
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// External resolver end of the hand-off
#[derive(Clone)]
pub struct LatchHandle {
    inner: Arc<Mutex<LatchState>>,
}

impl LatchHandle {
    /// Resolve the latch, running the parked continuation if present
    ///
    /// Returns `false` when the latch was already resolved; late
    /// resolutions are dropped, never run twice.
    #[allow(clippy::missing_panics_doc)]
    pub fn resolve(&self, result: Result<(), Fault>) -> bool {
        let parked = {
            let mut state = self.inner.lock().expect("latch lock poisoned");
            match std::mem::replace(&mut *state, LatchState::Consumed) {
                LatchState::Pending => {
                    *state = LatchState::Resolved(result);
                    return true;
                }
                LatchState::Parked(completer) => completer,
                other @ (LatchState::Resolved(_) | LatchState::Consumed) => {
                    *state = other;
                    return false;
                }
            }
        };
        parked(result);
        true
    }
}
