//! Asset managers: per-responsibility registries of waiting jobs.
//!
//! A job that cannot proceed registers an asset with the manager owning
//! that responsibility and yields its team thread. Reactivation always
//! comes back through the manager - synchronous completion, the periodic
//! timeout sweep, or forced cancellation - so each asset fires exactly
//! once and a thread-state is only ever re-entered from one place.

use gantry_core::{Fault, KernelTime};
use gantry_link::{Arena, LinkedSet, NodeKey};

/// Why a parked job is being woken
#[derive(Debug)]
pub enum WakeReason {
    /// The awaited work finished
    Completed,
    /// The configured timeout elapsed before completion
    TimedOut(Fault),
    /// The owning process was cancelled
    Cancelled(Fault),
    /// The awaited work itself failed
    Failed(Fault),
}

impl WakeReason {
    /// The fault carried by a non-successful wake, if any
    #[must_use]
    pub fn into_fault(self) -> Option<Fault> {
        match self {
            Self::Completed => None,
            Self::TimedOut(fault) | Self::Cancelled(fault) | Self::Failed(fault) => Some(fault),
        }
    }
}

/// Continuation invoked when an asset fires
///
/// Wakers re-enter the kernel (typically re-assigning the parked job to
/// its team), so they must be invoked outside the manager lock.
pub type AssetWaker = Box<dyn FnOnce(WakeReason) + Send>;

/// Key identifying one registered asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetKey(NodeKey);

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "asset/{}", self.0)
    }
}

/// Asset lookup failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    /// The asset already fired (completed, timed out, or cancelled)
    #[error("asset is no longer waiting")]
    NotWaiting,
}

struct AssetEntry {
    label: String,
    registered_at: KernelTime,
    timeout_ms: u64,
    waker: AssetWaker,
}

/// Registry of waiting jobs for one responsibility
pub struct AssetManager {
    name: String,
    default_timeout_ms: u64,
    arena: Arena<AssetEntry>,
    waiting: LinkedSet,
}

impl AssetManager {
    /// Create a manager for one responsibility
    #[must_use]
    pub fn new(name: impl Into<String>, default_timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            default_timeout_ms,
            arena: Arena::new(),
            waiting: LinkedSet::new(),
        }
    }

    /// Responsibility name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of assets currently waiting
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Register an asset with its waiting job's waker
    ///
    /// `timeout_ms` of `None` uses the manager's default; a timeout of 0
    /// never expires (the asset then relies on synchronous completion).
    #[allow(clippy::missing_panics_doc)]
    pub fn register(
        &mut self,
        label: impl Into<String>,
        timeout_ms: Option<u64>,
        now: KernelTime,
        waker: AssetWaker,
    ) -> AssetKey {
        let label = label.into();
        let key = self.arena.alloc(AssetEntry {
            label: label.clone(),
            registered_at: now,
            timeout_ms: timeout_ms.unwrap_or(self.default_timeout_ms),
            waker,
        });
        self.waiting
            .add_entry(&mut self.arena, key)
            .expect("freshly allocated node is unlinked");
        tracing::debug!(manager = %self.name, %label, at = %now, "asset registered");
        AssetKey(key)
    }

    /// Detach an asset on successful completion, returning its waker
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::NotWaiting`] when the asset already fired -
    /// completion after a timeout sweep is a late completion and must not
    /// wake anything a second time.
    pub fn complete(&mut self, key: AssetKey) -> Result<AssetWaker, AssetError> {
        self.withdraw(key).map(|entry| entry.waker)
    }

    /// Detach an asset on forced cancellation, returning its waker
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::NotWaiting`] when the asset already fired.
    pub fn force(&mut self, key: AssetKey) -> Result<AssetWaker, AssetError> {
        self.withdraw(key).map(|entry| entry.waker)
    }

    /// Sweep for assets past their deadline
    ///
    /// Invoked once per office-manager tick. Expired entries are detached
    /// and their wakers returned paired with timeout faults; the caller
    /// invokes them outside the manager lock.
    pub fn check(&mut self, now: KernelTime) -> Vec<(AssetWaker, Fault)> {
        let expired: Vec<NodeKey> = self
            .waiting
            .copy_entries(&self.arena)
            .filter(|(_, entry)| {
                entry.timeout_ms > 0 && now.since(entry.registered_at) >= entry.timeout_ms
            })
            .map(|(key, _)| key)
            .collect();

        let mut fired = Vec::with_capacity(expired.len());
        for key in expired {
            if let Ok(entry) = self.withdraw(AssetKey(key)) {
                fired.push((entry.waker, Fault::timeout(entry.label)));
            }
        }
        if !fired.is_empty() {
            tracing::warn!(manager = %self.name, count = fired.len(), at = %now, "asset waits timed out");
        }
        fired
    }

    fn withdraw(&mut self, key: AssetKey) -> Result<AssetEntry, AssetError> {
        if self.waiting.remove_entry(&mut self.arena, key.0).is_err() {
            return Err(AssetError::NotWaiting);
        }
        self.arena
            .release(key.0)
            .map_err(|_| AssetError::NotWaiting)
    }
}
