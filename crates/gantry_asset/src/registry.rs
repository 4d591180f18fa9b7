//! Registry of asset managers, swept once per office tick.

use crate::manager::{AssetManager, AssetWaker};
use gantry_core::{Fault, KernelTime};
use std::sync::Mutex;

/// Index of a manager within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerIndex(usize);

impl ManagerIndex {
    /// Wrap a raw index
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ManagerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mgr#{}", self.0)
    }
}

/// All asset managers of one office
///
/// Managers are created at construction time, one per responsibility;
/// afterwards the registry is shared read-only and each manager guards
/// its own state.
pub struct AssetRegistry {
    managers: Vec<Mutex<AssetManager>>,
}

impl AssetRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            managers: Vec::new(),
        }
    }

    /// Add a manager during construction
    pub fn add_manager(&mut self, manager: AssetManager) -> ManagerIndex {
        let index = ManagerIndex::new(self.managers.len());
        self.managers.push(Mutex::new(manager));
        index
    }

    /// Number of managers
    #[must_use]
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Check whether the registry holds no managers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Run a closure against one manager under its lock
    ///
    /// Wakers obtained inside must be invoked after this returns.
    #[allow(clippy::missing_panics_doc)]
    pub fn with_manager<R>(
        &self,
        index: ManagerIndex,
        f: impl FnOnce(&mut AssetManager) -> R,
    ) -> R {
        let mut manager = self.managers[index.index()]
            .lock()
            .expect("asset manager lock poisoned");
        f(&mut manager)
    }

    /// Sweep every manager for expired waits
    ///
    /// Locks are taken one manager at a time; the returned wakers are
    /// invoked by the caller with no locks held.
    #[allow(clippy::missing_panics_doc)]
    pub fn check_all(&self, now: KernelTime) -> Vec<(AssetWaker, Fault)> {
        let mut fired = Vec::new();
        for slot in &self.managers {
            let mut manager = slot.lock().expect("asset manager lock poisoned");
            fired.extend(manager.check(now));
        }
        fired
    }

    /// Total number of waiting assets across all managers
    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn waiting_total(&self) -> usize {
        self.managers
            .iter()
            .map(|slot| {
                slot.lock()
                    .expect("asset manager lock poisoned")
                    .waiting_len()
            })
            .sum()
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
