//! Managed-object containers.
//!
//! A container binds one externally sourced object to one scope. The
//! state machine is mutated only by the job currently owning that scope,
//! except the sourcing completion, which may arrive from whatever thread
//! the external resource uses. The external thread never touches
//! thread-state: it only moves the container to `Ready` and hands the
//! parked completer back to the kernel's wake-up path.

use crate::pool::ObjectPool;
use gantry_asset::Completer;
use gantry_core::Fault;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

/// The externally sourced object, opaque to the kernel
pub type ObjectPayload = Box<dyn Any + Send>;

/// Scope a managed object is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindScope {
    /// Sourced and recycled around a single function invocation
    Function,
    /// Lives for one thread-state
    Thread,
    /// Lives for the whole process-state
    Process,
}

/// What happens to the object when its scope ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourcePolicy {
    /// Discarded on recycle
    OneShot,
    /// Returned to the source's pool on recycle
    Pooled,
}

/// Lifecycle states of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// No sourcing attempted yet
    Unsourced,
    /// Sourcing in progress, completion may be asynchronous
    Sourcing,
    /// Object available, not yet handed to a job
    Ready,
    /// Object handed to the owning job
    InUse,
    /// Scope exit in progress
    Recycling,
    /// Object returned or discarded; terminal
    Recycled,
    /// Sourcing or use failed; absorbing
    Failed,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unsourced => "UNSOURCED",
            Self::Sourcing => "SOURCING",
            Self::Ready => "READY",
            Self::InUse => "IN_USE",
            Self::Recycling => "RECYCLING",
            Self::Recycled => "RECYCLED",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Container lifecycle misuse
///
/// These are programming-contract violations; the kernel fails the
/// owning process fast instead of absorbing them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    /// Transition not legal from the current state
    #[error("container {name}: illegal transition from {state}")]
    IllegalTransition {
        /// Container name
        name: String,
        /// State the container was in
        state: ContainerState,
    },

    /// Container recycled more than once
    #[error("container {name}: recycled twice")]
    AlreadyRecycled {
        /// Container name
        name: String,
    },

    /// Object accessed while not available
    #[error("container {name}: object not available in {state}")]
    NotAvailable {
        /// Container name
        name: String,
        /// State the container was in
        state: ContainerState,
    },

    /// Object present but of an unexpected type
    #[error("container {name}: object has unexpected type")]
    WrongType {
        /// Container name
        name: String,
    },
}

/// Result of supplying an object to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyOutcome {
    /// The container took the object
    Accepted,
    /// The container already had (or no longer wants) an object; the
    /// surplus instance went back to the pool or was dropped
    Surplus,
}

/// Result of beginning a sourcing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceBegin {
    /// Object available immediately (pool hit or synchronous supply)
    Ready,
    /// Completion will arrive asynchronously
    Pending,
}

/// Result of parking a continuation on a pending sourcing
pub enum ParkOutcome {
    /// Continuation stored; the supply path will hand it back
    Parked,
    /// Supply raced ahead; caller proceeds synchronously
    AlreadyReady,
    /// Sourcing already failed
    Failed(Fault),
}

struct ContainerInner {
    state: ContainerState,
    object: Option<ObjectPayload>,
    parked: Vec<Completer>,
    failure: Option<Fault>,
}

/// Per-binding state machine wrapping an externally sourced object
pub struct ManagedObjectContainer {
    name: String,
    policy: SourcePolicy,
    pool: Option<Arc<dyn ObjectPool>>,
    inner: Arc<Mutex<ContainerInner>>,
}

impl ManagedObjectContainer {
    /// Create an unsourced container
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        policy: SourcePolicy,
        pool: Option<Arc<dyn ObjectPool>>,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            pool,
            inner: Arc::new(Mutex::new(ContainerInner {
                state: ContainerState::Unsourced,
                object: None,
                parked: Vec::new(),
                failure: None,
            })),
        }
    }

    /// Container name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recycling policy
    #[must_use]
    pub const fn policy(&self) -> SourcePolicy {
        self.policy
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ContainerState {
        self.lock().state
    }

    /// Begin the `UNSOURCED -> SOURCING` transition
    ///
    /// A pooled container with an idle instance moves straight to
    /// `READY`. Otherwise the caller invokes the source with
    /// [`ManagedObjectContainer::sourcing_handle`] and inspects the
    /// state afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::IllegalTransition`] unless the container
    /// is `UNSOURCED`.
    pub fn begin_sourcing(&self) -> Result<SourceBegin, ContainerError> {
        let mut inner = self.lock();
        if inner.state != ContainerState::Unsourced {
            return Err(ContainerError::IllegalTransition {
                name: self.name.clone(),
                state: inner.state,
            });
        }

        if let Some(pool) = &self.pool {
            if let Some(object) = pool.acquire() {
                inner.object = Some(object);
                inner.state = ContainerState::Ready;
                tracing::debug!(container = %self.name, "sourced from pool");
                return Ok(SourceBegin::Ready);
            }
        }

        inner.state = ContainerState::Sourcing;
        Ok(SourceBegin::Pending)
    }

    /// Handle handed to the object source; safe to complete from any thread
    #[must_use]
    pub fn sourcing_handle(&self) -> SourcingHandle {
        SourcingHandle {
            name: self.name.clone(),
            policy: self.policy,
            pool: self.pool.clone(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Park a continuation until the pending sourcing completes
    ///
    /// Resolves the race between an asynchronous supply and the kernel
    /// committing to suspension: if the supply already landed, the caller
    /// proceeds synchronously instead.
    pub fn park(&self, completer: Completer) -> ParkOutcome {
        let mut inner = self.lock();
        match inner.state {
            ContainerState::Sourcing => {
                inner.parked.push(completer);
                ParkOutcome::Parked
            }
            ContainerState::Ready => ParkOutcome::AlreadyReady,
            ContainerState::Failed => {
                let fault = inner.failure.clone().unwrap_or_else(|| {
                    Fault::sourcing(self.name.clone(), "sourcing failed")
                });
                ParkOutcome::Failed(fault)
            }
            state => ParkOutcome::Failed(Fault::contract(format!(
                "container {} parked in {}",
                self.name, state
            ))),
        }
    }

    /// The sourcing failure, if the container failed
    #[must_use]
    pub fn failure(&self) -> Option<Fault> {
        self.lock().failure.clone()
    }

    /// Run a closure against the typed object
    ///
    /// Moves `READY -> IN_USE` on first access.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotAvailable`] outside `READY`/`IN_USE`
    /// and [`ContainerError::WrongType`] on a downcast mismatch.
    pub fn with_object<T: 'static, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, ContainerError> {
        let mut inner = self.lock();
        match inner.state {
            ContainerState::Ready => inner.state = ContainerState::InUse,
            ContainerState::InUse => {}
            state => {
                return Err(ContainerError::NotAvailable {
                    name: self.name.clone(),
                    state,
                });
            }
        }
        let state = inner.state;
        let object = inner.object.as_mut().ok_or(ContainerError::NotAvailable {
            name: self.name.clone(),
            state,
        })?;
        let typed = object
            .downcast_mut::<T>()
            .ok_or(ContainerError::WrongType {
                name: self.name.clone(),
            })?;
        Ok(f(typed))
    }

    /// Run a closure against the untyped payload
    ///
    /// Used by governance and administration, which resolve extension
    /// surfaces by downcasting inside the closure. Moves `READY ->
    /// IN_USE` like [`ManagedObjectContainer::with_object`].
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotAvailable`] outside `READY`/`IN_USE`.
    pub fn with_payload<R>(
        &self,
        f: impl FnOnce(&mut ObjectPayload) -> R,
    ) -> Result<R, ContainerError> {
        let mut inner = self.lock();
        match inner.state {
            ContainerState::Ready => inner.state = ContainerState::InUse,
            ContainerState::InUse => {}
            state => {
                return Err(ContainerError::NotAvailable {
                    name: self.name.clone(),
                    state,
                });
            }
        }
        let state = inner.state;
        let object = inner.object.as_mut().ok_or(ContainerError::NotAvailable {
            name: self.name.clone(),
            state,
        })?;
        Ok(f(object))
    }

    /// Recycle on scope exit
    ///
    /// Returns the object to the pool (`Pooled`) or discards it
    /// (`OneShot`). Recycling an already recycled container is a
    /// contract violation and fails fast.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::AlreadyRecycled`] on a second recycle.
    pub fn recycle(&self) -> Result<(), ContainerError> {
        let object = {
            let mut inner = self.lock();
            match inner.state {
                ContainerState::Recycling | ContainerState::Recycled => {
                    return Err(ContainerError::AlreadyRecycled {
                        name: self.name.clone(),
                    });
                }
                _ => {}
            }
            inner.state = ContainerState::Recycling;
            let object = inner.object.take();
            inner.state = ContainerState::Recycled;
            inner.parked.clear();
            object
        };

        if let Some(object) = object {
            match (&self.pool, self.policy) {
                (Some(pool), SourcePolicy::Pooled) => pool.release(object),
                _ => drop(object),
            }
        }
        tracing::debug!(container = %self.name, "recycled");
        Ok(())
    }

    #[allow(clippy::missing_panics_doc)]
    fn lock(&self) -> MutexGuard<'_, ContainerInner> {
        self.inner.lock().expect("container lock poisoned")
    }
}

/// Cloneable completion handle for one container's sourcing
///
/// The external resource calls [`SourcingHandle::supply`] from whatever
/// thread it uses; the kernel reactivates the waiting job itself.
#[derive(Clone)]
pub struct SourcingHandle {
    name: String,
    policy: SourcePolicy,
    pool: Option<Arc<dyn ObjectPool>>,
    inner: Arc<Mutex<ContainerInner>>,
}

impl SourcingHandle {
    /// Perform the `SOURCING -> READY` transition
    ///
    /// A second supply after `READY` (or any later state) never
    /// overwrites the held object: the surplus instance is returned to
    /// the pool when pooled, otherwise dropped, and `Surplus` signals the
    /// caller's error.
    #[allow(clippy::missing_panics_doc)]
    pub fn supply(&self, object: ObjectPayload) -> SupplyOutcome {
        let parked = {
            let mut inner = self.inner.lock().expect("container lock poisoned");
            match inner.state {
                ContainerState::Sourcing => {
                    inner.object = Some(object);
                    inner.state = ContainerState::Ready;
                    std::mem::take(&mut inner.parked)
                }
                _ => {
                    drop(inner);
                    match (&self.pool, self.policy) {
                        (Some(pool), SourcePolicy::Pooled) => pool.release(object),
                        _ => drop(object),
                    }
                    tracing::warn!(container = %self.name, "surplus supply discarded");
                    return SupplyOutcome::Surplus;
                }
            }
        };

        for completer in parked {
            completer(Ok(()));
        }
        SupplyOutcome::Accepted
    }

    /// Mark the sourcing as failed
    ///
    /// Transitions to the absorbing `FAILED` state and propagates the
    /// fault to the parked continuation, if any. A failure arriving after
    /// the container left `SOURCING` is ignored.
    #[allow(clippy::missing_panics_doc)]
    pub fn fail(&self, fault: Fault) {
        let parked = {
            let mut inner = self.inner.lock().expect("container lock poisoned");
            if inner.state != ContainerState::Sourcing {
                return;
            }
            inner.state = ContainerState::Failed;
            inner.failure = Some(fault.clone());
            std::mem::take(&mut inner.parked)
        };

        for completer in parked {
            completer(Err(fault.clone()));
        }
    }
}
