//! Process-state and thread-state bookkeeping.
//!
//! A process-state is one root invocation context; its thread-states are
//! strictly sequential logical threads. All bookkeeping lives behind one
//! mutex per process; function bodies never run under it.

use gantry_asset::{AssetKey, ManagerIndex};
use gantry_core::{Fault, FunctionIndex, ObjectIndex, ProcessId, ThreadIndex};
use gantry_govern::GovernanceScope;
use gantry_object::ManagedObjectContainer;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Escalation progress of one thread-state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// No escalation in progress
    Normal,
    /// A handler chain is executing
    Escalating,
    /// The handler chain ran to completion
    Resolved,
    /// Unresolved at the process root
    Fatal,
}

/// Terminal or live status of a process-state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Thread-states still executing
    Running,
    /// All thread-states completed, escalations resolved
    Resolved,
    /// An escalation went unmatched at the process root
    Fatal(Fault),
}

/// Completion callback fired once when the process finishes
pub type ProcessCallback = Box<dyn FnOnce(Result<(), Fault>) + Send>;

/// Parent continuation gated on a join counter
pub(crate) struct PendingResume {
    pub(crate) thread: ThreadIndex,
    pub(crate) function: FunctionIndex,
    pub(crate) parameter: Value,
}

/// Join accounting for one flow
pub(crate) struct FlowCell {
    /// Thread-states still bound to this flow
    pub(crate) remaining: usize,
    /// Continuation dispatched by whichever context decrements last
    pub(crate) parent: Option<PendingResume>,
}

/// One strictly sequential logical thread
pub(crate) struct ThreadCell {
    pub(crate) flow: usize,
    /// A job body of this thread is executing right now
    pub(crate) running: bool,
    pub(crate) done: bool,
    pub(crate) escalation: EscalationState,
    /// Consecutive escalations without resolution; bounds handler loops
    pub(crate) escalation_depth: u8,
    /// Thread-scoped containers, by binding index
    pub(crate) objects: IndexMap<ObjectIndex, Arc<ManagedObjectContainer>>,
    /// Asset this thread is parked on, for forced cancellation
    pub(crate) parked: Option<(ManagerIndex, AssetKey)>,
    /// Governance scopes opened by this thread, innermost last
    pub(crate) governance: Vec<GovernanceScope>,
}

impl ThreadCell {
    pub(crate) fn new(flow: usize) -> Self {
        Self {
            flow,
            running: false,
            done: false,
            escalation: EscalationState::Normal,
            escalation_depth: 0,
            objects: IndexMap::new(),
            parked: None,
            governance: Vec::new(),
        }
    }
}

pub(crate) struct ProcessInner {
    pub(crate) status: ProcessStatus,
    pub(crate) threads: Vec<ThreadCell>,
    pub(crate) flows: Vec<FlowCell>,
    pub(crate) live_threads: usize,
    /// Process-scoped containers, by binding index
    pub(crate) objects: IndexMap<ObjectIndex, Arc<ManagedObjectContainer>>,
    pub(crate) callback: Option<ProcessCallback>,
    pub(crate) cancelling: bool,
}

/// One root invocation context
pub struct ProcessState {
    id: ProcessId,
    management: bool,
    pub(crate) inner: Mutex<ProcessInner>,
    pub(crate) done: Condvar,
}

impl ProcessState {
    pub(crate) fn new(management: bool, callback: Option<ProcessCallback>) -> Self {
        Self {
            id: ProcessId::new(),
            management,
            inner: Mutex::new(ProcessInner {
                status: ProcessStatus::Running,
                threads: Vec::new(),
                flows: Vec::new(),
                live_threads: 0,
                objects: IndexMap::new(),
                callback,
                cancelling: false,
            }),
            done: Condvar::new(),
        }
    }

    /// Process identity
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Whether this is the office-management process
    #[must_use]
    pub const fn is_management(&self) -> bool {
        self.management
    }

    /// Current status snapshot
    #[must_use]
    pub fn poll(&self) -> ProcessStatus {
        self.lock().status.clone()
    }

    /// Block until the process finishes
    ///
    /// A synchronous caller receives the unresolved fault directly.
    #[allow(clippy::missing_panics_doc)]
    pub fn wait(&self) -> Result<(), Fault> {
        let mut inner = self.lock();
        while inner.status == ProcessStatus::Running {
            inner = self.done.wait(inner).expect("process lock poisoned");
        }
        match &inner.status {
            ProcessStatus::Resolved => Ok(()),
            ProcessStatus::Fatal(fault) => Err(fault.clone()),
            ProcessStatus::Running => unreachable!("loop exits only on completion"),
        }
    }

    /// Block until the process finishes or the timeout elapses
    ///
    /// Returns `None` while still running.
    #[allow(clippy::missing_panics_doc)]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), Fault>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut inner = self.lock();
        while inner.status == ProcessStatus::Running {
            let now = std::time::Instant::now();
            let Some(left) = deadline.checked_duration_since(now).filter(|d| !d.is_zero())
            else {
                return None;
            };
            let (guard, _timed_out) = self
                .done
                .wait_timeout(inner, left)
                .expect("process lock poisoned");
            inner = guard;
        }
        Some(match &inner.status {
            ProcessStatus::Resolved => Ok(()),
            ProcessStatus::Fatal(fault) => Err(fault.clone()),
            ProcessStatus::Running => unreachable!("loop exits only on completion"),
        })
    }

    #[allow(clippy::missing_panics_doc)]
    pub(crate) fn lock(&self) -> MutexGuard<'_, ProcessInner> {
        self.inner.lock().expect("process lock poisoned")
    }
}

impl std::fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessState")
            .field("id", &self.id)
            .field("management", &self.management)
            .field("status", &self.poll())
            .finish()
    }
}
