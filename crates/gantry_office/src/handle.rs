//! Handle returned to the external caller of a process.

use gantry_core::{Fault, ProcessId};
use gantry_flow::{FlowEngine, ProcessState, ProcessStatus};
use std::sync::Arc;
use std::time::Duration;

/// Await, poll, or cancel one instigated process
pub struct ProcessHandle {
    process: Arc<ProcessState>,
    engine: FlowEngine,
}

impl ProcessHandle {
    pub(crate) fn new(process: Arc<ProcessState>, engine: FlowEngine) -> Self {
        Self { process, engine }
    }

    /// Identity of the process
    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process.id()
    }

    /// Non-blocking status snapshot
    #[must_use]
    pub fn poll(&self) -> ProcessStatus {
        self.process.poll()
    }

    /// Block until the process finishes
    ///
    /// # Errors
    ///
    /// Returns the terminal fault of a `Fatal` process.
    pub fn wait(&self) -> Result<(), Fault> {
        self.process.wait()
    }

    /// Block until the process finishes or the timeout elapses
    ///
    /// Returns `None` while still running.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), Fault>> {
        self.process.wait_timeout(timeout)
    }

    /// Request cancellation
    ///
    /// Injected as a forced escalation into the process's thread-states;
    /// configured handlers may still resolve it.
    pub fn cancel(&self) {
        self.engine.cancel(&self.process);
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("process", &self.process_id())
            .field("status", &self.poll())
            .finish()
    }
}
