//! The office manager: supervises startup, the monitoring tick, and
//! shutdown of one kernel instance.

use crate::handle::ProcessHandle;
use gantry_core::{KernelError, KernelResult};
use gantry_flow::{FlowEngine, KernelMetrics, ProcessCallback, ProcessState};
use gantry_model::OfficeModel;
use gantry_team::Team;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

struct TickThread {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: JoinHandle<()>,
}

/// One running kernel instance
///
/// `start` brings teams up, creates the privileged management process,
/// and launches the tick thread that sweeps asset managers. `stop`
/// cancels live processes and winds everything down; dropping the office
/// stops it defensively.
pub struct Office {
    name: String,
    engine: FlowEngine,
    teams: Vec<Arc<dyn Team>>,
    tick: Mutex<Option<TickThread>>,
    management: Mutex<Option<Arc<ProcessState>>>,
    running: AtomicBool,
}

impl Office {
    pub(crate) fn assemble(name: String, engine: FlowEngine, teams: Vec<Arc<dyn Team>>) -> Self {
        Self {
            name,
            engine,
            teams,
            tick: Mutex::new(None),
            management: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Office name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static metadata this office executes
    #[must_use]
    pub fn model(&self) -> &OfficeModel {
        self.engine.model()
    }

    /// Instrumentation counters
    #[must_use]
    pub fn metrics(&self) -> &KernelMetrics {
        self.engine.metrics()
    }

    /// Number of live processes, the management process included
    #[must_use]
    pub fn live_processes(&self) -> usize {
        self.engine.live_processes()
    }

    /// Bring the office up; idempotent
    #[allow(clippy::missing_panics_doc)]
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        for team in &self.teams {
            team.start();
        }

        let management = self.engine.instigate_management();
        tracing::info!(office = %self.name, management = %management.id(), "office started");
        *self
            .management
            .lock()
            .expect("management lock poisoned") = Some(management);

        let interval_ms = self.engine.model().tick_interval_ms;
        if interval_ms > 0 {
            let stop = Arc::new((Mutex::new(false), Condvar::new()));
            let stop_for_thread = Arc::clone(&stop);
            let engine = self.engine.clone();
            let interval = Duration::from_millis(interval_ms);
            let handle = std::thread::Builder::new()
                .name(format!("{}-office-manager", self.name))
                .spawn(move || {
                    let (lock, condvar) = &*stop_for_thread;
                    let mut stopped = lock.lock().expect("tick stop lock poisoned");
                    loop {
                        let (guard, _timeout) = condvar
                            .wait_timeout(stopped, interval)
                            .expect("tick stop lock poisoned");
                        stopped = guard;
                        if *stopped {
                            break;
                        }
                        engine.tick(engine.clock().now());
                    }
                })
                .expect("spawn office-manager tick thread");
            *self.tick.lock().expect("tick lock poisoned") = Some(TickThread { stop, handle });
        }
    }

    /// Wind the office down: cancel live processes, stop teams and the
    /// tick thread; idempotent
    #[allow(clippy::missing_panics_doc)]
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(tick) = self.tick.lock().expect("tick lock poisoned").take() {
            {
                let (lock, condvar) = &*tick.stop;
                *lock.lock().expect("tick stop lock poisoned") = true;
                condvar.notify_all();
            }
            let _ = tick.handle.join();
        }

        self.engine.cancel_all();
        for team in &self.teams {
            team.stop();
        }

        if let Some(management) = self
            .management
            .lock()
            .expect("management lock poisoned")
            .take()
        {
            self.engine.retire(&management);
        }
        tracing::info!(office = %self.name, "office stopped");
    }

    /// Instigate a process at a named entry function
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Shutdown`] when the office is not running
    /// and [`KernelError::UnknownFunction`] for an undeclared name.
    pub fn instigate(
        &self,
        function_name: &str,
        parameter: Value,
        callback: Option<ProcessCallback>,
    ) -> KernelResult<ProcessHandle> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(KernelError::Shutdown);
        }
        let entry = self
            .engine
            .model()
            .function_by_name(function_name)
            .ok_or_else(|| KernelError::UnknownFunction {
                name: function_name.to_string(),
            })?;
        let process = self.engine.instigate(entry, parameter, callback)?;
        Ok(ProcessHandle::new(process, self.engine.clone()))
    }
}

impl Drop for Office {
    fn drop(&mut self) {
        self.stop();
    }
}
