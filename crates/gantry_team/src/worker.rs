//! Worker team: a fixed-size native thread pool fed by a channel.
//!
//! A bounded queue turns a full channel into a [`Refusal`] - the team's
//! deliberate backpressure signal. Workers drain the queue until the
//! team stops and the channel disconnects.

use crate::team::{Refusal, Team, TeamJob};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Mutex;
use std::thread::JoinHandle;

/// Team backed by native worker threads
pub struct WorkerTeam {
    name: String,
    workers: usize,
    sender: Mutex<Option<Sender<TeamJob>>>,
    receiver: Receiver<TeamJob>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerTeam {
    /// Create a team with an unbounded queue
    #[must_use]
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            name: name.into(),
            workers: workers.max(1),
            sender: Mutex::new(Some(sender)),
            receiver,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Create a team with a bounded queue
    ///
    /// A full queue refuses further assignments.
    #[must_use]
    pub fn bounded(name: impl Into<String>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            name: name.into(),
            workers: workers.max(1),
            sender: Mutex::new(Some(sender)),
            receiver,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Number of worker threads
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    fn refuse(&self, job: TeamJob) -> Refusal {
        tracing::warn!(team = %self.name, "assignment refused");
        Refusal {
            team: self.name.clone(),
            job,
        }
    }
}

impl Team for WorkerTeam {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::missing_panics_doc)]
    fn assign(&self, job: TeamJob) -> Result<(), Refusal> {
        let sender = self.sender.lock().expect("team sender lock poisoned");
        let Some(sender) = sender.as_ref() else {
            return Err(self.refuse(job));
        };
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job) | TrySendError::Disconnected(job)) => {
                Err(self.refuse(job))
            }
        }
    }

    #[allow(clippy::missing_panics_doc)]
    fn start(&self) {
        let mut handles = self.handles.lock().expect("team handles lock poisoned");
        if !handles.is_empty() {
            return;
        }
        for index in 0..self.workers {
            let receiver = self.receiver.clone();
            let label = format!("{}-{}", self.name, index);
            let handle = std::thread::Builder::new()
                .name(label)
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job.run();
                    }
                })
                .expect("spawn team worker thread");
            handles.push(handle);
        }
        tracing::debug!(team = %self.name, workers = self.workers, "team started");
    }

    #[allow(clippy::missing_panics_doc)]
    fn stop(&self) {
        // Dropping the sender disconnects the channel; workers finish the
        // backlog and exit
        self.sender
            .lock()
            .expect("team sender lock poisoned")
            .take();
        let handles: Vec<_> = self
            .handles
            .lock()
            .expect("team handles lock poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
        tracing::debug!(team = %self.name, "team stopped");
    }
}

impl Drop for WorkerTeam {
    fn drop(&mut self) {
        self.stop();
    }
}
