//! Passive team: inline execution on the assigning thread.
//!
//! Used for functions cheap enough that a thread hop costs more than the
//! work, and for deterministic single-threaded tests.

use crate::team::{Refusal, Team, TeamJob};

/// Team executing every job synchronously on the caller's thread
pub struct PassiveTeam {
    name: String,
}

impl PassiveTeam {
    /// Create a passive team
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Team for PassiveTeam {
    fn name(&self) -> &str {
        &self.name
    }

    fn assign(&self, job: TeamJob) -> Result<(), Refusal> {
        job.run();
        Ok(())
    }
}
