//! Team SPI.
//!
//! A team is a named unit of concurrency. The kernel hands it jobs and
//! imposes no fairness or priority policy; the team decides scheduling,
//! including deliberate backpressure by refusing work. The refused job
//! travels back inside the error so nothing is dropped; the kernel
//! escalates the refusal exactly like a function failure.

/// One unit of work a team can execute
pub trait Assignable: Send {
    /// Execute the job, consuming it
    fn run(self: Box<Self>);
}

/// Job handed across the team boundary
pub type TeamJob = Box<dyn Assignable>;

/// Job built from a closure
pub struct ClosureJob<F: FnOnce() + Send>(pub F);

impl<F: FnOnce() + Send> Assignable for ClosureJob<F> {
    fn run(self: Box<Self>) {
        (self.0)();
    }
}

/// A team declined an assignment
///
/// Carries the rejected job back to the caller.
pub struct Refusal {
    /// Name of the refusing team
    pub team: String,
    /// The job the team would not take
    pub job: TeamJob,
}

impl std::fmt::Debug for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refusal").field("team", &self.team).finish()
    }
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "team {} refused the assignment", self.team)
    }
}

impl std::error::Error for Refusal {}

/// Named, pluggable unit of concurrency
pub trait Team: Send + Sync {
    /// Team name
    fn name(&self) -> &str;

    /// Assign a job for execution
    ///
    /// # Errors
    ///
    /// Returns [`Refusal`] carrying the job back when the team will not
    /// accept more work.
    fn assign(&self, job: TeamJob) -> Result<(), Refusal>;

    /// Bring the team's workers up; idempotent
    fn start(&self) {}

    /// Stop accepting work and wind the workers down
    fn stop(&self) {}
}
