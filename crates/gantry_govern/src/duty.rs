//! Administration duties: pre/post hooks around function execution.

use crate::extension::ExtensionSet;
use gantry_asset::LatchHandle;
use gantry_core::{Fault, FunctionIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// When a duty runs relative to its bound function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DutyPhase {
    /// Strictly before the function body
    Pre,
    /// Strictly after the function body
    Post,
}

impl std::fmt::Display for DutyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// How a duty finished
#[derive(Debug)]
pub enum DutyOutcome {
    /// Duty completed; execution proceeds
    Done,
    /// Duty captured a suspension handle and parked; the kernel resumes
    /// it through the asset-manager wake-up path
    Suspended,
}

/// Resolver handed to external executors by a suspending duty
pub type DutySuspension = LatchHandle;

/// Everything a running duty can reach
///
/// The context is handed in by the kernel; duties never touch
/// thread-state directly.
pub trait DutyContext {
    /// Phase this invocation runs in
    fn phase(&self) -> DutyPhase;

    /// Extension surfaces of the administered objects, in binding order
    fn extensions(&self) -> &ExtensionSet<'_>;

    /// Instigate a sub-flow joining the surrounding completion accounting
    fn instigate(&mut self, function: FunctionIndex, parameter: Value);

    /// Suspension handle; returning [`DutyOutcome::Suspended`] afterwards
    /// parks the duty until the handle resolves
    fn suspender(&mut self) -> DutySuspension;
}

/// Administration hook bound to a function's execution
pub trait Duty: Send + Sync {
    /// Execute the duty
    ///
    /// # Errors
    ///
    /// Returns a fault that escalates on the owning thread-state,
    /// aborting the function chain exactly like a function failure.
    fn administer(&self, ctx: &mut dyn DutyContext) -> Result<DutyOutcome, Fault>;
}
