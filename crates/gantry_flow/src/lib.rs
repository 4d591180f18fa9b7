//! GANTRY Flow
//!
//! The execution graph: flows of chained function invocations, strictly
//! sequential thread-states, process-states aggregating them, and the
//! engine loop that drives jobs across teams, parks them on assets, and
//! resolves escalation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod job;
pub mod metrics;
pub mod process;

pub use engine::{EngineSeed, FlowEngine};
pub use job::{FnWork, FunctionContext, Outcome, SpawnRequest, WorkFunction};
pub use metrics::{KernelMetrics, MetricsSnapshot};
pub use process::{EscalationState, ProcessCallback, ProcessState, ProcessStatus};
