//! GANTRY Office
//!
//! The top of the kernel: an office binds static metadata to registered
//! functions, teams, object sources, duties, and governance enactors,
//! supervises bring-up and shutdown, and drives the periodic tick that
//! enforces the liveness guarantee.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod handle;
pub mod office;

pub use builder::OfficeBuilder;
pub use handle::ProcessHandle;
pub use office::Office;

pub use gantry_flow::{KernelMetrics, MetricsSnapshot, ProcessStatus};
