//! GANTRY Teams
//!
//! The pluggable concurrency boundary of the kernel: individual function
//! invocations are assigned to named teams, and a single execution graph
//! can span threads with different affinities without the graph logic
//! knowing about thread topology.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod passive;
pub mod team;
pub mod worker;

pub use passive::PassiveTeam;
pub use team::{Assignable, ClosureJob, Refusal, Team, TeamJob};
pub use worker::WorkerTeam;
