//! GANTRY Model
//!
//! Immutable static metadata the kernel consumes at construction time:
//! function chain topology, team responsibility per function,
//! managed-object bindings, duty wiring, and escalation tables. The
//! declarative layer that assembles this metadata is an external
//! collaborator; the kernel only validates and executes it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod escalation;
pub mod model;
pub mod validate;

pub use escalation::{EscalationEntry, EscalationTable, FaultMatch, KindPattern};
pub use model::{DutyModel, FunctionModel, ObjectModel, OfficeModel, TeamModel};
