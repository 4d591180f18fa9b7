//! GANTRY Governance & Administration
//!
//! Cross-cutting control layered over managed objects: governance scopes
//! activated per extension surface and committed or disregarded
//! atomically, and administration duties running strictly before or
//! after their bound function.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod duty;
pub mod extension;
pub mod governance;

pub use duty::{Duty, DutyContext, DutyOutcome, DutyPhase, DutySuspension};
pub use extension::{ExtensionKind, ExtensionSet};
pub use governance::{Governance, GovernanceAction, GovernanceScope, GovernError, ScopeState};
