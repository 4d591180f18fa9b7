//! Runtime fault taxonomy.
//!
//! A fault is the failure value that travels through escalation
//! resolution. Faults carry a kind (the most specific classification), a
//! category (the kind's family), and the function that raised them.
//! Escalation tables match on these levels; a more specific match always
//! wins over a broader one.

use crate::id::FunctionIndex;
use serde::{Deserialize, Serialize};

/// Failure raised by a function body, a timeout sweep, a team refusal, or
/// a lifecycle violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Most specific classification
    pub kind: FaultKind,
    /// Human-readable description
    pub message: String,
    /// Function active when the fault was raised, if any
    pub function: Option<FunctionIndex>,
}

impl Fault {
    /// Create a fault
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            function: None,
        }
    }

    /// Attach the raising function
    #[must_use]
    pub fn in_function(mut self, function: FunctionIndex) -> Self {
        self.function = Some(function);
        self
    }

    /// Asset wait exceeded its configured timeout
    #[must_use]
    pub fn timeout(label: impl Into<String>) -> Self {
        Self::new(FaultKind::Timeout, format!("wait timed out: {}", label.into()))
    }

    /// Team declined to accept more work
    #[must_use]
    pub fn refused(team: impl Into<String>) -> Self {
        Self::new(
            FaultKind::Refused,
            format!("team refused assignment: {}", team.into()),
        )
    }

    /// Managed-object sourcing failed
    #[must_use]
    pub fn sourcing(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            FaultKind::SourcingFailed,
            format!("sourcing {} failed: {}", object.into(), reason.into()),
        )
    }

    /// Business fault raised by a function body, identified by code
    #[must_use]
    pub fn user(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FaultKind::User(code.into()), message)
    }

    /// Process cancellation requested by the external caller
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(FaultKind::Cancelled, "process cancelled")
    }

    /// Programming-contract violation - never handled, always fatal
    #[must_use]
    pub fn contract(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Contract, message)
    }

    /// Category of this fault's kind
    #[must_use]
    pub fn category(&self) -> FaultCategory {
        self.kind.category()
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.function {
            Some(function) => write!(f, "{} in {}: {}", self.kind.name(), function, self.message),
            None => write!(f, "{}: {}", self.kind.name(), self.message),
        }
    }
}

impl std::error::Error for Fault {}

/// Most specific fault classification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// Asset wait exceeded its timeout
    Timeout,
    /// Team refused a job assignment
    Refused,
    /// Managed-object sourcing failed
    SourcingFailed,
    /// Governance enactment failed
    Governance,
    /// Business fault raised by a function body, carrying its code
    User(String),
    /// Process cancellation
    Cancelled,
    /// Programming-contract violation (lifecycle misuse)
    Contract,
}

impl FaultKind {
    /// The family this kind belongs to
    #[must_use]
    pub fn category(&self) -> FaultCategory {
        match self {
            Self::Timeout | Self::Refused => FaultCategory::Liveness,
            Self::SourcingFailed => FaultCategory::Resource,
            Self::Governance | Self::User(_) => FaultCategory::Application,
            Self::Cancelled => FaultCategory::Control,
            Self::Contract => FaultCategory::Contract,
        }
    }

    /// Stable name of the kind, ignoring payload
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::Refused => "Refused",
            Self::SourcingFailed => "SourcingFailed",
            Self::Governance => "Governance",
            Self::User(_) => "User",
            Self::Cancelled => "Cancelled",
            Self::Contract => "Contract",
        }
    }

    /// Check whether two kinds are the same variant, ignoring payload
    #[must_use]
    pub fn same_variant(&self, other: &FaultKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Family of fault kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultCategory {
    /// Stalled progress: timeouts and refusals
    Liveness,
    /// Managed-object sourcing and recycling
    Resource,
    /// Raised by application code or governance
    Application,
    /// External control: cancellation
    Control,
    /// Lifecycle misuse - unmatchable by escalation tables
    Contract,
}
