//! Unique identifiers for GANTRY entities.
//!
//! Runtime instances (processes, jobs) carry UUID-backed ids. Static
//! metadata assembled at construction time is referenced by plain index
//! newtypes - the model is immutable once the office is built, so a slot
//! index is a stable name.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process identifier - identifies one root invocation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Create a new random ProcessId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proc_{}", self.0)
    }
}

/// Job identifier - identifies one scheduled function invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random JobId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

macro_rules! index_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(usize);

        impl $name {
            /// Wrap a raw slot index
            #[must_use]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Get the raw slot index
            #[must_use]
            pub const fn index(&self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index)
            }
        }
    };
}

index_id!(
    /// Index of a function in the office model
    FunctionIndex,
    "fn#"
);

index_id!(
    /// Index of a team in the office model
    TeamIndex,
    "team#"
);

index_id!(
    /// Index of a managed-object binding in the office model
    ObjectIndex,
    "obj#"
);

index_id!(
    /// Index of an administration duty in the office model
    DutyIndex,
    "duty#"
);

index_id!(
    /// Index of a thread-state within one process-state
    ThreadIndex,
    "thread#"
);
