//! Extension surfaces of managed objects.
//!
//! Governance and administration never see the managed object itself;
//! they operate on the extension surfaces its binding advertises.

use gantry_core::{Fault, ObjectIndex};
use gantry_object::{ContainerError, ManagedObjectContainer, ObjectPayload};
use serde::{Deserialize, Serialize};

/// Name of one extension surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionKind(String);

impl ExtensionKind {
    /// Create an extension kind
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Surface name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ext:{}", self.0)
    }
}

impl From<&str> for ExtensionKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Ordered view over the extension surfaces of several containers
///
/// Order follows the binding declaration order of the administering
/// function or governance scope.
pub struct ExtensionSet<'a> {
    members: Vec<(ObjectIndex, &'a ManagedObjectContainer)>,
}

impl<'a> ExtensionSet<'a> {
    /// Build a set over the given containers
    #[must_use]
    pub fn new(members: Vec<(ObjectIndex, &'a ManagedObjectContainer)>) -> Self {
        Self { members }
    }

    /// Number of member objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check whether the set has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Binding indices, in declaration order
    pub fn indices(&self) -> impl Iterator<Item = ObjectIndex> + '_ {
        self.members.iter().map(|(index, _)| *index)
    }

    /// Run a closure against the typed extension of one member
    ///
    /// # Errors
    ///
    /// Returns a fault when the member's object is unavailable or of the
    /// wrong type.
    pub fn with_extension<T: 'static, R>(
        &self,
        position: usize,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, Fault> {
        let (index, container) = self
            .members
            .get(position)
            .ok_or_else(|| Fault::contract(format!("extension position {position} out of range")))?;
        container
            .with_object(f)
            .map_err(|err| extension_fault(*index, err))
    }

    /// Run a closure against the untyped payload of one member
    ///
    /// # Errors
    ///
    /// Returns a fault when the member's object is unavailable.
    pub fn with_payload<R>(
        &self,
        position: usize,
        f: impl FnOnce(&mut ObjectPayload) -> R,
    ) -> Result<R, Fault> {
        let (index, container) = self
            .members
            .get(position)
            .ok_or_else(|| Fault::contract(format!("extension position {position} out of range")))?;
        container
            .with_payload(f)
            .map_err(|err| extension_fault(*index, err))
    }
}

fn extension_fault(index: ObjectIndex, err: ContainerError) -> Fault {
    match err {
        ContainerError::WrongType { .. } | ContainerError::NotAvailable { .. } => {
            Fault::new(
                gantry_core::FaultKind::Governance,
                format!("extension access on {index}: {err}"),
            )
        }
        other => Fault::contract(format!("extension access on {index}: {other}")),
    }
}
