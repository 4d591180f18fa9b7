//! Governance scopes: active cross-cutting control over extension
//! surfaces.
//!
//! A scope captures every currently bound managed object exposing the
//! activated surface. Commit and disregard deactivate all registrations
//! atomically with respect to the owning thread-state - both execute as
//! jobs on that thread, so no other job of the thread can interleave.

use crate::extension::{ExtensionKind, ExtensionSet};
use gantry_core::{Fault, ObjectIndex};

/// Scope lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Registrations active
    Active,
    /// Deactivated by commit
    Committed,
    /// Deactivated by disregard
    Disregarded,
}

/// How an active scope is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceAction {
    /// Apply the governed work
    Commit,
    /// Abandon the governed work
    Disregard,
}

/// Governance misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernError {
    /// Commit or disregard on a scope that is no longer active
    #[error("governance scope for {kind} already closed")]
    ScopeClosed {
        /// Extension surface of the scope
        kind: ExtensionKind,
    },
}

/// Enactor invoked when a scope closes
pub trait Governance: Send + Sync {
    /// Apply or abandon the governed work over the registered surfaces
    ///
    /// # Errors
    ///
    /// Returns a fault that escalates on the owning thread-state.
    fn enact(&self, action: GovernanceAction, extensions: &ExtensionSet<'_>)
    -> Result<(), Fault>;
}

/// One activation of governance over an extension surface
pub struct GovernanceScope {
    kind: ExtensionKind,
    members: Vec<ObjectIndex>,
    state: ScopeState,
}

impl GovernanceScope {
    /// Activate governance over the given members
    #[must_use]
    pub fn activate(kind: ExtensionKind, members: Vec<ObjectIndex>) -> Self {
        tracing::debug!(kind = %kind, members = members.len(), "governance activated");
        Self {
            kind,
            members,
            state: ScopeState::Active,
        }
    }

    /// Extension surface this scope governs
    #[must_use]
    pub fn kind(&self) -> &ExtensionKind {
        &self.kind
    }

    /// Registered members, in binding order
    #[must_use]
    pub fn members(&self) -> &[ObjectIndex] {
        &self.members
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ScopeState {
        self.state
    }

    /// Check whether the scope still holds active registrations
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, ScopeState::Active)
    }

    /// Close the scope
    ///
    /// # Errors
    ///
    /// Returns [`GovernError::ScopeClosed`] when the scope was already
    /// committed or disregarded.
    pub fn close(&mut self, action: GovernanceAction) -> Result<&[ObjectIndex], GovernError> {
        if !self.is_open() {
            return Err(GovernError::ScopeClosed {
                kind: self.kind.clone(),
            });
        }
        self.state = match action {
            GovernanceAction::Commit => ScopeState::Committed,
            GovernanceAction::Disregard => ScopeState::Disregarded,
        };
        Ok(&self.members)
    }
}
