//! Escalation tables: type-matched exception handling metadata.
//!
//! A table is an ordered list of (match, handler) pairs. Selection walks
//! by specificity - a user-fault code beats a kind, a kind beats a
//! category, a category beats the catch-all - with declaration order
//! breaking ties inside one specificity level. Selection is pure and
//! deterministic: the same fault against the same table always yields
//! the same handler.

use gantry_core::{Fault, FaultCategory, FaultKind, FunctionIndex};
use serde::{Deserialize, Serialize};

/// Payload-less pattern over [`FaultKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KindPattern {
    /// Matches [`FaultKind::Timeout`]
    Timeout,
    /// Matches [`FaultKind::Refused`]
    Refused,
    /// Matches [`FaultKind::SourcingFailed`]
    SourcingFailed,
    /// Matches [`FaultKind::Governance`]
    Governance,
    /// Matches any [`FaultKind::User`] regardless of code
    User,
    /// Matches [`FaultKind::Cancelled`]
    Cancelled,
}

impl KindPattern {
    /// Check the pattern against a concrete kind
    #[must_use]
    pub fn matches(&self, kind: &FaultKind) -> bool {
        matches!(
            (self, kind),
            (Self::Timeout, FaultKind::Timeout)
                | (Self::Refused, FaultKind::Refused)
                | (Self::SourcingFailed, FaultKind::SourcingFailed)
                | (Self::Governance, FaultKind::Governance)
                | (Self::User, FaultKind::User(_))
                | (Self::Cancelled, FaultKind::Cancelled)
        )
    }
}

/// What an escalation entry matches, most specific first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultMatch {
    /// Exact user-fault code
    Code(String),
    /// Fault kind, ignoring payload
    Kind(KindPattern),
    /// Whole fault category
    Category(FaultCategory),
    /// Catch-all
    Any,
}

impl FaultMatch {
    /// Specificity rank; higher wins
    #[must_use]
    pub const fn specificity(&self) -> u8 {
        match self {
            Self::Code(_) => 3,
            Self::Kind(_) => 2,
            Self::Category(_) => 1,
            Self::Any => 0,
        }
    }

    /// Check this match against a fault
    ///
    /// Contract faults never match anything; lifecycle misuse is fatal by
    /// design, not handleable.
    #[must_use]
    pub fn matches(&self, fault: &Fault) -> bool {
        if fault.kind == FaultKind::Contract {
            return false;
        }
        match self {
            Self::Code(code) => matches!(&fault.kind, FaultKind::User(c) if c == code),
            Self::Kind(pattern) => pattern.matches(&fault.kind),
            Self::Category(category) => fault.category() == *category,
            Self::Any => true,
        }
    }
}

/// One (match, handler) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEntry {
    /// What this entry matches
    pub matches: FaultMatch,
    /// Handler function becoming the new head of the job chain
    pub handler: FunctionIndex,
}

/// Ordered escalation metadata for an office, process, or function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTable {
    entries: Vec<EscalationEntry>,
}

impl EscalationTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry, builder style
    #[must_use]
    pub fn with_entry(mut self, matches: FaultMatch, handler: FunctionIndex) -> Self {
        self.entries.push(EscalationEntry { matches, handler });
        self
    }

    /// Append an entry
    pub fn push(&mut self, matches: FaultMatch, handler: FunctionIndex) {
        self.entries.push(EscalationEntry { matches, handler });
    }

    /// Declared entries in declaration order
    #[must_use]
    pub fn entries(&self) -> &[EscalationEntry] {
        &self.entries
    }

    /// Check whether the table has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Select the handler for a fault
    ///
    /// The most specific matching entry wins; among equally specific
    /// matches the earliest declared wins.
    #[must_use]
    pub fn select(&self, fault: &Fault) -> Option<FunctionIndex> {
        let mut best: Option<(u8, FunctionIndex)> = None;
        for entry in &self.entries {
            if !entry.matches.matches(fault) {
                continue;
            }
            let specificity = entry.matches.specificity();
            match best {
                Some((rank, _)) if rank >= specificity => {}
                _ => best = Some((specificity, entry.handler)),
            }
        }
        best.map(|(_, handler)| handler)
    }
}
