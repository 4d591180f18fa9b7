//! Static office metadata.
//!
//! The declarative layer that assembles this metadata is out of scope;
//! the kernel receives one immutable [`OfficeModel`] at construction
//! time and never mutates it afterwards.

use crate::escalation::EscalationTable;
use gantry_core::{DutyIndex, FunctionIndex, ObjectIndex, TeamIndex};
use gantry_govern::{DutyPhase, ExtensionKind};
use gantry_object::{BindScope, SourcePolicy};
use serde::{Deserialize, Serialize};

/// One function in the chain topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionModel {
    /// Function name, unique per office
    pub name: String,
    /// Team responsible for executing this function
    pub team: TeamIndex,
    /// Configured successor in the chain, if any
    pub next: Option<FunctionIndex>,
    /// Managed-object bindings, in dependency order
    pub objects: Vec<ObjectIndex>,
    /// Duties running strictly before the body
    pub pre_duties: Vec<DutyIndex>,
    /// Duties running strictly after the body
    pub post_duties: Vec<DutyIndex>,
    /// Function-level escalation override, consulted before the office table
    pub escalations: EscalationTable,
}

impl FunctionModel {
    /// Create a function assigned to a team
    #[must_use]
    pub fn new(name: impl Into<String>, team: TeamIndex) -> Self {
        Self {
            name: name.into(),
            team,
            next: None,
            objects: Vec::new(),
            pre_duties: Vec::new(),
            post_duties: Vec::new(),
            escalations: EscalationTable::new(),
        }
    }

    /// Set the configured successor
    #[must_use]
    pub fn with_next(mut self, next: FunctionIndex) -> Self {
        self.next = Some(next);
        self
    }

    /// Bind a managed object
    #[must_use]
    pub fn with_object(mut self, object: ObjectIndex) -> Self {
        self.objects.push(object);
        self
    }

    /// Attach a pre duty
    #[must_use]
    pub fn with_pre_duty(mut self, duty: DutyIndex) -> Self {
        self.pre_duties.push(duty);
        self
    }

    /// Attach a post duty
    #[must_use]
    pub fn with_post_duty(mut self, duty: DutyIndex) -> Self {
        self.post_duties.push(duty);
        self
    }

    /// Set the function-level escalation table
    #[must_use]
    pub fn with_escalations(mut self, escalations: EscalationTable) -> Self {
        self.escalations = escalations;
        self
    }
}

/// One named team slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamModel {
    /// Team name, unique per office
    pub name: String,
}

impl TeamModel {
    /// Create a team slot
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One managed-object binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectModel {
    /// Binding name, unique per office
    pub name: String,
    /// Scope the container lives in
    pub scope: BindScope,
    /// Pool vs one-shot recycling
    pub policy: SourcePolicy,
    /// Sourcing timeout override in milliseconds
    pub timeout_ms: Option<u64>,
    /// Extension surfaces this binding advertises
    pub extensions: Vec<ExtensionKind>,
}

impl ObjectModel {
    /// Create a binding with default (one-shot, process-scoped) settings
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: BindScope::Process,
            policy: SourcePolicy::OneShot,
            timeout_ms: None,
            extensions: Vec::new(),
        }
    }

    /// Set the binding scope
    #[must_use]
    pub fn with_scope(mut self, scope: BindScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the recycling policy
    #[must_use]
    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the sourcing timeout
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Advertise an extension surface
    #[must_use]
    pub fn with_extension(mut self, kind: ExtensionKind) -> Self {
        self.extensions.push(kind);
        self
    }
}

/// One administration duty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyModel {
    /// Duty name, unique per office
    pub name: String,
    /// Pre or post its bound function
    pub phase: DutyPhase,
    /// Objects this duty administers, in order
    pub objects: Vec<ObjectIndex>,
}

impl DutyModel {
    /// Create a duty
    #[must_use]
    pub fn new(name: impl Into<String>, phase: DutyPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            objects: Vec::new(),
        }
    }

    /// Administer an object
    #[must_use]
    pub fn with_object(mut self, object: ObjectIndex) -> Self {
        self.objects.push(object);
        self
    }
}

/// Complete static metadata for one office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficeModel {
    /// Office name
    pub name: String,
    /// Function chain topology
    pub functions: Vec<FunctionModel>,
    /// Team slots
    pub teams: Vec<TeamModel>,
    /// Managed-object bindings
    pub objects: Vec<ObjectModel>,
    /// Administration duties
    pub duties: Vec<DutyModel>,
    /// Office-level escalation table
    pub escalations: EscalationTable,
    /// Office-manager tick interval in milliseconds; 0 disables monitoring
    pub tick_interval_ms: u64,
    /// Default asset timeout in milliseconds
    pub default_asset_timeout_ms: u64,
}

impl OfficeModel {
    /// Create an empty model
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            teams: Vec::new(),
            objects: Vec::new(),
            duties: Vec::new(),
            escalations: EscalationTable::new(),
            tick_interval_ms: 50,
            default_asset_timeout_ms: 5_000,
        }
    }

    /// Set the tick interval
    #[must_use]
    pub fn with_tick_interval_ms(mut self, tick_interval_ms: u64) -> Self {
        self.tick_interval_ms = tick_interval_ms;
        self
    }

    /// Set the default asset timeout
    #[must_use]
    pub fn with_default_asset_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_asset_timeout_ms = timeout_ms;
        self
    }

    /// Set the office-level escalation table
    #[must_use]
    pub fn with_escalations(mut self, escalations: EscalationTable) -> Self {
        self.escalations = escalations;
        self
    }

    /// Add a team slot
    pub fn add_team(&mut self, team: TeamModel) -> TeamIndex {
        let index = TeamIndex::new(self.teams.len());
        self.teams.push(team);
        index
    }

    /// Add a managed-object binding
    pub fn add_object(&mut self, object: ObjectModel) -> ObjectIndex {
        let index = ObjectIndex::new(self.objects.len());
        self.objects.push(object);
        index
    }

    /// Add a duty
    pub fn add_duty(&mut self, duty: DutyModel) -> DutyIndex {
        let index = DutyIndex::new(self.duties.len());
        self.duties.push(duty);
        index
    }

    /// Add a function
    pub fn add_function(&mut self, function: FunctionModel) -> FunctionIndex {
        let index = FunctionIndex::new(self.functions.len());
        self.functions.push(function);
        index
    }

    /// Look up a function by name
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<FunctionIndex> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FunctionIndex::new)
    }

    /// Bindings advertising the given extension surface
    #[must_use]
    pub fn objects_with_extension(&self, kind: &ExtensionKind) -> Vec<ObjectIndex> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, object)| object.extensions.contains(kind))
            .map(|(index, _)| ObjectIndex::new(index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_building() {
        let mut model = OfficeModel::new("orders");
        let team = model.add_team(TeamModel::new("fast"));
        let object = model.add_object(
            ObjectModel::new("db")
                .with_scope(BindScope::Thread)
                .with_policy(SourcePolicy::Pooled)
                .with_extension(ExtensionKind::from("audit")),
        );
        let handler = model.add_function(FunctionModel::new("handle", team));
        let entry = model.add_function(
            FunctionModel::new("entry", team)
                .with_next(handler)
                .with_object(object),
        );

        assert_eq!(model.function_by_name("entry"), Some(entry));
        assert_eq!(model.function_by_name("missing"), None);
        assert_eq!(model.functions[entry.index()].next, Some(handler));
        assert_eq!(
            model.objects_with_extension(&ExtensionKind::from("audit")),
            vec![object]
        );
    }

    #[test]
    fn test_model_serde_round_trip() {
        let mut model = OfficeModel::new("orders").with_tick_interval_ms(25);
        let team = model.add_team(TeamModel::new("fast"));
        model.add_function(FunctionModel::new("entry", team));

        let json = serde_json::to_string(&model).unwrap();
        let back: OfficeModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }
}
