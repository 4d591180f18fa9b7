//! Office construction: registrations checked against the model.
//!
//! Every declared function, team, object, and duty must have a matching
//! registration, and vice versa. Any mismatch is a construction error,
//! fatal to bring-up - request time never sees a dangling reference.

use crate::office::Office;
use gantry_core::{Clock, KernelError, KernelResult, SystemClock};
use gantry_flow::{EngineSeed, FlowEngine, WorkFunction};
use gantry_govern::{Duty, ExtensionKind, Governance};
use gantry_model::OfficeModel;
use gantry_object::ObjectSource;
use gantry_team::Team;
use indexmap::IndexMap;
use std::sync::Arc;

/// Builder collecting registrations for one office
pub struct OfficeBuilder {
    model: OfficeModel,
    functions: IndexMap<String, Arc<dyn WorkFunction>>,
    teams: IndexMap<String, Arc<dyn Team>>,
    sources: IndexMap<String, Arc<dyn ObjectSource>>,
    duties: IndexMap<String, Arc<dyn Duty>>,
    governors: IndexMap<ExtensionKind, Arc<dyn Governance>>,
    clock: Option<Arc<dyn Clock>>,
}

impl OfficeBuilder {
    /// Start building against validated-to-be metadata
    #[must_use]
    pub fn new(model: OfficeModel) -> Self {
        Self {
            model,
            functions: IndexMap::new(),
            teams: IndexMap::new(),
            sources: IndexMap::new(),
            duties: IndexMap::new(),
            governors: IndexMap::new(),
            clock: None,
        }
    }

    /// Register the logic for a declared function
    #[must_use]
    pub fn register_function(
        mut self,
        name: impl Into<String>,
        function: Arc<dyn WorkFunction>,
    ) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    /// Register a declared team
    #[must_use]
    pub fn register_team(mut self, name: impl Into<String>, team: Arc<dyn Team>) -> Self {
        self.teams.insert(name.into(), team);
        self
    }

    /// Register the source for a declared managed-object binding
    #[must_use]
    pub fn register_source(
        mut self,
        name: impl Into<String>,
        source: Arc<dyn ObjectSource>,
    ) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    /// Register a declared administration duty
    #[must_use]
    pub fn register_duty(mut self, name: impl Into<String>, duty: Arc<dyn Duty>) -> Self {
        self.duties.insert(name.into(), duty);
        self
    }

    /// Register a governance enactor for an extension surface
    #[must_use]
    pub fn register_governance(
        mut self,
        kind: ExtensionKind,
        governance: Arc<dyn Governance>,
    ) -> Self {
        self.governors.insert(kind, governance);
        self
    }

    /// Override the kernel clock (tests use a manual clock)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate everything and build the office
    ///
    /// # Errors
    ///
    /// Returns the first construction error found: model validation
    /// failures, unregistered declarations, or registrations the model
    /// never declares.
    pub fn build(self) -> KernelResult<Office> {
        let Self {
            model,
            mut functions,
            mut teams,
            mut sources,
            mut duties,
            governors,
            clock,
        } = self;

        if let Err(errors) = model.validate() {
            for error in &errors {
                tracing::error!(%error, "model validation failed");
            }
            return Err(errors.into_iter().next().unwrap_or(KernelError::Validation {
                field: "model".to_string(),
                reason: "validation failed".to_string(),
            }));
        }

        let function_table = model
            .functions
            .iter()
            .map(|declared| {
                functions
                    .shift_remove(&declared.name)
                    .ok_or(KernelError::UnknownFunction {
                        name: declared.name.clone(),
                    })
            })
            .collect::<KernelResult<Vec<_>>>()?;
        let team_table = model
            .teams
            .iter()
            .map(|declared| {
                teams
                    .shift_remove(&declared.name)
                    .ok_or(KernelError::UnknownTeam {
                        name: declared.name.clone(),
                    })
            })
            .collect::<KernelResult<Vec<_>>>()?;
        let source_table = model
            .objects
            .iter()
            .map(|declared| {
                sources
                    .shift_remove(&declared.name)
                    .ok_or(KernelError::UnknownObject {
                        name: declared.name.clone(),
                    })
            })
            .collect::<KernelResult<Vec<_>>>()?;
        let duty_table = model
            .duties
            .iter()
            .map(|declared| {
                duties
                    .shift_remove(&declared.name)
                    .ok_or(KernelError::UnknownDuty {
                        name: declared.name.clone(),
                    })
            })
            .collect::<KernelResult<Vec<_>>>()?;

        // Whatever remains was registered but never declared
        for (kind, leftover) in [
            ("function", functions.keys().next()),
            ("team", teams.keys().next()),
            ("object", sources.keys().next()),
            ("duty", duties.keys().next()),
        ] {
            if let Some(name) = leftover {
                return Err(KernelError::Validation {
                    field: kind.to_string(),
                    reason: format!("{name} registered but not declared in the model"),
                });
            }
        }

        let name = model.name.clone();
        let engine = FlowEngine::new(EngineSeed {
            model,
            functions: function_table,
            teams: team_table.clone(),
            sources: source_table,
            duties: duty_table,
            governors,
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
        })?;

        Ok(Office::assemble(name, engine, team_table))
    }
}
