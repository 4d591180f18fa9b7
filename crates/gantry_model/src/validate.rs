//! Model validation at office bring-up.
//!
//! Every cross-reference in the metadata is checked before the kernel
//! accepts it. Violations are construction errors: fatal to bring-up,
//! never seen at request time.

use crate::escalation::EscalationTable;
use crate::model::OfficeModel;
use gantry_core::KernelError;
use indexmap::IndexSet;

impl OfficeModel {
    /// Validate all cross-references in the model
    ///
    /// # Errors
    ///
    /// Returns every violation found; an office must refuse to build on
    /// any of them.
    pub fn validate(&self) -> Result<(), Vec<KernelError>> {
        let mut errors = Vec::new();

        self.check_unique_names(&mut errors);
        self.check_function_references(&mut errors);
        self.check_duty_references(&mut errors);
        self.check_escalations(&self.escalations, "office escalations", &mut errors);

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn check_unique_names(&self, errors: &mut Vec<KernelError>) {
        let tables: [(&str, Vec<&str>); 4] = [
            (
                "function",
                self.functions.iter().map(|f| f.name.as_str()).collect(),
            ),
            ("team", self.teams.iter().map(|t| t.name.as_str()).collect()),
            (
                "object",
                self.objects.iter().map(|o| o.name.as_str()).collect(),
            ),
            ("duty", self.duties.iter().map(|d| d.name.as_str()).collect()),
        ];
        for (kind, names) in tables {
            let mut seen = IndexSet::new();
            for name in names {
                if !seen.insert(name) {
                    errors.push(KernelError::DuplicateName {
                        kind: kind.to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
    }

    fn check_function_references(&self, errors: &mut Vec<KernelError>) {
        for function in &self.functions {
            if function.team.index() >= self.teams.len() {
                errors.push(KernelError::IndexOutOfRange {
                    field: format!("function {} team", function.name),
                    index: function.team.index(),
                    len: self.teams.len(),
                });
            }
            if let Some(next) = function.next {
                if next.index() >= self.functions.len() {
                    errors.push(KernelError::IndexOutOfRange {
                        field: format!("function {} next", function.name),
                        index: next.index(),
                        len: self.functions.len(),
                    });
                }
            }
            for object in &function.objects {
                if object.index() >= self.objects.len() {
                    errors.push(KernelError::IndexOutOfRange {
                        field: format!("function {} object", function.name),
                        index: object.index(),
                        len: self.objects.len(),
                    });
                }
            }
            for duty in function.pre_duties.iter().chain(&function.post_duties) {
                if duty.index() >= self.duties.len() {
                    errors.push(KernelError::IndexOutOfRange {
                        field: format!("function {} duty", function.name),
                        index: duty.index(),
                        len: self.duties.len(),
                    });
                }
            }
            self.check_escalations(
                &function.escalations,
                &format!("function {} escalations", function.name),
                errors,
            );
        }
    }

    fn check_duty_references(&self, errors: &mut Vec<KernelError>) {
        for duty in &self.duties {
            for object in &duty.objects {
                if object.index() >= self.objects.len() {
                    errors.push(KernelError::IndexOutOfRange {
                        field: format!("duty {} object", duty.name),
                        index: object.index(),
                        len: self.objects.len(),
                    });
                }
            }
        }
    }

    fn check_escalations(
        &self,
        table: &EscalationTable,
        field: &str,
        errors: &mut Vec<KernelError>,
    ) {
        for entry in table.entries() {
            if entry.handler.index() >= self.functions.len() {
                errors.push(KernelError::IndexOutOfRange {
                    field: field.to_string(),
                    index: entry.handler.index(),
                    len: self.functions.len(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::{FaultMatch, KindPattern};
    use crate::model::{DutyModel, FunctionModel, ObjectModel, TeamModel};
    use gantry_core::{DutyIndex, FunctionIndex, ObjectIndex, TeamIndex};
    use gantry_govern::DutyPhase;

    fn valid_model() -> OfficeModel {
        let mut model = OfficeModel::new("orders");
        let team = model.add_team(TeamModel::new("fast"));
        let object = model.add_object(ObjectModel::new("db"));
        let duty = model.add_duty(DutyModel::new("audit", DutyPhase::Pre).with_object(object));
        let handler = model.add_function(FunctionModel::new("on_timeout", team));
        model.add_function(
            FunctionModel::new("entry", team)
                .with_object(object)
                .with_pre_duty(duty)
                .with_escalations(
                    EscalationTable::new()
                        .with_entry(FaultMatch::Kind(KindPattern::Timeout), handler),
                ),
        );
        model
    }

    #[test]
    fn test_valid_model_passes() {
        assert!(valid_model().validate().is_ok());
    }

    #[test]
    fn test_duplicate_function_name() {
        let mut model = valid_model();
        let team = TeamIndex::new(0);
        model.add_function(FunctionModel::new("entry", team));

        let errors = model.validate().unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            KernelError::DuplicateName { kind, name } if kind == "function" && name == "entry"
        )));
    }

    #[test]
    fn test_dangling_team_reference() {
        let mut model = valid_model();
        model.add_function(FunctionModel::new("orphan", TeamIndex::new(9)));

        let errors = model.validate().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, KernelError::IndexOutOfRange { index: 9, .. })));
    }

    #[test]
    fn test_dangling_next_reference() {
        let mut model = valid_model();
        let team = TeamIndex::new(0);
        model.add_function(FunctionModel::new("tail", team).with_next(FunctionIndex::new(42)));

        assert!(model.validate().is_err());
    }

    #[test]
    fn test_dangling_object_and_duty() {
        let mut model = valid_model();
        let team = TeamIndex::new(0);
        model.add_function(
            FunctionModel::new("needy", team)
                .with_object(ObjectIndex::new(7))
                .with_post_duty(DutyIndex::new(7)),
        );
        model.add_duty(DutyModel::new("broken", DutyPhase::Post).with_object(ObjectIndex::new(8)));

        let errors = model.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_dangling_escalation_handler() {
        let mut model = valid_model();
        model.escalations = EscalationTable::new()
            .with_entry(FaultMatch::Any, FunctionIndex::new(99));

        assert!(model.validate().is_err());
    }
}
