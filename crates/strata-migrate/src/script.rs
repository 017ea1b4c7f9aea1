use serde::{Deserialize, Serialize};
use tracing::debug;

use strata_store::{RevisionRows, StoreId};

use crate::error::{MigrateError, MigrateResult};

/// A guard on [`MigrationStep::SetValue`]: only subjects whose stored
/// `field` text equals `equals` are rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: String,
    pub equals: String,
}

/// One rewrite operation over a revision's rows.
///
/// Values are stored strings, so `value`/`to` carry the exact stored text
/// (e.g. `"5000"` for an integer, `"\"Manager\""` for a string payload).
///
/// A step that names a component or interface the rows contain no trace of
/// fails with [`MigrateError::StepFailed`]: the script does not match the
/// shape of the data it was asked to rewrite. A guard that merely matches
/// zero subjects is not a failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationStep {
    RenameComponent {
        from: String,
        to: String,
    },
    RenameInterface {
        from: String,
        to: String,
    },
    RenameField {
        interface: String,
        from: String,
        to: String,
    },
    AddField {
        interface: String,
        field: String,
        value: String,
    },
    RemoveField {
        interface: String,
        field: String,
    },
    SetValue {
        interface: String,
        field: String,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        guard: Option<FieldMatch>,
        to: String,
    },
}

impl MigrationStep {
    fn apply(&self, script: &str, rows: &mut RevisionRows) -> MigrateResult<()> {
        match self {
            MigrationStep::RenameComponent { from, to } => {
                if rows.rename_component(from, to) == 0 {
                    return Err(step_failed(
                        script,
                        format!("no objects of component '{from}'"),
                    ));
                }
            }
            MigrationStep::RenameInterface { from, to } => {
                if rows.rename_interface(from, to) == 0 {
                    return Err(step_failed(
                        script,
                        format!("no services of interface '{from}'"),
                    ));
                }
            }
            MigrationStep::RenameField {
                interface,
                from,
                to,
            } => {
                require_services(script, rows, interface)?;
                if rows.rename_field(interface, from, to) == 0 {
                    return Err(step_failed(
                        script,
                        format!("no '{from}' rows on interface '{interface}'"),
                    ));
                }
            }
            MigrationStep::AddField {
                interface,
                field,
                value,
            } => {
                for subject in require_services(script, rows, interface)? {
                    if rows.value_of(subject, field).is_none() {
                        rows.set_value(subject, field, value.clone());
                    }
                }
            }
            MigrationStep::RemoveField { interface, field } => {
                for subject in require_services(script, rows, interface)? {
                    rows.remove_value(subject, field);
                }
            }
            MigrationStep::SetValue {
                interface,
                field,
                guard,
                to,
            } => {
                for subject in require_services(script, rows, interface)? {
                    let matched = match guard {
                        Some(m) => rows.value_of(subject, &m.field) == Some(m.equals.as_str()),
                        None => true,
                    };
                    if matched {
                        rows.set_value(subject, field, to.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

fn step_failed(script: &str, reason: String) -> MigrateError {
    MigrateError::StepFailed {
        script: script.to_string(),
        reason,
    }
}

fn require_services(
    script: &str,
    rows: &RevisionRows,
    interface: &str,
) -> MigrateResult<Vec<StoreId>> {
    let subjects = rows.services_of(interface);
    if subjects.is_empty() {
        return Err(step_failed(
            script,
            format!("no services of interface '{interface}'"),
        ));
    }
    Ok(subjects)
}

/// A parsed migration script: the ordered steps of its `update` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationScript {
    name: String,
    steps: Vec<MigrationStep>,
}

impl MigrationScript {
    /// Parse a JSON migration program of the form
    /// `{"update": [<step>, ...]}`.
    pub fn parse(name: &str, source: &str) -> MigrateResult<Self> {
        let document: serde_json::Value =
            serde_json::from_str(source).map_err(|e| MigrateError::Parse {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let update = document
            .get("update")
            .ok_or_else(|| MigrateError::NoUpdateEntry(name.to_string()))?;
        let steps: Vec<MigrationStep> =
            serde_json::from_value(update.clone()).map_err(|e| MigrateError::Parse {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: name.to_string(),
            steps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Apply every step, in order, to the revision rows. Fails on the first
    /// step whose target the rows do not contain.
    pub fn run(&self, rows: &mut RevisionRows) -> MigrateResult<()> {
        for step in &self.steps {
            step.apply(&self.name, rows)?;
        }
        debug!(script = %self.name, steps = self.steps.len(), "migration script applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::{FieldRow, ObjectRow, ServiceRow};

    fn employee_rows() -> RevisionRows {
        RevisionRows {
            revision: 1,
            update_list: String::new(),
            root: 1,
            objects: vec![ObjectRow {
                id: 1,
                component: "dom.Employee".into(),
            }],
            services: vec![
                ServiceRow {
                    id: 2,
                    interface: "dom.IEmployee".into(),
                    provider: 1,
                },
                ServiceRow {
                    id: 3,
                    interface: "dom.IEmployee".into(),
                    provider: 1,
                },
            ],
            values: vec![
                FieldRow {
                    subject: 2,
                    field: "salary".into(),
                    value: "4000".into(),
                },
                FieldRow {
                    subject: 3,
                    field: "salary".into(),
                    value: "1000".into(),
                },
            ],
        }
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let err = MigrationScript::parse("syntaxerror", "{update = broken").unwrap_err();
        assert!(matches!(err, MigrateError::Parse { .. }));
    }

    #[test]
    fn parse_requires_update_entry() {
        let err = MigrationScript::parse("noupdate", r#"{"steps": []}"#).unwrap_err();
        assert_eq!(err, MigrateError::NoUpdateEntry("noupdate".into()));
    }

    #[test]
    fn parse_rejects_unknown_op() {
        let err =
            MigrationScript::parse("badop", r#"{"update": [{"op": "explode"}]}"#).unwrap_err();
        assert!(matches!(err, MigrateError::Parse { .. }));
    }

    #[test]
    fn guarded_set_value_rewrites_matching_subjects_only() {
        let script = MigrationScript::parse(
            "dom_v2",
            r#"{"update": [
                {"op": "set_value", "interface": "dom.IEmployee", "field": "salary",
                 "where": {"field": "salary", "equals": "4000"}, "to": "5000"}
            ]}"#,
        )
        .unwrap();

        let mut rows = employee_rows();
        script.run(&mut rows).unwrap();
        assert_eq!(rows.value_of(2, "salary"), Some("5000"));
        assert_eq!(rows.value_of(3, "salary"), Some("1000"));
    }

    #[test]
    fn add_field_fills_missing_values_only() {
        let script = MigrationScript::parse(
            "dom_v2",
            r#"{"update": [
                {"op": "add_field", "interface": "dom.IEmployee", "field": "role",
                 "value": "\"Developer\""}
            ]}"#,
        )
        .unwrap();

        let mut rows = employee_rows();
        rows.set_value(2, "role", "\"Manager\"");
        script.run(&mut rows).unwrap();
        assert_eq!(rows.value_of(2, "role"), Some("\"Manager\""));
        assert_eq!(rows.value_of(3, "role"), Some("\"Developer\""));
    }

    #[test]
    fn rename_steps_apply_in_order() {
        let script = MigrationScript::parse(
            "dom_v2",
            r#"{"update": [
                {"op": "rename_field", "interface": "dom.IEmployee", "from": "salary", "to": "wage"},
                {"op": "rename_interface", "from": "dom.IEmployee", "to": "dom.IPerson"},
                {"op": "rename_component", "from": "dom.Employee", "to": "dom.Person"}
            ]}"#,
        )
        .unwrap();

        let mut rows = employee_rows();
        script.run(&mut rows).unwrap();
        assert_eq!(rows.value_of(2, "wage"), Some("4000"));
        assert_eq!(rows.services_of("dom.IPerson").len(), 2);
        assert_eq!(rows.objects_of("dom.Person"), vec![1]);
    }

    #[test]
    fn remove_field_drops_rows() {
        let script = MigrationScript::parse(
            "dom_v2",
            r#"{"update": [
                {"op": "remove_field", "interface": "dom.IEmployee", "field": "salary"}
            ]}"#,
        )
        .unwrap();

        let mut rows = employee_rows();
        script.run(&mut rows).unwrap();
        assert_eq!(rows.value_of(2, "salary"), None);
        assert_eq!(rows.value_of(3, "salary"), None);
    }

    #[test]
    fn step_targeting_absent_interface_fails() {
        let script = MigrationScript::parse(
            "dom_v2",
            r#"{"update": [
                {"op": "set_value", "interface": "dom.IMissing", "field": "x", "to": "1"}
            ]}"#,
        )
        .unwrap();

        let mut rows = employee_rows();
        let err = script.run(&mut rows).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::StepFailed { ref script, .. } if script == "dom_v2"
        ));
        // The rows were not touched past the failing step.
        assert_eq!(rows.value_of(2, "salary"), Some("4000"));
    }

    #[test]
    fn rename_of_absent_component_fails() {
        let script = MigrationScript::parse(
            "dom_v2",
            r#"{"update": [
                {"op": "rename_component", "from": "dom.Missing", "to": "dom.Renamed"}
            ]}"#,
        )
        .unwrap();

        let mut rows = employee_rows();
        assert!(matches!(
            script.run(&mut rows).unwrap_err(),
            MigrateError::StepFailed { .. }
        ));
    }

    #[test]
    fn guard_matching_no_subject_is_not_a_failure() {
        let script = MigrationScript::parse(
            "dom_v2",
            r#"{"update": [
                {"op": "set_value", "interface": "dom.IEmployee", "field": "salary",
                 "where": {"field": "salary", "equals": "99999"}, "to": "0"}
            ]}"#,
        )
        .unwrap();

        let mut rows = employee_rows();
        script.run(&mut rows).unwrap();
        assert_eq!(rows.value_of(2, "salary"), Some("4000"));
        assert_eq!(rows.value_of(3, "salary"), Some("1000"));
    }
}
