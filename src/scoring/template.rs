//! Default schema for a trampoline apparatus.

use std::collections::BTreeMap;

use super::config::{
    ComputedSpec, CountConfig, CrashConfig, FieldSpec, Params, Schema, DEFAULT_ELEMENTS,
};
use super::value::Value;

/// How judges enter execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Per-element deductions in a judge x element matrix, with crash
    Elements,
    /// One finished execution score per judge
    Manual,
}

/// Parameters for the default trampoline schema.
#[derive(Debug, Clone)]
pub struct TrampolineTemplate {
    pub judges: usize,
    pub valid: usize,
    pub criteria: String,
    pub elements: usize,
    /// `None` leaves execution out entirely
    pub execution: Option<ExecutionMode>,
    pub difficulty: bool,
    pub time_of_flight: bool,
    pub horizontal_displacement: bool,
    pub penalty: bool,
}

impl Default for TrampolineTemplate {
    fn default() -> Self {
        Self {
            judges: 3,
            valid: 3,
            criteria: "totes".to_string(),
            elements: DEFAULT_ELEMENTS,
            execution: Some(ExecutionMode::Elements),
            difficulty: true,
            time_of_flight: true,
            horizontal_displacement: true,
            penalty: true,
        }
    }
}

fn number_field(code: &str, label: &str) -> FieldSpec {
    FieldSpec {
        code: code.to_string(),
        label: Some(label.to_string()),
        kind: Some("number".to_string()),
        decimals: Some(3),
        ..Default::default()
    }
}

fn computed(code: &str, label: &str, formula: String) -> ComputedSpec {
    ComputedSpec {
        code: code.to_string(),
        label: Some(label.to_string()),
        formula: Some(formula),
        ..Default::default()
    }
}

impl TrampolineTemplate {
    pub fn build(&self) -> Schema {
        let judges = self.judges.max(1);
        let mut fields = Vec::new();
        let mut computed_fields = Vec::new();
        let mut columns: Vec<&str> = Vec::new();

        match self.execution {
            Some(ExecutionMode::Elements) => {
                fields.push(FieldSpec {
                    code: "E".to_string(),
                    label: Some("Execution".to_string()),
                    kind: Some("matrix".to_string()),
                    shape: Some("judge_x_element".to_string()),
                    decimals: Some(0),
                    min: Some(0.0),
                    max: Some(10.0),
                    judges: Some(CountConfig { count: Some(judges as f64) }),
                    items: Some(CountConfig { count: Some(self.elements as f64) }),
                    crash: Some(CrashConfig { enabled: true }),
                    ..Default::default()
                });
                computed_fields.push(computed(
                    "E_j",
                    "Execution by judge",
                    "exec_by_judge(E, crash('E'), params)".to_string(),
                ));
                computed_fields.push(computed(
                    "E_total",
                    "Execution total",
                    "select_sum(E_j, params['n_valid'], params['criteria'])".to_string(),
                ));
                columns.extend(["E", "E_total"]);
            }
            Some(ExecutionMode::Manual) => {
                fields.push(FieldSpec {
                    code: "E_manual".to_string(),
                    label: Some("Execution (manual)".to_string()),
                    kind: Some("list".to_string()),
                    shape: Some("judge".to_string()),
                    decimals: Some(3),
                    min: Some(0.0),
                    judges: Some(CountConfig { count: Some(judges as f64) }),
                    ..Default::default()
                });
                computed_fields.push(computed(
                    "E_total",
                    "Execution total",
                    "select_sum(E_manual, params['n_valid'], params['criteria'])".to_string(),
                ));
                columns.extend(["E_manual", "E_total"]);
            }
            None => {}
        }

        let mut parts: Vec<&str> = Vec::new();
        if self.execution.is_some() {
            parts.push("E_total");
        }
        let optional = [
            (self.difficulty, "DD", "Difficulty"),
            (self.time_of_flight, "TOF", "Time of flight"),
            (self.horizontal_displacement, "HD", "Horizontal displacement"),
        ];
        for (enabled, code, label) in optional {
            if enabled {
                fields.push(number_field(code, label));
                parts.push(code);
                columns.push(code);
            }
        }

        let mut total = if parts.is_empty() {
            "0".to_string()
        } else {
            parts.join(" + ")
        };
        if self.penalty {
            fields.push(number_field("P", "Penalty"));
            columns.push("P");
            total = format!("({}) - P", total);
        }
        computed_fields.push(computed("TOTAL", "Total", total));
        columns.push("TOTAL");

        let mut params = Params::default();
        params.set("n_judges", judges as f64);
        params.set("n_valid", self.valid.min(judges) as f64);
        params.set("criteria", self.criteria.as_str());
        params.set("n_elements", self.elements as f64);

        let mut ui = BTreeMap::new();
        ui.insert(
            "columns".to_string(),
            Value::List(columns.into_iter().map(Value::from).collect()),
        );

        Schema {
            params,
            fields,
            computed: computed_fields,
            ui: Some(Value::Map(ui)),
        }
    }
}
