use std::collections::BTreeMap;

use super::builtins::{self, Args, Builtin};
use super::config::Schema;
use super::error::ScoringResult;
use super::expr::{ExprCache, Scope};
use super::normalize::{crash_key, NormalizedInputs};
use super::value::{to_float, Value};

/// Everything a formula can see during one `compute()` call.
///
/// Built fresh per call and handed to every builtin, so nothing about a
/// computation lives on the engine itself.
pub struct EvalContext<'a> {
    schema: &'a Schema,
    exprs: &'a ExprCache,
    inputs: &'a NormalizedInputs,
    aliases: &'a BTreeMap<String, String>,
    params: Value,
    shortcuts: BTreeMap<String, Value>,
    outputs: BTreeMap<String, Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        schema: &'a Schema,
        exprs: &'a ExprCache,
        inputs: &'a NormalizedInputs,
        aliases: &'a BTreeMap<String, String>,
    ) -> Self {
        let mut cx = Self {
            schema,
            exprs,
            inputs,
            aliases,
            params: schema.params.to_value(),
            shortcuts: BTreeMap::new(),
            outputs: BTreeMap::new(),
        };
        for (short, code) in aliases {
            if let Some(value) = cx.base_value(code) {
                cx.shortcuts.insert(short.clone(), value);
            }
        }
        cx
    }

    fn base_value(&self, name: &str) -> Option<Value> {
        if name == "params" {
            Some(self.params.clone())
        } else {
            self.inputs.get(name).cloned()
        }
    }

    /// Record a computed output; aliases pointing at it see it from now on.
    pub fn store(&mut self, code: &str, value: Value) {
        for (short, target) in self.aliases {
            if target == code {
                self.shortcuts.insert(short.clone(), value.clone());
            }
        }
        self.outputs.insert(code.to_string(), value);
    }

    pub fn into_outputs(self) -> BTreeMap<String, Value> {
        self.outputs
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn exprs(&self) -> &ExprCache {
        self.exprs
    }

    /// The code a formula name refers to, following an alias unless the
    /// name is itself a stored output.
    pub fn canonical<'n>(&'n self, name: &'n str) -> &'n str {
        if self.outputs.contains_key(name) {
            return name;
        }
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Normalised crash positions for a field; empty when absent or disabled.
    pub fn crash_vector(&self, field_code: &str) -> Vec<i64> {
        self.inputs
            .get(&crash_key(field_code))
            .and_then(Value::as_list)
            .map(|items| items.iter().map(|v| to_float(v).trunc() as i64).collect())
            .unwrap_or_default()
    }
}

impl Scope for EvalContext<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.outputs
            .get(name)
            .or_else(|| self.shortcuts.get(name))
            .cloned()
            .or_else(|| self.base_value(name))
    }

    fn call(
        &self,
        func: Builtin,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScoringResult<Value> {
        let args = Args::bind(func, args, kwargs)?;
        builtins::dispatch(func, &args, self)
    }
}
