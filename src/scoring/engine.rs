use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::config::Schema;
use super::context::EvalContext;
use super::deps;
use super::error::{ScoringError, ScoringResult};
use super::expr::{evaluate, Expr, ExprCache, Grammar};
use super::normalize::{normalize_inputs, NormalizedInputs};
use super::value::{to_float, Value};

/// Outcome of one `compute()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    pub inputs: NormalizedInputs,
    pub outputs: BTreeMap<String, Value>,
    pub total: f64,
}

#[derive(Debug)]
struct CompiledFormula {
    code: String,
    expr: Expr,
}

/// A schema compiled into an ordered evaluation plan.
///
/// The engine holds no per-call state: `compute` may run concurrently from
/// any number of threads sharing one engine.
#[derive(Debug)]
pub struct ScoringEngine {
    schema: Schema,
    aliases: BTreeMap<String, String>,
    plan: Vec<CompiledFormula>,
    exprs: ExprCache,
}

impl ScoringEngine {
    pub fn new(schema: Schema) -> ScoringResult<Self> {
        check_codes(&schema)?;
        let aliases = deps::alias_map(&schema);

        let mut compiled = Vec::with_capacity(schema.computed.len());
        for entry in &schema.computed {
            let Some(formula) = entry.formula_text() else {
                debug!(code = %entry.code, "computed entry has no formula, skipping");
                continue;
            };
            let expr = Grammar::Formula
                .compile(formula)
                .map_err(|e| ScoringError::in_computed(&entry.code, e))?;
            compiled.push(CompiledFormula {
                code: entry.code.clone(),
                expr,
            });
        }

        let order = {
            let nodes: Vec<(&str, &Expr)> = compiled
                .iter()
                .map(|c| (c.code.as_str(), &c.expr))
                .collect();
            deps::evaluation_order(&nodes, &aliases)?
        };
        let mut slots: Vec<Option<CompiledFormula>> = compiled.into_iter().map(Some).collect();
        let plan: Vec<CompiledFormula> = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        debug!(
            fields = schema.fields.len(),
            order = ?plan.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(),
            "scoring engine ready"
        );

        Ok(Self {
            schema,
            aliases,
            plan,
            exprs: ExprCache::new(),
        })
    }

    /// Build from an untyped JSON schema document.
    pub fn from_json(doc: serde_json::Value) -> ScoringResult<Self> {
        Self::new(Schema::from_json(doc)?)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Computed codes in the order they are evaluated.
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.plan.iter().map(|c| c.code.as_str()).collect()
    }

    pub fn normalize(&self, raw: &BTreeMap<String, Value>) -> NormalizedInputs {
        normalize_inputs(&self.schema.fields, raw)
    }

    pub fn compute(&self, raw: &BTreeMap<String, Value>) -> ScoringResult<EngineResult> {
        let inputs = self.normalize(raw);
        let outputs = {
            let mut cx = EvalContext::new(&self.schema, &self.exprs, &inputs, &self.aliases);
            for formula in &self.plan {
                let value = evaluate(&formula.expr, &cx)
                    .map_err(|e| ScoringError::in_computed(&formula.code, e))?;
                trace!(code = %formula.code, ?value, "computed");
                cx.store(&formula.code, value);
            }
            cx.into_outputs()
        };
        let total = outputs
            .get("TOTAL")
            .or_else(|| outputs.get("total"))
            .map(to_float)
            .unwrap_or(0.0);
        Ok(EngineResult {
            inputs,
            outputs,
            total,
        })
    }
}

/// Every field and computed entry needs a code, and no two may share one.
fn check_codes(schema: &Schema) -> ScoringResult<()> {
    let mut seen = HashSet::new();
    let codes = schema
        .fields
        .iter()
        .map(|f| f.code.as_str())
        .chain(schema.computed.iter().map(|c| c.code.as_str()));
    for code in codes {
        if code.trim().is_empty() {
            return Err(ScoringError::Schema(
                "every field and computed entry needs a code".to_string(),
            ));
        }
        if !seen.insert(code) {
            return Err(ScoringError::Schema(format!("duplicate code: {}", code)));
        }
    }
    Ok(())
}
