use std::collections::BTreeMap;

use tracing::debug;

use super::config::{FieldLayout, FieldSpec, Schema};
use super::value::{to_float, Value};

/// Prefix of the synthetic per-field crash vector keys.
pub const CRASH_PREFIX: &str = "__crash__";

/// Canonical inputs keyed by field code, plus `__crash__<code>` vectors.
pub type NormalizedInputs = BTreeMap<String, Value>;

pub fn crash_key(code: &str) -> String {
    format!("{}{}", CRASH_PREFIX, code)
}

/// Bring raw inputs into the shapes the schema declares.
///
/// Keys that match no field are ignored. Crash positions stay alongside the
/// matrix; they never alter the matrix itself.
pub fn normalize_inputs(fields: &[FieldSpec], raw: &BTreeMap<String, Value>) -> NormalizedInputs {
    let mut out = NormalizedInputs::new();
    for field in fields {
        if field.code.is_empty() {
            continue;
        }
        let value = raw.get(&field.code).unwrap_or(&Value::Null);
        let normalized = match field.layout() {
            FieldLayout::Scalar => Value::Number(field.clamp(to_float(value))),
            FieldLayout::JudgeVector => Value::from(
                padded(value, field.judge_count())
                    .into_iter()
                    .map(|v| field.clamp(to_float(v)))
                    .collect::<Vec<f64>>(),
            ),
            FieldLayout::Matrix => {
                let n_items = field.item_count();
                let rows: Vec<Value> = padded(value, field.judge_count())
                    .into_iter()
                    .map(|row| {
                        Value::from(
                            padded(row, n_items)
                                .into_iter()
                                .map(|v| field.clamp(to_float(v)))
                                .collect::<Vec<f64>>(),
                        )
                    })
                    .collect();
                if field.crash_enabled() {
                    let key = crash_key(&field.code);
                    let crash: Vec<f64> = padded(raw.get(&key).unwrap_or(&Value::Null), field.judge_count())
                        .into_iter()
                        .map(|v| (to_float(v).trunc() as i64).clamp(0, n_items as i64) as f64)
                        .collect();
                    out.insert(key, Value::from(crash));
                }
                Value::List(rows)
            }
            FieldLayout::Passthrough => value.clone(),
        };
        out.insert(field.code.clone(), normalized);
    }
    out
}

/// The first `len` entries of a list, padded with `None` (read as 0).
/// Non-lists count as empty.
fn padded(value: &Value, len: usize) -> Vec<&Value> {
    const MISSING: &Value = &Value::Null;
    let items = value.as_list().unwrap_or(&[]);
    (0..len).map(|i| items.get(i).unwrap_or(MISSING)).collect()
}

/// Split raw inputs into those the schema declares (field codes and their
/// crash keys) and the names of everything else.
pub fn retain_declared_inputs(
    schema: &Schema,
    raw: BTreeMap<String, Value>,
) -> (BTreeMap<String, Value>, Vec<String>) {
    let mut kept = BTreeMap::new();
    let mut dropped = Vec::new();
    for (key, value) in raw {
        let declared = match key.strip_prefix(CRASH_PREFIX) {
            Some(code) => schema.field(code).is_some(),
            None => schema.field(&key).is_some(),
        };
        if declared {
            kept.insert(key, value);
        } else {
            dropped.push(key);
        }
    }
    if !dropped.is_empty() {
        debug!(dropped = ?dropped, "ignoring undeclared input keys");
    }
    (kept, dropped)
}
