use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{ScoringError, ScoringResult};
use super::value::{to_float, Value};

/// Default number of trampoline elements when `params.n_elements` is unset.
pub const DEFAULT_ELEMENTS: usize = 11;
/// Upper bound on elements/items in any row.
pub const MAX_ITEMS: usize = 50;
/// Upper bound on judges per field.
pub const MAX_JUDGES: usize = 10;

/// Scoring schema: what a judge enters and how totals are derived from it.
///
/// Example YAML:
/// ```yaml
/// params:
///   n_valid: 2
///   criteria: eliminar_extrems
///   n_elements: 10
/// fields:
///   - { code: E, type: matrix, shape: judge_x_element, judges: { count: 3 }, items: { count: 10 }, crash: { enabled: true } }
///   - { code: DD, type: number }
/// computed:
///   - { code: E_j, formula: "exec_by_judge(E, crash('E'), params)" }
///   - { code: TOTAL, formula: "select_sum(E_j, params['n_valid'], params['criteria']) + DD" }
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Schema {
    #[serde(default)]
    pub params: Params,

    /// Entries that are not maps are dropped
    #[serde(default, deserialize_with = "lenient::entries")]
    pub fields: Vec<FieldSpec>,

    #[serde(default, deserialize_with = "lenient::entries")]
    pub computed: Vec<ComputedSpec>,

    /// Presentation hints, carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
}

impl Schema {
    /// Build a schema from an untyped JSON document.
    ///
    /// The top level must be an object and `fields`/`computed`, when present,
    /// must be lists.
    pub fn from_json(doc: serde_json::Value) -> ScoringResult<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| ScoringError::Schema("schema must be an object".to_string()))?;
        for key in ["fields", "computed"] {
            match obj.get(key) {
                None | Some(serde_json::Value::Null) | Some(serde_json::Value::Array(_)) => {}
                Some(_) => {
                    return Err(ScoringError::Schema(format!("'{}' must be a list", key)));
                }
            }
        }
        if let Some(params) = obj.get("params") {
            if !params.is_null() && !params.is_object() {
                return Err(ScoringError::Schema("'params' must be an object".to_string()));
            }
        }
        serde_json::from_value(doc).map_err(|e| ScoringError::Schema(e.to_string()))
    }

    /// Field configuration by code.
    pub fn field(&self, code: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.code == code)
    }

    /// Computed configuration by code.
    pub fn computed_entry(&self, code: &str) -> Option<&ComputedSpec> {
        self.computed.iter().find(|c| c.code == code)
    }
}

/// Free-form schema parameters.
///
/// Formulas see the whole map as `params`; the engine itself only reads a
/// few well-known keys.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Params(pub BTreeMap<String, Value>);

impl Params {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Elements per trampoline routine (`n_elements`, falling back to
    /// `num_elements`), clamped to `1..=50`.
    pub fn n_elements(&self) -> usize {
        let configured = ["n_elements", "num_elements"]
            .iter()
            .filter_map(|k| self.get(k))
            .map(|v| to_float(v).trunc() as i64)
            .find(|n| *n != 0)
            .unwrap_or(DEFAULT_ELEMENTS as i64);
        configured.clamp(1, MAX_ITEMS as i64) as usize
    }

    /// Global short-name aliases (`params.aliases`). Non-string targets are ignored.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.get("aliases")
            .and_then(Value::as_map)
            .map(|map| {
                map.iter()
                    .filter_map(|(short, code)| {
                        code.as_str().map(|code| (short.clone(), code.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        Value::Map(self.0.clone())
    }
}

/// How a field's raw input is normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    /// `type: number`
    Scalar,
    /// `type: list`, `shape: judge`
    JudgeVector,
    /// `type: matrix`, `shape: judge_x_item | judge_x_element`
    Matrix,
    /// Anything else; the raw value passes through
    Passthrough,
}

/// An input field declared by the schema.
///
/// Keys are read leniently: a value of the wrong type falls back to the
/// default rather than rejecting the schema.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FieldSpec {
    /// Empty when missing; the linter reports it
    #[serde(default, deserialize_with = "lenient::string")]
    pub code: String,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// `number`, `list` or `matrix`
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,

    /// `judge` for lists; `judge_x_item` or `judge_x_element` for matrices
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,

    #[serde(default, deserialize_with = "lenient::decimals", skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,

    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, deserialize_with = "lenient::count", skip_serializing_if = "Option::is_none")]
    pub judges: Option<CountConfig>,

    #[serde(default, deserialize_with = "lenient::count", skip_serializing_if = "Option::is_none")]
    pub items: Option<CountConfig>,

    #[serde(default, deserialize_with = "lenient::crash", skip_serializing_if = "Option::is_none")]
    pub crash: Option<CrashConfig>,

    /// Optional short alias usable in formulas
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CountConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CrashConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl FieldSpec {
    pub fn layout(&self) -> FieldLayout {
        match (self.kind.as_deref(), self.shape.as_deref()) {
            (Some("number"), _) => FieldLayout::Scalar,
            (Some("list"), Some("judge")) => FieldLayout::JudgeVector,
            (Some("matrix"), Some("judge_x_item" | "judge_x_element")) => FieldLayout::Matrix,
            _ => FieldLayout::Passthrough,
        }
    }

    /// Judges for this field: `judges.count`, default 1, clamped to `1..=10`.
    pub fn judge_count(&self) -> usize {
        let n = self.judges.as_ref().and_then(|c| c.count).unwrap_or(0.0).trunc() as i64;
        let n = if n == 0 { 1 } else { n };
        n.clamp(1, MAX_JUDGES as i64) as usize
    }

    /// Items per judge: `items.count`, default 0, clamped to `0..=50`.
    pub fn item_count(&self) -> usize {
        let n = self.items.as_ref().and_then(|c| c.count).unwrap_or(0.0).trunc() as i64;
        n.clamp(0, MAX_ITEMS as i64) as usize
    }

    /// Crash tracking only applies to matrix fields.
    pub fn crash_enabled(&self) -> bool {
        self.layout() == FieldLayout::Matrix && self.crash.as_ref().is_some_and(|c| c.enabled)
    }

    /// Clamp a value into the declared `[min, max]`.
    pub fn clamp(&self, mut x: f64) -> f64 {
        if let Some(min) = self.min {
            x = x.max(min);
        }
        if let Some(max) = self.max {
            x = x.min(max);
        }
        x
    }

    /// The field as a formula value, as returned by `field(code)`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).map(Value::from).unwrap_or_default()
    }
}

/// A derived value computed from a formula.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ComputedSpec {
    #[serde(default, deserialize_with = "lenient::string")]
    pub code: String,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ComputedSpec {
    /// Formula text, `None` when missing or blank.
    pub fn formula_text(&self) -> Option<&str> {
        self.formula.as_deref().filter(|f| !f.trim().is_empty())
    }
}

/// Deserializers that coerce instead of failing.
mod lenient {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::{Deserialize, Deserializer};

    use super::{to_float, CountConfig, CrashConfig, Value};

    fn to_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => Some(*n),
            Value::Bool(_) => Some(to_float(value)),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn truthy(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn entries<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let raw: Option<Vec<serde_json::Value>> = Option::deserialize(d)?;
        raw.unwrap_or_default()
            .into_iter()
            .filter(serde_json::Value::is_object)
            .map(|entry| serde_json::from_value(entry).map_err(D::Error::custom))
            .collect()
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Str(s) => Some(s),
            _ => None,
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(to_number(&Value::deserialize(d)?))
    }

    pub fn decimals<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(number(d)?.map(|n| n.max(0.0) as u32))
    }

    /// `{count: n}`; anything but a map means "not configured".
    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<CountConfig>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Map(map) => Some(CountConfig {
                count: map.get("count").and_then(to_number),
            }),
            _ => None,
        })
    }

    pub fn crash<'de, D: Deserializer<'de>>(d: D) -> Result<Option<CrashConfig>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Map(map) => Some(CrashConfig {
                enabled: map.get("enabled").is_some_and(truthy),
            }),
            _ => None,
        })
    }
}
