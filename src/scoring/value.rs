use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A JSON-like value flowing through normalisation and formula evaluation.
///
/// Numbers are always `f64`; tuples built by formulas collapse into `List`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Tolerant numeric coercion.
///
/// `null`, the empty string and anything unconvertible become `0.0`; this
/// never fails so a malformed cell degrades instead of aborting a save.
pub fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Str(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Null | Value::List(_) | Value::Map(_) => 0.0,
    }
}

impl Value {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerce a list into floats with `to_float`. Non-lists yield an empty vector.
    pub fn to_floats(&self) -> Vec<f64> {
        self.as_list()
            .map(|items| items.iter().map(to_float).collect())
            .unwrap_or_default()
    }

    /// Look up a key when the value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<f64>> for Value {
    fn from(items: Vec<f64>) -> Self {
        Value::List(items.into_iter().map(Value::Number).collect())
    }
}

impl From<Vec<Vec<f64>>> for Value {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        Value::List(rows.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_float_null_and_empty() {
        assert_eq!(to_float(&Value::Null), 0.0);
        assert_eq!(to_float(&Value::from("")), 0.0);
    }

    #[test]
    fn test_to_float_numeric_strings() {
        assert_eq!(to_float(&Value::from("7.5")), 7.5);
        assert_eq!(to_float(&Value::from(" 3 ")), 3.0);
    }

    #[test]
    fn test_to_float_garbage_is_zero() {
        assert_eq!(to_float(&Value::from("abc")), 0.0);
        assert_eq!(to_float(&Value::List(vec![Value::Number(1.0)])), 0.0);
        assert_eq!(to_float(&Value::Map(BTreeMap::new())), 0.0);
    }

    #[test]
    fn test_to_float_bool() {
        assert_eq!(to_float(&Value::Bool(true)), 1.0);
        assert_eq!(to_float(&Value::Bool(false)), 0.0);
    }

    #[test]
    fn test_deserialize_json_integers_as_numbers() {
        let value: Value = serde_json::from_str(r#"{"E": [[1, 2], [3, 4.5]], "P": null}"#).unwrap();
        let e = value.get("E").unwrap();
        assert_eq!(e, &Value::from(vec![vec![1.0, 2.0], vec![3.0, 4.5]]));
        assert!(value.get("P").unwrap().is_null());
    }

    #[test]
    fn test_serialize_null_and_nested() {
        let value = Value::List(vec![Value::Null, Value::from(1.5), Value::from("a")]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"[null,1.5,"a"]"#);
    }

    #[test]
    fn test_from_serde_json_value() {
        let json = serde_json::json!({"n_valid": 3, "criteria": "totes"});
        let value = Value::from(&json);
        assert_eq!(value.get("n_valid"), Some(&Value::Number(3.0)));
        assert_eq!(value.get("criteria").and_then(Value::as_str), Some("totes"));
    }
}
