use std::collections::BTreeMap;

use crate::scoring::builtins::Builtin;
use crate::scoring::error::{ScoringError, ScoringResult};
use crate::scoring::value::Value;

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};

/// Where names and calls resolve during evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;

    fn call(
        &self,
        func: Builtin,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScoringResult<Value>;
}

/// Fixed numeric bindings, used for item and post-aggregation expressions.
pub struct Bindings<'a>(pub &'a [(&'static str, f64)]);

impl Scope for Bindings<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| Value::Number(*v))
    }

    fn call(&self, func: Builtin, _: Vec<Value>, _: Vec<(String, Value)>) -> ScoringResult<Value> {
        Err(ScoringError::Grammar(format!(
            "function not allowed: {}",
            func.name()
        )))
    }
}

pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> ScoringResult<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Number(n) => Value::Number(*n),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::None => Value::Null,
        }),
        Expr::Name(name) => scope
            .lookup(name)
            .ok_or_else(|| ScoringError::Grammar(format!("unknown name: {}", name))),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, scope)?;
            let rhs = evaluate(rhs, scope)?;
            binary(*op, lhs, rhs)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            let n = value.as_number().ok_or_else(|| {
                ScoringError::Type(format!(
                    "bad operand type for unary {}: '{}'",
                    if *op == UnaryOp::Minus { "-" } else { "+" },
                    value.type_name()
                ))
            })?;
            Ok(Value::Number(match op {
                UnaryOp::Plus => n,
                UnaryOp::Minus => -n,
            }))
        }
        Expr::Call { func, args, kwargs } => {
            let args = args
                .iter()
                .map(|a| evaluate(a, scope))
                .collect::<ScoringResult<Vec<_>>>()?;
            let kwargs = kwargs
                .iter()
                .map(|(k, v)| Ok((k.clone(), evaluate(v, scope)?)))
                .collect::<ScoringResult<Vec<_>>>()?;
            scope.call(*func, args, kwargs)
        }
        Expr::Index { base, index } => {
            let base = evaluate(base, scope)?;
            let index = evaluate(index, scope)?;
            subscript(&base, &index)
        }
        Expr::List(items) | Expr::Tuple(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<ScoringResult<Vec<_>>>()
            .map(Value::List),
        Expr::Dict(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let key = match evaluate(k, scope)? {
                    Value::Str(s) => s,
                    Value::Number(n) => format_number_key(n),
                    other => {
                        return Err(ScoringError::Type(format!(
                            "unsupported dict key type: '{}'",
                            other.type_name()
                        )))
                    }
                };
                map.insert(key, evaluate(v, scope)?);
            }
            Ok(Value::Map(map))
        }
    }
}

/// Evaluate an expression that must produce a number.
pub fn evaluate_number(expr: &Expr, vars: &[(&'static str, f64)]) -> ScoringResult<f64> {
    let value = evaluate(expr, &Bindings(vars))?;
    value.as_number().ok_or_else(|| {
        ScoringError::Type(format!(
            "expression produced '{}', expected a number",
            value.type_name()
        ))
    })
}

fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> ScoringResult<Value> {
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return arithmetic(op, a, b).map(Value::Number);
    }
    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (BinaryOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (op, lhs, rhs) => Err(ScoringError::Type(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> ScoringResult<f64> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                Err(ScoringError::Arithmetic("division by zero".to_string()))
            } else {
                Ok(a / b)
            }
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                Err(ScoringError::Arithmetic("modulo by zero".to_string()))
            } else {
                // result takes the sign of the divisor
                Ok(a - b * (a / b).floor())
            }
        }
    }
}

fn subscript(base: &Value, index: &Value) -> ScoringResult<Value> {
    let invalid = || {
        ScoringError::Type(format!(
            "invalid index access: '{}'[{}]",
            base.type_name(),
            match index {
                Value::Str(s) => format!("'{}'", s),
                Value::Number(n) => n.to_string(),
                other => other.type_name().to_string(),
            }
        ))
    };
    match (base, index) {
        (Value::List(items), idx) => {
            let pos = position(idx, items.len()).ok_or_else(invalid)?;
            Ok(items[pos].clone())
        }
        (Value::Str(s), idx) => {
            let chars: Vec<char> = s.chars().collect();
            let pos = position(idx, chars.len()).ok_or_else(invalid)?;
            Ok(Value::Str(chars[pos].to_string()))
        }
        (Value::Map(map), Value::Str(key)) => map.get(key).cloned().ok_or_else(invalid),
        (Value::Map(map), Value::Number(n)) => {
            map.get(&format_number_key(*n)).cloned().ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// Resolve a (possibly negative) integral index into `0..len`.
fn position(index: &Value, len: usize) -> Option<usize> {
    let n = index.as_number()?;
    if n.fract() != 0.0 {
        return None;
    }
    let n = n as i64;
    let pos = if n < 0 { len as i64 + n } else { n };
    (0..len as i64).contains(&pos).then_some(pos as usize)
}
