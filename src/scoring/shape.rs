//! Shape dry-run for formulas.
//!
//! Every value is treated as a `rows x cols` matrix (a number is `1x1`, a
//! judge list is `Jx1`, a judge x item matrix is `JxN`) and builtins check
//! the shapes they are handed. Unknown dimensions never fail a check.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::builtins::Builtin;
use super::config::{FieldLayout, FieldSpec, Schema};
use super::expr::ast::{BinaryOp, Literal};
use super::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub rows: Option<usize>,
    pub cols: Option<usize>,
}

impl Shape {
    pub const SCALAR: Shape = Shape {
        rows: Some(1),
        cols: Some(1),
    };
    pub const UNKNOWN: Shape = Shape {
        rows: None,
        cols: None,
    };

    fn column(rows: Option<usize>) -> Self {
        Shape {
            rows,
            cols: Some(1),
        }
    }

    /// Known to be something other than `1x1`.
    fn is_non_scalar(self) -> bool {
        self.rows.is_some_and(|r| r != 1) || self.cols.is_some_and(|c| c != 1)
    }

    fn compatible(self, other: Shape) -> bool {
        fn agree(a: Option<usize>, b: Option<usize>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        agree(self.rows, other.rows) && agree(self.cols, other.cols)
    }

    fn merge(self, other: Shape) -> Shape {
        Shape {
            rows: self.rows.or(other.rows),
            cols: self.cols.or(other.cols),
        }
    }

    /// Shape of a field's normalised input. A matrix without `items.count`
    /// has as many columns as its widest row, so the width stays unknown.
    pub fn of_field(field: &FieldSpec) -> Self {
        match field.layout() {
            FieldLayout::Scalar => Shape::SCALAR,
            FieldLayout::JudgeVector => Shape::column(Some(field.judge_count())),
            FieldLayout::Matrix => Shape {
                rows: Some(field.judge_count()),
                cols: Some(field.item_count()).filter(|n| *n > 0),
            },
            FieldLayout::Passthrough => Shape::UNKNOWN,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim = |d: Option<usize>| d.map_or_else(|| "?".to_string(), |d| d.to_string());
        write!(f, "{}x{}", dim(self.rows), dim(self.cols))
    }
}

/// Shapes of every name a formula can see.
pub struct ShapeCheck<'a> {
    schema: &'a Schema,
    aliases: &'a BTreeMap<String, String>,
    shapes: HashMap<String, Shape>,
}

impl<'a> ShapeCheck<'a> {
    pub fn new(schema: &'a Schema, aliases: &'a BTreeMap<String, String>) -> Self {
        let mut shapes: HashMap<String, Shape> = schema
            .fields
            .iter()
            .filter(|f| !f.code.is_empty())
            .map(|f| (f.code.clone(), Shape::of_field(f)))
            .collect();
        shapes.insert("params".to_string(), Shape::SCALAR);
        for (short, code) in aliases {
            if let Some(shape) = shapes.get(code).copied() {
                shapes.insert(short.clone(), shape);
            }
        }
        Self {
            schema,
            aliases,
            shapes,
        }
    }

    /// Record a computed result; aliases pointing at it see it too.
    pub fn store(&mut self, code: &str, shape: Shape) {
        for (short, target) in self.aliases {
            if target == code {
                self.shapes.insert(short.clone(), shape);
            }
        }
        self.shapes.insert(code.to_string(), shape);
    }

    pub fn shape_of(&self, expr: &Expr) -> Result<Shape, String> {
        match expr {
            Expr::Literal(_) => Ok(Shape::SCALAR),
            Expr::Name(name) => Ok(self.shapes.get(name).copied().unwrap_or(Shape::UNKNOWN)),
            Expr::Unary { operand, .. } => self.shape_of(operand),
            Expr::Binary { op, lhs, rhs } => {
                let (a, b) = (self.shape_of(lhs)?, self.shape_of(rhs)?);
                match op {
                    BinaryOp::Add | BinaryOp::Sub if a.compatible(b) => Ok(a.merge(b)),
                    BinaryOp::Add | BinaryOp::Sub => Err(format!(
                        "'{}' on incompatible shapes {} and {}",
                        op.symbol(),
                        a,
                        b
                    )),
                    _ if a.is_non_scalar() || b.is_non_scalar() => Err(format!(
                        "'{}' needs 1x1 operands, got {} and {}",
                        op.symbol(),
                        a,
                        b
                    )),
                    _ => Ok(Shape::SCALAR),
                }
            }
            Expr::Call { func, args, kwargs } => self.call(*func, args, kwargs),
            Expr::Index { base, index } => {
                let base = self.shape_of(base)?;
                self.shape_of(index)?;
                if matches!(**index, Expr::Literal(Literal::Str(_))) || base.rows == Some(1) {
                    Ok(Shape::SCALAR)
                } else {
                    // one row of the matrix
                    Ok(Shape {
                        rows: Some(1),
                        cols: base.cols,
                    })
                }
            }
            Expr::List(items) | Expr::Tuple(items) => {
                let mut all_scalar = true;
                for item in items {
                    all_scalar &= self.shape_of(item)? == Shape::SCALAR;
                }
                Ok(Shape {
                    rows: Some(items.len()),
                    cols: if all_scalar { Some(1) } else { None },
                })
            }
            Expr::Dict(entries) => {
                for (k, v) in entries {
                    self.shape_of(k)?;
                    self.shape_of(v)?;
                }
                Ok(Shape::UNKNOWN)
            }
        }
    }

    fn call(&self, func: Builtin, args: &[Expr], kwargs: &[(String, Expr)]) -> Result<Shape, String> {
        let names = func.params();
        let mut bound: Vec<Option<(&Expr, Shape)>> = vec![None; names.len()];
        for (slot, expr) in bound.iter_mut().zip(args) {
            *slot = Some((expr, self.shape_of(expr)?));
        }
        for (key, expr) in kwargs {
            let shape = self.shape_of(expr)?;
            if let Some(pos) = names.iter().position(|n| *n == key.as_str()) {
                bound[pos] = Some((expr, shape));
            }
        }
        let arg = |name: &str| {
            names
                .iter()
                .position(|n| *n == name)
                .and_then(|pos| bound[pos])
        };
        let shape = |name: &str| arg(name).map(|(_, shape)| shape);
        let text = |name: &str| match arg(name) {
            Some((Expr::Literal(Literal::Str(s)), _)) => Some(s.as_str()),
            _ => None,
        };
        let scalar = |name: &str| match shape(name) {
            Some(s) if s.is_non_scalar() => Err(format!(
                "{}(): '{}' must be 1x1, got {}",
                func.name(),
                name,
                s
            )),
            _ => Ok(()),
        };

        match func {
            Builtin::Sum | Builtin::Avg | Builtin::Min | Builtin::Max | Builtin::Med => {
                Ok(Shape::SCALAR)
            }
            Builtin::Float => {
                scalar("value")?;
                Ok(Shape::SCALAR)
            }
            Builtin::ExecByJudge => {
                let matrix = shape("matrix").unwrap_or(Shape::UNKNOWN);
                let crash = shape("crash").unwrap_or(Shape::UNKNOWN);
                if let (Some(m), Some(c)) = (matrix.rows, crash.rows) {
                    if m != c {
                        return Err(format!(
                            "exec_by_judge(): judge counts differ, matrix {} vs crash {}",
                            matrix, crash
                        ));
                    }
                }
                if crash.cols.is_some_and(|c| c != 1) {
                    return Err(format!("exec_by_judge(): crash must be Jx1, got {}", crash));
                }
                Ok(Shape::column(matrix.rows))
            }
            Builtin::SelectSum => {
                scalar("n_valid")?;
                scalar("criteria")?;
                Ok(Shape::SCALAR)
            }
            Builtin::BestN => {
                scalar("n")?;
                Ok(Shape::column(None))
            }
            Builtin::Field => {
                scalar("code")?;
                Ok(Shape::UNKNOWN)
            }
            Builtin::Crash => {
                scalar("field_code")?;
                let judges = text("field_code")
                    .and_then(|code| self.field(code))
                    .filter(|f| f.crash_enabled())
                    .map(|f| f.judge_count());
                Ok(Shape::column(judges))
            }
            Builtin::ItemsReduce => Ok(Shape::column(text("field_code").and_then(|c| self.rows(c)))),
            Builtin::RowCustomCompute | Builtin::ColumnCustomCompute => {
                let source = text("source");
                match (arg("return_mode"), text("return_mode").map(str::trim)) {
                    (None, _) | (_, Some("final")) => Ok(Shape::SCALAR),
                    (_, Some("by_judge")) => Ok(Shape::column(source.and_then(|c| self.rows(c)))),
                    (_, Some("by_item")) => Ok(Shape::column(
                        source
                            .and_then(|c| self.field(c))
                            .map(|f| f.item_count())
                            .filter(|n| *n > 0),
                    )),
                    _ => Ok(Shape::UNKNOWN),
                }
            }
        }
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        let code = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.schema.field(code)
    }

    fn rows(&self, name: &str) -> Option<usize> {
        self.shapes.get(name).and_then(|s| s.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::deps::alias_map;
    use crate::scoring::expr::Grammar;

    fn schema() -> Schema {
        Schema::from_json(serde_json::json!({
            "params": {"aliases": {"e": "E"}},
            "fields": [
                {"code": "E", "type": "matrix", "shape": "judge_x_element",
                 "judges": {"count": 3}, "items": {"count": 10}, "crash": {"enabled": true}},
                {"code": "F", "type": "matrix", "shape": "judge_x_element",
                 "judges": {"count": 2}, "crash": {"enabled": true}},
                {"code": "L", "type": "list", "shape": "judge", "judges": {"count": 2}},
                {"code": "DD", "type": "number"}
            ]
        }))
        .unwrap()
    }

    fn shape(src: &str) -> Result<Shape, String> {
        let schema = schema();
        let aliases = alias_map(&schema);
        let check = ShapeCheck::new(&schema, &aliases);
        check.shape_of(&Grammar::Formula.compile(src).unwrap())
    }

    fn col(rows: usize) -> Shape {
        Shape::column(Some(rows))
    }

    #[test]
    fn test_field_shapes() {
        assert_eq!(shape("E").unwrap().to_string(), "3x10");
        assert_eq!(shape("e").unwrap().to_string(), "3x10");
        assert_eq!(shape("F").unwrap().to_string(), "2x?");
        assert_eq!(shape("L").unwrap(), col(2));
        assert_eq!(shape("DD").unwrap(), Shape::SCALAR);
    }

    #[test]
    fn test_builtin_results() {
        assert_eq!(shape("exec_by_judge(E, crash('E'), params)").unwrap(), col(3));
        assert_eq!(shape("crash('e')").unwrap(), col(3));
        assert_eq!(shape("items_reduce('F')").unwrap(), col(2));
        assert_eq!(shape("select_sum(L, params['n_valid'], 'totes')").unwrap(), Shape::SCALAR);
        assert_eq!(shape("row_custom_compute('E')").unwrap(), Shape::SCALAR);
        assert_eq!(shape("row_custom_compute('E', return_mode='by_judge')").unwrap(), col(3));
        assert_eq!(shape("column_custom_compute('E', return_mode='by_item')").unwrap(), col(10));
        assert_eq!(shape("E[0]").unwrap().to_string(), "1x10");
        assert_eq!(shape("E[0][1] * 2").unwrap(), Shape::SCALAR);
        assert_eq!(shape("field('E')['items']").unwrap(), Shape::SCALAR);
    }

    #[test]
    fn test_exec_by_judge_judge_mismatch() {
        let err = shape("exec_by_judge(E, crash('F'), params)").unwrap_err();
        assert_eq!(err, "exec_by_judge(): judge counts differ, matrix 3x10 vs crash 2x1");
        assert!(shape("exec_by_judge(E, L, params)").is_err());
        assert!(shape("exec_by_judge(E, E, params)").is_err());
    }

    #[test]
    fn test_select_sum_needs_scalar_arguments() {
        let err = shape("select_sum(L, L, 'totes')").unwrap_err();
        assert_eq!(err, "select_sum(): 'n_valid' must be 1x1, got 2x1");
        assert!(shape("select_sum(L, criteria=E[0])").is_err());
    }

    #[test]
    fn test_float_needs_scalar() {
        assert!(shape("float(DD)").is_ok());
        assert_eq!(shape("float(L)").unwrap_err(), "float(): 'value' must be 1x1, got 2x1");
    }

    #[test]
    fn test_arithmetic_shapes() {
        assert_eq!(shape("L + L").unwrap(), col(2));
        assert_eq!(shape("L + DD").unwrap_err(), "'+' on incompatible shapes 2x1 and 1x1");
        assert!(shape("exec_by_judge(E, crash('E'), params) - L").is_err());
        assert!(shape("L * 2").is_err());
        assert!(shape("-DD / 2 + sum(E)").is_ok());
    }

    #[test]
    fn test_unknown_dimensions_pass() {
        assert!(shape("best_n(L, 2) + best_n(L, 1)").is_ok());
        assert!(shape("F[0] + E[1]").is_ok());
        assert!(shape("field('E') * 2").is_ok());
    }
}
