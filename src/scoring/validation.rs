use std::collections::{BTreeSet, HashSet};

use super::builtins::Builtin;
use super::config::{FieldLayout, Schema};
use super::deps;
use super::expr::{is_identifier, Expr, Grammar};
use super::shape::{Shape, ShapeCheck};

/// Names no field, computed entry or alias may take.
fn is_reserved(name: &str) -> bool {
    name == "params" || Builtin::from_name(name).is_some()
}

fn location(kind: &str, idx: usize, code: &str) -> String {
    if code.is_empty() {
        format!("{}[{}]", kind, idx)
    } else {
        format!("{}[{}] ({})", kind, idx, code)
    }
}

/// Lint a schema before it is saved.
/// Returns all validation errors at once (not just the first).
///
/// Stages run in order and stop at the first stage that reports anything,
/// so later checks never see malformed symbols.
pub fn validate_schema(schema: &Schema) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    // Symbols: codes and vars
    let mut seen_codes = HashSet::new();
    let mut seen_vars = HashSet::new();
    let symbols = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| ("fields", i, f.code.as_str(), f.var.as_deref()))
        .chain(
            schema
                .computed
                .iter()
                .enumerate()
                .map(|(i, c)| ("computed", i, c.code.as_str(), c.var.as_deref())),
        );
    for (kind, idx, code, var) in symbols {
        let loc = location(kind, idx, code);
        if code.is_empty() {
            errors.push(format!("{}: missing 'code'", loc));
            continue;
        }
        if !is_identifier(code) {
            errors.push(format!("{}: 'code' is not a valid identifier: '{}'", loc, code));
        }
        if is_reserved(code) {
            errors.push(format!("{}: 'code' is reserved: '{}'", loc, code));
        }
        if !seen_codes.insert(code) {
            errors.push(format!("{}: duplicate 'code': '{}'", loc, code));
        }
        if let Some(var) = var.filter(|v| !v.is_empty()) {
            if !is_identifier(var) {
                errors.push(format!("{}: 'var' is not a valid identifier: '{}'", loc, var));
            } else {
                if is_reserved(var) {
                    errors.push(format!("{}: 'var' is reserved: '{}'", loc, var));
                }
                if !seen_vars.insert(var) {
                    errors.push(format!("{}: duplicate 'var': '{}'", loc, var));
                }
            }
        }
    }

    // Field shapes and ranges
    for (i, field) in schema.fields.iter().enumerate() {
        let loc = location("fields", i, &field.code);
        let shape = field.shape.as_deref().unwrap_or("");
        match field.kind.as_deref() {
            Some("list") if field.layout() != FieldLayout::JudgeVector => {
                errors.push(format!("{}: list fields need shape 'judge', got '{}'", loc, shape));
            }
            Some("matrix") if field.layout() != FieldLayout::Matrix => {
                errors.push(format!(
                    "{}: matrix fields need shape 'judge_x_item' or 'judge_x_element', got '{}'",
                    loc, shape
                ));
            }
            _ => {}
        }
        if let (Some(min), Some(max)) = (field.min, field.max) {
            if min > max {
                errors.push(format!("{}: min ({}) is greater than max ({})", loc, min, max));
            }
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Aliases
    let aliases = deps::alias_map(schema);
    for (short, code) in &aliases {
        if !is_identifier(short) {
            errors.push(format!("alias '{}' is not a valid identifier", short));
        }
        if is_reserved(short) {
            errors.push(format!("alias '{}' is a reserved name", short));
        }
        if !seen_codes.contains(code.as_str()) {
            errors.push(format!("alias '{}' points to an unknown code: '{}'", short, code));
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Formulas: grammar and undeclared names
    let known: BTreeSet<&str> = seen_codes
        .iter()
        .copied()
        .chain(aliases.keys().map(String::as_str))
        .collect();
    let mut compiled: Vec<(&str, Expr)> = Vec::new();
    for (i, entry) in schema.computed.iter().enumerate() {
        let loc = location("computed", i, &entry.code);
        let Some(formula) = entry.formula_text() else {
            errors.push(format!("{}: missing 'formula'", loc));
            continue;
        };
        let expr = match Grammar::Formula.compile(formula) {
            Ok(expr) => expr,
            Err(e) => {
                errors.push(format!("{}: {}", loc, e));
                continue;
            }
        };
        let unknown: Vec<String> = expr
            .referenced_names()
            .into_iter()
            .filter(|name| !known.contains(name.as_str()) && !is_reserved(name))
            .collect();
        if !unknown.is_empty() {
            errors.push(format!("{}: undeclared names: {}", loc, unknown.join(", ")));
        }
        compiled.push((entry.code.as_str(), expr));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Dependency cycles
    let nodes: Vec<(&str, &Expr)> = compiled.iter().map(|(code, expr)| (*code, expr)).collect();
    let order = match deps::evaluation_order(&nodes, &aliases) {
        Ok(order) => order,
        Err(e) => return Err(vec![e.to_string()]),
    };

    // Shape dry-run in evaluation order; every entry reached this stage, so
    // node indices are computed indices
    let mut shapes = ShapeCheck::new(schema, &aliases);
    for idx in order {
        let (code, expr) = nodes[idx];
        let shape = shapes.shape_of(expr).unwrap_or_else(|msg| {
            errors.push(format!(
                "{}: shape mismatch: {}",
                location("computed", idx, code),
                msg
            ));
            Shape::UNKNOWN
        });
        shapes.store(code, shape);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(())
}
