//! Evaluation order for computed fields.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use super::config::Schema;
use super::error::{ScoringError, ScoringResult};
use super::expr::Expr;

/// Short name -> code: `params.aliases` first, then every `var` declared on
/// fields and computed entries.
pub fn alias_map(schema: &Schema) -> BTreeMap<String, String> {
    let mut aliases = schema.params.aliases();
    let vars = schema
        .fields
        .iter()
        .map(|f| (f.var.as_deref(), f.code.as_str()))
        .chain(schema.computed.iter().map(|c| (c.var.as_deref(), c.code.as_str())));
    for (var, code) in vars {
        if let Some(var) = var.map(str::trim).filter(|v| !v.is_empty()) {
            if !code.is_empty() {
                aliases.insert(var.to_string(), code.to_string());
            }
        }
    }
    aliases
}

/// Kahn's algorithm over `nodes` (code, compiled formula).
///
/// Returns indices into `nodes`. Ties are broken by declaration order.
pub fn evaluation_order(
    nodes: &[(&str, &Expr)],
    aliases: &BTreeMap<String, String>,
) -> ScoringResult<Vec<usize>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (code, _))| (*code, i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, (_, expr)) in nodes.iter().enumerate() {
        let mut deps = BTreeSet::new();
        for name in expr.referenced_names() {
            let resolved = aliases.get(&name).map(String::as_str).unwrap_or(name.as_str());
            if let Some(&j) = index.get(resolved) {
                if j != i {
                    deps.insert(j);
                }
            }
        }
        in_degree[i] = deps.len();
        for j in deps {
            dependents[j].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < nodes.len() {
        let codes = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].0.to_string())
            .collect();
        return Err(ScoringError::Cycle { codes });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::expr::Grammar;

    fn order(formulas: &[(&str, &str)], aliases: &[(&str, &str)]) -> ScoringResult<Vec<String>> {
        let compiled: Vec<(&str, Expr)> = formulas
            .iter()
            .map(|(code, src)| (*code, Grammar::Formula.compile(src).unwrap()))
            .collect();
        let nodes: Vec<(&str, &Expr)> = compiled.iter().map(|(c, e)| (*c, e)).collect();
        let aliases = aliases
            .iter()
            .map(|(s, c)| (s.to_string(), c.to_string()))
            .collect();
        evaluation_order(&nodes, &aliases)
            .map(|idx| idx.into_iter().map(|i| formulas[i].0.to_string()).collect())
    }

    #[test]
    fn test_dependency_first() {
        assert_eq!(order(&[("A", "B + 1"), ("B", "2")], &[]).unwrap(), vec!["B", "A"]);
    }

    #[test]
    fn test_cycle_names_remaining_codes() {
        let err = order(&[("A", "B + 1"), ("B", "A + 1"), ("C", "1")], &[]).unwrap_err();
        assert_eq!(
            err,
            ScoringError::Cycle {
                codes: vec!["A".to_string(), "B".to_string()]
            }
        );
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        assert_eq!(order(&[("A", "A + 1")], &[]).unwrap(), vec!["A"]);
    }

    #[test]
    fn test_alias_edges() {
        let got = order(&[("TOTAL", "e + 1"), ("E_sum", "3")], &[("e", "E_sum")]).unwrap();
        assert_eq!(got, vec!["E_sum", "TOTAL"]);
    }

    #[test]
    fn test_source_code_strings_are_edges() {
        let got = order(
            &[("T", "row_custom_compute('E_j')"), ("E_j", "[[1, 2]]")],
            &[],
        )
        .unwrap();
        assert_eq!(got, vec!["E_j", "T"]);
    }

    #[test]
    fn test_declaration_order_kept_for_independent_nodes() {
        let got = order(&[("C", "1"), ("A", "2"), ("B", "3")], &[]).unwrap();
        assert_eq!(got, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_alias_map_merges_vars() {
        let schema: Schema = serde_json::from_value(serde_json::json!({
            "params": {"aliases": {"e": "E", "bad": 3}},
            "fields": [{"code": "DD", "type": "number", "var": "d"}],
            "computed": [{"code": "T", "formula": "d", "var": " "}],
        }))
        .unwrap();
        let aliases = alias_map(&schema);
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases["e"], "E");
        assert_eq!(aliases["d"], "DD");
    }
}
