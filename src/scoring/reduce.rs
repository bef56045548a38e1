//! Judge x item reductions behind `items_reduce`, `row_custom_compute` and
//! `column_custom_compute`.

use std::ops::Range;
use std::sync::Arc;

use super::builtins::Args;
use super::config::MAX_ITEMS;
use super::context::EvalContext;
use super::error::{ScoringError, ScoringResult};
use super::expr::{evaluate_number, is_safe_name, Expr, Grammar, Scope};
use super::selection::{Aggregator, Criterion};
use super::value::{to_float, Value};

/// Which axis is reduced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOrder {
    /// Reduce each judge's row of items, then across judges
    RowsFirst,
    /// Reduce each item column across judges, then across items
    ColumnsFirst,
}

impl ReduceOrder {
    fn func_name(self) -> &'static str {
        match self {
            ReduceOrder::RowsFirst => "row_custom_compute",
            ReduceOrder::ColumnsFirst => "column_custom_compute",
        }
    }

    /// (inner, outer) parameter prefixes
    fn prefixes(self) -> (&'static str, &'static str) {
        match self {
            ReduceOrder::RowsFirst => ("row", "col"),
            ReduceOrder::ColumnsFirst => ("col", "row"),
        }
    }

    fn per_line_mode(self) -> &'static str {
        match self {
            ReduceOrder::RowsFirst => "by_judge",
            ReduceOrder::ColumnsFirst => "by_item",
        }
    }
}

/// Whether selection or aggregation looks at transformed or raw cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Basis {
    Expr,
    Raw,
}

impl Basis {
    fn parse(name: &str, key: &str) -> ScoringResult<Self> {
        match name.trim() {
            "expr" => Ok(Basis::Expr),
            "raw" => Ok(Basis::Raw),
            other => Err(ScoringError::Selection(format!(
                "{} must be 'expr' or 'raw', got '{}'",
                key, other
            ))),
        }
    }

    fn pick<'v>(self, transformed: &'v [f64], raw: &'v [f64]) -> &'v [f64] {
        match self {
            Basis::Expr => transformed,
            Basis::Raw => raw,
        }
    }
}

/// A judge x item matrix with its item bound and crash positions.
#[derive(Debug)]
struct Source {
    rows: Vec<Vec<f64>>,
    n_items: usize,
    crash: Vec<i64>,
}

impl Source {
    fn resolve(value: &Value, cx: &EvalContext, func: &str) -> ScoringResult<Self> {
        match value {
            Value::Str(name) => {
                if !is_safe_name(name) {
                    return Err(ScoringError::Grammar(format!(
                        "{}(): source name not allowed: '{}'",
                        func, name
                    )));
                }
                let data = cx.lookup(name).ok_or_else(|| {
                    ScoringError::Grammar(format!("{}(): unknown source '{}'", func, name))
                })?;
                let code = cx.canonical(name);
                let rows = matrix_rows(&data, func)?;
                let n_items = cx
                    .schema()
                    .field(code)
                    .map(|f| f.item_count())
                    .filter(|n| *n > 0)
                    .unwrap_or_else(|| widest(&rows));
                Ok(Self {
                    rows,
                    n_items,
                    crash: cx.crash_vector(code),
                })
            }
            Value::List(_) => {
                let rows = matrix_rows(value, func)?;
                Ok(Self {
                    n_items: widest(&rows),
                    rows,
                    crash: Vec::new(),
                })
            }
            other => Err(ScoringError::Type(format!(
                "{}() source must be a field code or a matrix, got '{}'",
                func,
                other.type_name()
            ))),
        }
    }

    /// Item positions judge `j` contributes, after the start/count window and
    /// crash truncation.
    fn window(&self, judge: usize, start: usize, count: Option<usize>) -> Range<usize> {
        let lo = start.min(self.n_items);
        let mut hi = count
            .map(|c| lo.saturating_add(c))
            .unwrap_or(self.n_items)
            .min(self.n_items);
        let crash_at = self.crash.get(judge).copied().unwrap_or(0);
        if crash_at > 0 {
            hi = hi.min((crash_at - 1) as usize);
        }
        lo..hi.max(lo)
    }

    fn cell(&self, judge: usize, item: usize) -> f64 {
        self.rows
            .get(judge)
            .and_then(|row| row.get(item))
            .copied()
            .unwrap_or(0.0)
    }
}

fn matrix_rows(value: &Value, func: &str) -> ScoringResult<Vec<Vec<f64>>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::List(rows) => Ok(rows
            .iter()
            .map(|row| match row {
                Value::List(_) => row.to_floats(),
                scalar => vec![to_float(scalar)],
            })
            .collect()),
        other => Err(ScoringError::Type(format!(
            "{}() expects a judge x item matrix, got '{}'",
            func,
            other.type_name()
        ))),
    }
}

fn widest(rows: &[Vec<f64>]) -> usize {
    rows.iter().map(Vec::len).max().unwrap_or(0).min(MAX_ITEMS)
}

/// Select, aggregate, then optionally post-process one level of a reduction.
struct Stage {
    criterion: Criterion,
    agg: Aggregator,
    post: Option<Arc<Expr>>,
}

impl Stage {
    fn from_args(
        args: &Args,
        cx: &EvalContext,
        prefix: &str,
        fallback_n: Option<i64>,
        post_key: &str,
    ) -> ScoringResult<Self> {
        let select = args.str_or(&format!("{}_select", prefix), "all")?;
        let n = args.int(&format!("{}_n", prefix)).or(fallback_n);
        let agg = args.str_or(&format!("{}_agg", prefix), "sum")?;
        let post = match args.get(post_key) {
            None => None,
            Some(Value::Str(src)) => Some(cx.exprs().get(Grammar::PostAggregate, src)?),
            Some(other) => {
                return Err(ScoringError::Type(format!(
                    "{} must be a string, got '{}'",
                    post_key,
                    other.type_name()
                )))
            }
        };
        Ok(Self {
            criterion: Criterion::parse(select, n)?,
            agg: Aggregator::parse(agg)?,
            post,
        })
    }

    fn reduce(&self, select_on: &[f64], agg_on: &[f64]) -> ScoringResult<f64> {
        let picked: Vec<f64> = self
            .criterion
            .select_indices(select_on)
            .into_iter()
            .map(|i| agg_on[i])
            .collect();
        let m = self.agg.apply(&picked);
        match &self.post {
            Some(expr) if !picked.is_empty() => evaluate_number(expr, &[("m", m)]),
            _ => Ok(m),
        }
    }
}

fn transform(item_expr: &Expr, cells: &[(usize, f64)]) -> ScoringResult<Vec<f64>> {
    cells
        .iter()
        .map(|&(item, x)| evaluate_number(item_expr, &[("x", x), ("i", (item + 1) as f64)]))
        .collect()
}

fn window_args(args: &Args) -> (usize, Option<usize>) {
    let start = args.int("start").unwrap_or(0).max(0) as usize;
    let count = args.int("count").map(|c| c.max(0) as usize);
    (start, count)
}

/// `items_reduce`: one aggregate per judge over a window of transformed items.
pub fn items_reduce(args: &Args, cx: &EvalContext) -> ScoringResult<Value> {
    let code = match args.required("field_code")? {
        Value::Str(code) => Value::Str(code.clone()),
        other => {
            return Err(ScoringError::Type(format!(
                "items_reduce() expects a field code string, got '{}'",
                other.type_name()
            )))
        }
    };
    let source = Source::resolve(&code, cx, "items_reduce")?;
    let item_expr = cx.exprs().get(Grammar::Item, args.str_or("item_expr", "x")?)?;
    let agg = Aggregator::parse(args.str_or("agg", "sum")?)?;
    let (start, count) = window_args(args);
    let count = count.or_else(|| args.int("limit_items").map(|c| c.max(0) as usize));

    let mut out = Vec::with_capacity(source.rows.len());
    for judge in 0..source.rows.len() {
        let cells: Vec<(usize, f64)> = source
            .window(judge, start, count)
            .map(|item| (item, source.cell(judge, item)))
            .collect();
        out.push(agg.apply(&transform(&item_expr, &cells)?));
    }
    Ok(Value::from(out))
}

/// `row_custom_compute` / `column_custom_compute`.
pub fn custom_compute(order: ReduceOrder, args: &Args, cx: &EvalContext) -> ScoringResult<Value> {
    let func = order.func_name();
    let source = Source::resolve(args.required("source")?, cx, func)?;
    let item_expr = cx.exprs().get(Grammar::Item, args.str_or("item_expr", "x")?)?;
    let select_on = Basis::parse(args.str_or("select_on", "expr")?, "select_on")?;
    let agg_on = Basis::parse(args.str_or("agg_on", "expr")?, "agg_on")?;
    let (inner_prefix, outer_prefix) = order.prefixes();
    let inner = Stage::from_args(args, cx, inner_prefix, args.int("n"), "post_agg_expr")?;
    let outer = Stage::from_args(args, cx, outer_prefix, None, "post_final_expr")?;
    let return_mode = args.str_or("return_mode", "final")?.trim().to_string();
    if return_mode != "final" && return_mode != order.per_line_mode() {
        return Err(ScoringError::Selection(format!(
            "{}() return_mode must be 'final' or '{}', got '{}'",
            func,
            order.per_line_mode(),
            return_mode
        )));
    }
    let (start, count) = window_args(args);

    let lines: Vec<Vec<(usize, f64)>> = match order {
        ReduceOrder::RowsFirst => (0..source.rows.len())
            .map(|judge| {
                source
                    .window(judge, start, count)
                    .map(|item| (item, source.cell(judge, item)))
                    .collect()
            })
            .collect(),
        ReduceOrder::ColumnsFirst => {
            let windows: Vec<Range<usize>> = (0..source.rows.len())
                .map(|judge| source.window(judge, start, count))
                .collect();
            let lo = start.min(source.n_items);
            let hi = count
                .map(|c| lo.saturating_add(c))
                .unwrap_or(source.n_items)
                .min(source.n_items);
            (lo..hi)
                .map(|item| {
                    windows
                        .iter()
                        .enumerate()
                        .filter(|(_, w)| w.contains(&item))
                        .map(|(judge, _)| (item, source.cell(judge, item)))
                        .collect()
                })
                .collect()
        }
    };

    let mut per_line = Vec::with_capacity(lines.len());
    for cells in &lines {
        let raw: Vec<f64> = cells.iter().map(|&(_, x)| x).collect();
        let transformed = transform(&item_expr, cells)?;
        per_line.push(inner.reduce(
            select_on.pick(&transformed, &raw),
            agg_on.pick(&transformed, &raw),
        )?);
    }

    if return_mode == "final" {
        Ok(Value::Number(outer.reduce(&per_line, &per_line)?))
    } else {
        Ok(Value::from(per_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::config::Schema;
    use crate::scoring::expr::{evaluate, ExprCache};
    use crate::scoring::normalize::{crash_key, NormalizedInputs};
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        serde_json::from_value(serde_json::json!({
            "fields": [
                {"code": "M", "type": "matrix", "shape": "judge_x_item",
                 "judges": {"count": 3}, "items": {"count": 4}, "crash": {"enabled": true}},
                {"code": "W", "type": "matrix", "shape": "judge_x_item",
                 "judges": {"count": 2}, "items": {"count": 3}}
            ],
        }))
        .unwrap()
    }

    fn run_with_crash(src: &str, crash: Vec<f64>) -> ScoringResult<Value> {
        let schema = schema();
        let exprs = ExprCache::new();
        let mut inputs = NormalizedInputs::new();
        inputs.insert(
            "M".into(),
            Value::from(vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![2.0, 2.0, 2.0, 2.0],
                vec![0.0, 5.0, 1.0, 3.0],
            ]),
        );
        inputs.insert(crash_key("M"), Value::from(crash));
        inputs.insert("W".into(), Value::from(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]));
        let aliases = BTreeMap::from([("m".to_string(), "M".to_string())]);
        let cx = EvalContext::new(&schema, &exprs, &inputs, &aliases);
        let expr = Grammar::Formula.compile(src)?;
        evaluate(&expr, &cx)
    }

    fn run(src: &str) -> ScoringResult<Value> {
        run_with_crash(src, vec![0.0, 0.0, 0.0])
    }

    fn number(src: &str) -> f64 {
        run(src).unwrap().as_number().unwrap()
    }

    #[test]
    fn test_items_reduce_per_judge() {
        assert_eq!(run("items_reduce('M')").unwrap(), Value::from(vec![10.0, 8.0, 9.0]));
        assert_eq!(
            run("items_reduce('M', 'x * i', 'max', 2)").unwrap(),
            Value::from(vec![4.0, 4.0, 10.0])
        );
        assert_eq!(
            run("items_reduce('M', start=1, count=2)").unwrap(),
            Value::from(vec![5.0, 4.0, 6.0])
        );
    }

    #[test]
    fn test_items_reduce_respects_crash() {
        let value = run_with_crash("items_reduce('M')", vec![0.0, 3.0, 1.0]).unwrap();
        assert_eq!(value, Value::from(vec![10.0, 4.0, 0.0]));
    }

    #[test]
    fn test_items_reduce_rejects_item_grammar_violations() {
        let err = run("items_reduce('M', 'y + 1')").unwrap_err();
        assert!(matches!(err, ScoringError::Grammar(_)));
        let err = run("items_reduce('M', 'sum(x)')").unwrap_err();
        assert!(matches!(err, ScoringError::Grammar(_)));
    }

    #[test]
    fn test_row_then_column() {
        // row sums [10, 8, 9] then sum
        assert_eq!(number("row_custom_compute('W')"), 21.0);
        assert_eq!(number("row_custom_compute('M')"), 27.0);
        assert_eq!(number("row_custom_compute('M', col_select='maximes', col_n=2)"), 19.0);
    }

    #[test]
    fn test_row_by_judge_with_post_agg() {
        let value = run("row_custom_compute('W', row_agg='avg', post_agg_expr='m * 10', return_mode='by_judge')")
            .unwrap();
        assert_eq!(value, Value::from(vec![20.0, 50.0]));
    }

    #[test]
    fn test_column_by_item() {
        let value = run("column_custom_compute('W', return_mode='by_item')").unwrap();
        assert_eq!(value, Value::from(vec![5.0, 7.0, 9.0]));
        let value = run("column_custom_compute('M', col_select='drop_extremes', return_mode='by_item')")
            .unwrap();
        assert_eq!(value, Value::from(vec![1.0, 2.0, 2.0, 3.0]));
    }

    #[test]
    fn test_column_drops_crashed_cells() {
        // judge 1 stops after item 2, judge 2 crashes on item 1
        let crash = vec![0.0, 3.0, 1.0];
        let value = run_with_crash("column_custom_compute('M', return_mode='by_item')", crash.clone())
            .unwrap();
        assert_eq!(value, Value::from(vec![3.0, 4.0, 3.0, 4.0]));
        let value = run_with_crash(
            "column_custom_compute('M', col_agg='avg', return_mode='by_item')",
            crash,
        )
        .unwrap();
        assert_eq!(value, Value::from(vec![1.5, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_alias_source_keeps_crash_and_item_count() {
        let crash = vec![0.0, 3.0, 1.0];
        let by_code = run_with_crash("row_custom_compute('M')", crash.clone()).unwrap();
        let by_alias = run_with_crash("row_custom_compute('m')", crash.clone()).unwrap();
        assert_eq!(by_code, Value::Number(14.0));
        assert_eq!(by_alias, by_code);
        assert_eq!(
            run_with_crash("items_reduce('m')", crash).unwrap(),
            Value::from(vec![10.0, 4.0, 0.0])
        );
    }

    #[test]
    fn test_internal_keys_are_not_sources() {
        let err = run("row_custom_compute('__crash__M')").unwrap_err();
        assert!(matches!(err, ScoringError::Grammar(_)));
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn test_column_final_with_post_final() {
        assert_eq!(
            number("column_custom_compute('W', col_agg='max', row_agg='min', post_final_expr='m + 0.5')"),
            4.5
        );
    }

    #[test]
    fn test_select_on_raw_agg_on_expr() {
        // pick the 2 largest raw cells per row, sum their negations
        let value = run(
            "row_custom_compute('W', item_expr='-x', row_select='maximes', row_n=2, select_on='raw', return_mode='by_judge')",
        )
        .unwrap();
        assert_eq!(value, Value::from(vec![-5.0, -11.0]));
    }

    #[test]
    fn test_n_falls_back_for_inner_stage() {
        let value = run("row_custom_compute('W', row_select='minimes', n=1, return_mode='by_judge')")
            .unwrap();
        assert_eq!(value, Value::from(vec![1.0, 4.0]));
    }

    #[test]
    fn test_select_without_n_keeps_every_cell() {
        let value = run("row_custom_compute('W', row_select='maximes', return_mode='by_judge')").unwrap();
        assert_eq!(value, Value::from(vec![6.0, 15.0]));
    }

    #[test]
    fn test_direct_matrix_source() {
        assert_eq!(number("row_custom_compute([[1, 2], [3]])"), 6.0);
    }

    #[test]
    fn test_empty_selection_skips_post_agg() {
        let value = run_with_crash(
            "row_custom_compute('M', post_agg_expr='m + 100', return_mode='by_judge')",
            vec![1.0, 0.0, 0.0],
        )
        .unwrap();
        assert_eq!(value, Value::from(vec![0.0, 108.0, 109.0]));
    }

    #[test]
    fn test_invalid_return_mode() {
        let err = run("row_custom_compute('W', return_mode='by_item')").unwrap_err();
        assert!(matches!(err, ScoringError::Selection(_)));
    }

    #[test]
    fn test_invalid_basis_and_aggregator() {
        assert!(matches!(
            run("row_custom_compute('W', select_on='both')").unwrap_err(),
            ScoringError::Selection(_)
        ));
        assert!(matches!(
            run("row_custom_compute('W', row_agg='mode')").unwrap_err(),
            ScoringError::Selection(_)
        ));
    }

    #[test]
    fn test_unknown_source() {
        assert!(matches!(
            run("row_custom_compute('NOPE')").unwrap_err(),
            ScoringError::Grammar(_)
        ));
    }
}
