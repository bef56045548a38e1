//! The closed set of functions formulas may call.

use super::config::Params;
use super::context::EvalContext;
use super::error::{ScoringError, ScoringResult};
use super::reduce::{self, ReduceOrder};
use super::selection::{Aggregator, Criterion};
use super::trampoline::execution_score;
use super::value::{to_float, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Sum,
    Avg,
    Min,
    Max,
    Med,
    Float,
    ExecByJudge,
    SelectSum,
    BestN,
    Field,
    Crash,
    ItemsReduce,
    RowCustomCompute,
    ColumnCustomCompute,
}

const REDUCE_PARAMS: &[&str] = &[
    "source",
    "item_expr",
    "row_select",
    "row_n",
    "row_agg",
    "col_select",
    "col_n",
    "col_agg",
    "n",
    "select_on",
    "agg_on",
    "post_agg_expr",
    "post_final_expr",
    "start",
    "count",
    "return_mode",
];

impl Builtin {
    pub const ALL: [Builtin; 14] = [
        Builtin::Sum,
        Builtin::Avg,
        Builtin::Min,
        Builtin::Max,
        Builtin::Med,
        Builtin::Float,
        Builtin::ExecByJudge,
        Builtin::SelectSum,
        Builtin::BestN,
        Builtin::Field,
        Builtin::Crash,
        Builtin::ItemsReduce,
        Builtin::RowCustomCompute,
        Builtin::ColumnCustomCompute,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Sum => "sum",
            Builtin::Avg => "avg",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Med => "med",
            Builtin::Float => "float",
            Builtin::ExecByJudge => "exec_by_judge",
            Builtin::SelectSum => "select_sum",
            Builtin::BestN => "best_n",
            Builtin::Field => "field",
            Builtin::Crash => "crash",
            Builtin::ItemsReduce => "items_reduce",
            Builtin::RowCustomCompute => "row_custom_compute",
            Builtin::ColumnCustomCompute => "column_custom_compute",
        }
    }

    /// Builtins whose first argument may name a field or computed code.
    pub fn reads_source_code(self) -> bool {
        matches!(
            self,
            Builtin::ItemsReduce | Builtin::RowCustomCompute | Builtin::ColumnCustomCompute
        )
    }

    /// Parameter names, in positional order.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Builtin::Sum | Builtin::Avg | Builtin::Min | Builtin::Max | Builtin::Med => &["values"],
            Builtin::Float => &["value"],
            Builtin::ExecByJudge => &["matrix", "crash", "params"],
            Builtin::SelectSum => &["scores", "n_valid", "criteria"],
            Builtin::BestN => &["scores", "n"],
            Builtin::Field => &["code"],
            Builtin::Crash => &["field_code"],
            Builtin::ItemsReduce => &["field_code", "item_expr", "agg", "limit_items", "start", "count"],
            Builtin::RowCustomCompute | Builtin::ColumnCustomCompute => REDUCE_PARAMS,
        }
    }
}

/// Call arguments bound to a builtin's parameter names.
#[derive(Debug)]
pub struct Args {
    func: Builtin,
    slots: Vec<Option<Value>>,
}

impl Args {
    pub fn bind(
        func: Builtin,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScoringResult<Self> {
        let names = func.params();
        if args.len() > names.len() {
            return Err(ScoringError::Grammar(format!(
                "{}() takes at most {} arguments ({} given)",
                func.name(),
                names.len(),
                args.len()
            )));
        }
        let mut slots: Vec<Option<Value>> = vec![None; names.len()];
        for (slot, value) in slots.iter_mut().zip(args) {
            *slot = Some(value);
        }
        for (key, value) in kwargs {
            let pos = names.iter().position(|n| *n == key).ok_or_else(|| {
                ScoringError::Grammar(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    func.name(),
                    key
                ))
            })?;
            if slots[pos].is_some() {
                return Err(ScoringError::Grammar(format!(
                    "{}() got multiple values for argument '{}'",
                    func.name(),
                    key
                )));
            }
            slots[pos] = Some(value);
        }
        Ok(Self { func, slots })
    }

    fn slot(&self, name: &str) -> Option<&Value> {
        self.func
            .params()
            .iter()
            .position(|n| *n == name)
            .and_then(|pos| self.slots[pos].as_ref())
    }

    /// Argument value; an explicit `None` counts as not given.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slot(name).filter(|v| !v.is_null())
    }

    /// Argument that must be passed (possibly as `None`).
    pub fn required(&self, name: &str) -> ScoringResult<&Value> {
        self.slot(name).ok_or_else(|| {
            ScoringError::Grammar(format!(
                "{}() missing required argument '{}'",
                self.func.name(),
                name
            ))
        })
    }

    pub fn str_or<'v>(&'v self, name: &str, default: &'v str) -> ScoringResult<&'v str> {
        match self.get(name) {
            None => Ok(default),
            Some(Value::Str(s)) => Ok(s),
            Some(other) => Err(ScoringError::Type(format!(
                "{}() argument '{}' must be a string, got '{}'",
                self.func.name(),
                name,
                other.type_name()
            ))),
        }
    }

    /// Integer argument, truncating like `int()`.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).map(|v| to_float(v).trunc() as i64)
    }

    pub fn func_name(&self) -> &'static str {
        self.func.name()
    }
}

pub fn dispatch(func: Builtin, args: &Args, cx: &EvalContext) -> ScoringResult<Value> {
    match func {
        Builtin::Sum => aggregate(Aggregator::Sum, args),
        Builtin::Avg => aggregate(Aggregator::Avg, args),
        Builtin::Min => aggregate(Aggregator::Min, args),
        Builtin::Max => aggregate(Aggregator::Max, args),
        Builtin::Med => aggregate(Aggregator::Med, args),
        Builtin::Float => Ok(Value::Number(to_float(args.required("value")?))),
        Builtin::ExecByJudge => exec_by_judge(args),
        Builtin::SelectSum => select_sum(args),
        Builtin::BestN => best_n(args),
        Builtin::Field => {
            let code = code_arg(args, "code")?;
            Ok(cx
                .schema()
                .field(&code)
                .map(|f| f.to_value())
                .unwrap_or_else(|| Value::Map(Default::default())))
        }
        Builtin::Crash => {
            let code = code_arg(args, "field_code")?;
            let crash = cx.crash_vector(&code);
            Ok(Value::List(
                crash.into_iter().map(|c| Value::Number(c as f64)).collect(),
            ))
        }
        Builtin::ItemsReduce => reduce::items_reduce(args, cx),
        Builtin::RowCustomCompute => reduce::custom_compute(ReduceOrder::RowsFirst, args, cx),
        Builtin::ColumnCustomCompute => {
            reduce::custom_compute(ReduceOrder::ColumnsFirst, args, cx)
        }
    }
}

fn aggregate(agg: Aggregator, args: &Args) -> ScoringResult<Value> {
    let values = flatten(args.required("values")?, args.func_name())?;
    Ok(Value::Number(agg.apply(&values)))
}

/// Numbers in a (possibly nested) list; `None` is empty, scalars are one value.
pub fn flatten(value: &Value, func: &str) -> ScoringResult<Vec<f64>> {
    fn collect(value: &Value, out: &mut Vec<f64>) {
        match value {
            Value::List(items) => items.iter().for_each(|item| collect(item, out)),
            other => out.push(to_float(other)),
        }
    }
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Str(_) | Value::Map(_) => Err(ScoringError::Type(format!(
            "{}() expects a list of numbers, got '{}'",
            func,
            value.type_name()
        ))),
        other => {
            let mut out = Vec::new();
            collect(other, &mut out);
            Ok(out)
        }
    }
}

fn code_arg(args: &Args, name: &str) -> ScoringResult<String> {
    match args.required(name)? {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ScoringError::Type(format!(
            "{}() expects a field code string, got '{}'",
            args.func_name(),
            other.type_name()
        ))),
    }
}

fn exec_by_judge(args: &Args) -> ScoringResult<Value> {
    let rows = match args.required("matrix")? {
        Value::Null => &[][..],
        Value::List(rows) => rows.as_slice(),
        other => {
            return Err(ScoringError::Type(format!(
                "exec_by_judge() expects a judge x element matrix, got '{}'",
                other.type_name()
            )))
        }
    };
    let crash = args.get("crash").map(Value::to_floats).unwrap_or_default();
    let n_elements = args
        .get("params")
        .and_then(Value::as_map)
        .map(|map| Params(map.clone()).n_elements())
        .unwrap_or_else(|| Params::default().n_elements());

    let scores: Vec<f64> = rows
        .iter()
        .enumerate()
        .map(|(j, row)| {
            let crash_at = crash.get(j).map(|c| c.trunc() as i64).unwrap_or(0);
            execution_score(&row.to_floats(), crash_at, n_elements)
        })
        .collect();
    Ok(Value::from(scores))
}

fn select_sum(args: &Args) -> ScoringResult<Value> {
    let scores = flatten(args.get("scores").unwrap_or(&Value::Null), "select_sum")?;
    let k = args.int("n_valid").filter(|k| *k != 0).unwrap_or(1);
    let criteria = args.str_or("criteria", "totes")?;
    let criterion = Criterion::parse(criteria, Some(k))?;
    Ok(Value::Number(criterion.select(&scores).iter().sum()))
}

fn best_n(args: &Args) -> ScoringResult<Value> {
    let mut scores = flatten(args.get("scores").unwrap_or(&Value::Null), "best_n")?;
    scores.sort_by(|a, b| b.total_cmp(a));
    let n = args.int("n").unwrap_or(0).max(0) as usize;
    scores.truncate(n);
    Ok(Value::from(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::config::Schema;
    use crate::scoring::expr::{evaluate, ExprCache, Grammar};
    use crate::scoring::normalize::{crash_key, NormalizedInputs};
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        serde_json::from_value(serde_json::json!({
            "params": {"n_valid": 2, "criteria": "eliminar_extrems", "n_elements": 3},
            "fields": [
                {"code": "E", "type": "matrix", "shape": "judge_x_element",
                 "judges": {"count": 2}, "items": {"count": 3}, "crash": {"enabled": true}},
                {"code": "S", "type": "list", "shape": "judge", "judges": {"count": 3}}
            ],
        }))
        .unwrap()
    }

    fn run(src: &str) -> ScoringResult<Value> {
        let schema = schema();
        let exprs = ExprCache::new();
        let mut inputs = NormalizedInputs::new();
        inputs.insert("E".into(), Value::from(vec![vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 2.0]]));
        inputs.insert(crash_key("E"), Value::from(vec![0.0, 2.0]));
        inputs.insert("S".into(), Value::from(vec![8.0, 9.0, 7.5]));
        let aliases = BTreeMap::new();
        let cx = EvalContext::new(&schema, &exprs, &inputs, &aliases);
        let expr = Grammar::Formula.compile(src)?;
        evaluate(&expr, &cx)
    }

    fn number(src: &str) -> f64 {
        run(src).unwrap().as_number().unwrap()
    }

    #[test]
    fn test_from_name_roundtrip() {
        for b in Builtin::ALL {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(Builtin::from_name("eval"), None);
    }

    #[test]
    fn test_basic_reductions() {
        assert_eq!(number("sum(S)"), 24.5);
        assert_eq!(number("avg([1, 2, 3, 4])"), 2.5);
        assert_eq!(number("min(S)"), 7.5);
        assert_eq!(number("max(S)"), 9.0);
        assert_eq!(number("med([1, 2, 3, 4])"), 2.5);
        assert_eq!(number("med([1, 2, 3])"), 2.0);
    }

    #[test]
    fn test_reductions_on_empty_are_zero() {
        for f in ["sum", "avg", "min", "max", "med"] {
            assert_eq!(number(&format!("{}([])", f)), 0.0);
        }
        assert_eq!(number("sum(None)"), 0.0);
    }

    #[test]
    fn test_sum_flattens_matrix() {
        assert_eq!(number("sum(E)"), 9.0);
    }

    #[test]
    fn test_sum_rejects_string() {
        assert!(matches!(run("sum('abc')").unwrap_err(), ScoringError::Type(_)));
    }

    #[test]
    fn test_float() {
        assert_eq!(number("float('2.5') + float(None)"), 2.5);
    }

    #[test]
    fn test_exec_by_judge_uses_crash_and_params() {
        let value = run("exec_by_judge(E, crash('E'), params)").unwrap();
        let scores = value.to_floats();
        // judge 1: 3 - 0.6; judge 2 crashed at 2: 1 - 0.0
        assert!((scores[0] - 2.4).abs() < 1e-9);
        assert!((scores[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_exec_by_judge_default_elements() {
        let value = run("exec_by_judge([[0]], [], None)").unwrap();
        assert_eq!(value.to_floats(), vec![10.0]);
    }

    #[test]
    fn test_select_sum() {
        // eliminar_extrems to 2 of [8, 9, 7.5]: median 8, 9 is farthest
        assert_eq!(number("select_sum(S, params['n_valid'], params['criteria'])"), 15.5);
        assert_eq!(number("select_sum(S, 2, 'maximes')"), 17.0);
        assert_eq!(number("select_sum(S, 0)"), 9.0);
    }

    #[test]
    fn test_select_sum_unknown_criteria() {
        assert!(matches!(
            run("select_sum(S, 2, 'nope')").unwrap_err(),
            ScoringError::Selection(_)
        ));
    }

    #[test]
    fn test_best_n() {
        assert_eq!(run("best_n(S, 2)").unwrap(), Value::from(vec![9.0, 8.0]));
        assert_eq!(run("best_n(S, -1)").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_field_lookup() {
        assert_eq!(number("field('E')['items']['count']"), 3.0);
        assert_eq!(run("field('missing')").unwrap(), Value::Map(Default::default()));
    }

    #[test]
    fn test_crash_vector() {
        assert_eq!(run("crash('E')").unwrap(), Value::from(vec![0.0, 2.0]));
        assert_eq!(run("crash('S')").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_argument_binding_errors() {
        let err = run("sum()").unwrap_err();
        assert!(err.to_string().contains("missing required argument 'values'"));
        let err = run("best_n(S, 1, 2)").unwrap_err();
        assert!(err.to_string().contains("takes at most 2 arguments"));
        let err = run("best_n(S, k=1)").unwrap_err();
        assert!(err.to_string().contains("unexpected keyword argument 'k'"));
        let err = run("best_n(S, 1, n=2)").unwrap_err();
        assert!(err.to_string().contains("multiple values"));
    }

    #[test]
    fn test_keyword_arguments() {
        assert_eq!(number("select_sum(criteria='minimes', n_valid=1, scores=S)"), 7.5);
    }
}
