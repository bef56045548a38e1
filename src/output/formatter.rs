use anyhow::{Context, Result};
use atomic_write_file::AtomicWriteFile;
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Write};
use std::path::Path;
use terminal_size::{terminal_size, Width};

use crate::scoring::{EngineResult, Schema, Value};

/// Decide on colors: an explicit setting wins, else stdout must be a TTY.
pub fn should_use_colors(setting: Option<bool>) -> bool {
    setting.unwrap_or_else(|| std::io::stdout().is_terminal())
}

/// Get terminal width, defaulting to None for pipes (unlimited)
fn get_terminal_width() -> Option<usize> {
    terminal_size().map(|(Width(w), _)| w as usize)
}

/// Truncate to fit available width, accounting for Unicode
fn truncate(text: &str, max_width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_width {
        text.to_string()
    } else if max_width > 3 {
        format!("{}...", chars[..max_width - 3].iter().collect::<String>())
    } else {
        chars[..max_width].iter().collect()
    }
}

/// Render a value compactly: numbers to `precision` places, lists in brackets.
pub fn format_value(value: &Value, precision: usize) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format!("{:.*}", precision, n),
        Value::Str(s) => s.clone(),
        Value::List(items) => format!(
            "[{}]",
            items
                .iter()
                .map(|item| format_value(item, precision))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Value::Map(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v, precision)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Format a result as two aligned blocks: inputs in field order, then
/// computed values in declaration order. `TOTAL` is highlighted.
pub fn format_result_table(
    result: &EngineResult,
    schema: &Schema,
    precision: usize,
    use_colors: bool,
) -> String {
    let inputs: Vec<(&str, &Value)> = schema
        .fields
        .iter()
        .filter_map(|f| result.inputs.get(&f.code).map(|v| (f.code.as_str(), v)))
        .collect();
    let computed: Vec<(&str, &Value)> = schema
        .computed
        .iter()
        .filter_map(|c| result.outputs.get(&c.code).map(|v| (c.code.as_str(), v)))
        .collect();

    let code_width = inputs
        .iter()
        .chain(computed.iter())
        .map(|(code, _)| code.chars().count())
        .max()
        .unwrap_or(0);
    let term_width = get_terminal_width();

    let render = |code: &str, value: &Value, is_input: bool| {
        let text = format_value(value, precision);
        let text = match term_width {
            Some(width) if width > code_width + 12 => truncate(&text, width - code_width - 2),
            Some(_) => truncate(&text, 20),
            None => text,
        };
        let padded = format!("{:<width$}", code, width = code_width);
        if !use_colors {
            format!("{}  {}", padded, text)
        } else if code == "TOTAL" {
            format!("{}  {}", padded.bold(), text.bold().green())
        } else if is_input {
            format!("{}  {}", padded.dimmed(), text)
        } else {
            format!("{}  {}", padded.cyan(), text)
        }
    };

    let mut lines: Vec<String> = inputs
        .iter()
        .map(|(code, value)| render(code, value, true))
        .collect();
    if !inputs.is_empty() && !computed.is_empty() {
        lines.push(String::new());
    }
    lines.extend(computed.iter().map(|(code, value)| render(code, value, false)));
    if computed.iter().all(|(code, _)| *code != "TOTAL") {
        let total = format!("{:.*}", precision, result.total);
        lines.push(if use_colors {
            format!("{}: {}", "total".bold(), total.bold())
        } else {
            format!("total: {}", total)
        });
    }
    lines.join("\n")
}

/// Pretty JSON for scripting.
pub fn format_json(result: &EngineResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize result")
}

/// One line per linter error, under a heading.
pub fn format_validation_errors(errors: &[String], use_colors: bool) -> String {
    let heading = if use_colors {
        "Schema errors:".red().bold().to_string()
    } else {
        "Schema errors:".to_string()
    };
    std::iter::once(heading)
        .chain(errors.iter().map(|e| format!("  - {}", e)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Computed codes with their 1-based evaluation step.
pub fn format_order(order: &[&str], use_colors: bool) -> String {
    if order.is_empty() {
        return "No computed fields.".to_string();
    }
    order
        .iter()
        .enumerate()
        .map(|(idx, code)| {
            let index_str = format!("{:>2}.", idx + 1);
            if use_colors {
                format!("{} {}", index_str.dimmed(), code)
            } else {
                format!("{} {}", index_str, code)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Save a result as pretty JSON atomically
///
/// The target is never left half-written.
pub fn write_result(path: &Path, result: &EngineResult) -> Result<()> {
    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("Failed to open atomic write file at {}", path.display()))?;

    serde_json::to_writer_pretty(&mut file, result).context("Failed to serialize result")?;
    file.write_all(b"\n").context("Failed to write result")?;

    file.commit()
        .with_context(|| format!("Failed to save result to {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoringEngine;
    use std::collections::BTreeMap;
    use std::env;

    fn sample() -> (Schema, EngineResult) {
        let schema = Schema::from_json(serde_json::json!({
            "fields": [
                {"code": "E", "type": "list", "shape": "judge", "judges": {"count": 2}},
                {"code": "DD", "type": "number"}
            ],
            "computed": [{"code": "TOTAL", "formula": "sum(E) + DD"}]
        }))
        .unwrap();
        let engine = ScoringEngine::new(schema.clone()).unwrap();
        let raw: BTreeMap<String, Value> =
            serde_json::from_value(serde_json::json!({"E": [8, 7.5], "DD": 4})).unwrap();
        let result = engine.compute(&raw).unwrap();
        (schema, result)
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Number(1.23456), 2), "1.23");
        assert_eq!(
            format_value(&Value::from(vec![vec![1.0, 2.0], vec![3.0]]), 0),
            "[[1, 2], [3]]"
        );
        assert_eq!(format_value(&Value::Null, 3), "-");
        assert_eq!(format_value(&Value::from("x"), 3), "x");
    }

    #[test]
    fn test_format_result_table_plain() {
        let (schema, result) = sample();
        let table = format_result_table(&result, &schema, 1, false);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "E      [8.0, 7.5]");
        assert_eq!(lines[1], "DD     4.0");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "TOTAL  19.5");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_format_result_table_without_total_row() {
        let schema = Schema::from_json(serde_json::json!({
            "computed": [{"code": "X", "formula": "2"}]
        }))
        .unwrap();
        let result = ScoringEngine::new(schema.clone())
            .unwrap()
            .compute(&BTreeMap::new())
            .unwrap();
        let table = format_result_table(&result, &schema, 0, false);
        assert_eq!(table, "X  2\ntotal: 0");
    }

    #[test]
    fn test_format_json_has_total() {
        let (_, result) = sample();
        let json: serde_json::Value = serde_json::from_str(&format_json(&result).unwrap()).unwrap();
        assert_eq!(json["total"], serde_json::json!(19.5));
        assert_eq!(json["outputs"]["TOTAL"], serde_json::json!(19.5));
    }

    #[test]
    fn test_format_validation_errors() {
        let out = format_validation_errors(&["a".to_string(), "b".to_string()], false);
        assert_eq!(out, "Schema errors:\n  - a\n  - b");
    }

    #[test]
    fn test_format_order() {
        assert_eq!(format_order(&["B", "A"], false), " 1. B\n 2. A");
        assert_eq!(format_order(&[], false), "No computed fields.");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 10), "abcdef");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_write_result_roundtrip() {
        let (_, result) = sample();
        let path = env::temp_dir().join("gym_score_test_result.json");
        let _ = std::fs::remove_file(&path);
        write_result(&path, &result).unwrap();
        let back: EngineResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, result);
    }
}
