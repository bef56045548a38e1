use crate::scoring::error::{ScoringError, ScoringResult};

use super::ast::{Expr, Literal};
use super::parser::parse;

/// The three restricted expression dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// Per-cell transform over `x` (raw value) and `i` (1-based position)
    Item,
    /// Post-processing of an aggregate `m`
    PostAggregate,
    /// Computed-field formulas over the evaluation context
    Formula,
}

/// Identifier that formulas may reference: `__` prefixes are reserved for
/// internal keys such as crash vectors.
pub fn is_safe_name(name: &str) -> bool {
    is_identifier(name) && !name.starts_with("__")
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl Grammar {
    fn label(self) -> &'static str {
        match self {
            Grammar::Item => "item expression",
            Grammar::PostAggregate => "post-aggregation expression",
            Grammar::Formula => "formula",
        }
    }

    /// Source used when the expression text is blank.
    fn blank_source(self) -> &'static str {
        match self {
            Grammar::Item => "x",
            Grammar::PostAggregate => "m",
            Grammar::Formula => "0",
        }
    }

    fn allows_name(self, name: &str) -> bool {
        match self {
            Grammar::Item => name == "x" || name == "i",
            Grammar::PostAggregate => name == "m",
            Grammar::Formula => is_safe_name(name),
        }
    }

    /// Parse `src` and reject anything outside this tier before it ever runs.
    pub fn compile(self, src: &str) -> ScoringResult<Expr> {
        let src = if src.trim().is_empty() {
            self.blank_source()
        } else {
            src
        };
        let expr = parse(src)?;
        self.check(&expr)?;
        Ok(expr)
    }

    fn check(self, expr: &Expr) -> ScoringResult<()> {
        let mut failure = None;
        expr.walk(&mut |node| {
            if failure.is_some() {
                return;
            }
            failure = self.check_node(node).err();
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_node(self, node: &Expr) -> ScoringResult<()> {
        match node {
            Expr::Name(name) if !self.allows_name(name) => Err(ScoringError::Grammar(format!(
                "name not allowed in {}: {}",
                self.label(),
                name
            ))),
            Expr::Literal(Literal::None) if self != Grammar::Formula => Err(ScoringError::Grammar(
                format!("None is not allowed in {}", self.label()),
            )),
            Expr::Call { func, .. } if self != Grammar::Formula => Err(ScoringError::Grammar(
                format!("function not allowed in {}: {}", self.label(), func.name()),
            )),
            Expr::Index { .. } | Expr::List(_) | Expr::Dict(_) | Expr::Tuple(_)
                if self != Grammar::Formula =>
            {
                Err(ScoringError::Grammar(format!(
                    "containers and subscripts are not allowed in {}",
                    self.label()
                )))
            }
            _ => Ok(()),
        }
    }
}
