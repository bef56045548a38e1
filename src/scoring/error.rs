//! Error type shared by every stage of the scoring engine.

use thiserror::Error;

/// Errors produced while building an engine or computing a score.
///
/// All variants are recoverable at the request boundary: callers reject the
/// specific save or recalculation and report the message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// The schema document itself is malformed.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// Syntax errors, disallowed nodes, names or functions in any grammar tier.
    #[error("{0}")]
    Grammar(String),

    /// Unknown selection criterion, aggregator or mode, or a missing `n`.
    #[error("{0}")]
    Selection(String),

    /// Computed fields that could not be ordered.
    #[error("dependency cycle between computed fields: {}", .codes.join(", "))]
    Cycle { codes: Vec<String> },

    /// Any error raised while evaluating a computed field's formula.
    #[error("computed '{code}': {source}")]
    Computed {
        code: String,
        #[source]
        source: Box<ScoringError>,
    },

    /// Division or modulo by zero.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Operands or subscripts of the wrong type.
    #[error("type error: {0}")]
    Type(String),
}

impl ScoringError {
    /// Wrap an error with the computed field that raised it.
    pub fn in_computed(code: &str, source: ScoringError) -> Self {
        ScoringError::Computed {
            code: code.to_string(),
            source: Box::new(source),
        }
    }

    /// The innermost error, skipping `Computed` wrappers.
    pub fn root(&self) -> &ScoringError {
        match self {
            ScoringError::Computed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Convenience result alias.
pub type ScoringResult<T> = std::result::Result<T, ScoringError>;
