use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::scoring::error::ScoringResult;

use super::ast::Expr;
use super::grammar::Grammar;

/// Compiled expressions keyed by grammar tier and source text.
///
/// Lives as long as the engine; lookups after warm-up only take the read lock.
#[derive(Debug, Default)]
pub struct ExprCache {
    entries: RwLock<HashMap<(Grammar, String), Arc<Expr>>>,
}

impl ExprCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled form of `src`, compiling and caching it on first use.
    /// Failed compilations are not cached.
    pub fn get(&self, grammar: Grammar, src: &str) -> ScoringResult<Arc<Expr>> {
        let key = (grammar, src.to_string());
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(expr) = entries.get(&key) {
                return Ok(Arc::clone(expr));
            }
        }
        let expr = Arc::new(grammar.compile(src)?);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(entries.entry(key).or_insert(expr)))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
