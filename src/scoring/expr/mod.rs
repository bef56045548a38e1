//! Restricted expression language: one parser, three grammar tiers.

pub mod ast;
pub mod cache;
pub mod eval;
pub mod grammar;
pub mod lexer;
pub mod parser;

pub use ast::Expr;
pub use cache::ExprCache;
pub use eval::{evaluate, evaluate_number, Scope};
pub use grammar::{is_identifier, is_safe_name, Grammar};
