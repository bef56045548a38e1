use std::collections::BTreeSet;

use crate::scoring::builtins::Builtin;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// Parsed expression shared by all three grammar tiers.
///
/// Calls are resolved to a [`Builtin`] at parse time, so an unknown function
/// never survives parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Tuple(Vec<Expr>),
}

impl Expr {
    /// Pre-order walk over every node.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Name(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Call { args, kwargs, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
                for (_, arg) in kwargs {
                    arg.walk(visit);
                }
            }
            Expr::Index { base, index } => {
                base.walk(visit);
                index.walk(visit);
            }
            Expr::List(items) | Expr::Tuple(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expr::Dict(entries) => {
                for (k, v) in entries {
                    k.walk(visit);
                    v.walk(visit);
                }
            }
        }
    }

    /// Every name the expression reads.
    ///
    /// Builtins that take their source matrix as a field code (for example
    /// `row_custom_compute('E_j')`) also count that literal code as a read.
    pub fn referenced_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |node| match node {
            Expr::Name(name) => {
                names.insert(name.clone());
            }
            Expr::Call { func, args, kwargs } if func.reads_source_code() => {
                let source = args.first().or_else(|| {
                    kwargs
                        .iter()
                        .find(|(k, _)| k == "source" || k == "field_code")
                        .map(|(_, v)| v)
                });
                if let Some(Expr::Literal(Literal::Str(code))) = source {
                    names.insert(code.clone());
                }
            }
            _ => {}
        });
        names
    }
}

#[cfg(test)]
mod tests {
    use crate::scoring::expr::parser::parse;

    #[test]
    fn test_referenced_names_plain() {
        let expr = parse("A + B * params['n_valid']").unwrap();
        let names: Vec<_> = expr.referenced_names().into_iter().collect();
        assert_eq!(names, vec!["A", "B", "params"]);
    }

    #[test]
    fn test_referenced_names_include_source_code_literal() {
        let expr = parse("row_custom_compute('E_j', row_agg='max') + crash('E')[0]").unwrap();
        let names = expr.referenced_names();
        assert!(names.contains("E_j"));
        // crash() reads input keys only, not computed values
        assert!(!names.contains("E"));
    }
}
