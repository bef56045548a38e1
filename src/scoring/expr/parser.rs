use crate::scoring::builtins::Builtin;
use crate::scoring::error::{ScoringError, ScoringResult};

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};

// Reserved words that never act as names.
const KEYWORDS: &[&str] = &[
    "and", "or", "not", "if", "else", "lambda", "for", "in", "is", "import", "from", "def",
    "class", "return", "yield", "await", "async", "with", "as", "del", "global", "pass",
];

/// Deepest tree a formula may build. Brackets, calls, unary signs and each
/// operator in a chain all count as one level.
const MAX_DEPTH: usize = 100;

/// Parse an expression into an [`Expr`] without any grammar-tier checks.
pub fn parse(src: &str) -> ScoringResult<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.parse_top()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        // tokenize always appends Eof, and we never advance past it
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    fn is_symbol(&self, sym: &str) -> bool {
        matches!(self.current().kind, TokenKind::Symbol(s) if s == sym)
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if self.is_symbol(sym) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> ScoringResult<()> {
        if self.eat_symbol(sym) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", sym)))
        }
    }

    fn unexpected(&self, what: &str) -> ScoringError {
        let token = self.current();
        let found = match &token.kind {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Ident(name) => format!("name '{}'", name),
            TokenKind::Symbol(sym) => format!("'{}'", sym),
            TokenKind::Eof => "end of expression".to_string(),
        };
        ScoringError::Grammar(format!(
            "syntax error at column {}: {}, found {}",
            token.pos + 1,
            what,
            found
        ))
    }

    fn expect_end(&mut self) -> ScoringResult<()> {
        match &self.current().kind {
            TokenKind::Eof => Ok(()),
            TokenKind::Symbol(sym @ ("==" | "!=" | "<" | ">" | "<=" | ">=")) => Err(
                ScoringError::Grammar(format!("comparison '{}' is not allowed", sym)),
            ),
            _ => Err(self.unexpected("expected end of expression")),
        }
    }

    /// Top level accepts a bare tuple: `a, b`
    fn parse_top(&mut self) -> ScoringResult<Expr> {
        let first = self.parse_expr()?;
        if !self.is_symbol(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_symbol(",") {
            if matches!(self.current().kind, TokenKind::Eof) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn descend(&mut self) -> ScoringResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(ScoringError::Grammar(format!(
                "expression is nested too deeply (more than {} levels)",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_expr(&mut self) -> ScoringResult<Expr> {
        let depth = self.depth;
        self.descend()?;
        let expr = self.parse_additive();
        self.depth = depth;
        expr
    }

    fn parse_additive(&mut self) -> ScoringResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.eat_symbol("+") {
                BinaryOp::Add
            } else if self.eat_symbol("-") {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            self.descend()?;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_term(&mut self) -> ScoringResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_symbol("*") {
                BinaryOp::Mul
            } else if self.eat_symbol("/") {
                BinaryOp::Div
            } else if self.eat_symbol("%") {
                BinaryOp::Mod
            } else if let TokenKind::Symbol(sym @ ("//" | "@" | "&" | "|" | "^")) =
                self.current().kind
            {
                return Err(ScoringError::Grammar(format!(
                    "operator '{}' is not allowed",
                    sym
                )));
            } else {
                return Ok(lhs);
            };
            self.descend()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> ScoringResult<Expr> {
        if self.eat_symbol("-") {
            self.descend()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Minus,
                operand: Box::new(operand),
            });
        }
        if self.eat_symbol("+") {
            self.descend()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Plus,
                operand: Box::new(operand),
            });
        }
        if let TokenKind::Symbol(sym @ ("~" | "!")) = self.current().kind {
            return Err(ScoringError::Grammar(format!("operator '{}' is not allowed", sym)));
        }
        let expr = self.parse_postfix()?;
        if self.is_symbol("**") {
            return Err(ScoringError::Grammar("operator '**' is not allowed".to_string()));
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> ScoringResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.is_symbol("(") || self.is_symbol("[") {
                self.descend()?;
            }
            if self.is_symbol("(") {
                let name = match &expr {
                    Expr::Name(name) => name.clone(),
                    _ => {
                        return Err(ScoringError::Grammar(
                            "only direct calls to builtin functions are allowed".to_string(),
                        ))
                    }
                };
                let func = Builtin::from_name(&name).ok_or_else(|| {
                    ScoringError::Grammar(format!("function not allowed: {}", name))
                })?;
                self.advance();
                expr = self.parse_call(func)?;
            } else if self.eat_symbol("[") {
                let index = self.parse_expr()?;
                if self.is_symbol(":") {
                    return Err(ScoringError::Grammar("slices are not allowed".to_string()));
                }
                self.expect_symbol("]")?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.is_symbol(".") {
                return Err(ScoringError::Grammar(
                    "attribute access is not allowed".to_string(),
                ));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_call(&mut self, func: Builtin) -> ScoringResult<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.is_symbol(")") {
            let keyword = match (&self.current().kind, self.tokens.get(self.index + 1)) {
                (TokenKind::Ident(name), Some(next))
                    if next.kind == TokenKind::Symbol("=") =>
                {
                    Some(name.clone())
                }
                _ => None,
            };
            match keyword {
                Some(name) => {
                    self.advance();
                    self.advance();
                    if kwargs.iter().any(|(k, _)| *k == name) {
                        return Err(ScoringError::Grammar(format!(
                            "{}() got repeated keyword argument '{}'",
                            func.name(),
                            name
                        )));
                    }
                    let value = self.parse_expr()?;
                    kwargs.push((name, value));
                }
                None => {
                    if !kwargs.is_empty() {
                        return Err(self.unexpected("positional argument follows keyword argument"));
                    }
                    args.push(self.parse_expr()?);
                }
            }
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol(")")?;
        Ok(Expr::Call { func, args, kwargs })
    }

    fn parse_primary(&mut self) -> ScoringResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            TokenKind::Str(s) => {
                self.advance();
                // adjacent literals concatenate: 'a' 'b'
                let mut text = s;
                while let TokenKind::Str(more) = &self.current().kind {
                    text.push_str(more);
                    self.advance();
                }
                Ok(Expr::Literal(Literal::Str(text)))
            }
            TokenKind::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "True" => Ok(Expr::Literal(Literal::Bool(true))),
                    "False" => Ok(Expr::Literal(Literal::Bool(false))),
                    "None" => Ok(Expr::Literal(Literal::None)),
                    kw if KEYWORDS.contains(&kw) => Err(ScoringError::Grammar(format!(
                        "keyword '{}' is not allowed",
                        kw
                    ))),
                    _ => Ok(Expr::Name(name)),
                }
            }
            TokenKind::Symbol("(") => {
                self.advance();
                if self.eat_symbol(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat_symbol(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_symbol(",") {
                    if self.is_symbol(")") {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.expect_symbol(")")?;
                Ok(Expr::Tuple(items))
            }
            TokenKind::Symbol("[") => {
                self.advance();
                let items = self.parse_sequence("]")?;
                Ok(Expr::List(items))
            }
            TokenKind::Symbol("{") => {
                self.advance();
                self.parse_dict()
            }
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    fn parse_sequence(&mut self, close: &str) -> ScoringResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.is_symbol(close) {
            items.push(self.parse_expr()?);
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol(close)?;
        Ok(items)
    }

    fn parse_dict(&mut self) -> ScoringResult<Expr> {
        let mut entries = Vec::new();
        while !self.is_symbol("}") {
            let key = self.parse_expr()?;
            if !self.eat_symbol(":") {
                return Err(ScoringError::Grammar(
                    "set literals are not allowed".to_string(),
                ));
            }
            let value = self.parse_expr()?;
            entries.push((key, value));
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol("}")?;
        Ok(Expr::Dict(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Expr {
        Expr::Literal(Literal::Number(n))
    }

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(num(1.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(num(2.0)),
                    rhs: Box::new(num(3.0)),
                }),
            }
        );
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = parse("a - b - c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Sub, lhs, rhs } => {
                assert_eq!(*rhs, name("c"));
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Sub, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_call_with_keywords() {
        let expr = parse("row_custom_compute(E, row_select='best_n', row_n=2)").unwrap();
        match expr {
            Expr::Call { func, args, kwargs } => {
                assert_eq!(func, Builtin::RowCustomCompute);
                assert_eq!(args, vec![name("E")]);
                assert_eq!(kwargs.len(), 2);
                assert_eq!(kwargs[0].0, "row_select");
                assert_eq!(kwargs[1].1, num(2.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nested_subscripts() {
        let expr = parse("E[0][1]").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
    }

    #[test]
    fn test_containers() {
        assert_eq!(parse("[1, 2,]").unwrap(), Expr::List(vec![num(1.0), num(2.0)]));
        assert_eq!(parse("(1, 2)").unwrap(), Expr::Tuple(vec![num(1.0), num(2.0)]));
        assert_eq!(parse("(1,)").unwrap(), Expr::Tuple(vec![num(1.0)]));
        assert_eq!(parse("(1)").unwrap(), num(1.0));
        assert_eq!(parse("1, 2").unwrap(), Expr::Tuple(vec![num(1.0), num(2.0)]));
        assert!(matches!(parse("{'a': 1}").unwrap(), Expr::Dict(entries) if entries.len() == 1));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("True").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert_eq!(parse("None").unwrap(), Expr::Literal(Literal::None));
        assert_eq!(parse("'a' 'b'").unwrap(), Expr::Literal(Literal::Str("ab".into())));
    }

    #[test]
    fn test_unknown_function_rejected() {
        let err = parse("open('x')").unwrap_err();
        assert_eq!(err.to_string(), "function not allowed: open");
    }

    #[test]
    fn test_attribute_rejected() {
        let err = parse("params.n_valid").unwrap_err();
        assert!(err.to_string().contains("attribute access"));
    }

    #[test]
    fn test_indirect_call_rejected() {
        assert!(parse("E[0](1)").is_err());
    }

    #[test]
    fn test_disallowed_operators() {
        assert!(parse("a ** 2").unwrap_err().to_string().contains("'**'"));
        assert!(parse("a // 2").unwrap_err().to_string().contains("'//'"));
        assert!(parse("a < 2").unwrap_err().to_string().contains("comparison"));
        assert!(parse("x if y else z").is_err());
        assert!(parse("lambda: 1").is_err());
    }

    #[test]
    fn test_slices_and_sets_rejected() {
        assert!(parse("E[0:2]").unwrap_err().to_string().contains("slices"));
        assert!(parse("{1, 2}").unwrap_err().to_string().contains("set literals"));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse(&deep).unwrap_err();
        assert!(matches!(err, ScoringError::Grammar(_)));
        assert!(err.to_string().contains("nested too deeply"));

        assert!(parse(&format!("{}1", "-".repeat(100_000))).is_err());
        assert!(parse(&format!("E{}", "[0]".repeat(500))).is_err());
        let long_chain = vec!["1"; 5_000].join(" + ");
        assert!(parse(&long_chain).is_err());

        let shallow = format!("{}1{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(parse(&shallow).unwrap(), num(1.0));
        assert!(parse(&vec!["x"; 40].join(" * ")).is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("1 +").is_err());
        assert!(parse("sum(1").is_err());
        assert!(parse(")").is_err());
        assert!(parse("sum(a=1, 2)").is_err());
    }
}
