use crate::scoring::error::{ScoringError, ScoringResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Symbol(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset in the source, for messages
    pub pos: usize,
}

// Longest first so "**" wins over "*".
const SYMBOLS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "(", ")", "[", "]", "{", "}",
    ",", ":", "=", ".", "<", ">", "!", "&", "|", "^", "~", "@",
];

pub fn tokenize(src: &str) -> ScoringResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit())) {
            let (n, next) = lex_number(&chars, pos)?;
            tokens.push(Token { kind: TokenKind::Number(n), pos });
            pos = next;
            continue;
        }

        if c == '\'' || c == '"' {
            let (s, next) = lex_string(&chars, pos)?;
            tokens.push(Token { kind: TokenKind::Str(s), pos });
            pos = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let ident: String = chars[start..pos].iter().collect();
            tokens.push(Token { kind: TokenKind::Ident(ident), pos: start });
            continue;
        }

        let sym = SYMBOLS.iter().find(|sym| {
            sym.chars()
                .enumerate()
                .all(|(i, sc)| chars.get(pos + i) == Some(&sc))
        });
        match sym {
            Some(sym) => {
                tokens.push(Token { kind: TokenKind::Symbol(sym), pos });
                pos += sym.chars().count();
            }
            None => {
                return Err(ScoringError::Grammar(format!(
                    "syntax error at column {}: unexpected character '{}'",
                    pos + 1,
                    c
                )));
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, pos: chars.len() });
    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> ScoringResult<(f64, usize)> {
    let mut pos = start;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < chars.len() && chars[pos] == '.' {
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
        let mut exp = pos + 1;
        if exp < chars.len() && (chars[exp] == '+' || chars[exp] == '-') {
            exp += 1;
        }
        if exp < chars.len() && chars[exp].is_ascii_digit() {
            pos = exp;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    // "3abc" is not a number followed by a name
    if pos < chars.len() && (chars[pos].is_alphabetic() || chars[pos] == '_') {
        return Err(ScoringError::Grammar(format!(
            "syntax error at column {}: invalid number literal",
            start + 1
        )));
    }
    let text: String = chars[start..pos].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, pos))
        .map_err(|_| {
            ScoringError::Grammar(format!(
                "syntax error at column {}: invalid number literal '{}'",
                start + 1,
                text
            ))
        })
}

fn lex_string(chars: &[char], start: usize) -> ScoringResult<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        let c = chars[pos];
        if c == quote {
            return Ok((out, pos + 1));
        }
        if c == '\\' {
            let escaped = chars.get(pos + 1).copied();
            match escaped {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            }
            pos += 2;
            continue;
        }
        out.push(c);
        pos += 1;
    }
    Err(ScoringError::Grammar(format!(
        "syntax error at column {}: unterminated string",
        start + 1
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_call() {
        assert_eq!(
            kinds("sum(E[0]) - 1.5"),
            vec![
                TokenKind::Ident("sum".into()),
                TokenKind::Symbol("("),
                TokenKind::Ident("E".into()),
                TokenKind::Symbol("["),
                TokenKind::Number(0.0),
                TokenKind::Symbol("]"),
                TokenKind::Symbol(")"),
                TokenKind::Symbol("-"),
                TokenKind::Number(1.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings_both_quotes() {
        assert_eq!(
            kinds(r#"params['n_valid'] "a\"b""#),
            vec![
                TokenKind::Ident("params".into()),
                TokenKind::Symbol("["),
                TokenKind::Str("n_valid".into()),
                TokenKind::Symbol("]"),
                TokenKind::Str("a\"b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_exponent_and_leading_dot() {
        assert_eq!(
            kinds("1e3 .5"),
            vec![TokenKind::Number(1000.0), TokenKind::Number(0.5), TokenKind::Eof]
        );
    }

    #[test]
    fn test_tokenize_two_char_symbols() {
        assert_eq!(
            kinds("a ** b // c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Symbol("**"),
                TokenKind::Ident("b".into()),
                TokenKind::Symbol("//"),
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a $ b").unwrap_err();
        assert!(err.to_string().contains("unexpected character '$'"));
    }

    #[test]
    fn test_number_followed_by_letters() {
        assert!(tokenize("3abc").is_err());
    }
}
