//! Cypher lexer. Tokenizes the read-only dialect traversals emit.

use crate::{Error, Result};

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

/// Source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Start, Match, Where, Return, Order, By, Skip, Limit,
    Asc, Desc,
    And, Or, Not, Null, True, False,

    // Literals
    Integer, Float, StringLiteral,

    // Identifiers and parameters
    Identifier, Parameter,

    // Punctuation
    LParen, RParen, LBracket, RBracket,
    Dot, Comma, Colon, Semicolon, Pipe,
    Arrow,      // ->
    LeftArrow,  // <-
    Dash,       // -

    // Operators
    Eq, Neq, Lt, Lte, Gt, Gte,
    RegexMatch, // =~

    Eof,
}

/// Tokenize a query string.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => { chars.next(); }

            // Line comments
            '/' if matches!(chars.clone().nth(1), Some((_, '/'))) => {
                while chars.peek().is_some_and(|&(_, c)| c != '\n') {
                    chars.next();
                }
            }

            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let start = pos;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                match escaped {
                                    'n' => s.push('\n'),
                                    't' => s.push('\t'),
                                    '\\' => s.push('\\'),
                                    c if c == quote => s.push(c),
                                    c => { s.push('\\'); s.push(c); }
                                }
                            }
                        }
                        Some((end, c)) if c == quote => {
                            tokens.push(Token {
                                kind: TokenKind::StringLiteral,
                                span: Span { start, end: end + 1 },
                                text: s,
                            });
                            break;
                        }
                        Some((_, c)) => s.push(c),
                        None => return Err(Error::SyntaxError {
                            position: start,
                            message: "Unterminated string literal".into(),
                        }),
                    }
                }
            }

            c if c.is_ascii_digit() => {
                let start = pos;
                let mut num = String::new();
                let mut is_float = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        num.push(c);
                        chars.next();
                    } else if c == '.' && !is_float
                        && matches!(chars.clone().nth(1), Some((_, d)) if d.is_ascii_digit())
                    {
                        is_float = true;
                        num.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: if is_float { TokenKind::Float } else { TokenKind::Integer },
                    span: Span { start, end: start + num.len() },
                    text: num,
                });
            }

            // Parameter: $name
            '$' => {
                chars.next();
                let start = pos;
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(Error::SyntaxError {
                        position: start,
                        message: "Empty parameter name".into(),
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::Parameter,
                    span: Span { start, end: start + name.len() + 1 },
                    text: name,
                });
            }

            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let kind = keyword_or_ident(&ident);
                tokens.push(Token {
                    kind,
                    span: Span { start, end: start + ident.len() },
                    text: ident,
                });
            }

            '(' => { chars.next(); tokens.push(punct(TokenKind::LParen, pos, "(")); }
            ')' => { chars.next(); tokens.push(punct(TokenKind::RParen, pos, ")")); }
            '[' => { chars.next(); tokens.push(punct(TokenKind::LBracket, pos, "[")); }
            ']' => { chars.next(); tokens.push(punct(TokenKind::RBracket, pos, "]")); }
            ',' => { chars.next(); tokens.push(punct(TokenKind::Comma, pos, ",")); }
            ':' => { chars.next(); tokens.push(punct(TokenKind::Colon, pos, ":")); }
            ';' => { chars.next(); tokens.push(punct(TokenKind::Semicolon, pos, ";")); }
            '|' => { chars.next(); tokens.push(punct(TokenKind::Pipe, pos, "|")); }
            '.' => { chars.next(); tokens.push(punct(TokenKind::Dot, pos, ".")); }
            '=' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '~'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::RegexMatch, pos, "=~"));
                } else {
                    tokens.push(punct(TokenKind::Eq, pos, "="));
                }
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Lte, pos, "<="));
                } else if matches!(chars.peek(), Some(&(_, '-'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::LeftArrow, pos, "<-"));
                } else if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Neq, pos, "<>"));
                } else {
                    tokens.push(punct(TokenKind::Lt, pos, "<"));
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Gte, pos, ">="));
                } else {
                    tokens.push(punct(TokenKind::Gt, pos, ">"));
                }
            }
            '-' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Arrow, pos, "->"));
                } else {
                    tokens.push(punct(TokenKind::Dash, pos, "-"));
                }
            }

            other => {
                return Err(Error::SyntaxError {
                    position: pos,
                    message: format!("Unexpected character: '{other}'"),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span { start: input.len(), end: input.len() },
        text: String::new(),
    });

    Ok(tokens)
}

fn punct(kind: TokenKind, pos: usize, text: &str) -> Token {
    Token {
        kind,
        span: Span { start: pos, end: pos + text.len() },
        text: text.to_string(),
    }
}

fn keyword_or_ident(s: &str) -> TokenKind {
    match s.to_uppercase().as_str() {
        "START" => TokenKind::Start,
        "MATCH" => TokenKind::Match,
        "WHERE" => TokenKind::Where,
        "RETURN" => TokenKind::Return,
        "ORDER" => TokenKind::Order,
        "BY" => TokenKind::By,
        "SKIP" => TokenKind::Skip,
        "LIMIT" => TokenKind::Limit,
        "ASC" => TokenKind::Asc,
        "DESC" => TokenKind::Desc,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "NULL" => TokenKind::Null,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        _ => TokenKind::Identifier,
    }
}
