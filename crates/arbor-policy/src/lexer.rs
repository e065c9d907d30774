//! Tokenizer for the policy language.
//!
//! Newlines are significant (they separate body statements, like `;`), so
//! the lexer emits them as tokens and the parser decides where they matter.

use crate::error::{PolicyError, PolicyResult};

/// A lexical token.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    // Keywords
    Package,
    Default,
    Not,
    True,
    False,
    Null,
    // Punctuation
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Dot,
    Comma,
    Semicolon,
    Pipe,
    Underscore,
    Assign,    // =
    Bind,      // :=
    Eq,        // ==
    Neq,       // !=
    Newline,
}

/// Tokenize policy source.
pub fn tokenize(source: &str, module: &str) -> PolicyResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;

    let err = |line: usize, reason: String| PolicyError::Compile {
        module: module.to_string(),
        reason: format!("line {line}: {reason}"),
    };

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                chars.next();
                line += 1;
                tokens.push(Token::Newline);
            }
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '#' => {
                // Comment to end of line.
                for next in chars.by_ref() {
                    if next == '\n' {
                        line += 1;
                        tokens.push(Token::Newline);
                        break;
                    }
                }
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(next) = chars.next() {
                    match next {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('\\') => text.push('\\'),
                            Some('"') => text.push('"'),
                            Some(other) => {
                                return Err(err(line, format!("bad escape '\\{other}'")))
                            }
                            None => return Err(err(line, "unterminated escape".into())),
                        },
                        '\n' => return Err(err(line, "unterminated string".into())),
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(err(line, "unterminated string".into()));
                }
                tokens.push(Token::Str(text));
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semicolon);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Neq);
                } else {
                    return Err(err(line, "unexpected '!'".into()));
                }
            }
            ':' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Bind);
                } else {
                    return Err(err(line, "unexpected ':'".into()));
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                if c == '-' {
                    text.push(c);
                    chars.next();
                }
                let mut is_float = false;
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_digit() {
                        text.push(next);
                        chars.next();
                    } else if next == '.' && !is_float {
                        // Lookahead: `1.x` is a number only if x is a digit.
                        let mut clone = chars.clone();
                        clone.next();
                        if clone.peek().is_some_and(|d| d.is_ascii_digit()) {
                            is_float = true;
                            text.push('.');
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|e| err(line, format!("bad number {text}: {e}")))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|e| err(line, format!("bad number {text}: {e}")))?;
                    tokens.push(Token::Int(value));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        text.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match text.as_str() {
                    "package" => Token::Package,
                    "default" => Token::Default,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "_" => Token::Underscore,
                    _ => Token::Ident(text),
                });
            }
            other => return Err(err(line, format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}
