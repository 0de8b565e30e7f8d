use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::{Token, TokenKind};

/// Location of a token or error in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Character offset from the start of the input, 0-based
    pub offset: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at {position}")]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

/// Splits query text into tokens. The final token is always [`TokenKind::Eof`].
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if self.current_char() == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    fn here(&self) -> Position {
        Position {
            offset: self.position,
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, message: impl Into<String>, position: Position) -> LexError {
        LexError {
            message: message.into(),
            position,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.current_char() {
                Some(ch) if ch.is_whitespace() => self.advance(),
                Some('-') if self.peek_char(1) == Some('-') => {
                    while let Some(ch) = self.current_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// Reads a single-quoted literal. `''` and backslash escapes are resolved.
    fn read_string(&mut self, start: Position) -> Result<String, LexError> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                '\'' if self.peek_char(1) == Some('\'') => {
                    result.push('\'');
                    self.advance();
                    self.advance();
                }
                '\'' => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    let escape_at = self.here();
                    self.advance();
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('\'') => result.push('\''),
                        Some('"') => result.push('"'),
                        Some('\\') => result.push('\\'),
                        Some(other) => {
                            return Err(
                                self.error(format!("Invalid escape sequence '\\{}'", other), escape_at)
                            );
                        }
                        None => break,
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(self.error("Unterminated string literal", start))
    }

    /// Reads a double-quoted identifier. `""` stands for one quote.
    fn read_quoted_ident(&mut self, start: Position) -> Result<String, LexError> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                '"' if self.peek_char(1) == Some('"') => {
                    result.push('"');
                    self.advance();
                    self.advance();
                }
                '"' => {
                    self.advance();
                    if result.is_empty() {
                        return Err(self.error("Empty quoted identifier", start));
                    }
                    return Ok(result);
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(self.error("Unterminated quoted identifier", start))
    }

    fn read_number(&mut self, start: Position) -> Result<Decimal, LexError> {
        let mut number = String::new();
        let mut seen_dot = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.'
                && !seen_dot
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                seen_dot = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if self.current_char().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.error(format!("Malformed number '{}'", number), start));
        }

        Decimal::from_str(&number)
            .map_err(|_| self.error(format!("Number '{}' is out of range", number), start))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn pair(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        self.advance();
        kind
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let start = self.here();
        let kind = match self.current_char() {
            None => TokenKind::Eof,
            Some(',') => self.single(TokenKind::Comma),
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some(';') => self.single(TokenKind::Semicolon),
            Some('+') => self.single(TokenKind::Plus),
            Some('-') => self.single(TokenKind::Minus),
            Some('*') => self.single(TokenKind::Star),
            Some('/') => self.single(TokenKind::Slash),
            Some('%') => self.single(TokenKind::Percent),
            Some('=') => self.single(TokenKind::Eq),
            Some('!') => {
                if self.peek_char(1) == Some('=') {
                    self.pair(TokenKind::NotEq)
                } else {
                    return Err(self.error("Unexpected '!' (did you mean '!='?)", start));
                }
            }
            Some('<') => match self.peek_char(1) {
                Some('=') => self.pair(TokenKind::LtEq),
                Some('>') => self.pair(TokenKind::NotEq),
                _ => self.single(TokenKind::Lt),
            },
            Some('>') => {
                if self.peek_char(1) == Some('=') {
                    self.pair(TokenKind::GtEq)
                } else {
                    self.single(TokenKind::Gt)
                }
            }
            Some('\'') => TokenKind::String(self.read_string(start)?),
            Some('"') => TokenKind::QuotedIdent(self.read_quoted_ident(start)?),
            Some(ch) if ch.is_ascii_digit() => TokenKind::Number(self.read_number(start)?),
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let word = self.read_word();
                TokenKind::keyword(&word).unwrap_or(TokenKind::Identifier(word))
            }
            Some(ch) => {
                return Err(self.error(format!("Unexpected character '{}'", ch), start));
            }
        };

        let lexeme: String = self.input[start.offset..self.position].iter().collect();
        Ok(Token {
            kind,
            lexeme,
            position: start,
        })
    }
}
