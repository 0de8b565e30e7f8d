//! Diagnostics produced while compiling a statement.
//!
//! Lexer and parser failures abort the compile attempt with a single
//! [`ParseError`] of kind [`ErrorKind::Syntax`]. The binder and plan compiler
//! collect every problem they can find and return them together.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lexer::{LexError, Position};

/// Classification of a compile diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Lexing or parsing failed, or an input could not otherwise be classified
    Syntax,
    /// A `FIELD(...)` or column reference does not exist in the source
    UnknownField,
    /// The statement's form or internal table does not exist
    UnknownForm,
    /// A function or operator received operands of the wrong type or count
    TypeMismatch,
    /// An UPDATE assigns to a field that cannot be written
    NonEditableField,
    /// Aggregation and grouping are inconsistent
    GroupingError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::UnknownField => "unknown_field",
            ErrorKind::UnknownForm => "unknown_form",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::NonEditableField => "non_editable_field",
            ErrorKind::GroupingError => "grouping_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compile diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}{}", located(.position))]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<Position>,
}

fn located(position: &Option<Position>) -> String {
    match position {
        Some(p) => format!(" (at {})", p),
        None => String::new(),
    }
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            position: None,
        }
    }

    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        ParseError {
            kind: ErrorKind::Syntax,
            message: message.into(),
            position: Some(position),
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::syntax(e.message, e.position)
    }
}

/// Accumulates semantic diagnostics, reporting each distinct problem once.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    errors: Vec<ParseError>,
}

impl Diagnostics {
    pub(crate) fn push(&mut self, error: ParseError) {
        let seen = self
            .errors
            .iter()
            .any(|e| e.kind == error.kind && e.message == error.message);
        if !seen {
            self.errors.push(error);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.errors.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn into_vec(self) -> Vec<ParseError> {
        self.errors
    }
}
