//! CLI support for formql
//!
//! Provides programmatic access to the formql commands so they can be
//! embedded in other tools.

mod check;
mod convert;
mod docs;
mod run;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use convert::{json_to_record, json_to_value, record_to_json, value_to_json};
pub use docs::{DocCategory, function_listing, get_doc_category, get_docs_overview};
pub use run::{RunOptions, RunOutput, execute_run};

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::config::CompilerConfig;
use crate::error::ParseError;
use crate::schema::SchemaSnapshot;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{}", render_errors(.0))]
    Compile(Vec<ParseError>),

    #[error("Evaluation error: {0}")]
    Eval(#[from] crate::EvalError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("No records provided. Use --records or pipe a JSON array to stdin.")]
    NoInput,

    #[error("Unknown category: '{0}'\nRun 'formql docs' to see available categories.")]
    UnknownCategory(String),
}

fn render_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ParseError::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads a schema snapshot from a JSON file, or an empty snapshot when no
/// file is given (internal tables only).
pub fn load_schema(path: Option<&Path>) -> Result<SchemaSnapshot, CliError> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(SchemaSnapshot::default()),
    }
}

/// Builds the compiler configuration from an optional JSON file plus flag
/// overrides.
pub fn load_config(
    path: Option<&Path>,
    max_limit: Option<u64>,
    default_limit: Option<u64>,
) -> Result<CompilerConfig, CliError> {
    let mut config = match path {
        Some(path) => CompilerConfig::from_json(&fs::read_to_string(path)?)?,
        None => CompilerConfig::default(),
    };
    if let Some(max_limit) = max_limit {
        config.max_limit = max_limit;
    }
    if default_limit.is_some() {
        config.default_limit = default_limit;
    }
    Ok(config)
}
