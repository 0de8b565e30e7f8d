//! Validate formql queries against a schema snapshot

use super::CliError;
use crate::compiler::{CompileOutcome, Compiler};
use crate::config::CompilerConfig;
use crate::error::ParseError;
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::schema::SchemaSnapshot;

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The query to check
    pub query: String,
    pub schema: SchemaSnapshot,
    pub config: CompilerConfig,
    /// Only validate syntax, don't bind against the schema
    pub syntax_only: bool,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Syntax validation passed
    SyntaxValid,
    /// Full compile outcome; may carry errors
    Compiled(CompileOutcome),
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        match self {
            CheckResult::SyntaxValid => true,
            CheckResult::Compiled(outcome) => outcome.is_ok(),
        }
    }
}

/// Execute a formql check operation.
///
/// Syntax errors in `--syntax-only` mode are returned as `Err`; a full check
/// always succeeds and reports problems inside the outcome.
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    if options.syntax_only {
        let tokens = tokenize(&options.query).map_err(ParseError::from)?;
        Parser::new(tokens)
            .with_max_depth(options.config.max_expression_depth)
            .parse()?;
        return Ok(CheckResult::SyntaxValid);
    }

    let compiler = Compiler::new(options.config.clone());
    Ok(CheckResult::Compiled(compiler.compile(&options.query, &options.schema)))
}
