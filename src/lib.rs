//! # FormQL
//!
//! A compiler for a small SQL dialect over form submissions. Queries are
//! lexed, parsed, bound against a [`SchemaSnapshot`] and compiled into a
//! serializable [`CompiledPlan`]. The [`Executor`] runs plans over records
//! held in memory.
//!
//! ```
//! use formql::{compile, Field, FieldType, Form, SchemaSnapshot};
//!
//! let snapshot = SchemaSnapshot::new(vec![Form::new(
//!     "f-orders",
//!     "Orders",
//!     vec![Field::new("price", "Price", FieldType::Number)],
//! )]);
//! let outcome = compile(r#"SELECT FIELD("price") * 2 AS doubled FROM "f-orders""#, &snapshot);
//! assert!(outcome.is_ok());
//! ```
pub mod ast;
pub mod binder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expression;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod plan;
pub mod record;
pub mod schema;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;

pub use ast::{BinOp, Expr, Statement, Token, TokenKind, UnaryOp};
pub use binder::{BoundStatement, bind};
pub use compiler::{CompileOutcome, Compiler, compile};
pub use config::CompilerConfig;
pub use error::{ErrorKind, ParseError};
pub use evaluator::{EvalError, Evaluator};
pub use executor::{ExecutionResult, Executor, RecordError, ResultSet, UpdateOutcome};
pub use expression::Expression;
pub use lexer::{LexError, Lexer, Position, tokenize};
pub use parser::{Parser, parse, parse_query};
pub use plan::{CompiledPlan, PlanMode, PlanSource, SelectPlan, UpdatePlan};
pub use record::Record;
pub use schema::{Field, FieldType, Form, InternalTable, SchemaSnapshot, SystemColumn};
pub use value::{Value, ValueType};
