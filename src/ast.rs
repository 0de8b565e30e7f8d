//! # FormQL - Abstract Syntax Tree
//!
//! This module defines the untyped syntax tree produced by the parser. Nothing
//! here has been checked against a schema: identifiers are kept exactly as
//! written and resolved later by the binder.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, references, operations)
//! - **[operators]** - Binary and unary operators
//! - **[statements]** - The two statement shapes: SELECT and UPDATE FORM
//!
//! ## Quoting
//!
//! Quoting carries meaning and is never collapsed:
//!
//! - `"double quoted"` text is an identifier (form id, field id, table name,
//!   alias, submission id)
//! - `'single quoted'` text is a string literal
//!
//! ## Examples
//!
//! ### Projection with aggregation
//!
//! ```text
//! SELECT FIELD("category"), COUNT(FIELD("id")) FROM "form-uuid"
//!   GROUP BY FIELD("category") HAVING COUNT(FIELD("id")) > 5
//! ```
//!
//! ### Internal table
//!
//! ```text
//! SELECT * FROM user_profiles WHERE organization_id = 'org-uuid'
//! ```
//!
//! ### Single-record update
//!
//! ```text
//! UPDATE FORM "form-uuid" SET FIELD("price") = ROUND(FIELD("price") * 1.1, 2)
//!   WHERE submission_id = "sub-uuid"
//! ```
pub mod expressions;
pub mod operators;
pub mod statements;
pub mod tokens;

pub use expressions::Expr;
pub use operators::{BinOp, UnaryOp};
pub use statements::{
    Assignment, OrderItem, SelectItem, SelectStatement, Source, Statement, UpdateStatement,
};
pub use tokens::{Token, TokenKind};
