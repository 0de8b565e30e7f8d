//! Documentation content for the formql CLI

use std::fmt::Write;

use super::CliError;
use crate::functions::{Category, FUNCTIONS, Returns};

/// Available documentation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocCategory {
    Syntax,
    Select,
    Update,
    Expressions,
    Functions,
    Types,
    Errors,
}

impl DocCategory {
    /// Parse category name from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "syntax" | "lexical" => Some(Self::Syntax),
            "select" | "query" | "queries" => Some(Self::Select),
            "update" | "updates" => Some(Self::Update),
            "expressions" | "expression" | "operators" | "ops" => Some(Self::Expressions),
            "functions" | "function" | "fn" => Some(Self::Functions),
            "types" | "type" => Some(Self::Types),
            "errors" | "error" => Some(Self::Errors),
            _ => None,
        }
    }
}

/// Get the docs overview (category listing)
pub fn get_docs_overview() -> &'static str {
    r#"FORMQL DOCUMENTATION

FormQL is a restricted SQL dialect for reading and updating form submissions.
Only two statement shapes exist: SELECT and UPDATE FORM. Every identifier is
checked against a schema snapshot before a plan is produced.

DOCUMENTATION CATEGORIES

  syntax            Tokens, quoting rules, comments and literals
  select            SELECT grammar: sources, projections, grouping, ordering
  update            UPDATE FORM grammar, single and bulk modes
  expressions       Operators, precedence, NULL handling, CASE
  functions         The function registry
  types             Value types, field types and coercion
  errors            Error kinds reported by the compiler

QUICK REFERENCE

  "form-id"         Double quotes: identifiers (forms, fields, aliases)
  'text'            Single quotes: string literals
  FIELD("id")       A form field by id
  submission_id     System column (form sources)
  -- comment        Line comment

Run 'formql doc <category>' for detailed documentation.
"#
}

/// Get documentation for a specific category
pub fn get_doc_category(name: &str) -> Result<String, CliError> {
    let doc = match DocCategory::from_name(name) {
        Some(DocCategory::Syntax) => SYNTAX_DOC,
        Some(DocCategory::Select) => SELECT_DOC,
        Some(DocCategory::Update) => UPDATE_DOC,
        Some(DocCategory::Expressions) => EXPRESSIONS_DOC,
        Some(DocCategory::Functions) => return Ok(function_listing()),
        Some(DocCategory::Types) => TYPES_DOC,
        Some(DocCategory::Errors) => ERRORS_DOC,
        None => return Err(CliError::UnknownCategory(name.to_string())),
    };
    Ok(doc.to_string())
}

/// Renders the function registry grouped by category.
pub fn function_listing() -> String {
    let mut out = String::from("FUNCTIONS - The Function Registry\n");
    for category in [
        Category::Aggregate,
        Category::String,
        Category::Math,
        Category::Date,
        Category::Conditional,
    ] {
        let _ = writeln!(out, "\n{}", category.to_string().to_uppercase());
        for function in FUNCTIONS.iter().filter(|f| f.category == category) {
            let returns = match function.returns {
                Returns::Fixed(ty) => ty.to_string(),
                Returns::CommonFrom(_) => "same as arguments".to_string(),
            };
            let _ = writeln!(
                out,
                "  {:<10} args: {:<5} returns: {}",
                function.name,
                function.arity(),
                returns
            );
        }
    }
    out.push_str(
        "\nNotes:\n  - Function names are case-insensitive\n  - Aggregates require GROUP BY\n  - COUNT(*) counts rows; other aggregates skip NULLs\n",
    );
    out
}

const SYNTAX_DOC: &str = r#"SYNTAX - Tokens and Quoting

QUOTING
  "double quoted"
    An identifier: form id, field id, table name, column name or alias.
    Compared with submission_id it is the id itself: submission_id = "sub-uuid"
    A doubled quote ("") inside escapes a quote. Backslashes are literal.

  'single quoted'
    A string literal. Escapes: '' \' \\ \n \t \r \"

    Constraints:
      - The two quote styles are never interchangeable
      - FIELD('id') is a syntax error; use FIELD("id")
      - Empty identifiers ("") are rejected

KEYWORDS
  Case-insensitive: SELECT FROM WHERE UPDATE FORM SET DISTINCT GROUP BY
  HAVING ORDER LIMIT AND OR NOT IN BETWEEN LIKE IS NULL AS CASE WHEN THEN
  ELSE END FIELD ASC DESC TRUE FALSE

NUMBERS
  42   3.14   0.5
    Exact decimals. A leading minus is an operator.

COMMENTS
  -- runs to the end of the line

STATEMENTS
  Exactly one statement per query. A single trailing ';' is allowed.
  DELETE, DROP, INSERT and bare UPDATE are rejected by the grammar.
"#;

const SELECT_DOC: &str = r#"SELECT - Reading Submissions and Tables

GRAMMAR
  SELECT [DISTINCT] item, ...
  FROM source
  [WHERE condition]
  [GROUP BY expr, ...]
  [HAVING condition]
  [ORDER BY key [ASC|DESC], ...]
  [LIMIT n]

  Clauses must appear in this order.

SOURCES
  FROM "form-id"
    Form mode. Fields are addressed as FIELD("field-id"); bare names
    resolve to system columns: submission_id, submitted_by, submitted_at.

  FROM user_profiles   FROM "organizations"
    Table mode, whitelisted internal tables only. Bare names resolve to the
    table's columns; FIELD() is an error.

PROJECTIONS
  *                     System columns then every data field (form mode)
  FIELD("f1") AS price  Output named by alias
  FIELD("f1")           Output named by the field label

GROUPING
  SELECT FIELD("category"), COUNT(*) FROM "f"
    GROUP BY FIELD("category") HAVING COUNT(*) > 5

    Constraints:
      - Aggregates require GROUP BY
      - Projected columns must be grouping keys or inside an aggregate
      - Aggregates are not allowed in WHERE or GROUP BY, nor nested

ORDERING
  ORDER BY price DESC
    Keys may name a projection alias. NULLs sort first ascending.

LIMIT
  LIMIT 50
    Clamped to the configured maximum (default 10000), minimum 1.
"#;

const UPDATE_DOC: &str = r#"UPDATE - Changing Field Values

GRAMMAR
  UPDATE FORM "form-id"
  SET FIELD("id") = expr, ...
  [WHERE condition]

MODES
  Single
    WHERE submission_id = "sub-id"   (either operand order)
    Targets exactly one submission.

  Bulk
    Any other WHERE clause, or none. Targets every matching submission.

    Example:
      UPDATE FORM "orders" SET FIELD("price") = ROUND(FIELD("price") * 1.1, 2)
        WHERE FIELD("status") = 'pending'

    Constraints:
      - Only editable fields may be assigned; calculated and lookup fields
        are read-only
      - Each field may be assigned once per statement
      - Assigned values must fit the field's type
      - Every assignment reads the record's values from before the update
"#;

const EXPRESSIONS_DOC: &str = r#"EXPRESSIONS - Operators and Precedence

PRECEDENCE (lowest first)
  OR
  AND
  NOT
  = != <> < > <= >=   IN   BETWEEN   LIKE   IS [NOT] NULL
  + -
  * / %
  unary -

COMPARISON
  Comparing with NULL yields NULL; WHERE treats NULL as false.
  Text that looks like a number compares as a number against numbers.

ARITHMETIC
  + adds numbers or concatenates two texts
  / and % by zero fail at execution time

PATTERNS
  FIELD("email") LIKE '%@example.com'
    % matches any run, _ matches one character. Case-insensitive.

LISTS AND RANGES
  FIELD("status") IN ('open', 'pending')
  FIELD("price") NOT BETWEEN 10 AND 20

CASE
  CASE WHEN FIELD("score") >= 90 THEN 'A' WHEN FIELD("score") >= 80 THEN 'B'
       ELSE 'C' END
  CASE FIELD("status") WHEN 'open' THEN 1 ELSE 0 END

    The first matching branch wins; no match and no ELSE yields NULL.
"#;

const TYPES_DOC: &str = r#"TYPES - Values and Field Types

VALUE TYPES
  text         UTF-8 text
  number       Exact decimal
  boolean      TRUE / FALSE
  date         Point in time, UTC
  list         Multi-valued answers (checkboxes, multi-select)
  structured   Composite answers (address, file)

FIELD TYPES
  text textarea email url phone select radio time          -> text
  number currency rating slider                            -> number
  checkbox toggle                                          -> boolean
  date datetime                                            -> date
  multi_select checkboxes                                  -> list
  file signature address                                   -> structured
  calculated lookup                                        -> any, read-only
  section heading divider page_break                       -> layout only

COERCION
  - Text parseable as a number acts as a number next to numbers
  - Text parseable as a date (YYYY-MM-DD, RFC 3339) acts as a date
  - Text fields accept numbers, booleans and dates
"#;

const ERRORS_DOC: &str = r#"ERRORS - Compiler Diagnostics

KINDS
  syntax               Lexing or parsing failed, or an unknown function
  unknown_form         FROM or UPDATE FORM names no form or table
  unknown_field        FIELD("id") is not on the form
  type_mismatch        Operand, argument or assignment type is wrong
  non_editable_field   UPDATE assigns a read-only field
  grouping_error       Aggregates or GROUP BY used inconsistently

BEHAVIOR
  - Lexing and parsing stop at the first error, with its position
  - Binding and compiling report every distinct problem at once
  - A plan is only produced when there are no errors
"#;
