use rust_decimal::Decimal;

use crate::ast::{BinOp, UnaryOp};
use crate::lexer::Position;

/// Abstract Syntax Tree node representing a parsed, not yet bound, expression.
///
/// Identifiers are kept as written; the binder decides what they refer to.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    /// Literal number
    ///
    /// # Example
    /// ```text
    /// 1.1
    /// ```
    Number(Decimal),

    /// Single-quoted text literal
    ///
    /// # Example
    /// ```text
    /// 'approved'
    /// ```
    String(String),

    /// `TRUE` or `FALSE`
    Boolean(bool),

    /// `NULL`
    Null,

    // References
    /// Field of the statement's form
    ///
    /// # Example
    /// ```text
    /// FIELD("price")
    /// ```
    Field { id: String, position: Position },

    /// Bare identifier: a system column in form queries, a table column in
    /// internal-table queries, or a projection alias in ORDER BY
    ///
    /// # Examples
    /// ```text
    /// submission_id
    /// organization_id
    /// ```
    Column { name: String, position: Position },

    /// Double-quoted identifier in expression position: a column name, or the
    /// id itself when compared with `submission_id` (`submission_id = "sub-uuid"`)
    QuotedIdent { value: String, position: Position },

    /// `*` as the sole argument of a call (`COUNT(*)`)
    Star,

    // Operations
    /// Function call; `name` is upper-cased
    ///
    /// # Examples
    /// ```text
    /// COUNT(*)
    /// ROUND(FIELD("price") * 1.1, 2)
    /// ```
    Call {
        name: String,
        args: Vec<Expr>,
        position: Position,
    },

    /// Binary operation (arithmetic, comparison, logical)
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `NOT expr` or `-expr`
    UnaryOp { op: UnaryOp, operand: Box<Expr> },

    /// `expr [NOT] BETWEEN low AND high`
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// `expr [NOT] IN (a, b, ...)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    /// `expr [NOT] LIKE pattern`
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },

    /// `expr IS [NOT] NULL`
    IsNull { expr: Box<Expr>, negated: bool },

    /// Searched CASE; simple CASE is desugared into this form by the parser
    ///
    /// # Example
    /// ```text
    /// CASE WHEN FIELD("score") > 90 THEN 'A' ELSE 'B' END
    /// ```
    Case {
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
}

impl Expr {
    pub(crate) fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Levels in the tree below and including this node; a leaf is 1.
    pub fn height(&self) -> usize {
        let child = |e: &Expr| e.height();
        let tallest = match self {
            Expr::Number(_)
            | Expr::String(_)
            | Expr::Boolean(_)
            | Expr::Null
            | Expr::Field { .. }
            | Expr::Column { .. }
            | Expr::QuotedIdent { .. }
            | Expr::Star => 0,
            Expr::Call { args, .. } => args.iter().map(child).max().unwrap_or(0),
            Expr::BinaryOp { left, right, .. } => child(left).max(child(right)),
            Expr::UnaryOp { operand, .. } => child(operand),
            Expr::Between {
                expr, low, high, ..
            } => child(expr).max(child(low)).max(child(high)),
            Expr::InList { expr, list, .. } => list.iter().map(child).fold(child(expr), usize::max),
            Expr::Like { expr, pattern, .. } => child(expr).max(child(pattern)),
            Expr::IsNull { expr, .. } => child(expr),
            Expr::Case {
                branches,
                else_expr,
            } => branches
                .iter()
                .map(|(when, then)| child(when).max(child(then)))
                .chain(else_expr.as_deref().map(child))
                .max()
                .unwrap_or(0),
        };
        tallest + 1
    }
}
