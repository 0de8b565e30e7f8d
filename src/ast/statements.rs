use crate::ast::Expr;
use crate::lexer::Position;

/// One parsed statement. The grammar has no other shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// # Example
    /// ```text
    /// SELECT FIELD("category"), COUNT(*) FROM "form-uuid" GROUP BY FIELD("category")
    /// ```
    Select(SelectStatement),

    /// # Example
    /// ```text
    /// UPDATE FORM "form-uuid" SET FIELD("status") = 'approved' WHERE FIELD("status") = 'pending'
    /// ```
    Update(UpdateStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub projections: Vec<SelectItem>,
    pub source: Source,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

/// An entry of the projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `expr [AS alias]`
    Expr { expr: Expr, alias: Option<String> },
}

/// The `FROM` target.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// `FROM "id"`: a form id, or a whitelisted internal table name
    Quoted { name: String, position: Position },
    /// `FROM name`: internal tables only
    Bare { name: String, position: Position },
}

impl Source {
    pub fn name(&self) -> &str {
        match self {
            Source::Quoted { name, .. } | Source::Bare { name, .. } => name,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Source::Quoted { position, .. } | Source::Bare { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub form_id: String,
    pub form_position: Position,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Expr>,
}

/// `FIELD("id") = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field_id: String,
    pub position: Position,
    pub value: Expr,
}
