use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{BinOp, UnaryOp};
use crate::functions::{self, common_type};
use crate::schema::SystemColumn;
use crate::value::{Value, ValueType};

/// A bound expression: every reference has been resolved against the schema
/// snapshot and every function call checked against the registry.
///
/// Plans are made of these. Unlike [`crate::ast::Expr`] there is no ambiguity
/// left: a field reference knows its form and type, a quoted identifier used
/// as a value has become a text literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expression {
    Literal {
        value: Value,
    },

    /// `FIELD("id")` of a form
    FieldRef {
        form_id: String,
        field_id: String,
        value_type: ValueType,
    },

    SystemColumn {
        column: SystemColumn,
    },

    /// Column of a whitelisted internal table
    TableColumn {
        table: String,
        column: String,
        value_type: ValueType,
    },

    /// `*` inside `COUNT(*)`; evaluates to TRUE for every row
    Star,

    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },

    BinaryOp {
        op: BinOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    UnaryOp {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },

    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },

    Like {
        expr: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
    },

    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },

    /// Searched CASE, first matching branch wins
    Case {
        branches: Vec<CaseBranch>,
        else_expr: Option<Box<Expression>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: Expression,
    pub then: Expression,
}

impl Expression {
    pub fn literal(value: Value) -> Self {
        Expression::Literal { value }
    }

    pub fn null() -> Self {
        Expression::Literal { value: Value::Null }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal { .. })
    }

    /// Reads a value from the current record.
    pub fn is_column(&self) -> bool {
        matches!(
            self,
            Expression::FieldRef { .. }
                | Expression::SystemColumn { .. }
                | Expression::TableColumn { .. }
        )
    }

    /// A call to an aggregate function, at the top of this node.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::FunctionCall { name, .. } if functions::is_aggregate(name))
    }

    pub fn contains_aggregate(&self) -> bool {
        self.is_aggregate() || self.children().into_iter().any(Expression::contains_aggregate)
    }

    /// Calls to functions whose result depends on when they run.
    pub fn is_deterministic(&self) -> bool {
        let here = match self {
            Expression::FunctionCall { name, .. } => {
                functions::lookup(name).is_none_or(|f| f.deterministic)
            }
            _ => true,
        };
        here && self.children().into_iter().all(Expression::is_deterministic)
    }

    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal { .. }
            | Expression::FieldRef { .. }
            | Expression::SystemColumn { .. }
            | Expression::TableColumn { .. }
            | Expression::Star => Vec::new(),
            Expression::FunctionCall { args, .. } => args.iter().collect(),
            Expression::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expression::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expression::Between {
                expr, low, high, ..
            } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
            Expression::InList { expr, list, .. } => {
                std::iter::once(expr.as_ref()).chain(list.iter()).collect()
            }
            Expression::Like { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
            Expression::IsNull { expr, .. } => vec![expr.as_ref()],
            Expression::Case {
                branches,
                else_expr,
            } => branches
                .iter()
                .flat_map(|b| [&b.when, &b.then])
                .chain(else_expr.as_deref())
                .collect(),
        }
    }

    /// Rebuilds this node with every direct child replaced by `f(child)`.
    pub fn map_children(self, mut f: impl FnMut(Expression) -> Expression) -> Expression {
        fn boxed(
            f: &mut impl FnMut(Expression) -> Expression,
            e: Box<Expression>,
        ) -> Box<Expression> {
            Box::new(f(*e))
        }

        match self {
            Expression::FunctionCall { name, args } => Expression::FunctionCall {
                name,
                args: args.into_iter().map(&mut f).collect(),
            },
            Expression::BinaryOp { op, left, right } => {
                let left = boxed(&mut f, left);
                let right = boxed(&mut f, right);
                Expression::BinaryOp { op, left, right }
            }
            Expression::UnaryOp { op, operand } => Expression::UnaryOp {
                op,
                operand: boxed(&mut f, operand),
            },
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let expr = boxed(&mut f, expr);
                let low = boxed(&mut f, low);
                let high = boxed(&mut f, high);
                Expression::Between {
                    expr,
                    low,
                    high,
                    negated,
                }
            }
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                let expr = boxed(&mut f, expr);
                let list = list.into_iter().map(&mut f).collect();
                Expression::InList {
                    expr,
                    list,
                    negated,
                }
            }
            Expression::Like {
                expr,
                pattern,
                negated,
            } => {
                let expr = boxed(&mut f, expr);
                let pattern = boxed(&mut f, pattern);
                Expression::Like {
                    expr,
                    pattern,
                    negated,
                }
            }
            Expression::IsNull { expr, negated } => Expression::IsNull {
                expr: boxed(&mut f, expr),
                negated,
            },
            Expression::Case {
                branches,
                else_expr,
            } => {
                let branches = branches
                    .into_iter()
                    .map(|b| CaseBranch {
                        when: f(b.when),
                        then: f(b.then),
                    })
                    .collect();
                let else_expr = else_expr.map(|e| boxed(&mut f, e));
                Expression::Case {
                    branches,
                    else_expr,
                }
            }
            leaf => leaf,
        }
    }

    /// Static type of the expression's result.
    pub fn value_type(&self) -> ValueType {
        match self {
            Expression::Literal { value } => value.value_type(),
            Expression::FieldRef { value_type, .. } | Expression::TableColumn { value_type, .. } => {
                *value_type
            }
            Expression::SystemColumn { column } => column.value_type(),
            Expression::Star => ValueType::Any,
            Expression::FunctionCall { name, args } => match functions::lookup(name) {
                Some(f) => {
                    let types: Vec<ValueType> = args.iter().map(Expression::value_type).collect();
                    f.return_type(&types)
                }
                None => ValueType::Any,
            },
            Expression::BinaryOp { op, left, right } => {
                if !op.is_arithmetic() {
                    return ValueType::Boolean;
                }
                let (l, r) = (left.value_type(), right.value_type());
                match op {
                    BinOp::Add if l == ValueType::Text || r == ValueType::Text => ValueType::Text,
                    _ => ValueType::Number,
                }
            }
            Expression::UnaryOp { op, .. } => match op {
                UnaryOp::Not => ValueType::Boolean,
                UnaryOp::Negate => ValueType::Number,
            },
            Expression::Between { .. }
            | Expression::InList { .. }
            | Expression::Like { .. }
            | Expression::IsNull { .. } => ValueType::Boolean,
            Expression::Case {
                branches,
                else_expr,
            } => common_type(
                branches
                    .iter()
                    .map(|b| b.then.value_type())
                    .chain(else_expr.iter().map(|e| e.value_type())),
            ),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
    match expr {
        Expression::BinaryOp { .. }
        | Expression::Between { .. }
        | Expression::InList { .. }
        | Expression::Like { .. }
        | Expression::IsNull { .. } => write!(f, "({})", expr),
        _ => write!(f, "{}", expr),
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn not(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

/// Canonical query-text rendering, used for default column names and
/// diagnostics.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value } => write!(f, "{}", value),
            Expression::FieldRef { field_id, .. } => {
                write!(f, "FIELD(\"{}\")", field_id.replace('"', "\"\""))
            }
            Expression::SystemColumn { column } => f.write_str(column.name()),
            Expression::TableColumn { column, .. } => f.write_str(column),
            Expression::Star => f.write_str("*"),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expression::BinaryOp { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op)?;
                write_operand(f, right)
            }
            Expression::UnaryOp { op, operand } => {
                write!(f, "{}", op)?;
                write_operand(f, operand)
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                write_operand(f, expr)?;
                write!(f, " {}BETWEEN ", not(*negated))?;
                write_operand(f, low)?;
                f.write_str(" AND ")?;
                write_operand(f, high)
            }
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                write_operand(f, expr)?;
                write!(f, " {}IN (", not(*negated))?;
                write_list(f, list)?;
                f.write_str(")")
            }
            Expression::Like {
                expr,
                pattern,
                negated,
            } => {
                write_operand(f, expr)?;
                write!(f, " {}LIKE ", not(*negated))?;
                write_operand(f, pattern)
            }
            Expression::IsNull { expr, negated } => {
                write_operand(f, expr)?;
                write!(f, " IS {}NULL", not(*negated))
            }
            Expression::Case {
                branches,
                else_expr,
            } => {
                f.write_str("CASE")?;
                for branch in branches {
                    write!(f, " WHEN {} THEN {}", branch.when, branch.then)?;
                }
                if let Some(e) = else_expr {
                    write!(f, " ELSE {}", e)?;
                }
                f.write_str(" END")
            }
        }
    }
}
