//! Schema binding.
//!
//! Resolves every identifier of a parsed statement against a
//! [`SchemaSnapshot`] and type-checks operators and function calls against
//! the function registry. Problems are collected rather than returned one at
//! a time; a reference that cannot be resolved binds to a NULL literal so it
//! does not trigger follow-on type errors.
//!
//! Form fields and internal-table columns live in separate namespaces: a
//! statement reads from exactly one of them, and nothing in one can be named
//! from the other.

use tracing::debug;

use crate::ast::{
    BinOp, Expr, SelectItem, SelectStatement, Source, Statement, UnaryOp, UpdateStatement,
};
use crate::error::{Diagnostics, ErrorKind, ParseError};
use crate::expression::{CaseBranch, Expression};
use crate::functions::{self, ArgType};
use crate::lexer::Position;
use crate::plan::{PlanAssignment, PlanMode, PlanSource};
use crate::schema::{Form, InternalTable, SchemaSnapshot, SystemColumn};
use crate::value::{Value, ValueType, parse_date};

/// A statement whose references are all resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundStatement {
    Select(BoundSelect),
    Update(BoundUpdate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundSelect {
    pub source: PlanSource,
    pub distinct: bool,
    pub projections: Vec<BoundProjection>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<BoundOrder>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundProjection {
    pub name: String,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundOrderTarget {
    /// Name of an aliased projection
    Alias(String),
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundOrder {
    pub target: BoundOrderTarget,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundUpdate {
    pub form_id: String,
    pub assignments: Vec<PlanAssignment>,
    pub filter: Option<Expression>,
    /// Present when the filter is exactly `submission_id = <literal>`
    pub submission_id: Option<String>,
}

impl BoundUpdate {
    pub fn mode(&self) -> PlanMode {
        match self.submission_id {
            Some(_) => PlanMode::UpdateSingle,
            None => PlanMode::UpdateBulk,
        }
    }
}

/// What bare identifiers and `FIELD()` refer to in one statement.
#[derive(Clone, Copy)]
enum Namespace<'s> {
    Form(&'s Form),
    Table(&'static InternalTable),
    /// The source itself failed to resolve; references are not checked
    Unresolved,
}

/// Binds `statement` against `snapshot`, returning every problem found.
pub fn bind(statement: &Statement, snapshot: &SchemaSnapshot) -> Result<BoundStatement, Vec<ParseError>> {
    let (bound, diagnostics) = Binder::new(snapshot).run(statement);
    if diagnostics.is_empty() {
        Ok(bound)
    } else {
        Err(diagnostics.into_vec())
    }
}

pub struct Binder<'s> {
    snapshot: &'s SchemaSnapshot,
    diagnostics: Diagnostics,
}

impl<'s> Binder<'s> {
    pub fn new(snapshot: &'s SchemaSnapshot) -> Self {
        Binder {
            snapshot,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Binds a statement. The bound statement is always returned so later
    /// stages can keep collecting diagnostics; it is only meaningful when the
    /// diagnostics are empty.
    pub(crate) fn run(mut self, statement: &Statement) -> (BoundStatement, Diagnostics) {
        let bound = match statement {
            Statement::Select(select) => BoundStatement::Select(self.bind_select(select)),
            Statement::Update(update) => BoundStatement::Update(self.bind_update(update)),
        };
        debug!(errors = self.diagnostics.len(), "bound statement");
        (bound, self.diagnostics)
    }

    fn report(&mut self, kind: ErrorKind, message: String, position: Option<Position>) {
        self.diagnostics.push(ParseError {
            kind,
            message,
            position,
        });
    }

    // ========================================
    // SELECT
    // ========================================

    fn bind_select(&mut self, select: &SelectStatement) -> BoundSelect {
        let (namespace, source) = self.resolve_source(&select.source);

        let mut projections = Vec::new();
        let mut aliases = Vec::new();
        for item in &select.projections {
            match item {
                SelectItem::Wildcard => self.expand_wildcard(namespace, &mut projections),
                SelectItem::Expr { expr, alias } => {
                    let bound = self.bind_expr(expr, namespace);
                    let name = match alias {
                        Some(alias) => {
                            aliases.push(alias.clone());
                            alias.clone()
                        }
                        None => default_name(expr, &bound, namespace),
                    };
                    projections.push(BoundProjection { name, expr: bound });
                }
            }
        }

        let filter = select.filter.as_ref().map(|e| self.bind_expr(e, namespace));
        let group_by = select
            .group_by
            .iter()
            .map(|e| self.bind_expr(e, namespace))
            .collect();
        let having = select.having.as_ref().map(|e| self.bind_expr(e, namespace));

        let order_by = select
            .order_by
            .iter()
            .map(|item| {
                let target = match order_alias(&item.expr, &aliases) {
                    Some(alias) => BoundOrderTarget::Alias(alias),
                    None => BoundOrderTarget::Expr(self.bind_expr(&item.expr, namespace)),
                };
                BoundOrder {
                    target,
                    descending: item.descending,
                }
            })
            .collect();

        BoundSelect {
            source,
            distinct: select.distinct,
            projections,
            filter,
            group_by,
            having,
            order_by,
            limit: select.limit,
        }
    }

    /// `FROM "x"` names a form, falling back to the table whitelist;
    /// `FROM x` names a table only.
    fn resolve_source(&mut self, source: &Source) -> (Namespace<'s>, PlanSource) {
        let snapshot = self.snapshot;
        let name = source.name();
        let position = Some(source.position());

        if let Source::Quoted { .. } = source
            && let Some(form) = snapshot.form(name)
        {
            let plan_source = PlanSource::Form {
                id: form.id.clone(),
                name: form.name.clone(),
            };
            return (Namespace::Form(form), plan_source);
        }

        if let Some(table) = InternalTable::lookup(name) {
            let plan_source = PlanSource::Table {
                name: table.name.to_string(),
            };
            return (Namespace::Table(table), plan_source);
        }

        let message = match source {
            Source::Bare { .. } if snapshot.form(name).is_some() => format!(
                "Unknown table {}; form ids must be double-quoted: FROM \"{}\"",
                name, name
            ),
            Source::Bare { .. } => format!("Unknown table {}", name),
            Source::Quoted { .. } => format!("Unknown form \"{}\"", name),
        };
        self.report(ErrorKind::UnknownForm, message, position);

        let plan_source = PlanSource::Form {
            id: name.to_string(),
            name: name.to_string(),
        };
        (Namespace::Unresolved, plan_source)
    }

    fn expand_wildcard(&mut self, namespace: Namespace<'s>, out: &mut Vec<BoundProjection>) {
        match namespace {
            Namespace::Form(form) => {
                for column in SystemColumn::ALL {
                    out.push(BoundProjection {
                        name: column.name().to_string(),
                        expr: Expression::SystemColumn { column },
                    });
                }
                for field in form.fields.iter().filter(|f| f.field_type.holds_data()) {
                    out.push(BoundProjection {
                        name: field.label.clone(),
                        expr: Expression::FieldRef {
                            form_id: form.id.clone(),
                            field_id: field.id.clone(),
                            value_type: field.value_type(),
                        },
                    });
                }
            }
            Namespace::Table(table) => {
                for (column, value_type) in table.columns {
                    out.push(BoundProjection {
                        name: column.to_string(),
                        expr: Expression::TableColumn {
                            table: table.name.to_string(),
                            column: column.to_string(),
                            value_type: *value_type,
                        },
                    });
                }
            }
            Namespace::Unresolved => {}
        }
    }

    // ========================================
    // UPDATE
    // ========================================

    fn bind_update(&mut self, update: &UpdateStatement) -> BoundUpdate {
        let snapshot = self.snapshot;
        let form = snapshot.form(&update.form_id);
        let namespace = match form {
            Some(form) => Namespace::Form(form),
            None => {
                let message = if InternalTable::lookup(&update.form_id).is_some() {
                    format!("{} is an internal table; UPDATE only targets forms", update.form_id)
                } else {
                    format!("Unknown form \"{}\"", update.form_id)
                };
                self.report(ErrorKind::UnknownForm, message, Some(update.form_position));
                Namespace::Unresolved
            }
        };

        let mut assignments = Vec::with_capacity(update.assignments.len());
        for assignment in &update.assignments {
            let value = self.bind_expr(&assignment.value, namespace);
            let position = Some(assignment.position);
            let mut value_type = ValueType::Any;

            if let Some(form) = form {
                match form.field(&assignment.field_id) {
                    None => self.report(
                        ErrorKind::UnknownField,
                        format!("Unknown field \"{}\" in form \"{}\"", assignment.field_id, form.name),
                        position,
                    ),
                    Some(field) if !field.is_editable() => self.report(
                        ErrorKind::NonEditableField,
                        format!(
                            "Field \"{}\" ({}) is not editable",
                            assignment.field_id, field.label
                        ),
                        position,
                    ),
                    Some(field) => {
                        value_type = field.value_type();
                        if !assignable(value_type, &value) {
                            self.report(
                                ErrorKind::TypeMismatch,
                                format!(
                                    "Cannot assign {} value {} to field \"{}\" of type {}",
                                    value.value_type(),
                                    value,
                                    assignment.field_id,
                                    value_type
                                ),
                                position,
                            );
                        }
                    }
                }
            }

            assignments.push(PlanAssignment {
                field_id: assignment.field_id.clone(),
                value_type,
                value,
            });
        }

        let filter = update.filter.as_ref().map(|e| self.bind_expr(e, namespace));

        BoundUpdate {
            form_id: update.form_id.clone(),
            assignments,
            filter,
            submission_id: single_target(update.filter.as_ref()),
        }
    }

    // ========================================
    // Expressions
    // ========================================

    fn bind_expr(&mut self, expr: &Expr, namespace: Namespace<'s>) -> Expression {
        match expr {
            Expr::Number(n) => Expression::literal(Value::Number(*n)),
            Expr::String(s) => Expression::literal(Value::Text(s.clone())),
            Expr::Boolean(b) => Expression::literal(Value::Boolean(*b)),
            Expr::Null => Expression::null(),
            Expr::QuotedIdent { value, position } => self.bind_column(value, *position, namespace),

            Expr::Field { id, position } => self.bind_field(id, *position, namespace),
            Expr::Column { name, position } => self.bind_column(name, *position, namespace),

            Expr::Star => {
                self.report(
                    ErrorKind::TypeMismatch,
                    "'*' is only allowed as a projection or in COUNT(*)".to_string(),
                    None,
                );
                Expression::Star
            }

            Expr::Call {
                name,
                args,
                position,
            } => self.bind_call(name, args, *position, namespace),

            Expr::BinaryOp { op, left, right } => {
                let (left, right) = if op.is_comparison() {
                    (
                        self.bind_compared(left, right, namespace),
                        self.bind_compared(right, left, namespace),
                    )
                } else {
                    (self.bind_expr(left, namespace), self.bind_expr(right, namespace))
                };
                let bound = Expression::BinaryOp {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
                self.check_operator(&bound);
                bound
            }

            Expr::UnaryOp { op, operand } => {
                let operand = self.bind_expr(operand, namespace);
                if *op == UnaryOp::Negate && !operand.value_type().is_numeric() {
                    self.report(
                        ErrorKind::TypeMismatch,
                        format!("Cannot negate {} value {}", operand.value_type(), operand),
                        None,
                    );
                }
                Expression::UnaryOp {
                    op: *op,
                    operand: Box::new(operand),
                }
            }

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expression::Between {
                expr: Box::new(self.bind_expr(expr, namespace)),
                low: Box::new(self.bind_expr(low, namespace)),
                high: Box::new(self.bind_expr(high, namespace)),
                negated: *negated,
            },

            Expr::InList {
                expr,
                list,
                negated,
            } => Expression::InList {
                expr: Box::new(self.bind_expr(expr, namespace)),
                list: list
                    .iter()
                    .map(|e| self.bind_compared(e, expr, namespace))
                    .collect(),
                negated: *negated,
            },

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let expr = self.bind_expr(expr, namespace);
                let pattern = self.bind_expr(pattern, namespace);
                for operand in [&expr, &pattern] {
                    if !ArgType::Text.accepts(operand.value_type()) {
                        self.report(
                            ErrorKind::TypeMismatch,
                            format!("LIKE requires text operands, got {} ({})", operand.value_type(), operand),
                            None,
                        );
                    }
                }
                Expression::Like {
                    expr: Box::new(expr),
                    pattern: Box::new(pattern),
                    negated: *negated,
                }
            }

            Expr::IsNull { expr, negated } => Expression::IsNull {
                expr: Box::new(self.bind_expr(expr, namespace)),
                negated: *negated,
            },

            Expr::Case {
                branches,
                else_expr,
            } => Expression::Case {
                branches: branches
                    .iter()
                    .map(|(when, then)| CaseBranch {
                        when: self.bind_expr(when, namespace),
                        then: self.bind_expr(then, namespace),
                    })
                    .collect(),
                else_expr: else_expr
                    .as_ref()
                    .map(|e| Box::new(self.bind_expr(e, namespace))),
            },
        }
    }

    /// Binds one side of a comparison. A double-quoted identifier compared
    /// with `submission_id` is the id itself, as in `submission_id = "sub-uuid"`;
    /// anywhere else it names a column.
    fn bind_compared(&mut self, expr: &Expr, other: &Expr, namespace: Namespace<'s>) -> Expression {
        match expr {
            Expr::QuotedIdent { value, .. }
                if matches!(namespace, Namespace::Form(_)) && is_submission_id(other) =>
            {
                Expression::literal(Value::Text(value.clone()))
            }
            _ => self.bind_expr(expr, namespace),
        }
    }

    fn bind_field(&mut self, id: &str, position: Position, namespace: Namespace<'s>) -> Expression {
        match namespace {
            Namespace::Form(form) => match form.field(id) {
                Some(field) => Expression::FieldRef {
                    form_id: form.id.clone(),
                    field_id: field.id.clone(),
                    value_type: field.value_type(),
                },
                None => {
                    self.report(
                        ErrorKind::UnknownField,
                        format!("Unknown field \"{}\" in form \"{}\"", id, form.name),
                        Some(position),
                    );
                    Expression::null()
                }
            },
            Namespace::Table(table) => {
                self.report(
                    ErrorKind::UnknownField,
                    format!(
                        "FIELD(\"{}\") cannot be used with internal table {}; name its columns directly",
                        id, table.name
                    ),
                    Some(position),
                );
                Expression::null()
            }
            Namespace::Unresolved => Expression::null(),
        }
    }

    fn bind_column(&mut self, name: &str, position: Position, namespace: Namespace<'s>) -> Expression {
        match namespace {
            Namespace::Form(_) => match SystemColumn::lookup(name) {
                Some(column) => Expression::SystemColumn { column },
                None => {
                    self.report(
                        ErrorKind::UnknownField,
                        format!(
                            "Unknown column {}; form fields are referenced as FIELD(\"id\")",
                            name
                        ),
                        Some(position),
                    );
                    Expression::null()
                }
            },
            Namespace::Table(table) => match table.column(name) {
                Some((column, value_type)) => Expression::TableColumn {
                    table: table.name.to_string(),
                    column: column.to_string(),
                    value_type,
                },
                None => {
                    self.report(
                        ErrorKind::UnknownField,
                        format!("Unknown column {} in table {}", name, table.name),
                        Some(position),
                    );
                    Expression::null()
                }
            },
            Namespace::Unresolved => Expression::null(),
        }
    }

    fn bind_call(
        &mut self,
        name: &str,
        args: &[Expr],
        position: Position,
        namespace: Namespace<'s>,
    ) -> Expression {
        let Some(function) = functions::lookup(name) else {
            self.report(ErrorKind::Syntax, format!("Unknown function {}()", name), Some(position));
            for arg in args.iter().filter(|a| !matches!(a, Expr::Star)) {
                self.bind_expr(arg, namespace);
            }
            return Expression::null();
        };

        if !function.accepts_arity(args.len()) {
            self.report(
                ErrorKind::TypeMismatch,
                format!(
                    "{}() expects {} argument(s), got {}",
                    function.name,
                    function.arity(),
                    args.len()
                ),
                Some(position),
            );
        }

        let mut bound_args = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            if let Expr::Star = arg {
                if !function.accepts_star {
                    self.report(
                        ErrorKind::TypeMismatch,
                        format!("{}(*) is not allowed; only COUNT accepts *", function.name),
                        Some(position),
                    );
                }
                bound_args.push(Expression::Star);
                continue;
            }

            let bound = self.bind_expr(arg, namespace);
            let param = function.param(index);
            if !argument_accepts(param, &bound) {
                self.report(
                    ErrorKind::TypeMismatch,
                    format!(
                        "{}() argument {} must be {}, got {} ({})",
                        function.name,
                        index + 1,
                        param,
                        bound.value_type(),
                        bound
                    ),
                    Some(position),
                );
            }
            bound_args.push(bound);
        }

        Expression::FunctionCall {
            name: function.name.to_string(),
            args: bound_args,
        }
    }

    fn check_operator(&mut self, bound: &Expression) {
        let Expression::BinaryOp { op, left, right } = bound else {
            return;
        };
        if !op.is_arithmetic() {
            return;
        }

        let (l, r) = (left.value_type(), right.value_type());
        let numeric = l.is_numeric() && r.is_numeric();
        let texts = matches!(l, ValueType::Text | ValueType::Any)
            && matches!(r, ValueType::Text | ValueType::Any);
        let valid = match op {
            BinOp::Add => numeric || texts,
            _ => numeric,
        };

        if !valid {
            self.report(
                ErrorKind::TypeMismatch,
                format!("Operator '{}' cannot combine {} and {} in {}", op, l, r, bound),
                None,
            );
        }
    }
}

fn argument_accepts(param: ArgType, arg: &Expression) -> bool {
    param.accepts(arg.value_type()) || (param == ArgType::Date && is_date_literal(arg))
}

fn assignable(target: ValueType, value: &Expression) -> bool {
    target.accepts(value.value_type()) || (target == ValueType::Date && is_date_literal(value))
}

fn is_date_literal(expr: &Expression) -> bool {
    matches!(expr.as_literal(), Some(Value::Text(s)) if parse_date(s).is_some())
}

/// Field label for `FIELD()` projections, the canonical text otherwise.
fn default_name(expr: &Expr, bound: &Expression, namespace: Namespace<'_>) -> String {
    if let (Expr::Field { id, .. }, Namespace::Form(form)) = (expr, namespace)
        && let Some(field) = form.field(id)
    {
        return field.label.clone();
    }
    bound.to_string()
}

fn order_alias(expr: &Expr, aliases: &[String]) -> Option<String> {
    let found = match expr {
        Expr::Column { name, .. } => aliases.iter().find(|a| a.eq_ignore_ascii_case(name)),
        Expr::QuotedIdent { value, .. } => aliases.iter().find(|a| *a == value),
        _ => None,
    };
    found.cloned()
}

/// The submission id when the filter is exactly `submission_id = <literal>`,
/// in either operand order.
fn single_target(filter: Option<&Expr>) -> Option<String> {
    let Some(Expr::BinaryOp {
        op: BinOp::Equal,
        left,
        right,
    }) = filter
    else {
        return None;
    };
    id_equality(left, right).or_else(|| id_equality(right, left))
}

fn id_equality(column: &Expr, literal: &Expr) -> Option<String> {
    match literal {
        Expr::QuotedIdent { value, .. } | Expr::String(value) if is_submission_id(column) => {
            Some(value.clone())
        }
        _ => None,
    }
}

fn is_submission_id(expr: &Expr) -> bool {
    matches!(expr, Expr::Column { name, .. } if SystemColumn::lookup(name) == Some(SystemColumn::SubmissionId))
}
