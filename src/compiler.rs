//! Plan compilation: the last stage of the pipeline, and the pipeline itself.
//!
//! [`Compiler::compile`] runs lex, parse, bind and compile in order. The first
//! two stages stop at the first syntax error; binding and compiling report
//! every problem they find. A plan is only returned when nothing was
//! reported.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binder::{Binder, BoundOrderTarget, BoundSelect, BoundStatement, BoundUpdate};
use crate::config::CompilerConfig;
use crate::error::{Diagnostics, ErrorKind, ParseError};
use crate::evaluator::Evaluator;
use crate::expression::Expression;
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::plan::{
    CompiledPlan, OrderKey, OrderTarget, PlanAssignment, Projection, SelectPlan, UpdatePlan,
};
use crate::record::Record;
use crate::schema::SchemaSnapshot;

/// Result of one compile call. `plan` is present only when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub plan: Option<CompiledPlan>,
    pub errors: Vec<ParseError>,
}

impl CompileOutcome {
    fn failed(errors: Vec<ParseError>) -> Self {
        CompileOutcome { plan: None, errors }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.plan.is_some()
    }

    pub fn into_result(self) -> Result<CompiledPlan, Vec<ParseError>> {
        match self.plan {
            Some(plan) if self.errors.is_empty() => Ok(plan),
            _ => Err(self.errors),
        }
    }
}

/// Compiles `source` against `snapshot` with the default configuration.
///
/// # Examples
///
/// ```
/// use formql::{compile, Field, FieldType, Form, PlanMode, SchemaSnapshot};
///
/// let snapshot = SchemaSnapshot::new(vec![Form::new(
///     "form1",
///     "Orders",
///     vec![Field::new("f1", "Status", FieldType::Text)],
/// )]);
///
/// let outcome = compile(r#"SELECT FIELD("f1") FROM "form1""#, &snapshot);
/// assert_eq!(outcome.plan.unwrap().mode(), PlanMode::Select);
///
/// let outcome = compile(r#"SELECT FIELD("ghost") FROM "form1""#, &snapshot);
/// assert!(outcome.plan.is_none());
/// assert_eq!(outcome.errors[0].kind.as_str(), "unknown_field");
/// ```
pub fn compile(source: &str, snapshot: &SchemaSnapshot) -> CompileOutcome {
    Compiler::default().compile(source, snapshot)
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Compiler { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(&self, source: &str, snapshot: &SchemaSnapshot) -> CompileOutcome {
        let tokens = match tokenize(source) {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!(error = %e, "lexing failed");
                return CompileOutcome::failed(vec![e.into()]);
            }
        };
        debug!(tokens = tokens.len(), "tokenized query");

        let statement = match Parser::new(tokens)
            .with_max_depth(self.config.max_expression_depth)
            .parse()
        {
            Ok(statement) => statement,
            Err(e) => {
                debug!(error = %e, "parsing failed");
                return CompileOutcome::failed(vec![e]);
            }
        };

        let (bound, mut diagnostics) = Binder::new(snapshot).run(&statement);
        let plan = self.build(bound, &mut diagnostics);

        if diagnostics.is_empty() {
            debug!(mode = %plan.mode(), "compiled plan");
            CompileOutcome {
                plan: Some(plan),
                errors: Vec::new(),
            }
        } else {
            debug!(errors = diagnostics.len(), "compilation failed");
            CompileOutcome::failed(diagnostics.into_vec())
        }
    }

    fn build(&self, bound: BoundStatement, diagnostics: &mut Diagnostics) -> CompiledPlan {
        let folder = Folder::new();
        match bound {
            BoundStatement::Select(select) => {
                CompiledPlan::Select(self.build_select(select, &folder, diagnostics))
            }
            BoundStatement::Update(update) => {
                CompiledPlan::Update(self.build_update(update, &folder, diagnostics))
            }
        }
    }

    fn build_select(&self, select: BoundSelect, folder: &Folder, diagnostics: &mut Diagnostics) -> SelectPlan {
        let projections: Vec<Projection> = select
            .projections
            .into_iter()
            .map(|p| {
                let expr = folder.fold(p.expr);
                Projection {
                    name: p.name,
                    value_type: expr.value_type(),
                    expr,
                }
            })
            .collect();
        let filter = select.filter.map(|e| folder.fold(e));
        let group_by: Vec<Expression> = select.group_by.into_iter().map(|e| folder.fold(e)).collect();
        let having = select.having.map(|e| folder.fold(e));

        if filter.as_ref().is_some_and(Expression::contains_aggregate) {
            diagnostics.push(grouping(
                "Aggregate functions are not allowed in WHERE; filter groups with HAVING",
            ));
        }
        if group_by.iter().any(Expression::contains_aggregate) {
            diagnostics.push(grouping("Aggregate functions are not allowed in GROUP BY"));
        }

        let aggregated = !group_by.is_empty();
        if !aggregated {
            if projections.iter().any(|p| p.expr.contains_aggregate()) {
                diagnostics.push(grouping(
                    "Aggregate functions in the select list require a GROUP BY clause",
                ));
            }
            if having.is_some() {
                diagnostics.push(grouping("HAVING requires a GROUP BY clause"));
            }
        }

        let mut grouped_exprs: Vec<&Expression> = projections.iter().map(|p| &p.expr).collect();
        grouped_exprs.extend(having.as_ref());
        for expr in &grouped_exprs {
            check_nesting(expr, diagnostics);
            if aggregated {
                check_grouped(expr, &group_by, diagnostics);
            }
        }

        let mut order_by = Vec::with_capacity(select.order_by.len());
        for item in select.order_by {
            let target = match item.target {
                BoundOrderTarget::Alias(alias) => {
                    match projections.iter().position(|p| p.name == alias) {
                        Some(index) => OrderTarget::Projection(index),
                        None => {
                            diagnostics.push(ParseError::new(
                                ErrorKind::Syntax,
                                format!("ORDER BY references unknown alias {}", alias),
                            ));
                            continue;
                        }
                    }
                }
                BoundOrderTarget::Expr(expr) => {
                    let expr = folder.fold(expr);
                    match projections.iter().position(|p| p.expr == expr) {
                        Some(index) => OrderTarget::Projection(index),
                        None => {
                            check_nesting(&expr, diagnostics);
                            if aggregated {
                                check_grouped(&expr, &group_by, diagnostics);
                            } else if expr.contains_aggregate() {
                                diagnostics.push(grouping(
                                    "Aggregate functions in ORDER BY require a GROUP BY clause",
                                ));
                            }
                            OrderTarget::Expression(expr)
                        }
                    }
                }
            };
            order_by.push(OrderKey {
                target,
                descending: item.descending,
            });
        }

        SelectPlan {
            source: select.source,
            distinct: select.distinct,
            projections,
            filter,
            group_by,
            having,
            order_by,
            limit: self.config.effective_limit(select.limit),
            aggregated,
        }
    }

    fn build_update(&self, update: BoundUpdate, folder: &Folder, diagnostics: &mut Diagnostics) -> UpdatePlan {
        let assignments = update
            .assignments
            .into_iter()
            .map(|a| {
                let value = folder.fold(a.value);
                if value.contains_aggregate() {
                    diagnostics.push(grouping(&format!(
                        "Aggregate functions are not allowed in SET (field \"{}\")",
                        a.field_id
                    )));
                }
                PlanAssignment { value, ..a }
            })
            .collect();

        let filter = update.filter.map(|e| folder.fold(e));
        if filter.as_ref().is_some_and(Expression::contains_aggregate) {
            diagnostics.push(grouping("Aggregate functions are not allowed in WHERE"));
        }

        UpdatePlan {
            form_id: update.form_id,
            assignments,
            filter,
            bulk: update.submission_id.is_none(),
            submission_id: update.submission_id,
        }
    }
}

fn grouping(message: &str) -> ParseError {
    ParseError::new(ErrorKind::GroupingError, message)
}

/// Reports the first column reference that is neither a grouping key nor
/// inside an aggregate.
fn check_grouped(expr: &Expression, keys: &[Expression], diagnostics: &mut Diagnostics) {
    if let Some(column) = ungrouped(expr, keys) {
        diagnostics.push(grouping(&format!(
            "{} must appear in GROUP BY or be used in an aggregate function",
            column
        )));
    }
}

fn ungrouped<'e>(expr: &'e Expression, keys: &[Expression]) -> Option<&'e Expression> {
    if expr.is_aggregate() || keys.contains(expr) {
        return None;
    }
    if expr.is_column() {
        return Some(expr);
    }
    expr.children().into_iter().find_map(|child| ungrouped(child, keys))
}

fn check_nesting(expr: &Expression, diagnostics: &mut Diagnostics) {
    if expr.is_aggregate() {
        if expr.children().into_iter().any(Expression::contains_aggregate) {
            diagnostics.push(grouping(&format!("Aggregate functions cannot be nested: {}", expr)));
        }
        return;
    }
    for child in expr.children() {
        check_nesting(child, diagnostics);
    }
}

/// Replaces literal-only subtrees with their value.
struct Folder {
    evaluator: Evaluator,
}

impl Folder {
    fn new() -> Self {
        Folder {
            evaluator: Evaluator::new(),
        }
    }

    fn fold(&self, expr: Expression) -> Expression {
        let expr = expr.map_children(|child| self.fold(child));
        if !foldable(&expr) {
            return expr;
        }
        // Runtime errors such as division by zero are left for execution
        match self.evaluator.evaluate(&expr, &Record::default()) {
            Ok(value) => Expression::literal(value),
            Err(_) => expr,
        }
    }
}

fn foldable(expr: &Expression) -> bool {
    !expr.is_literal()
        && !expr.is_column()
        && !expr.is_aggregate()
        && !matches!(expr, Expression::Star)
        && expr.is_deterministic()
        && expr.children().into_iter().all(Expression::is_literal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use rust_decimal::Decimal;

    #[test]
    fn test_folds_literal_arithmetic() {
        let snapshot = SchemaSnapshot::default();
        let plan = compile("SELECT 1 + 2 * 3 AS n FROM forms", &snapshot)
            .into_result()
            .unwrap();
        let select = plan.as_select().unwrap();
        assert_eq!(
            select.projections[0].expr,
            Expression::literal(Value::Number(Decimal::from(7)))
        );
    }

    #[test]
    fn test_division_by_zero_is_left_for_runtime() {
        let snapshot = SchemaSnapshot::default();
        let plan = compile("SELECT 1 / 0 AS n FROM forms", &snapshot)
            .into_result()
            .unwrap();
        assert!(matches!(
            plan.as_select().unwrap().projections[0].expr,
            Expression::BinaryOp { .. }
        ));
    }

    #[test]
    fn test_now_is_never_folded() {
        let snapshot = SchemaSnapshot::default();
        let plan = compile("SELECT YEAR(NOW()) AS y FROM forms", &snapshot)
            .into_result()
            .unwrap();
        assert!(matches!(
            plan.as_select().unwrap().projections[0].expr,
            Expression::FunctionCall { .. }
        ));
    }
}
