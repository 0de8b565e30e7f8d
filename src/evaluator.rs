use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    ast::{BinOp, UnaryOp},
    expression::Expression,
    functions::{self, Implementation},
    record::Record,
    value::Value,
};

/// Errors that can occur while evaluating a bound expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Type mismatch or invalid operation for the given operands
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Division by zero")]
    DivisionByZero,

    /// Only reachable with hand-built or deserialized plans
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid LIKE pattern: {0}")]
    InvalidPattern(String),

    /// An aggregate reached outside a grouped evaluation
    #[error("Aggregate function {0} cannot be evaluated against a single record")]
    AggregateOutsideGroup(String),
}

/// Per-evaluation inputs visible to functions.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    /// What `NOW()` returns; fixed for one evaluator so every row agrees
    pub now: DateTime<Utc>,
}

/// Rows an expression is evaluated against.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Row(&'a Record),
    /// Aggregates fold over all rows; anything else reads the first row
    Group(&'a [&'a Record]),
}

/// Evaluates bound expressions against records.
///
/// Comparison and logic follow SQL three-valued semantics: a comparison with
/// NULL is NULL, `NULL AND FALSE` is FALSE, `NULL OR TRUE` is TRUE, and a
/// filter treats a NULL result as "no match".
///
/// # Examples
///
/// ```
/// use formql::{Evaluator, Expression, Record, Value};
/// use formql::ast::BinOp;
///
/// let expr = Expression::BinaryOp {
///     op: BinOp::Equal,
///     left: Box::new(Expression::literal(Value::Null)),
///     right: Box::new(Expression::literal(Value::Text("x".into()))),
/// };
/// let result = Evaluator::new().evaluate(&expr, &Record::default()).unwrap();
/// assert_eq!(result, Value::Null);
/// ```
#[derive(Debug, Clone)]
pub struct Evaluator {
    context: CallContext,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::at(Utc::now())
    }
}

/// Evaluates `expr` for a single record with the clock read now.
pub fn evaluate(expr: &Expression, record: &Record) -> Result<Value, EvalError> {
    Evaluator::new().evaluate(expr, record)
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An evaluator whose `NOW()` is pinned to `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Evaluator {
            context: CallContext { now },
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.context.now
    }

    /// Evaluates a non-aggregate expression against one record.
    pub fn evaluate(&self, expr: &Expression, record: &Record) -> Result<Value, EvalError> {
        self.eval(expr, Scope::Row(record))
    }

    /// Evaluates an expression for a whole group of records.
    ///
    /// Aggregate calls fold their argument over every row; other references
    /// read the first row, which is well defined because a valid plan only
    /// reads grouping keys outside aggregates. An empty group yields
    /// `COUNT = 0` and NULL for the other aggregates.
    pub fn evaluate_group(&self, expr: &Expression, rows: &[&Record]) -> Result<Value, EvalError> {
        self.eval(expr, Scope::Group(rows))
    }

    /// Filter semantics: only TRUE matches.
    pub fn matches(&self, predicate: &Expression, record: &Record) -> Result<bool, EvalError> {
        Ok(self.evaluate(predicate, record)?.is_truthy())
    }

    fn eval(&self, expr: &Expression, scope: Scope<'_>) -> Result<Value, EvalError> {
        match expr {
            Expression::Literal { value } => Ok(value.clone()),

            Expression::FieldRef { field_id, .. } => Ok(read(scope, |r| r.get(field_id))),
            Expression::TableColumn { column, .. } => Ok(read(scope, |r| r.get(column))),
            Expression::SystemColumn { column } => Ok(read(scope, |r| r.system(*column))),

            Expression::Star => Ok(Value::Boolean(true)),

            Expression::FunctionCall { name, args } => self.eval_call(name, args, scope),

            Expression::BinaryOp { op, left, right } => match op {
                BinOp::And => self.eval_and(left, right, scope),
                BinOp::Or => self.eval_or(left, right, scope),
                _ => {
                    let l = self.eval(left, scope)?;
                    let r = self.eval(right, scope)?;
                    self.apply_binop(*op, &l, &r)
                }
            },

            Expression::UnaryOp { op, operand } => {
                let v = self.eval(operand, scope)?;
                match (op, v) {
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Not, v) => Ok(Value::Boolean(!v.is_truthy())),
                    (UnaryOp::Negate, v) => match v.as_number() {
                        Some(n) => Ok(Value::Number(-n)),
                        None => Err(EvalError::TypeError(format!("Cannot negate {}", v.type_name()))),
                    },
                }
            }

            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let v = self.eval(expr, scope)?;
                let low = self.eval(low, scope)?;
                let high = self.eval(high, scope)?;
                match (v.compare(&low), v.compare(&high)) {
                    (Some(lo), Some(hi)) => {
                        let inside = lo != Ordering::Less && hi != Ordering::Greater;
                        Ok(Value::Boolean(inside != *negated))
                    }
                    _ => Ok(Value::Null),
                }
            }

            Expression::InList {
                expr,
                list,
                negated,
            } => {
                let v = self.eval(expr, scope)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = self.eval(item, scope)?;
                    if candidate.is_null() {
                        saw_null = true;
                    } else if v.compare(&candidate) == Some(Ordering::Equal) {
                        return Ok(Value::Boolean(!*negated));
                    }
                }
                if saw_null {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Boolean(*negated))
                }
            }

            Expression::Like {
                expr,
                pattern,
                negated,
            } => {
                let v = self.eval(expr, scope)?;
                let p = self.eval(pattern, scope)?;
                if v.is_null() || p.is_null() {
                    return Ok(Value::Null);
                }
                let re = like_regex(&p.to_text())?;
                Ok(Value::Boolean(re.is_match(&v.to_text()) != *negated))
            }

            Expression::IsNull { expr, negated } => {
                let v = self.eval(expr, scope)?;
                Ok(Value::Boolean(v.is_null() != *negated))
            }

            Expression::Case {
                branches,
                else_expr,
            } => {
                for branch in branches {
                    if self.eval(&branch.when, scope)?.is_truthy() {
                        return self.eval(&branch.then, scope);
                    }
                }
                match else_expr {
                    Some(e) => self.eval(e, scope),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    fn eval_call(&self, name: &str, args: &[Expression], scope: Scope<'_>) -> Result<Value, EvalError> {
        let function =
            functions::lookup(name).ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        if !function.accepts_arity(args.len()) {
            return Err(EvalError::TypeError(format!(
                "{}() expects {} argument(s), got {}",
                function.name,
                function.arity(),
                args.len()
            )));
        }

        match function.implementation {
            Implementation::Scalar(f) => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                if function.strict && values.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                f(&values, &self.context)
            }
            Implementation::Lazy(f) => {
                let mut arg = |i: usize| self.eval(&args[i], scope);
                f(&mut arg, args.len())
            }
            Implementation::Aggregate(f) => {
                let Scope::Group(rows) = scope else {
                    return Err(EvalError::AggregateOutsideGroup(function.name.to_string()));
                };
                let mut values = Vec::with_capacity(rows.len());
                for row in rows {
                    values.push(self.eval(&args[0], Scope::Row(*row))?);
                }
                f(&values)
            }
        }
    }

    fn eval_and(&self, left: &Expression, right: &Expression, scope: Scope<'_>) -> Result<Value, EvalError> {
        let l = truth(&self.eval(left, scope)?);
        if l == Some(false) {
            return Ok(Value::Boolean(false));
        }
        let r = truth(&self.eval(right, scope)?);
        Ok(match (l, r) {
            (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ => Value::Null,
        })
    }

    fn eval_or(&self, left: &Expression, right: &Expression, scope: Scope<'_>) -> Result<Value, EvalError> {
        let l = truth(&self.eval(left, scope)?);
        if l == Some(true) {
            return Ok(Value::Boolean(true));
        }
        let r = truth(&self.eval(right, scope)?);
        Ok(match (l, r) {
            (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ => Value::Null,
        })
    }

    fn apply_binop(&self, op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }

        if op.is_comparison() {
            return Ok(compare_values(op, left, right));
        }

        if let (BinOp::Add, Value::Text(a), Value::Text(b)) = (op, left, right) {
            return Ok(Value::Text(format!("{}{}", a, b)));
        }

        let (a, b) = match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(EvalError::TypeError(format!(
                    "Cannot apply '{}' to {} and {}",
                    op,
                    left.type_name(),
                    right.type_name()
                )));
            }
        };

        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Subtract => a.checked_sub(b),
            BinOp::Multiply => a.checked_mul(b),
            BinOp::Divide | BinOp::Modulo if b.is_zero() => return Err(EvalError::DivisionByZero),
            BinOp::Divide => a.checked_div(b),
            BinOp::Modulo => a.checked_rem(b),
            _ => {
                return Err(EvalError::TypeError(format!(
                    "'{}' is not an arithmetic operator",
                    op
                )));
            }
        };
        result
            .map(|n: Decimal| Value::Number(n.normalize()))
            .ok_or_else(|| EvalError::TypeError(format!("Numeric overflow in '{}'", op)))
    }
}

fn read(scope: Scope<'_>, get: impl Fn(&Record) -> Value) -> Value {
    match scope {
        Scope::Row(record) => get(record),
        Scope::Group(rows) => rows.first().map_or(Value::Null, |r| get(*r)),
    }
}

/// Three-valued view of a value: `None` is unknown.
fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        v => Some(v.is_truthy()),
    }
}

/// Values of unrelated types are unequal, and unordered (NULL) for `<` and
/// friends.
fn compare_values(op: BinOp, left: &Value, right: &Value) -> Value {
    let ordering = left.compare(right);
    let result = match (op, ordering) {
        (BinOp::Equal, ord) => ord == Some(Ordering::Equal),
        (BinOp::NotEqual, ord) => ord != Some(Ordering::Equal),
        (_, None) => return Value::Null,
        (BinOp::LessThan, Some(ord)) => ord == Ordering::Less,
        (BinOp::GreaterThan, Some(ord)) => ord == Ordering::Greater,
        (BinOp::LessEqual, Some(ord)) => ord != Ordering::Greater,
        (BinOp::GreaterEqual, Some(ord)) => ord != Ordering::Less,
        _ => return Value::Null,
    };
    Value::Boolean(result)
}

/// Translates a LIKE pattern into an anchored, case-insensitive regex.
/// `%` matches any run of characters, `_` exactly one.
pub fn like_regex(pattern: &str) -> Result<Regex, EvalError> {
    let mut source = String::from("(?is)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if ch == '%' { ".*" } else { "." });
            }
            _ => literal.push(ch),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');
    Regex::new(&source).map_err(|e| EvalError::InvalidPattern(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_wildcards() {
        let re = like_regex("ab%_z").unwrap();
        assert!(re.is_match("ABcdz"));
        assert!(re.is_match("abxz"));
        assert!(!re.is_match("abz"));
        assert!(like_regex("50.5%").unwrap().is_match("50.5 percent"));
        assert!(!like_regex("50.5%").unwrap().is_match("5005"));
    }

    #[test]
    fn test_truth_table() {
        let t = Expression::literal(Value::Boolean(true));
        let f = Expression::literal(Value::Boolean(false));
        let n = Expression::null();
        let ev = Evaluator::new();
        let scope = Record::default();
        let and = |l: &Expression, r: &Expression| {
            ev.eval_and(l, r, Scope::Row(&scope)).unwrap()
        };
        assert_eq!(and(&n, &f), Value::Boolean(false));
        assert_eq!(and(&t, &n), Value::Null);
        assert_eq!(ev.eval_or(&n, &t, Scope::Row(&scope)).unwrap(), Value::Boolean(true));
        assert_eq!(ev.eval_or(&f, &n, Scope::Row(&scope)).unwrap(), Value::Null);
    }
}
