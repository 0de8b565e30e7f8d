// tests/evaluator_tests.rs

use chrono::{TimeZone, Utc};
use formql::ast::{BinOp, UnaryOp};
use formql::evaluator::{EvalError, Evaluator};
use formql::expression::{CaseBranch, Expression};
use formql::record::Record;
use formql::schema::SystemColumn;
use formql::value::{Value, ValueType};
use rust_decimal::Decimal;
use std::str::FromStr;

fn num(s: &str) -> Value {
    Value::Number(Decimal::from_str(s).unwrap())
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn lit(value: Value) -> Expression {
    Expression::literal(value)
}

fn field(id: &str) -> Expression {
    Expression::FieldRef {
        form_id: "orders".to_string(),
        field_id: id.to_string(),
        value_type: ValueType::Any,
    }
}

fn binary(op: BinOp, left: Expression, right: Expression) -> Expression {
    Expression::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn call(name: &str, args: Vec<Expression>) -> Expression {
    Expression::FunctionCall {
        name: name.to_string(),
        args,
    }
}

fn eval(expr: &Expression) -> Result<Value, EvalError> {
    Evaluator::new().evaluate(expr, &Record::default())
}

fn eval_on(expr: &Expression, record: &Record) -> Value {
    Evaluator::new().evaluate(expr, record).unwrap()
}

// ============================================================================
// Logic and comparison
// ============================================================================

#[test]
fn test_three_valued_logic() {
    let t = || lit(Value::Boolean(true));
    let f = || lit(Value::Boolean(false));
    let n = Expression::null;

    assert_eq!(eval(&binary(BinOp::And, n(), f())).unwrap(), Value::Boolean(false));
    assert_eq!(eval(&binary(BinOp::And, t(), n())).unwrap(), Value::Null);
    assert_eq!(eval(&binary(BinOp::Or, n(), t())).unwrap(), Value::Boolean(true));
    assert_eq!(eval(&binary(BinOp::Or, f(), n())).unwrap(), Value::Null);

    let not_null = Expression::UnaryOp {
        op: UnaryOp::Not,
        operand: Box::new(n()),
    };
    assert_eq!(eval(&not_null).unwrap(), Value::Null);
}

#[test]
fn test_and_short_circuits_errors() {
    // The right side would divide by zero
    let boom = binary(BinOp::Divide, lit(num("1")), lit(num("0")));
    let expr = binary(BinOp::And, lit(Value::Boolean(false)), boom.clone());
    assert_eq!(eval(&expr).unwrap(), Value::Boolean(false));

    let expr = binary(BinOp::Or, lit(Value::Boolean(true)), boom);
    assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
}

#[test]
fn test_comparison_with_null_is_null() {
    let expr = binary(BinOp::Equal, field("missing"), lit(text("x")));
    assert_eq!(eval(&expr).unwrap(), Value::Null);
    assert!(!Evaluator::new().matches(&expr, &Record::default()).unwrap());
}

#[test]
fn test_comparisons_coerce_text_to_number() {
    let record = Record::new("s1").with_value("qty", text("12"));
    let expr = binary(BinOp::GreaterThan, field("qty"), lit(num("9")));
    assert_eq!(eval_on(&expr, &record), Value::Boolean(true));

    let expr = binary(BinOp::Equal, field("qty"), lit(num("12.0")));
    assert_eq!(eval_on(&expr, &record), Value::Boolean(true));
}

#[test]
fn test_incomparable_types() {
    let test_cases = vec![
        (BinOp::Equal, Value::Boolean(false)),
        (BinOp::NotEqual, Value::Boolean(true)),
        (BinOp::LessThan, Value::Null),
        (BinOp::GreaterEqual, Value::Null),
    ];

    for (op, expected) in test_cases {
        let expr = binary(op, lit(text("abc")), lit(num("3")));
        assert_eq!(eval(&expr).unwrap(), expected, "Failed for operator: {}", op);
    }
}

#[test]
fn test_dates_compare_against_text() {
    let due = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
    let record = Record::new("s1").with_value("due", Value::Date(due));
    let expr = binary(BinOp::LessThan, field("due"), lit(text("2024-04-01")));
    assert_eq!(eval_on(&expr, &record), Value::Boolean(true));
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_arithmetic_is_exact() {
    let expr = binary(BinOp::Add, lit(num("0.1")), lit(num("0.2")));
    assert_eq!(eval(&expr).unwrap(), num("0.3"));

    let expr = binary(BinOp::Modulo, lit(num("10")), lit(num("4")));
    assert_eq!(eval(&expr).unwrap(), num("2"));

    let expr = Expression::UnaryOp {
        op: UnaryOp::Negate,
        operand: Box::new(field("qty")),
    };
    let record = Record::new("s1").with_value("qty", num("7"));
    assert_eq!(eval_on(&expr, &record), num("-7"));
}

#[test]
fn test_division_by_zero() {
    let expr = binary(BinOp::Divide, lit(num("1")), lit(num("0")));
    assert_eq!(eval(&expr), Err(EvalError::DivisionByZero));

    let expr = binary(BinOp::Modulo, lit(num("1")), lit(num("0")));
    assert_eq!(eval(&expr), Err(EvalError::DivisionByZero));

    // NULL wins over the zero divisor
    let expr = binary(BinOp::Divide, Expression::null(), lit(num("0")));
    assert_eq!(eval(&expr).unwrap(), Value::Null);
}

#[test]
fn test_text_concatenation_and_type_errors() {
    let expr = binary(BinOp::Add, lit(text("ab")), lit(text("cd")));
    assert_eq!(eval(&expr).unwrap(), text("abcd"));

    let expr = binary(BinOp::Multiply, lit(text("ab")), lit(num("2")));
    assert!(matches!(eval(&expr), Err(EvalError::TypeError(_))));
}

// ============================================================================
// Predicates
// ============================================================================

#[test]
fn test_like_is_case_insensitive_and_anchored() {
    let record = Record::new("s1").with_value("email", text("Alice@Example.com"));
    let like = |pattern: &str, negated: bool| Expression::Like {
        expr: Box::new(field("email")),
        pattern: Box::new(lit(text(pattern))),
        negated,
    };

    assert_eq!(eval_on(&like("%@example.com", false), &record), Value::Boolean(true));
    assert_eq!(eval_on(&like("alice", false), &record), Value::Boolean(false));
    assert_eq!(eval_on(&like("_lice%", false), &record), Value::Boolean(true));
    assert_eq!(eval_on(&like("%.org", true), &record), Value::Boolean(true));
    assert_eq!(eval_on(&like("%", false), &Record::default()), Value::Null);
}

#[test]
fn test_in_list_with_null() {
    let in_list = |value: Value, list: Vec<Value>, negated: bool| Expression::InList {
        expr: Box::new(lit(value)),
        list: list.into_iter().map(lit).collect(),
        negated,
    };

    assert_eq!(
        eval(&in_list(text("a"), vec![text("a"), Value::Null], false)).unwrap(),
        Value::Boolean(true)
    );
    assert_eq!(
        eval(&in_list(text("b"), vec![text("a"), Value::Null], false)).unwrap(),
        Value::Null
    );
    assert_eq!(
        eval(&in_list(text("b"), vec![text("a")], true)).unwrap(),
        Value::Boolean(true)
    );
    assert_eq!(eval(&in_list(Value::Null, vec![text("a")], false)).unwrap(), Value::Null);
}

#[test]
fn test_between_is_inclusive() {
    let between = |value: &str, negated: bool| Expression::Between {
        expr: Box::new(lit(num(value))),
        low: Box::new(lit(num("10"))),
        high: Box::new(lit(num("20"))),
        negated,
    };

    assert_eq!(eval(&between("10", false)).unwrap(), Value::Boolean(true));
    assert_eq!(eval(&between("20", false)).unwrap(), Value::Boolean(true));
    assert_eq!(eval(&between("21", false)).unwrap(), Value::Boolean(false));
    assert_eq!(eval(&between("21", true)).unwrap(), Value::Boolean(true));
}

#[test]
fn test_is_null() {
    let record = Record::new("s1").with_value("notes", text(""));
    let is_null = |id: &str| Expression::IsNull {
        expr: Box::new(field(id)),
        negated: false,
    };
    assert_eq!(eval_on(&is_null("notes"), &record), Value::Boolean(false));
    assert_eq!(eval_on(&is_null("absent"), &record), Value::Boolean(true));
}

#[test]
fn test_case_first_match_wins() {
    let case = Expression::Case {
        branches: vec![
            CaseBranch {
                when: binary(BinOp::GreaterThan, field("qty"), lit(num("100"))),
                then: lit(text("bulk")),
            },
            CaseBranch {
                when: binary(BinOp::GreaterThan, field("qty"), lit(num("10"))),
                then: lit(text("large")),
            },
        ],
        else_expr: None,
    };

    let large = Record::new("s1").with_value("qty", num("500"));
    assert_eq!(eval_on(&case, &large), text("bulk"));
    let medium = Record::new("s2").with_value("qty", num("50"));
    assert_eq!(eval_on(&case, &medium), text("large"));
    let small = Record::new("s3").with_value("qty", num("5"));
    assert_eq!(eval_on(&case, &small), Value::Null);
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_scalar_functions() {
    let test_cases = vec![
        (call("UPPER", vec![lit(text("abc"))]), text("ABC")),
        (call("LENGTH", vec![lit(text("héllo"))]), num("5")),
        (call("ROUND", vec![lit(num("2.345")), lit(num("2"))]), num("2.35")),
        (call("ABS", vec![lit(num("-4"))]), num("4")),
        (
            call("CONCAT", vec![lit(text("a")), Expression::null(), lit(num("1"))]),
            text("a1"),
        ),
        (call("UPPER", vec![Expression::null()]), Value::Null),
        (
            call("COALESCE", vec![Expression::null(), lit(text("fallback"))]),
            text("fallback"),
        ),
        (
            call("IF", vec![lit(Value::Boolean(false)), lit(num("1")), lit(num("2"))]),
            num("2"),
        ),
    ];

    for (expr, expected) in test_cases {
        assert_eq!(eval(&expr).unwrap(), expected, "Failed for: {}", expr);
    }
}

#[test]
fn test_if_only_evaluates_the_chosen_branch() {
    let boom = binary(BinOp::Divide, lit(num("1")), lit(num("0")));
    let expr = call("IF", vec![lit(Value::Boolean(true)), lit(num("1")), boom]);
    assert_eq!(eval(&expr).unwrap(), num("1"));
}

#[test]
fn test_now_is_pinned_per_evaluator() {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let evaluator = Evaluator::at(now);
    let record = Record {
        submitted_at: Some(Utc.with_ymd_and_hms(2025, 5, 22, 8, 30, 0).unwrap()),
        ..Record::new("s1")
    };

    let expr = call(
        "DATEDIFF",
        vec![
            call("NOW", vec![]),
            Expression::SystemColumn {
                column: SystemColumn::SubmittedAt,
            },
        ],
    );
    assert_eq!(evaluator.evaluate(&expr, &record).unwrap(), num("10"));
    assert_eq!(evaluator.evaluate(&call("NOW", vec![]), &record).unwrap(), Value::Date(now));
}

#[test]
fn test_system_columns_read_metadata() {
    let record = Record {
        submitted_by: Some("user-7".to_string()),
        ..Record::new("s1")
    };
    let column = |column| Expression::SystemColumn { column };
    assert_eq!(eval_on(&column(SystemColumn::SubmissionId), &record), text("s1"));
    assert_eq!(eval_on(&column(SystemColumn::SubmittedBy), &record), text("user-7"));
    assert_eq!(eval_on(&column(SystemColumn::SubmittedAt), &record), Value::Null);
}

#[test]
fn test_unknown_function_in_hand_built_plan() {
    let expr = call("SOUNDEX", vec![lit(text("x"))]);
    assert_eq!(eval(&expr), Err(EvalError::UnknownFunction("SOUNDEX".to_string())));
}

// ============================================================================
// Aggregates
// ============================================================================

fn orders() -> Vec<Record> {
    vec![
        Record::new("s1").with_value("qty", num("10")).with_value("status", text("open")),
        Record::new("s2").with_value("qty", num("20")).with_value("status", text("open")),
        Record::new("s3").with_value("status", text("open")),
        Record::new("s4").with_value("qty", num("30")).with_value("status", text("open")),
    ]
}

#[test]
fn test_group_aggregates() {
    let records = orders();
    let rows: Vec<&Record> = records.iter().collect();
    let evaluator = Evaluator::new();
    let group = |expr: Expression| evaluator.evaluate_group(&expr, &rows).unwrap();

    assert_eq!(group(call("COUNT", vec![Expression::Star])), num("4"));
    assert_eq!(group(call("COUNT", vec![field("qty")])), num("3"));
    assert_eq!(group(call("SUM", vec![field("qty")])), num("60"));
    assert_eq!(group(call("AVG", vec![field("qty")])), num("20"));
    assert_eq!(group(call("MIN", vec![field("qty")])), num("10"));
    assert_eq!(group(call("MAX", vec![field("qty")])), num("30"));

    // Non-aggregate parts read the first row of the group
    assert_eq!(group(field("status")), text("open"));
    assert_eq!(
        group(binary(BinOp::Add, call("SUM", vec![field("qty")]), lit(num("1")))),
        num("61")
    );
}

#[test]
fn test_empty_group() {
    let evaluator = Evaluator::new();
    let group = |expr: Expression| evaluator.evaluate_group(&expr, &[]).unwrap();

    assert_eq!(group(call("COUNT", vec![Expression::Star])), num("0"));
    assert_eq!(group(call("SUM", vec![field("qty")])), Value::Null);
    assert_eq!(group(call("AVG", vec![field("qty")])), Value::Null);
    assert_eq!(group(field("status")), Value::Null);
}

#[test]
fn test_aggregate_over_text_fails() {
    let records = vec![Record::new("s1").with_value("qty", text("many"))];
    let rows: Vec<&Record> = records.iter().collect();
    let result = Evaluator::new().evaluate_group(&call("SUM", vec![field("qty")]), &rows);
    assert!(matches!(result, Err(EvalError::TypeError(_))));
}

#[test]
fn test_aggregate_outside_group() {
    let result = eval(&call("COUNT", vec![Expression::Star]));
    assert_eq!(result, Err(EvalError::AggregateOutsideGroup("COUNT".to_string())));
}
