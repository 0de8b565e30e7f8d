// tests/executor_tests.rs

use std::str::FromStr;
use std::sync::atomic::AtomicBool;

use formql::compiler::compile;
use formql::evaluator::{EvalError, Evaluator};
use formql::executor::{ExecutionResult, Executor, ResultSet};
use formql::plan::{SelectPlan, UpdatePlan};
use formql::record::Record;
use formql::schema::{Field, FieldType, Form, SchemaSnapshot};
use formql::value::Value;
use rust_decimal::Decimal;

fn schema() -> SchemaSnapshot {
    SchemaSnapshot::new(vec![Form::new(
        "orders",
        "Orders",
        vec![
            Field::new("customer", "Customer", FieldType::Text),
            Field::new("status", "Status", FieldType::Select),
            Field::new("qty", "Quantity", FieldType::Number),
            Field::new("total", "Total", FieldType::Calculated),
            Field::new("note", "Note", FieldType::Text),
        ],
    )])
}

fn num(s: &str) -> Value {
    Value::Number(Decimal::from_str(s).unwrap())
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn order(id: &str, customer: &str, status: &str, qty: Option<&str>) -> Record {
    let record = Record::new(id)
        .with_value("customer", text(customer))
        .with_value("status", text(status));
    match qty {
        Some(q) => record.with_value("qty", num(q)),
        None => record,
    }
}

fn orders() -> Vec<Record> {
    vec![
        order("s1", "acme", "open", Some("5")),
        order("s2", "globex", "closed", Some("12")),
        order("s3", "acme", "open", Some("7")),
        order("s4", "initech", "open", None),
        order("s5", "globex", "open", Some("3")),
    ]
}

fn select_plan(text: &str) -> SelectPlan {
    let plan = compile(text, &schema()).into_result().unwrap();
    plan.as_select().cloned().unwrap()
}

fn update_plan(text: &str) -> UpdatePlan {
    let plan = compile(text, &schema()).into_result().unwrap();
    plan.as_update().cloned().unwrap()
}

fn run_select(text: &str) -> ResultSet {
    Executor::default().select(&select_plan(text), &orders()).unwrap()
}

// ============================================================================
// SELECT
// ============================================================================

#[test]
fn test_select_with_filter() {
    let result = run_select(
        r#"SELECT submission_id, FIELD("qty") FROM "orders" WHERE FIELD("status") = 'open' AND FIELD("qty") > 4"#,
    );
    assert_eq!(result.columns, vec!["submission_id", "Quantity"]);
    assert_eq!(
        result.rows,
        vec![vec![text("s1"), num("5")], vec![text("s3"), num("7")]]
    );
}

#[test]
fn test_null_filter_result_excludes_row() {
    let result = run_select(r#"SELECT submission_id FROM "orders" WHERE FIELD("qty") < 100"#);
    assert_eq!(result.rows.len(), 4);
    assert!(!result.rows.contains(&vec![text("s4")]));
}

#[test]
fn test_order_by_puts_nulls_first() {
    let result = run_select(r#"SELECT submission_id FROM "orders" ORDER BY FIELD("qty")"#);
    let ids: Vec<Value> = result.rows.into_iter().map(|mut r| r.remove(0)).collect();
    assert_eq!(ids, vec![text("s4"), text("s5"), text("s1"), text("s3"), text("s2")]);

    let result = run_select(r#"SELECT submission_id FROM "orders" ORDER BY FIELD("qty") DESC"#);
    assert_eq!(result.rows.first(), Some(&vec![text("s2")]));
    assert_eq!(result.rows.last(), Some(&vec![text("s4")]));
}

#[test]
fn test_sort_is_stable_for_ties() {
    let result = run_select(r#"SELECT submission_id FROM "orders" ORDER BY FIELD("customer")"#);
    let ids: Vec<Value> = result.rows.into_iter().map(|mut r| r.remove(0)).collect();
    assert_eq!(ids, vec![text("s1"), text("s3"), text("s2"), text("s5"), text("s4")]);
}

#[test]
fn test_order_by_alias_and_limit() {
    let result = run_select(
        r#"SELECT FIELD("customer") AS who, FIELD("qty") * 2 AS doubled FROM "orders" WHERE FIELD("qty") IS NOT NULL ORDER BY doubled DESC LIMIT 2"#,
    );
    assert_eq!(result.columns, vec!["who", "doubled"]);
    assert_eq!(
        result.rows,
        vec![vec![text("globex"), num("24")], vec![text("acme"), num("14")]]
    );
}

#[test]
fn test_distinct() {
    let result = run_select(
        r#"SELECT DISTINCT FIELD("customer") FROM "orders" ORDER BY FIELD("customer")"#,
    );
    assert_eq!(
        result.rows,
        vec![vec![text("acme")], vec![text("globex")], vec![text("initech")]]
    );
}

#[test]
fn test_group_by_with_having() {
    let result = run_select(
        r#"SELECT FIELD("customer"), COUNT(*) AS orders, SUM(FIELD("qty")) AS units
           FROM "orders"
           GROUP BY FIELD("customer")
           HAVING COUNT(*) > 1
           ORDER BY units DESC"#,
    );
    assert_eq!(result.columns, vec!["Customer", "orders", "units"]);
    assert_eq!(
        result.rows,
        vec![
            vec![text("globex"), num("2"), num("15")],
            vec![text("acme"), num("2"), num("12")],
        ]
    );
}

#[test]
fn test_groups_keep_first_seen_order() {
    let result = run_select(
        r#"SELECT FIELD("status"), MAX(FIELD("qty")) FROM "orders" GROUP BY FIELD("status")"#,
    );
    assert_eq!(
        result.rows,
        vec![vec![text("open"), num("7")], vec![text("closed"), num("12")]]
    );
}

#[test]
fn test_grouped_select_over_no_rows() {
    let result = run_select(
        r#"SELECT FIELD("status"), COUNT(*) FROM "orders" WHERE FIELD("qty") > 1000 GROUP BY FIELD("status")"#,
    );
    assert!(result.rows.is_empty());
}

#[test]
fn test_select_fails_on_first_evaluation_error() {
    let plan = select_plan(r#"SELECT 100 / FIELD("qty") FROM "orders""#);
    let records = vec![order("s1", "acme", "open", Some("0"))];
    let result = Executor::default().select(&plan, &records);
    assert_eq!(result, Err(EvalError::DivisionByZero));
}

#[test]
fn test_table_select() {
    let plan = select_plan("SELECT email FROM user_profiles WHERE role = 'admin' ORDER BY email");
    let rows = vec![
        Record::default()
            .with_value("email", text("zoe@example.com"))
            .with_value("role", text("admin")),
        Record::default()
            .with_value("email", text("bob@example.com"))
            .with_value("role", text("member")),
        Record::default()
            .with_value("email", text("amy@example.com"))
            .with_value("role", text("admin")),
    ];
    let result = Executor::default().select(&plan, &rows).unwrap();
    assert_eq!(result.columns, vec!["email"]);
    assert_eq!(
        result.rows,
        vec![vec![text("amy@example.com")], vec![text("zoe@example.com")]]
    );
}

// ============================================================================
// UPDATE
// ============================================================================

#[test]
fn test_bulk_update() {
    let plan = update_plan(
        r#"UPDATE FORM "orders" SET FIELD("status") = 'shipped' WHERE FIELD("status") = 'open' AND FIELD("qty") >= 5"#,
    );
    let mut records = orders();
    let outcome = Executor::default().update(&plan, &mut records, &AtomicBool::new(false));

    assert_eq!(outcome.processed, 5);
    assert_eq!(outcome.matched, 2);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 0);
    assert!(!outcome.cancelled);
    assert_eq!(records[0].get("status"), text("shipped"));
    assert_eq!(records[2].get("status"), text("shipped"));
    assert_eq!(records[4].get("status"), text("open"));
}

#[test]
fn test_single_record_update() {
    let plan = update_plan(
        r#"UPDATE FORM "orders" SET FIELD("qty") = FIELD("qty") + 1 WHERE submission_id = "s3""#,
    );
    assert!(!plan.bulk);
    let mut records = orders();
    let outcome = Executor::default().update(&plan, &mut records, &AtomicBool::new(false));

    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(records[2].get("qty"), num("8"));
    assert_eq!(records[0].get("qty"), num("5"));
}

#[test]
fn test_assignments_read_pre_update_values() {
    let plan = update_plan(
        r#"UPDATE FORM "orders" SET FIELD("qty") = FIELD("qty") * 10, FIELD("note") = FIELD("qty") WHERE submission_id = 's1'"#,
    );
    let mut records = orders();
    Executor::default().update(&plan, &mut records, &AtomicBool::new(false));

    assert_eq!(records[0].get("qty"), num("50"));
    // Number written into a text field is stored as its text rendering
    assert_eq!(records[0].get("note"), text("5"));
}

#[test]
fn test_failed_record_does_not_stop_the_batch() {
    let plan = update_plan(r#"UPDATE FORM "orders" SET FIELD("qty") = 60 / FIELD("qty")"#);
    let mut records = vec![
        order("s1", "acme", "open", Some("6")),
        order("s2", "acme", "open", Some("0")),
        order("s3", "acme", "open", Some("12")),
    ];
    let outcome = Executor::default().update(&plan, &mut records, &AtomicBool::new(false));

    assert_eq!(outcome.matched, 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].submission_id.as_deref(), Some("s2"));
    assert!(outcome.errors[0].message.contains("Division by zero"));

    assert_eq!(records[0].get("qty"), num("10"));
    assert_eq!(records[1].get("qty"), num("0"));
    assert_eq!(records[2].get("qty"), num("5"));
}

#[test]
fn test_runtime_value_must_fit_the_field() {
    // Calculated fields have no static type, so this is checked per record
    let plan = update_plan(r#"UPDATE FORM "orders" SET FIELD("qty") = FIELD("total")"#);
    let mut records = vec![
        order("s1", "acme", "open", Some("1")).with_value("total", text("42")),
        order("s2", "acme", "open", Some("1")).with_value("total", text("n/a")),
    ];
    let outcome = Executor::default().update(&plan, &mut records, &AtomicBool::new(false));

    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(records[0].get("qty"), num("42"));
    assert_eq!(records[1].get("qty"), num("1"));
    assert!(outcome.errors[0].message.contains("does not fit type number"));
}

#[test]
fn test_update_with_every_assignment_or_none() {
    let plan = update_plan(
        r#"UPDATE FORM "orders" SET FIELD("status") = 'checked', FIELD("qty") = FIELD("total") WHERE submission_id = 's1'"#,
    );
    let mut records = vec![order("s1", "acme", "open", Some("1")).with_value("total", text("bad"))];
    let outcome = Executor::default().update(&plan, &mut records, &AtomicBool::new(false));

    assert_eq!(outcome.failed, 1);
    assert_eq!(records[0].get("status"), text("open"));
}

#[test]
fn test_cancelled_update_touches_nothing() {
    let plan = update_plan(r#"UPDATE FORM "orders" SET FIELD("status") = 'void'"#);
    let mut records = orders();
    let outcome = Executor::default().update(&plan, &mut records, &AtomicBool::new(true));

    assert!(outcome.cancelled);
    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.matched, 0);
    assert!(records.iter().all(|r| r.get("status") != text("void")));
}

#[test]
fn test_execute_dispatches_on_plan_kind() {
    let executor = Executor::new(Evaluator::new());
    let mut records = orders();
    let cancel = AtomicBool::new(false);

    let plan = compile(r#"SELECT COUNT(*) FROM "orders" GROUP BY FIELD("status")"#, &schema())
        .into_result()
        .unwrap();
    match executor.execute(&plan, &mut records, &cancel).unwrap() {
        ExecutionResult::Rows(rows) => assert_eq!(rows.rows, vec![vec![num("4")], vec![num("1")]]),
        ExecutionResult::Updated(_) => panic!("Expected rows"),
    }

    let plan = compile(r#"UPDATE FORM "orders" SET FIELD("note") = 'seen'"#, &schema())
        .into_result()
        .unwrap();
    match executor.execute(&plan, &mut records, &cancel).unwrap() {
        ExecutionResult::Updated(outcome) => assert_eq!(outcome.succeeded, 5),
        ExecutionResult::Rows(_) => panic!("Expected an update outcome"),
    }
}
