// tests/integration_tests.rs
//
// End-to-end: schema from JSON, compile, execute over JSON records.

use formql::{ErrorKind, ExecutionResult, SchemaSnapshot, Value, compile};
use rust_decimal::Decimal;
use serde_json::json;

fn schema() -> SchemaSnapshot {
    serde_json::from_value(json!({
        "forms": [{
            "id": "a1b2c3",
            "name": "Event signup",
            "fields": [
                { "id": "name", "label": "Full name", "type": "text" },
                { "id": "email", "label": "Email", "type": "email" },
                { "id": "guests", "label": "Guests", "type": "number" },
                { "id": "day", "label": "Day", "type": "date" },
                { "id": "diet", "label": "Diet", "type": "multi_select" },
                { "id": "paid", "label": "Paid", "type": "checkbox" },
                { "id": "badge", "label": "Badge", "type": "calculated" },
                { "id": "checked_in", "label": "Checked in", "type": "toggle", "editable": false }
            ]
        }]
    }))
    .unwrap()
}

fn number(n: i64) -> Value {
    Value::Number(Decimal::from(n))
}

#[test]
fn test_schema_json_round_trip() {
    let snapshot = schema();
    let form = snapshot.form("a1b2c3").unwrap();
    assert_eq!(form.fields.len(), 8);
    assert!(form.field("guests").unwrap().is_editable());
    assert!(!form.field("badge").unwrap().is_editable());
    assert!(!form.field("checked_in").unwrap().is_editable());

    let text = serde_json::to_string(&snapshot).unwrap();
    let back: SchemaSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(back, snapshot);
}

#[test]
fn test_report_query() {
    let outcome = compile(
        r#"
        -- headcount per day
        SELECT FIELD("day") AS day, COUNT(*) AS signups, SUM(FIELD("guests") + 1) AS people
        FROM "a1b2c3"
        WHERE FIELD("paid") = TRUE
        GROUP BY FIELD("day")
        HAVING SUM(FIELD("guests")) >= 1
        ORDER BY day
        LIMIT 10
        "#,
        &schema(),
    );
    assert!(outcome.is_ok(), "unexpected errors: {:?}", outcome.errors);
    let select = outcome.plan.as_ref().and_then(|p| p.as_select()).unwrap();
    assert!(select.aggregated);
    assert_eq!(select.limit, Some(10));
    assert_eq!(
        select.projections.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        vec!["day", "signups", "people"]
    );
}

#[test]
fn test_every_error_is_reported_at_once() {
    let outcome = compile(
        r#"UPDATE FORM "a1b2c3" SET FIELD("badge") = 'VIP', FIELD("guests") = 'many', FIELD("nope") = 1"#,
        &schema(),
    );
    assert!(outcome.plan.is_none());
    let kinds: Vec<ErrorKind> = outcome.errors.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![ErrorKind::NonEditableField, ErrorKind::TypeMismatch, ErrorKind::UnknownField]
    );
    assert!(outcome.errors.iter().all(|e| e.position.is_some()));
}

#[test]
fn test_form_name_is_not_an_id() {
    let outcome = compile(r#"SELECT * FROM "Event signup""#, &schema());
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].kind, ErrorKind::UnknownForm);
}

#[test]
fn test_select_star_expands_data_fields() {
    let outcome = compile(r#"SELECT * FROM "a1b2c3""#, &schema());
    let select = outcome.plan.as_ref().and_then(|p| p.as_select()).unwrap();
    let names: Vec<&str> = select.projections.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains(&"Full name"));
    assert!(names.contains(&"Checked in"));
}

#[cfg(feature = "cli")]
mod cli {
    use super::*;
    use formql::cli::{
        CheckOptions, CheckResult, CliError, RunOptions, execute_check, execute_run, get_doc_category,
        json_to_record, record_to_json,
    };

    const RECORDS: &str = r#"[
        {"submission_id": "s1", "submitted_by": "u1", "submitted_at": "2025-01-10T09:00:00Z",
         "name": "Ada", "guests": 2, "paid": true, "diet": ["vegan"]},
        {"submission_id": "s2", "submitted_by": "u2", "name": "Brook", "guests": 0, "paid": false},
        {"submission_id": "s3", "submitted_by": "u1", "name": "Cy", "guests": "3", "paid": true}
    ]"#;

    fn run(query: &str) -> Result<formql::cli::RunOutput, CliError> {
        execute_run(&RunOptions {
            query: query.to_string(),
            schema: schema(),
            records: Some(RECORDS.to_string()),
            ..RunOptions::default()
        })
    }

    #[test]
    fn test_check_reports_outcome() {
        let result = execute_check(&CheckOptions {
            query: r#"SELECT FIELD("missing") FROM "a1b2c3""#.to_string(),
            schema: schema(),
            ..CheckOptions::default()
        })
        .unwrap();
        assert!(!result.is_ok());
        match result {
            CheckResult::Compiled(outcome) => assert_eq!(outcome.errors[0].kind, ErrorKind::UnknownField),
            CheckResult::SyntaxValid => panic!("Expected a compile outcome"),
        }
    }

    #[test]
    fn test_syntax_only_check_ignores_schema() {
        let options = CheckOptions {
            query: r#"SELECT FIELD("missing") FROM "nowhere""#.to_string(),
            syntax_only: true,
            ..CheckOptions::default()
        };
        assert!(execute_check(&options).unwrap().is_ok());

        let options = CheckOptions {
            query: "SELECT FROM".to_string(),
            syntax_only: true,
            ..CheckOptions::default()
        };
        assert!(matches!(execute_check(&options), Err(CliError::Parse(_))));
    }

    #[test]
    fn test_run_select() {
        let output = run(
            r#"SELECT FIELD("name") AS name, submitted_by FROM "a1b2c3" WHERE FIELD("guests") > 1 ORDER BY name"#,
        )
        .unwrap();
        assert_eq!(
            output.to_json(),
            json!({
                "columns": ["name", "submitted_by"],
                "rows": [
                    { "name": "Ada", "submitted_by": "u1" },
                    { "name": "Cy", "submitted_by": "u1" }
                ]
            })
        );
    }

    #[test]
    fn test_run_update() {
        let output = run(r#"UPDATE FORM "a1b2c3" SET FIELD("guests") = FIELD("guests") + 1 WHERE FIELD("paid")"#).unwrap();
        match &output.result {
            ExecutionResult::Updated(outcome) => {
                assert_eq!(outcome.matched, 2);
                assert_eq!(outcome.succeeded, 2);
            }
            ExecutionResult::Rows(_) => panic!("Expected an update outcome"),
        }
        assert_eq!(output.records[0].get("guests"), number(3));
        assert_eq!(output.records[1].get("guests"), number(0));
        assert_eq!(output.records[2].get("guests"), number(4));
    }

    #[test]
    fn test_run_requires_records() {
        let result = execute_run(&RunOptions {
            query: r#"SELECT * FROM "a1b2c3""#.to_string(),
            schema: schema(),
            ..RunOptions::default()
        });
        assert!(matches!(result, Err(CliError::NoInput)));
    }

    #[test]
    fn test_run_reports_compile_errors() {
        let err = run(r#"SELECT FIELD("nope") FROM "a1b2c3""#).unwrap_err();
        assert!(matches!(err, CliError::Compile(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_record_json_round_trip() {
        let input = json!({
            "submission_id": "s9",
            "submitted_at": "2025-02-01T00:00:00+00:00",
            "guests": 1.5,
            "diet": ["none"]
        });
        let record = json_to_record(input.clone()).unwrap();
        assert_eq!(record.submission_id.as_deref(), Some("s9"));
        assert!(record.submitted_at.is_some());
        assert_eq!(record.get("guests"), Value::Number(Decimal::new(15, 1)));
        assert_eq!(record_to_json(record), input);
    }

    #[test]
    fn test_bad_records_are_rejected() {
        assert!(matches!(json_to_record(json!([1, 2])), Err(CliError::InvalidRecord(_))));
        assert!(matches!(
            json_to_record(json!({ "submitted_at": "yesterday" })),
            Err(CliError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_docs() {
        assert!(get_doc_category("functions").unwrap().contains("DATEDIFF"));
        assert!(matches!(get_doc_category("nonsense"), Err(CliError::UnknownCategory(_))));
    }
}
