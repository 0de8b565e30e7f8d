use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::SystemColumn;
use crate::value::Value;

/// One row handed to the evaluator: a form submission, or a row of an
/// internal table.
///
/// Form answers and table columns both live in `values`, keyed by field id or
/// column name. Submission metadata has dedicated slots so it cannot collide
/// with a field that happens to share its name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub submission_id: Option<String>,
    #[serde(default)]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(submission_id: impl Into<String>) -> Self {
        Record {
            submission_id: Some(submission_id.into()),
            ..Record::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Missing keys read as NULL.
    pub fn get(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn system(&self, column: SystemColumn) -> Value {
        match column {
            SystemColumn::SubmissionId => self.submission_id.clone().map_or(Value::Null, Value::Text),
            SystemColumn::SubmittedBy => self.submitted_by.clone().map_or(Value::Null, Value::Text),
            SystemColumn::SubmittedAt => self.submitted_at.map_or(Value::Null, Value::Date),
        }
    }
}
