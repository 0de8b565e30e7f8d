//! Compile a query and execute it over records read from JSON

use std::sync::atomic::AtomicBool;

use serde_json::json;

use super::{CliError, json_to_record, record_to_json, value_to_json};
use crate::compiler::Compiler;
use crate::config::CompilerConfig;
use crate::evaluator::Evaluator;
use crate::executor::{ExecutionResult, Executor};
use crate::record::Record;
use crate::schema::SchemaSnapshot;

/// Options for the run command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub query: String,
    pub schema: SchemaSnapshot,
    pub config: CompilerConfig,
    /// JSON array of flat record objects
    pub records: Option<String>,
}

#[derive(Debug)]
pub struct RunOutput {
    pub result: ExecutionResult,
    /// Records after execution; differ from the input only for UPDATE
    pub records: Vec<Record>,
}

impl RunOutput {
    /// Plain JSON rendering: rows as objects keyed by column name, or the
    /// update outcome alongside the updated records.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.result {
            ExecutionResult::Rows(set) => {
                let rows: Vec<serde_json::Value> = set
                    .rows
                    .iter()
                    .map(|row| {
                        let obj: serde_json::Map<_, _> = set
                            .columns
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned().map(value_to_json))
                            .collect();
                        serde_json::Value::Object(obj)
                    })
                    .collect();
                json!({ "columns": set.columns, "rows": rows })
            }
            ExecutionResult::Updated(outcome) => json!({
                "outcome": outcome,
                "records": self.records.iter().cloned().map(record_to_json).collect::<Vec<_>>(),
            }),
        }
    }
}

pub fn execute_run(options: &RunOptions) -> Result<RunOutput, CliError> {
    let plan = Compiler::new(options.config.clone())
        .compile(&options.query, &options.schema)
        .into_result()
        .map_err(CliError::Compile)?;

    let input = options.records.as_ref().ok_or(CliError::NoInput)?;
    let serde_json::Value::Array(items) = serde_json::from_str(input)? else {
        return Err(CliError::InvalidRecord("expected a JSON array of records".to_string()));
    };
    let mut records = items
        .into_iter()
        .map(json_to_record)
        .collect::<Result<Vec<_>, _>>()?;

    let executor = Executor::new(Evaluator::new());
    let result = executor.execute(&plan, &mut records, &AtomicBool::new(false))?;
    Ok(RunOutput { result, records })
}
