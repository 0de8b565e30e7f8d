//! In-memory plan execution.
//!
//! A reference executor for compiled plans over records held in memory. Reads
//! are all-or-nothing: the first evaluation error fails the query. Updates
//! are applied record by record, and a record that fails is reported without
//! affecting the others.

use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicBool};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::evaluator::{EvalError, Evaluator};
use crate::plan::{CompiledPlan, OrderTarget, SelectPlan, UpdatePlan};
use crate::record::Record;
use crate::value::{Value, ValueType};

/// Rows produced by a SELECT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Outcome of an UPDATE over a batch of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// Records examined before finishing or being cancelled
    pub processed: usize,
    pub matched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<RecordError>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub submission_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionResult {
    Rows(ResultSet),
    Updated(UpdateOutcome),
}

#[derive(Debug, Clone, Default)]
pub struct Executor {
    evaluator: Evaluator,
}

/// One output row plus the values it sorts by.
struct Row {
    values: Vec<Value>,
    sort_keys: Vec<Value>,
}

impl Executor {
    pub fn new(evaluator: Evaluator) -> Self {
        Executor { evaluator }
    }

    /// Runs any plan. SELECT plans leave `records` untouched.
    pub fn execute(
        &self,
        plan: &CompiledPlan,
        records: &mut [Record],
        cancel: &AtomicBool,
    ) -> Result<ExecutionResult, EvalError> {
        match plan {
            CompiledPlan::Select(select) => Ok(ExecutionResult::Rows(self.select(select, records)?)),
            CompiledPlan::Update(update) => Ok(ExecutionResult::Updated(self.update(update, records, cancel))),
        }
    }

    pub fn select(&self, plan: &SelectPlan, records: &[Record]) -> Result<ResultSet, EvalError> {
        let mut matching = Vec::new();
        for record in records {
            let keep = match &plan.filter {
                Some(filter) => self.evaluator.matches(filter, record)?,
                None => true,
            };
            if keep {
                matching.push(record);
            }
        }

        let mut rows = if plan.aggregated {
            self.grouped_rows(plan, &matching)?
        } else {
            self.plain_rows(plan, &matching)?
        };

        if plan.distinct {
            let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.iter().any(|u| u.values == row.values) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        if !plan.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for (key, (x, y)) in plan.order_by.iter().zip(a.sort_keys.iter().zip(&b.sort_keys)) {
                    let ordering = x.sort_cmp(y);
                    let ordering = if key.descending { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = plan.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        info!(rows = rows.len(), scanned = records.len(), "select executed");
        Ok(ResultSet {
            columns: plan.projections.iter().map(|p| p.name.clone()).collect(),
            rows: rows.into_iter().map(|r| r.values).collect(),
        })
    }

    fn plain_rows(&self, plan: &SelectPlan, records: &[&Record]) -> Result<Vec<Row>, EvalError> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let values = plan
                .projections
                .iter()
                .map(|p| self.evaluator.evaluate(&p.expr, record))
                .collect::<Result<Vec<_>, _>>()?;
            let sort_keys = plan
                .order_by
                .iter()
                .map(|key| match &key.target {
                    OrderTarget::Projection(index) => Ok(values.get(*index).cloned().unwrap_or(Value::Null)),
                    OrderTarget::Expression(expr) => self.evaluator.evaluate(expr, record),
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(Row { values, sort_keys });
        }
        Ok(rows)
    }

    /// Groups keep first-seen order. Keys are matched by a linear scan, so
    /// this is O(rows × groups); `Value` has no hash to key a map with.
    fn grouped_rows(&self, plan: &SelectPlan, records: &[&Record]) -> Result<Vec<Row>, EvalError> {
        let mut groups: Vec<(Vec<Value>, Vec<&Record>)> = Vec::new();
        for record in records {
            let key = plan
                .group_by
                .iter()
                .map(|e| self.evaluator.evaluate(e, record))
                .collect::<Result<Vec<_>, _>>()?;
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(record),
                None => groups.push((key, vec![record])),
            }
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (_, members) in &groups {
            if let Some(having) = &plan.having
                && !self.evaluator.evaluate_group(having, members)?.is_truthy()
            {
                continue;
            }
            let values = plan
                .projections
                .iter()
                .map(|p| self.evaluator.evaluate_group(&p.expr, members))
                .collect::<Result<Vec<_>, _>>()?;
            let sort_keys = plan
                .order_by
                .iter()
                .map(|key| match &key.target {
                    OrderTarget::Projection(index) => Ok(values.get(*index).cloned().unwrap_or(Value::Null)),
                    OrderTarget::Expression(expr) => self.evaluator.evaluate_group(expr, members),
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(Row { values, sort_keys });
        }
        Ok(rows)
    }

    /// Applies an UPDATE to every matching record independently.
    ///
    /// `cancel` is checked between records; a cancelled run leaves the
    /// remaining records untouched and can simply be run again.
    pub fn update(&self, plan: &UpdatePlan, records: &mut [Record], cancel: &AtomicBool) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        for record in records.iter_mut() {
            if cancel.load(atomic::Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }
            outcome.processed += 1;

            if let Some(id) = &plan.submission_id
                && record.submission_id.as_ref() != Some(id)
            {
                continue;
            }

            let matched = match &plan.filter {
                Some(filter) => self.evaluator.matches(filter, record),
                None => Ok(true),
            };
            let result = match matched {
                Ok(false) => continue,
                Ok(true) => {
                    outcome.matched += 1;
                    self.apply(plan, record)
                }
                Err(e) => {
                    outcome.matched += 1;
                    Err(e.to_string())
                }
            };

            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(message) => {
                    warn!(submission_id = ?record.submission_id, %message, "record update failed");
                    outcome.failed += 1;
                    outcome.errors.push(RecordError {
                        submission_id: record.submission_id.clone(),
                        message,
                    });
                }
            }
        }

        info!(
            form_id = %plan.form_id,
            matched = outcome.matched,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            cancelled = outcome.cancelled,
            "update executed"
        );
        outcome
    }

    /// Evaluates every assignment against the record as it was, then writes
    /// them all, or none if any fails.
    fn apply(&self, plan: &UpdatePlan, record: &mut Record) -> Result<(), String> {
        let mut updates = Vec::with_capacity(plan.assignments.len());
        for assignment in &plan.assignments {
            let value = self
                .evaluator
                .evaluate(&assignment.value, record)
                .map_err(|e| format!("field \"{}\": {}", assignment.field_id, e))?;
            let value = coerce(value, assignment.value_type).ok_or_else(|| {
                format!(
                    "field \"{}\": value does not fit type {}",
                    assignment.field_id, assignment.value_type
                )
            })?;
            updates.push((assignment.field_id.clone(), value));
        }
        record.values.extend(updates);
        Ok(())
    }
}

/// Brings a computed value into the storage shape of its target field.
fn coerce(value: Value, target: ValueType) -> Option<Value> {
    if !value.conforms_to(target) {
        return None;
    }
    match target {
        ValueType::Number if matches!(value, Value::Text(_)) => value.as_number().map(Value::Number),
        ValueType::Date if matches!(value, Value::Text(_)) => value.as_date().map(Value::Date),
        ValueType::Text if matches!(value, Value::Number(_) | Value::Boolean(_) | Value::Date(_)) => {
            Some(Value::Text(value.to_text()))
        }
        _ => Some(value),
    }
}
