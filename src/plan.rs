//! Compiled plans.
//!
//! A plan is the only artifact the executor sees. It carries no parser state:
//! every reference is resolved, LIMIT is already clamped and ORDER BY aliases
//! point at projection slots. Plans serialize to JSON so they can be handed to
//! another process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expression::Expression;
use crate::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanMode {
    Select,
    /// Targets exactly one submission by id
    UpdateSingle,
    /// Targets every submission matching a filter
    UpdateBulk,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanMode::Select => "select",
            PlanMode::UpdateSingle => "update-single",
            PlanMode::UpdateBulk => "update-bulk",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "statement", rename_all = "snake_case")]
pub enum CompiledPlan {
    Select(SelectPlan),
    Update(UpdatePlan),
}

impl CompiledPlan {
    pub fn mode(&self) -> PlanMode {
        match self {
            CompiledPlan::Select(_) => PlanMode::Select,
            CompiledPlan::Update(u) if u.bulk => PlanMode::UpdateBulk,
            CompiledPlan::Update(_) => PlanMode::UpdateSingle,
        }
    }

    pub fn as_select(&self) -> Option<&SelectPlan> {
        match self {
            CompiledPlan::Select(s) => Some(s),
            CompiledPlan::Update(_) => None,
        }
    }

    pub fn as_update(&self) -> Option<&UpdatePlan> {
        match self {
            CompiledPlan::Update(u) => Some(u),
            CompiledPlan::Select(_) => None,
        }
    }
}

/// Where rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanSource {
    Form { id: String, name: String },
    Table { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPlan {
    pub source: PlanSource,
    pub distinct: bool,
    pub projections: Vec<Projection>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<u64>,
    /// Rows are folded into groups by the GROUP BY keys
    pub aggregated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Output column name
    pub name: String,
    pub value_type: ValueType,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub target: OrderTarget,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTarget {
    /// Index into [`SelectPlan::projections`]
    Projection(usize),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub form_id: String,
    pub assignments: Vec<PlanAssignment>,
    pub filter: Option<Expression>,
    pub bulk: bool,
    /// Set for single-record updates
    pub submission_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAssignment {
    pub field_id: String,
    /// Type of the target field; results are checked against it per record
    pub value_type: ValueType,
    pub value: Expression,
}
