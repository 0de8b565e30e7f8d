//! Schema snapshot consumed by a single compile call.
//!
//! Snapshots are plain values handed in by the caller. Nothing in this crate
//! caches or mutates them, so a plan is only valid against the snapshot it
//! was compiled with.
//!
//! Two namespaces are kept apart here and in the binder: user forms, whose
//! fields are addressed with `FIELD("id")`, and a compiled-in whitelist of
//! internal tables addressed with bare column names.

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default)]
    pub forms: Vec<Form>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_editable")]
    pub editable: bool,
}

fn default_editable() -> bool {
    true
}

/// Field types produced by the form builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Url,
    Phone,
    Select,
    Radio,
    Number,
    Currency,
    Rating,
    Slider,
    Checkbox,
    Toggle,
    Date,
    Datetime,
    Time,
    MultiSelect,
    Checkboxes,
    File,
    Signature,
    Address,
    /// Formula over other fields
    Calculated,
    /// Value pulled from another form
    Lookup,
    Section,
    Heading,
    Divider,
    PageBreak,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    pub fn value_type(&self) -> ValueType {
        match self {
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Email
            | FieldType::Url
            | FieldType::Phone
            | FieldType::Select
            | FieldType::Radio
            | FieldType::Time => ValueType::Text,
            FieldType::Number | FieldType::Currency | FieldType::Rating | FieldType::Slider => {
                ValueType::Number
            }
            FieldType::Checkbox | FieldType::Toggle => ValueType::Boolean,
            FieldType::Date | FieldType::Datetime => ValueType::Date,
            FieldType::MultiSelect | FieldType::Checkboxes => ValueType::List,
            FieldType::File | FieldType::Signature | FieldType::Address => ValueType::Structured,
            FieldType::Calculated
            | FieldType::Lookup
            | FieldType::Section
            | FieldType::Heading
            | FieldType::Divider
            | FieldType::PageBreak
            | FieldType::Unknown => ValueType::Any,
        }
    }

    /// Computed, cross-reference and layout-only fields are never writable,
    /// whatever their `editable` flag says.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            FieldType::Calculated
                | FieldType::Lookup
                | FieldType::Section
                | FieldType::Heading
                | FieldType::Divider
                | FieldType::PageBreak
        )
    }

    /// Layout elements are part of the form definition but never hold an
    /// answer.
    pub fn holds_data(&self) -> bool {
        !matches!(
            self,
            FieldType::Section | FieldType::Heading | FieldType::Divider | FieldType::PageBreak
        )
    }
}

impl Field {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            id: id.into(),
            label: label.into(),
            field_type,
            editable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn is_editable(&self) -> bool {
        self.editable && !self.field_type.is_read_only()
    }

    pub fn value_type(&self) -> ValueType {
        self.field_type.value_type()
    }
}

impl Form {
    pub fn new(id: impl Into<String>, name: impl Into<String>, fields: Vec<Field>) -> Self {
        Form {
            id: id.into(),
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }
}

impl SchemaSnapshot {
    pub fn new(forms: Vec<Form>) -> Self {
        SchemaSnapshot { forms }
    }

    pub fn form(&self, id: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.id == id)
    }
}

/// Columns present on every form submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemColumn {
    SubmissionId,
    SubmittedBy,
    SubmittedAt,
}

impl SystemColumn {
    pub const ALL: [SystemColumn; 3] = [
        SystemColumn::SubmissionId,
        SystemColumn::SubmittedBy,
        SystemColumn::SubmittedAt,
    ];

    pub fn lookup(name: &str) -> Option<SystemColumn> {
        SystemColumn::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SystemColumn::SubmissionId => "submission_id",
            SystemColumn::SubmittedBy => "submitted_by",
            SystemColumn::SubmittedAt => "submitted_at",
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            SystemColumn::SubmissionId | SystemColumn::SubmittedBy => ValueType::Text,
            SystemColumn::SubmittedAt => ValueType::Date,
        }
    }
}

/// A whitelisted administrative table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalTable {
    pub name: &'static str,
    pub columns: &'static [(&'static str, ValueType)],
}

impl InternalTable {
    pub fn lookup(name: &str) -> Option<&'static InternalTable> {
        INTERNAL_TABLES
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Canonical column name and type.
    pub fn column(&self, name: &str) -> Option<(&'static str, ValueType)> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .copied()
    }
}

/// The only internal tables a query may read.
pub static INTERNAL_TABLES: &[InternalTable] = &[
    InternalTable {
        name: "user_profiles",
        columns: &[
            ("id", ValueType::Text),
            ("organization_id", ValueType::Text),
            ("email", ValueType::Text),
            ("full_name", ValueType::Text),
            ("role", ValueType::Text),
            ("created_at", ValueType::Date),
        ],
    },
    InternalTable {
        name: "organizations",
        columns: &[
            ("id", ValueType::Text),
            ("name", ValueType::Text),
            ("slug", ValueType::Text),
            ("created_at", ValueType::Date),
        ],
    },
    InternalTable {
        name: "forms",
        columns: &[
            ("id", ValueType::Text),
            ("organization_id", ValueType::Text),
            ("name", ValueType::Text),
            ("created_by", ValueType::Text),
            ("created_at", ValueType::Date),
            ("updated_at", ValueType::Date),
        ],
    },
    InternalTable {
        name: "form_submissions",
        columns: &[
            ("id", ValueType::Text),
            ("form_id", ValueType::Text),
            ("submitted_by", ValueType::Text),
            ("submitted_at", ValueType::Date),
            ("status", ValueType::Text),
        ],
    },
];
