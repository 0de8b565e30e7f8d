use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A field value flowing through filters, projections and assignments.
///
/// Form submissions are stored as loosely-typed blobs; every value is brought
/// into one of these variants before it reaches the evaluator, and conversions
/// between them happen only through the explicit rules below.
///
/// # Examples
///
/// ```
/// use formql::Value;
/// use rust_decimal::Decimal;
///
/// let price = Value::Number(Decimal::new(1999, 2));
/// assert_eq!(price.to_text(), "19.99");
///
/// // Text that looks like a number coerces when a number is required
/// assert_eq!(Value::Text("42".into()).as_number(), Some(Decimal::from(42)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Missing or empty
    Null,

    /// UTF-8 text
    Text(String),

    /// Exact decimal number
    Number(Decimal),

    Boolean(bool),

    /// Point in time, UTC
    Date(DateTime<Utc>),

    /// Multi-valued answers (checkbox groups, tags)
    List(Vec<Value>),

    /// Composite answers (addresses, file metadata)
    Structured(BTreeMap<String, Value>),
}

/// Static type of an expression, as far as the binder can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    Number,
    Boolean,
    Date,
    List,
    Structured,
    /// Unknown until evaluation; compatible with everything
    Any,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Number | ValueType::Any)
    }

    /// Whether a value of type `source` may be stored in a field of this type.
    pub fn accepts(&self, source: ValueType) -> bool {
        match (self, source) {
            (ValueType::Any, _) | (_, ValueType::Any) => true,
            (target, source) if *target == source => true,
            // Text fields hold the rendering of any scalar
            (ValueType::Text, ValueType::Number | ValueType::Boolean | ValueType::Date) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::List => "list",
            ValueType::Structured => "structured",
            ValueType::Any => "any",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses the date shapes submissions carry: RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// and plain `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Text(_) => ValueType::Text,
            Value::Number(_) => ValueType::Number,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Date(_) => ValueType::Date,
            Value::List(_) => ValueType::List,
            Value::Structured(_) => ValueType::Structured,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            other => other.value_type().name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is truthy (for conditions). NULL is never true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::List(items) => !items.is_empty(),
            Value::Structured(map) => !map.is_empty(),
        }
    }

    /// Numeric view: numbers, and text that parses as a number.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Date view: dates, and text that parses as a date.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Text rendering used for string functions and concatenation.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => n.normalize().to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.to_rfc3339(),
            Value::List(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Structured(map) => map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.to_text()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// SQL comparison. `None` when either side is NULL or the values cannot
    /// be ordered against each other.
    ///
    /// Mixed text/number and text/date pairs are compared in the non-text
    /// domain when the text parses.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Text(_)) => other.as_number().map(|b| a.cmp(&b)),
            (Value::Text(_), Value::Number(b)) => self.as_number().map(|a| a.cmp(b)),
            (Value::Date(a), Value::Text(_)) => other.as_date().map(|b| a.cmp(&b)),
            (Value::Text(_), Value::Date(b)) => self.as_date().map(|a| a.cmp(b)),
            (Value::List(a), Value::List(b)) if a == b => Some(Ordering::Equal),
            (Value::Structured(a), Value::Structured(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Total order for sorting result rows: NULL first, then grouped by
    /// type, then by value within a type.
    ///
    /// Unlike [`Value::compare`] there is no text/number coercion here, which
    /// keeps the order transitive on columns holding mixed types.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Value::Structured(a), Value::Structured(b)) => a
                .iter()
                .zip(b)
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.sort_cmp(vb)))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self.sort_rank().cmp(&other.sort_rank()),
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Number(_) => 2,
            Value::Date(_) => 3,
            Value::Text(_) => 4,
            Value::List(_) => 5,
            Value::Structured(_) => 6,
        }
    }

    /// Whether this value can be written into a field of type `target`.
    pub fn conforms_to(&self, target: ValueType) -> bool {
        match (target, self) {
            (_, Value::Null) | (ValueType::Any, _) => true,
            (ValueType::Number, v) => v.as_number().is_some(),
            (ValueType::Date, v) => v.as_date().is_some(),
            (target, v) => target.accepts(v.value_type()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::Boolean(true) => f.write_str("TRUE"),
            Value::Boolean(false) => f.write_str("FALSE"),
            Value::Date(d) => write!(f, "'{}'", d.to_rfc3339()),
            Value::List(_) | Value::Structured(_) => write!(f, "'{}'", self.to_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i64) -> Value {
        Value::Number(Decimal::from(n))
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_sort_cmp_is_transitive_on_mixed_columns() {
        // compare() would give 5 < "10", "10" < "3" and "3" < 5
        let values = [num(5), text("10"), text("3")];
        for a in &values {
            for b in &values {
                for c in &values {
                    if a.sort_cmp(b).is_le() && b.sort_cmp(c).is_le() {
                        assert!(a.sort_cmp(c).is_le(), "{} <= {} <= {}", a, b, c);
                    }
                }
            }
        }

        let mut column = vec![text("3"), Value::Null, num(5), text("10"), num(-1)];
        column.sort_by(Value::sort_cmp);
        assert_eq!(column, vec![Value::Null, num(-1), num(5), text("10"), text("3")]);
    }

    #[test]
    fn test_sort_cmp_orders_lists_elementwise() {
        let short = Value::List(vec![text("a")]);
        let long = Value::List(vec![text("a"), text("b")]);
        let other = Value::List(vec![text("b")]);
        assert_eq!(short.sort_cmp(&long), Ordering::Less);
        assert_eq!(long.sort_cmp(&other), Ordering::Less);
    }
}
