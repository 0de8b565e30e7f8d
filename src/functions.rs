//! Function registry.
//!
//! Every callable function is described once, here: its category, arity,
//! parameter types, return type and implementation. The binder type-checks
//! calls against these descriptors and the evaluator runs the very same
//! descriptors, so a function cannot be accepted at compile time yet be
//! missing at execution time.
//!
//! `CASE ... WHEN ... END` is a syntax node of its own and is not listed here.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::Datelike;
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde::Serialize;

use crate::evaluator::{CallContext, EvalError};
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Aggregate,
    String,
    Math,
    Date,
    Conditional,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Aggregate => "aggregate",
            Category::String => "string",
            Category::Math => "math",
            Category::Date => "date",
            Category::Conditional => "conditional",
        };
        f.write_str(name)
    }
}

/// Static constraint on one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    Any,
    Numeric,
    /// Any scalar; numbers, booleans and dates are rendered as text
    Text,
    Date,
}

impl ArgType {
    pub fn accepts(&self, ty: ValueType) -> bool {
        match self {
            ArgType::Any => true,
            ArgType::Numeric => ty.is_numeric(),
            ArgType::Text => !matches!(ty, ValueType::List | ValueType::Structured),
            ArgType::Date => matches!(ty, ValueType::Date | ValueType::Any),
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Any => "any value",
            ArgType::Numeric => "numeric",
            ArgType::Text => "text",
            ArgType::Date => "a date",
        };
        f.write_str(name)
    }
}

/// How the result type is derived from the argument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Fixed(ValueType),
    /// Common type of the arguments from this index onward
    CommonFrom(usize),
}

pub type ScalarFn = fn(&[Value], &CallContext) -> Result<Value, EvalError>;
/// Receives a callback evaluating the n-th argument on demand.
pub type LazyFn = fn(&mut dyn FnMut(usize) -> Result<Value, EvalError>, usize) -> Result<Value, EvalError>;
/// Receives the argument evaluated once per row of the group.
pub type AggregateFn = fn(&[Value]) -> Result<Value, EvalError>;

#[derive(Clone, Copy)]
pub enum Implementation {
    Scalar(ScalarFn),
    Lazy(LazyFn),
    Aggregate(AggregateFn),
}

#[derive(Clone, Copy)]
pub struct FunctionDescriptor {
    pub name: &'static str,
    pub category: Category,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    /// Parameter constraints; the last entry repeats for variadic tails
    pub params: &'static [ArgType],
    pub returns: Returns,
    /// Scalar functions returning NULL whenever an argument is NULL
    pub strict: bool,
    /// False for functions whose result depends on the clock
    pub deterministic: bool,
    /// Whether `*` is a valid argument (only `COUNT(*)`)
    pub accepts_star: bool,
    pub implementation: Implementation,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

impl FunctionDescriptor {
    pub fn is_aggregate(&self) -> bool {
        self.category == Category::Aggregate
    }

    pub fn param(&self, index: usize) -> ArgType {
        self.params
            .get(index)
            .or(self.params.last())
            .copied()
            .unwrap_or(ArgType::Any)
    }

    pub fn accepts_arity(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Human-readable arity, e.g. `1`, `1-2`, `1+`.
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{}-{}", self.min_args, max),
            None => format!("{}+", self.min_args),
        }
    }

    pub fn return_type(&self, arg_types: &[ValueType]) -> ValueType {
        match self.returns {
            Returns::Fixed(ty) => ty,
            Returns::CommonFrom(start) => common_type(arg_types.iter().skip(start).copied()),
        }
    }
}

/// The single shared type of a set of expressions; `Any` when they disagree.
pub fn common_type(types: impl IntoIterator<Item = ValueType>) -> ValueType {
    let mut common = None;
    for ty in types {
        if ty == ValueType::Any {
            continue;
        }
        match common {
            None => common = Some(ty),
            Some(existing) if existing == ty => {}
            Some(_) => return ValueType::Any,
        }
    }
    common.unwrap_or(ValueType::Any)
}

const fn scalar(
    name: &'static str,
    category: Category,
    min_args: usize,
    max_args: usize,
    params: &'static [ArgType],
    returns: ValueType,
    implementation: ScalarFn,
) -> FunctionDescriptor {
    FunctionDescriptor {
        name,
        category,
        min_args,
        max_args: Some(max_args),
        params,
        returns: Returns::Fixed(returns),
        strict: true,
        deterministic: true,
        accepts_star: false,
        implementation: Implementation::Scalar(implementation),
    }
}

const fn aggregate(
    name: &'static str,
    param: &'static [ArgType],
    implementation: AggregateFn,
) -> FunctionDescriptor {
    FunctionDescriptor {
        name,
        category: Category::Aggregate,
        min_args: 1,
        max_args: Some(1),
        params: param,
        returns: Returns::Fixed(ValueType::Number),
        strict: false,
        deterministic: true,
        accepts_star: false,
        implementation: Implementation::Aggregate(implementation),
    }
}

const fn conditional(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    returns: Returns,
    implementation: LazyFn,
) -> FunctionDescriptor {
    FunctionDescriptor {
        name,
        category: Category::Conditional,
        min_args,
        max_args,
        params: &[ArgType::Any],
        returns,
        strict: false,
        deterministic: true,
        accepts_star: false,
        implementation: Implementation::Lazy(implementation),
    }
}

use ArgType::{Any, Date, Numeric, Text};

/// Every function the language knows, in documentation order.
pub static FUNCTIONS: &[FunctionDescriptor] = &[
    // Aggregate
    FunctionDescriptor {
        accepts_star: true,
        ..aggregate("COUNT", &[Any], agg_count)
    },
    aggregate("SUM", &[Numeric], agg_sum),
    aggregate("AVG", &[Numeric], agg_avg),
    aggregate("MIN", &[Numeric], agg_min),
    aggregate("MAX", &[Numeric], agg_max),
    // String
    scalar("UPPER", Category::String, 1, 1, &[Text], ValueType::Text, fn_upper),
    scalar("LOWER", Category::String, 1, 1, &[Text], ValueType::Text, fn_lower),
    FunctionDescriptor {
        max_args: None,
        strict: false,
        ..scalar("CONCAT", Category::String, 1, 1, &[Any], ValueType::Text, fn_concat)
    },
    scalar("LENGTH", Category::String, 1, 1, &[Text], ValueType::Number, fn_length),
    scalar("TRIM", Category::String, 1, 1, &[Text], ValueType::Text, fn_trim),
    scalar(
        "SUBSTRING",
        Category::String,
        2,
        3,
        &[Text, Numeric, Numeric],
        ValueType::Text,
        fn_substring,
    ),
    scalar(
        "REPLACE",
        Category::String,
        3,
        3,
        &[Text, Text, Text],
        ValueType::Text,
        fn_replace,
    ),
    scalar("LEFT", Category::String, 2, 2, &[Text, Numeric], ValueType::Text, fn_left),
    scalar("RIGHT", Category::String, 2, 2, &[Text, Numeric], ValueType::Text, fn_right),
    // Math
    scalar("ROUND", Category::Math, 1, 2, &[Numeric, Numeric], ValueType::Number, fn_round),
    scalar("ABS", Category::Math, 1, 1, &[Numeric], ValueType::Number, fn_abs),
    scalar("CEIL", Category::Math, 1, 1, &[Numeric], ValueType::Number, fn_ceil),
    scalar("FLOOR", Category::Math, 1, 1, &[Numeric], ValueType::Number, fn_floor),
    scalar("MOD", Category::Math, 2, 2, &[Numeric, Numeric], ValueType::Number, fn_mod),
    scalar("SQRT", Category::Math, 1, 1, &[Numeric], ValueType::Number, fn_sqrt),
    scalar("POWER", Category::Math, 2, 2, &[Numeric, Numeric], ValueType::Number, fn_power),
    // Date
    FunctionDescriptor {
        deterministic: false,
        ..scalar("NOW", Category::Date, 0, 0, &[], ValueType::Date, fn_now)
    },
    scalar("YEAR", Category::Date, 1, 1, &[Date], ValueType::Number, fn_year),
    scalar("MONTH", Category::Date, 1, 1, &[Date], ValueType::Number, fn_month),
    scalar("DAY", Category::Date, 1, 1, &[Date], ValueType::Number, fn_day),
    scalar("DATEDIFF", Category::Date, 2, 2, &[Date, Date], ValueType::Number, fn_datediff),
    // Conditional
    conditional("IF", 3, Some(3), Returns::CommonFrom(1), cond_if),
    conditional("COALESCE", 1, None, Returns::CommonFrom(0), cond_coalesce),
    conditional("IFNULL", 2, Some(2), Returns::CommonFrom(0), cond_ifnull),
];

static INDEX: LazyLock<HashMap<&'static str, &'static FunctionDescriptor>> =
    LazyLock::new(|| FUNCTIONS.iter().map(|f| (f.name, f)).collect());

/// Finds a function by name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static FunctionDescriptor> {
    INDEX.get(name.to_ascii_uppercase().as_str()).copied()
}

pub fn is_aggregate(name: &str) -> bool {
    lookup(name).is_some_and(|f| f.is_aggregate())
}

// ========================================
// Argument helpers
// ========================================

fn number_arg(name: &str, args: &[Value], index: usize) -> Result<Decimal, EvalError> {
    let value = &args[index];
    value.as_number().ok_or_else(|| {
        EvalError::TypeError(format!(
            "{}() expects a number for argument {}, got {}",
            name,
            index + 1,
            value.type_name()
        ))
    })
}

fn int_arg(name: &str, args: &[Value], index: usize) -> Result<i64, EvalError> {
    number_arg(name, args, index)?
        .trunc()
        .to_i64()
        .ok_or_else(|| EvalError::TypeError(format!("{}() argument {} is out of range", name, index + 1)))
}

fn date_arg(name: &str, args: &[Value], index: usize) -> Result<chrono::DateTime<chrono::Utc>, EvalError> {
    let value = &args[index];
    value.as_date().ok_or_else(|| {
        EvalError::TypeError(format!(
            "{}() expects a date for argument {}, got {}",
            name,
            index + 1,
            value.type_name()
        ))
    })
}

fn text(value: String) -> Result<Value, EvalError> {
    Ok(Value::Text(value))
}

fn number(value: Decimal) -> Result<Value, EvalError> {
    Ok(Value::Number(value))
}

fn from_f64(value: f64) -> Value {
    if value.is_finite() {
        Decimal::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

// ========================================
// String functions
// ========================================

fn fn_upper(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    text(args[0].to_text().to_uppercase())
}

fn fn_lower(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    text(args[0].to_text().to_lowercase())
}

/// NULL arguments are skipped rather than nulling the whole result.
fn fn_concat(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    text(args.iter().filter(|v| !v.is_null()).map(Value::to_text).collect())
}

fn fn_length(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    number(Decimal::from(args[0].to_text().chars().count()))
}

fn fn_trim(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    text(args[0].to_text().trim().to_string())
}

/// 1-based start; a negative start counts back from the end.
fn fn_substring(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let chars: Vec<char> = args[0].to_text().chars().collect();
    let total = chars.len() as i64;
    let start = int_arg("SUBSTRING", args, 1)?;

    let begin = match start {
        s if s > 0 => s - 1,
        s if s < 0 => total + s,
        _ => return text(String::new()),
    };
    if begin < 0 || begin >= total {
        return text(String::new());
    }

    let length = match args.get(2) {
        Some(_) => int_arg("SUBSTRING", args, 2)?,
        None => total - begin,
    };
    if length <= 0 {
        return text(String::new());
    }

    let end = begin.saturating_add(length).min(total);
    text(chars[begin as usize..end as usize].iter().collect())
}

fn fn_replace(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let source = args[0].to_text();
    let from = args[1].to_text();
    if from.is_empty() {
        return text(source);
    }
    text(source.replace(&from, &args[2].to_text()))
}

fn fn_left(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let count = int_arg("LEFT", args, 1)?;
    if count <= 0 {
        return text(String::new());
    }
    text(args[0].to_text().chars().take(count as usize).collect())
}

fn fn_right(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let count = int_arg("RIGHT", args, 1)?;
    if count <= 0 {
        return text(String::new());
    }
    let chars: Vec<char> = args[0].to_text().chars().collect();
    let skip = chars.len().saturating_sub(count as usize);
    text(chars[skip..].iter().collect())
}

// ========================================
// Math functions
// ========================================

/// Half away from zero; a negative precision rounds to tens, hundreds, ...
fn fn_round(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let x = number_arg("ROUND", args, 0)?;
    let places = match args.get(1) {
        Some(_) => int_arg("ROUND", args, 1)?,
        None => 0,
    };

    if places >= 0 {
        let dp = places.min(28) as u32;
        return number(x.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero));
    }

    let exponent = places.unsigned_abs();
    if exponent > 27 {
        return number(Decimal::ZERO);
    }
    let factor = Decimal::from_i128_with_scale(10i128.pow(exponent as u32), 0);
    let rounded = x
        .checked_div(factor)
        .map(|q| q.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|q| q.checked_mul(factor));
    Ok(rounded.map(Value::Number).unwrap_or(Value::Null))
}

fn fn_abs(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    number(number_arg("ABS", args, 0)?.abs())
}

fn fn_ceil(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    number(number_arg("CEIL", args, 0)?.ceil())
}

fn fn_floor(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    number(number_arg("FLOOR", args, 0)?.floor())
}

/// Remainder takes the sign of the dividend; a zero divisor yields NULL.
fn fn_mod(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let a = number_arg("MOD", args, 0)?;
    let b = number_arg("MOD", args, 1)?;
    if b.is_zero() {
        return Ok(Value::Null);
    }
    Ok(a.checked_rem(b).map(Value::Number).unwrap_or(Value::Null))
}

fn fn_sqrt(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let x = number_arg("SQRT", args, 0)?;
    if x.is_sign_negative() && !x.is_zero() {
        return Ok(Value::Null);
    }
    Ok(x.to_f64().map(|f| from_f64(f.sqrt())).unwrap_or(Value::Null))
}

/// Exact for integral exponents up to 64 in magnitude, floating point
/// otherwise.
fn fn_power(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let base = number_arg("POWER", args, 0)?;
    let exponent = number_arg("POWER", args, 1)?;

    if exponent.fract().is_zero()
        && let Some(e) = exponent.to_i64()
        && e.unsigned_abs() <= 64
    {
        let mut result = Some(Decimal::ONE);
        for _ in 0..e.unsigned_abs() {
            result = result.and_then(|r| r.checked_mul(base));
        }
        let result = if e < 0 {
            result.and_then(|r| Decimal::ONE.checked_div(r))
        } else {
            result
        };
        if let Some(r) = result {
            return number(r);
        }
    }

    match (base.to_f64(), exponent.to_f64()) {
        (Some(b), Some(e)) => Ok(from_f64(b.powf(e))),
        _ => Ok(Value::Null),
    }
}

// ========================================
// Date functions
// ========================================

fn fn_now(_: &[Value], ctx: &CallContext) -> Result<Value, EvalError> {
    Ok(Value::Date(ctx.now))
}

fn fn_year(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    number(Decimal::from(date_arg("YEAR", args, 0)?.year()))
}

fn fn_month(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    number(Decimal::from(date_arg("MONTH", args, 0)?.month()))
}

fn fn_day(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    number(Decimal::from(date_arg("DAY", args, 0)?.day()))
}

/// Whole calendar days from the second date to the first.
fn fn_datediff(args: &[Value], _: &CallContext) -> Result<Value, EvalError> {
    let a = date_arg("DATEDIFF", args, 0)?.date_naive();
    let b = date_arg("DATEDIFF", args, 1)?.date_naive();
    number(Decimal::from((a - b).num_days()))
}

// ========================================
// Conditional functions
// ========================================

fn cond_if(
    arg: &mut dyn FnMut(usize) -> Result<Value, EvalError>,
    _: usize,
) -> Result<Value, EvalError> {
    if arg(0)?.is_truthy() { arg(1) } else { arg(2) }
}

fn cond_coalesce(
    arg: &mut dyn FnMut(usize) -> Result<Value, EvalError>,
    count: usize,
) -> Result<Value, EvalError> {
    for index in 0..count {
        let value = arg(index)?;
        if !value.is_null() {
            return Ok(value);
        }
    }
    Ok(Value::Null)
}

fn cond_ifnull(
    arg: &mut dyn FnMut(usize) -> Result<Value, EvalError>,
    _: usize,
) -> Result<Value, EvalError> {
    let value = arg(0)?;
    if value.is_null() { arg(1) } else { Ok(value) }
}

// ========================================
// Aggregates
// ========================================

fn agg_count(values: &[Value]) -> Result<Value, EvalError> {
    number(Decimal::from(values.iter().filter(|v| !v.is_null()).count()))
}

fn numeric_values(name: &str, values: &[Value]) -> Result<Vec<Decimal>, EvalError> {
    values
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| {
            v.as_number().ok_or_else(|| {
                EvalError::TypeError(format!("{}() requires numeric values, got {}", name, v.type_name()))
            })
        })
        .collect()
}

fn checked_sum(numbers: &[Decimal]) -> Result<Decimal, EvalError> {
    numbers.iter().try_fold(Decimal::ZERO, |acc, n| {
        acc.checked_add(*n)
            .ok_or_else(|| EvalError::TypeError("numeric overflow in SUM()".to_string()))
    })
}

fn agg_sum(values: &[Value]) -> Result<Value, EvalError> {
    let numbers = numeric_values("SUM", values)?;
    if numbers.is_empty() {
        return Ok(Value::Null);
    }
    number(checked_sum(&numbers)?)
}

fn agg_avg(values: &[Value]) -> Result<Value, EvalError> {
    let numbers = numeric_values("AVG", values)?;
    if numbers.is_empty() {
        return Ok(Value::Null);
    }
    let total = checked_sum(&numbers)?;
    Ok(total
        .checked_div(Decimal::from(numbers.len()))
        .map(Value::Number)
        .unwrap_or(Value::Null))
}

fn agg_min(values: &[Value]) -> Result<Value, EvalError> {
    let numbers = numeric_values("MIN", values)?;
    Ok(numbers.into_iter().min().map(Value::Number).unwrap_or(Value::Null))
}

fn agg_max(values: &[Value]) -> Result<Value, EvalError> {
    let numbers = numeric_values("MAX", values)?;
    Ok(numbers.into_iter().max().map(Value::Number).unwrap_or(Value::Null))
}
