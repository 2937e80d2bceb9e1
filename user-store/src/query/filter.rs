//! Filter predicates and values
//!
//! A [`Predicate`] is one parameterized comparison against a column. A
//! [`RawSql`] fragment is the caller-trusted escape hatch for conditions and
//! join clauses that predicates cannot express. Both combine into a
//! [`Condition`].
//!
//! # Example
//!
//! ```rust
//! use user_store::query::{Condition, Predicate, RawSql};
//!
//! let verified = Condition::all([
//!     Predicate::eq("email", "jane@example.com"),
//!     Predicate::eq("is_verified", true),
//! ]);
//!
//! let raw = RawSql::new("users.email = ? AND users.is_deleted = ?")
//!     .bind("jane@example.com")
//!     .bind(false);
//! # let _ = (verified, raw);
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Comparison operators for predicates
///
/// # Example
///
/// ```rust
/// use user_store::query::FilterOperator;
///
/// assert_eq!(format!("{}", FilterOperator::Equal), "=");
/// assert_eq!(format!("{}", FilterOperator::ILike), "ILIKE");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterOperator {
    /// Equal to (=)
    #[default]
    Equal,
    /// Case-sensitive pattern match (LIKE)
    Like,
    /// Case-insensitive pattern match (ILIKE)
    ILike,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Value is in a list (IN)
    In,
    /// Inclusive range (BETWEEN)
    Between,
    /// Value is null (IS NULL)
    IsNull,
}

impl FilterOperator {
    /// Parse an operator tag such as `"ILIKE"` or `"gte"`
    ///
    /// Tags are case-insensitive. Unrecognized tags, including the empty
    /// tag, mean equality.
    ///
    /// # Example
    ///
    /// ```rust
    /// use user_store::query::FilterOperator;
    ///
    /// assert_eq!(FilterOperator::from_tag("ilike"), FilterOperator::ILike);
    /// assert_eq!(FilterOperator::from_tag("GTE"), FilterOperator::GreaterThanOrEqual);
    /// assert_eq!(FilterOperator::from_tag("whatever"), FilterOperator::Equal);
    /// ```
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "LIKE" => Self::Like,
            "ILIKE" => Self::ILike,
            "GT" => Self::GreaterThan,
            "GTE" => Self::GreaterThanOrEqual,
            "LT" => Self::LessThan,
            "LTE" => Self::LessThanOrEqual,
            "IN" => Self::In,
            "BETWEEN" => Self::Between,
            _ => Self::Equal,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::Like => write!(f, "LIKE"),
            Self::ILike => write!(f, "ILIKE"),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::In => write!(f, "IN"),
            Self::Between => write!(f, "BETWEEN"),
            Self::IsNull => write!(f, "IS NULL"),
        }
    }
}

/// A value that can be compared against a column
///
/// # Example
///
/// ```rust
/// use user_store::query::FilterValue;
///
/// let string_val: FilterValue = "active".into();
/// let int_val: FilterValue = 42_i64.into();
/// let bool_val: FilterValue = true.into();
/// assert!(!bool_val.is_zero());
/// assert!(FilterValue::from("").is_zero());
/// # let _ = (string_val, int_val);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// String value
    String(String),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// UUID value
    Uuid(Uuid),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
    /// List of values (IN lists, BETWEEN bounds)
    List(Vec<FilterValue>),
    /// Null value
    Null,
}

impl FilterValue {
    /// Whether this is its type's zero value
    ///
    /// Empty strings and lists, numeric zero, the nil UUID, the Unix epoch
    /// and `Null` are zero. Booleans are never zero: `false` is a value like
    /// any other.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Integer(n) => *n == 0,
            Self::Float(n) => *n == 0.0,
            Self::Boolean(_) => false,
            Self::Uuid(id) => id.is_nil(),
            Self::Timestamp(ts) => *ts == DateTime::<Utc>::default(),
            Self::List(items) => items.is_empty(),
            Self::Null => true,
        }
    }

    /// Whether this is a boolean
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }

    /// JSON representation, as stored in a row
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Uuid(id) => Value::String(id.to_string()),
            Self::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null => Value::Null,
        }
    }

    /// Convert a key value read from a row back into a filter value
    ///
    /// Strings that parse as UUIDs become [`FilterValue::Uuid`] so they bind
    /// with the column's type.
    pub fn from_key(value: &Value) -> Self {
        match value {
            Value::String(s) => match Uuid::parse_str(s) {
                Ok(id) => Self::Uuid(id),
                Err(_) => Self::String(s.clone()),
            },
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::Bool(b) => Self::Boolean(*b),
            Value::Array(items) => Self::List(items.iter().map(Self::from_key).collect()),
            Value::Null | Value::Object(_) => Self::Null,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Uuid(id) => write!(f, "{}", id),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Null => write!(f, "NULL"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for FilterValue {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for FilterValue {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Uuid> for FilterValue {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(list: Vec<T>) -> Self {
        Self::List(list.into_iter().map(Into::into).collect())
    }
}

/// A single parameterized comparison
///
/// The column is an identifier taken from entity metadata and is rendered
/// as-is; the value is always bound as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// The column to compare, optionally table-qualified
    pub column: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FilterValue,
}

impl Predicate {
    /// Create a new predicate
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    /// Equality (`column = value`)
    pub fn eq(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOperator::Equal, value.into())
    }

    /// Case-sensitive pattern match; `%` and `_` are wildcards
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::Like, FilterValue::String(pattern.into()))
    }

    /// Case-insensitive pattern match
    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::ILike, FilterValue::String(pattern.into()))
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOperator::GreaterThan, value.into())
    }

    /// `column >= value`
    pub fn gte(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOperator::LessThan, value.into())
    }

    /// `column <= value`
    pub fn lte(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOperator::LessThanOrEqual, value.into())
    }

    /// Set membership
    pub fn in_list<T: Into<FilterValue>>(column: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(
            column,
            FilterOperator::In,
            FilterValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Inclusive range
    pub fn between(
        column: impl Into<String>,
        low: impl Into<FilterValue>,
        high: impl Into<FilterValue>,
    ) -> Self {
        Self::new(
            column,
            FilterOperator::Between,
            FilterValue::List(vec![low.into(), high.into()]),
        )
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::IsNull, FilterValue::Null)
    }
}

/// Caller-trusted raw SQL fragment with `?` placeholders
///
/// The fragment is inserted into the statement verbatim. It is never
/// validated or escaped: only the bound arguments are parameterized, so
/// never build the fragment text from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    /// SQL text; each `?` is replaced by the next bound argument
    pub sql: String,
    /// Arguments for the placeholders, in order
    pub args: Vec<FilterValue>,
}

impl RawSql {
    /// Create a fragment without arguments
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// Bind the next placeholder
    #[must_use]
    pub fn bind(mut self, value: impl Into<FilterValue>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Number of `?` placeholders in the text
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// A boolean condition over a row
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Parameterized comparison
    Predicate(Predicate),
    /// Caller-trusted SQL fragment
    Raw(RawSql),
    /// Conjunction; empty means "always true"
    All(Vec<Condition>),
}

impl Condition {
    /// AND together a set of conditions
    pub fn all<I, C>(conditions: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        Self::All(conditions.into_iter().map(Into::into).collect())
    }

    /// Whether this condition contains a raw SQL fragment anywhere
    pub fn has_raw(&self) -> bool {
        match self {
            Self::Predicate(_) => false,
            Self::Raw(_) => true,
            Self::All(items) => items.iter().any(Self::has_raw),
        }
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

impl From<RawSql> for Condition {
    fn from(raw: RawSql) -> Self {
        Self::Raw(raw)
    }
}

impl From<Vec<Predicate>> for Condition {
    fn from(predicates: Vec<Predicate>) -> Self {
        Self::all(predicates)
    }
}
