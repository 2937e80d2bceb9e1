//! Query context
//!
//! [`Query`] accumulates AND-ed conditions, raw join clauses, relation
//! preloads, ordering and limit/offset. Every builder method consumes the
//! context and returns a new one, so a context is owned by one logical query
//! and never mutated behind a caller's back.

use std::fmt;

use super::filter::{Condition, RawSql};

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use user_store::query::OrderDirection;
///
/// assert_eq!(format!("{}", OrderDirection::Ascending), "ASC");
/// assert_eq!(format!("{}", OrderDirection::Descending), "DESC");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "ASC"),
            Self::Descending => write!(f, "DESC"),
        }
    }
}

/// Ordering on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column name, rendered as-is
    pub column: String,
    /// Sort direction
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Ascending order on `column`
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Ascending,
        }
    }

    /// Descending order on `column`
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Descending,
        }
    }

    /// Parse an order clause such as `"id"` or `"created_at desc"`
    ///
    /// Returns `None` for an empty clause.
    ///
    /// # Example
    ///
    /// ```rust
    /// use user_store::query::{OrderBy, OrderDirection};
    ///
    /// let order = OrderBy::parse("created_at DESC").unwrap();
    /// assert_eq!(order.column, "created_at");
    /// assert_eq!(order.direction, OrderDirection::Descending);
    ///
    /// assert!(OrderBy::parse("  ").is_none());
    /// ```
    pub fn parse(clause: &str) -> Option<Self> {
        let mut parts = clause.split_whitespace();
        let column = parts.next()?;
        let direction = match parts.next() {
            Some(dir) if dir.eq_ignore_ascii_case("desc") => OrderDirection::Descending,
            _ => OrderDirection::Ascending,
        };
        Some(Self {
            column: column.to_string(),
            direction,
        })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, self.direction)
    }
}

/// An accumulating, immutable-style query context
///
/// # Example
///
/// ```rust
/// use user_store::query::{OrderBy, Predicate, Query};
///
/// let query = Query::new()
///     .filter(Predicate::eq("is_verified", true))
///     .filter(Predicate::ilike("first_name", "%jan%"))
///     .order_by(OrderBy::desc("created_at"))
///     .limit(10);
///
/// assert_eq!(query.conditions().len(), 2);
/// assert_eq!(query.limit_value(), Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<Condition>,
    joins: Vec<RawSql>,
    preloads: Vec<String>,
    order_by: Option<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    unscoped: bool,
}

impl Query {
    /// An unfiltered query over live rows
    pub fn new() -> Self {
        Self::default()
    }

    /// AND one more condition onto the context
    #[must_use]
    pub fn filter(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Add a raw join clause, applied before the conditions
    #[must_use]
    pub fn join(mut self, clause: RawSql) -> Self {
        self.joins.push(clause);
        self
    }

    /// Eagerly attach a named relation to each result
    #[must_use]
    pub fn preload(mut self, relation: impl Into<String>) -> Self {
        let relation = relation.into();
        if !self.preloads.contains(&relation) {
            self.preloads.push(relation);
        }
        self
    }

    /// Order results; replaces any earlier ordering
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Limit the number of results
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip results
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Include soft-deleted rows
    #[must_use]
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    /// Drop ordering, limit and offset, keeping the filter
    ///
    /// Used to count the rows a paginated query would page over.
    #[must_use]
    pub fn without_window(mut self) -> Self {
        self.order_by = None;
        self.limit = None;
        self.offset = None;
        self
    }

    /// The AND-ed conditions, in application order
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Raw join clauses
    pub fn joins(&self) -> &[RawSql] {
        &self.joins
    }

    /// Relations to preload
    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    /// Current ordering
    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    /// Current limit
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Current offset
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Whether soft-deleted rows are included
    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    /// Whether any condition or join carries raw SQL
    pub fn has_raw_sql(&self) -> bool {
        !self.joins.is_empty() || self.conditions.iter().any(Condition::has_raw)
    }
}
