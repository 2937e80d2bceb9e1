//! Dynamic query building from filter descriptors
//!
//! A filterable type implements [`FilterDescriptor`], listing one
//! [`FilterField`] per filterable attribute. [`build_query`] walks that list
//! in order and ANDs a predicate onto the context for every field that is
//! present.
//!
//! # Presence
//!
//! Under [`Presence::Legacy`] (the default) a zero value means "not
//! provided": empty strings and lists, numeric zero and the nil UUID are
//! skipped. Booleans are the exception and always apply, so `false` filters
//! just like `true`. This means an explicit `0` cannot be searched for under
//! the legacy rule; use [`Presence::Explicit`] for fields where zero is a
//! meaningful value.
//!
//! # Example
//!
//! ```rust
//! use user_store::query::{build_query, FilterDescriptor, FilterField, FilterOperator, Query};
//!
//! struct ProductFilter {
//!     name: Option<String>,
//!     in_stock: bool,
//! }
//!
//! impl FilterDescriptor for ProductFilter {
//!     fn filter_fields(&self) -> Vec<FilterField> {
//!         vec![
//!             FilterField::optional("name", FilterOperator::ILike, self.name.clone()),
//!             FilterField::new("in_stock", FilterOperator::Equal, self.in_stock),
//!         ]
//!     }
//! }
//!
//! let filter = ProductFilter { name: None, in_stock: false };
//! let query = build_query(Query::new(), &filter);
//! assert_eq!(query.conditions().len(), 1);
//! ```

use super::context::Query;
use super::filter::{FilterOperator, FilterValue, Predicate};

/// Rule deciding whether a provided value produces a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Zero values are treated as absent; booleans always apply
    #[default]
    Legacy,
    /// Any provided value applies, zero included
    Explicit,
}

/// One filterable attribute: column, operator and the provided value
#[derive(Debug, Clone, PartialEq)]
pub struct FilterField {
    /// Target column; an empty column contributes nothing
    pub column: String,
    /// Comparison operator
    pub operator: FilterOperator,
    /// Provided value, `None` when the caller left it out
    pub value: Option<FilterValue>,
    /// Presence rule for the value
    pub presence: Presence,
}

impl FilterField {
    /// A field whose value is always provided
    pub fn new(
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(value.into()),
            presence: Presence::Legacy,
        }
    }

    /// A field whose value may be absent
    pub fn optional<V: Into<FilterValue>>(
        column: impl Into<String>,
        operator: FilterOperator,
        value: Option<V>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.map(Into::into),
            presence: Presence::Legacy,
        }
    }

    /// A field declared with an operator tag such as `"ILIKE"` or `"gte"`
    pub fn tagged<V: Into<FilterValue>>(
        column: impl Into<String>,
        tag: &str,
        value: Option<V>,
    ) -> Self {
        Self::optional(column, FilterOperator::from_tag(tag), value)
    }

    /// Apply the field whenever a value is provided, even a zero value
    #[must_use]
    pub fn explicit(mut self) -> Self {
        self.presence = Presence::Explicit;
        self
    }

    /// Resolve the predicate this field contributes, if any
    pub fn to_predicate(&self) -> Option<Predicate> {
        if self.column.is_empty() {
            return None;
        }
        let value = self.value.as_ref()?;
        let applies = match self.presence {
            Presence::Legacy => value.is_boolean() || !value.is_zero(),
            Presence::Explicit => true,
        };
        if !applies {
            return None;
        }

        let column = self.column.clone();
        match self.operator {
            FilterOperator::Like => Some(Predicate::like(column, format!("%{}%", value))),
            FilterOperator::ILike => Some(Predicate::ilike(column, format!("%{}%", value))),
            FilterOperator::In => match value {
                FilterValue::String(s) => Some(Predicate::new(
                    column,
                    FilterOperator::In,
                    FilterValue::List(s.split(',').map(FilterValue::from).collect()),
                )),
                _ => None,
            },
            FilterOperator::Between => match value {
                FilterValue::List(bounds) if bounds.len() == 2 => Some(Predicate::new(
                    column,
                    FilterOperator::Between,
                    value.clone(),
                )),
                _ => None,
            },
            FilterOperator::IsNull => Some(Predicate::is_null(column)),
            op => Some(Predicate::new(column, op, value.clone())),
        }
    }
}

/// A value that can describe itself as a list of filter fields
pub trait FilterDescriptor {
    /// The filterable fields in declaration order
    fn filter_fields(&self) -> Vec<FilterField>;
}

/// AND a predicate onto `query` for every present field of `filter`
///
/// Fields are applied in declaration order. The returned context is equal to
/// `query` when no field contributes.
pub fn build_query<F>(query: Query, filter: &F) -> Query
where
    F: FilterDescriptor + ?Sized,
{
    filter
        .filter_fields()
        .iter()
        .filter_map(FilterField::to_predicate)
        .fold(query, |query, predicate| {
            tracing::trace!(
                column = %predicate.column,
                operator = %predicate.operator,
                "applying filter predicate"
            );
            query.filter(predicate)
        })
}
