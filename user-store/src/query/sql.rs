//! Rendering query contexts as PostgreSQL
//!
//! Column and table names come from entity metadata and are written as-is;
//! every value is a bind parameter. Raw fragments have their `?`
//! placeholders replaced by bind parameters in order.
//!
//! Text values compared against a named column are converted with that
//! column's type, so `"42"` matches a `bigint` column and `"1,2"` split into
//! an `IN` list matches numeric or uuid columns.

use sqlx::{Postgres, QueryBuilder};

use super::context::Query;
use super::filter::{Condition, FilterOperator, FilterValue, Predicate, RawSql};
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult, DELETED_AT_COLUMN};

/// Append a bound value; lists expand to a comma-separated parameter list
pub fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::String(s) => {
            qb.push_bind(s.clone());
        }
        FilterValue::Integer(n) => {
            qb.push_bind(*n);
        }
        FilterValue::Float(n) => {
            qb.push_bind(*n);
        }
        FilterValue::Boolean(b) => {
            qb.push_bind(*b);
        }
        FilterValue::Uuid(id) => {
            qb.push_bind(*id);
        }
        FilterValue::Timestamp(ts) => {
            qb.push_bind(*ts);
        }
        FilterValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, item);
            }
        }
        FilterValue::Null => {
            qb.push("NULL");
        }
    }
}

/// Append a raw fragment, binding its arguments in place of `?`
pub fn push_raw(
    qb: &mut QueryBuilder<'static, Postgres>,
    raw: &RawSql,
    operation: RepositoryOperation,
) -> RepositoryResult<()> {
    if raw.placeholder_count() != raw.args.len() {
        return Err(RepositoryError::validation_failed(
            operation,
            format!(
                "raw SQL has {} placeholders but {} arguments",
                raw.placeholder_count(),
                raw.args.len()
            ),
        ));
    }

    let mut args = raw.args.iter();
    let mut pieces = raw.sql.split('?').peekable();
    while let Some(piece) = pieces.next() {
        qb.push(piece);
        if pieces.peek().is_some() {
            if let Some(arg) = args.next() {
                push_value(qb, arg);
            }
        }
    }
    Ok(())
}

/// Table and bare column name of `column` when it is a plain identifier,
/// optionally qualified; bare names belong to `table`
fn column_target<'a>(column: &'a str, table: &'a str) -> Option<(&'a str, &'a str)> {
    fn plain(ident: &str) -> bool {
        let mut chars = ident.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    let (owner, name) = column.rsplit_once('.').unwrap_or((table, column));
    (plain(name) && owner.split('.').all(plain)).then_some((owner, name))
}

/// Append a value compared against `target`
///
/// Text is bound as `text` and read back through the column's own type via
/// `jsonb_populate_record`; other values bind with their native type.
fn push_operand(
    qb: &mut QueryBuilder<'static, Postgres>,
    target: Option<(&str, &str)>,
    value: &FilterValue,
) {
    match (value, target) {
        (FilterValue::String(s), Some((owner, name))) => {
            qb.push(format!(
                "(jsonb_populate_record(NULL::{owner}, jsonb_build_object('{name}', "
            ));
            qb.push_bind(s.clone());
            qb.push(format!("::text))).{name}"));
        }
        (FilterValue::List(items), _) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_operand(qb, target, item);
            }
        }
        _ => push_value(qb, value),
    }
}

fn push_predicate(qb: &mut QueryBuilder<'static, Postgres>, table: &str, predicate: &Predicate) {
    let column = predicate.column.as_str();
    let target = column_target(column, table);
    match (&predicate.operator, &predicate.value) {
        (FilterOperator::IsNull, _) => {
            qb.push(column).push(" IS NULL");
        }
        (FilterOperator::In, FilterValue::List(items)) if items.is_empty() => {
            qb.push("FALSE");
        }
        (FilterOperator::In, value) => {
            qb.push(column).push(" IN (");
            push_operand(qb, target, value);
            qb.push(")");
        }
        (FilterOperator::Between, FilterValue::List(bounds)) if bounds.len() == 2 => {
            qb.push(column).push(" BETWEEN ");
            push_operand(qb, target, &bounds[0]);
            qb.push(" AND ");
            push_operand(qb, target, &bounds[1]);
        }
        (FilterOperator::Between, _) => {
            qb.push("FALSE");
        }
        (_, FilterValue::Null) => {
            qb.push("FALSE");
        }
        (op @ (FilterOperator::Like | FilterOperator::ILike), value) => {
            qb.push(column).push(format!(" {} ", op));
            push_value(qb, value);
        }
        (op, value) => {
            qb.push(column).push(format!(" {} ", op));
            push_operand(qb, target, value);
        }
    }
}

/// Append one condition
///
/// Bare column names in predicates belong to `table`.
pub fn push_condition(
    qb: &mut QueryBuilder<'static, Postgres>,
    table: &str,
    condition: &Condition,
    operation: RepositoryOperation,
) -> RepositoryResult<()> {
    match condition {
        Condition::Predicate(predicate) => push_predicate(qb, table, predicate),
        Condition::Raw(raw) => {
            qb.push("(");
            push_raw(qb, raw, operation)?;
            qb.push(")");
        }
        Condition::All(items) if items.is_empty() => {
            qb.push("TRUE");
        }
        Condition::All(items) => {
            qb.push("(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    qb.push(" AND ");
                }
                push_condition(qb, table, item, operation)?;
            }
            qb.push(")");
        }
    }
    Ok(())
}

/// Append the joins of `query`
pub fn push_joins(
    qb: &mut QueryBuilder<'static, Postgres>,
    query: &Query,
    operation: RepositoryOperation,
) -> RepositoryResult<()> {
    for join in query.joins() {
        qb.push(" ");
        push_raw(qb, join, operation)?;
    }
    Ok(())
}

/// Append the `WHERE` clause: the soft-delete scope plus every condition
pub fn push_where(
    qb: &mut QueryBuilder<'static, Postgres>,
    table: &str,
    query: &Query,
    operation: RepositoryOperation,
) -> RepositoryResult<()> {
    let mut first = true;
    let mut next = |qb: &mut QueryBuilder<'static, Postgres>| {
        qb.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    if !query.is_unscoped() {
        next(qb);
        qb.push(format!("{}.{} IS NULL", table, DELETED_AT_COLUMN));
    }
    for condition in query.conditions() {
        next(qb);
        push_condition(qb, table, condition, operation)?;
    }
    Ok(())
}

/// Append ordering, limit and offset
pub fn push_window(qb: &mut QueryBuilder<'static, Postgres>, query: &Query) {
    if let Some(order) = query.ordering() {
        qb.push(format!(" ORDER BY {} {}", order.column, order.direction));
    }
    if let Some(limit) = query.limit_value() {
        qb.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(offset) = query.offset_value() {
        qb.push(" OFFSET ").push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
}

/// `SELECT to_jsonb(table.*) FROM table ...` for `query`
pub fn select_rows(table: &str, query: &Query) -> RepositoryResult<QueryBuilder<'static, Postgres>> {
    let operation = RepositoryOperation::FindAll;
    let mut qb = QueryBuilder::new(format!("SELECT to_jsonb({table}.*) FROM {table}"));
    push_joins(&mut qb, query, operation)?;
    push_where(&mut qb, table, query, operation)?;
    push_window(&mut qb, query);
    Ok(qb)
}

/// `SELECT COUNT(*) FROM table ...` for `query`
pub fn count_rows(table: &str, query: &Query) -> RepositoryResult<QueryBuilder<'static, Postgres>> {
    let operation = RepositoryOperation::Count;
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"));
    push_joins(&mut qb, query, operation)?;
    push_where(&mut qb, table, query, operation)?;
    Ok(qb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, Predicate};

    #[test]
    fn test_select_with_scope_and_predicates() {
        let query = Query::new()
            .filter(Predicate::eq("email", "a@b.c"))
            .filter(Predicate::ilike("first_name", "%jan%"))
            .order_by(OrderBy::desc("id"))
            .limit(10)
            .offset(20);
        let qb = select_rows("users", &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT to_jsonb(users.*) FROM users WHERE users.deleted_at IS NULL \
             AND email = (jsonb_populate_record(NULL::users, jsonb_build_object('email', $1::text))).email \
             AND first_name ILIKE $2 ORDER BY id DESC LIMIT $3 OFFSET $4"
        );
    }

    #[test]
    fn test_unscoped_select_has_no_where() {
        let qb = select_rows("users", &Query::new().unscoped()).unwrap();
        assert_eq!(qb.sql(), "SELECT to_jsonb(users.*) FROM users");
    }

    #[test]
    fn test_in_between_and_null() {
        let query = Query::new()
            .unscoped()
            .filter(Predicate::in_list("status", vec!["a", "b"]))
            .filter(Predicate::between("price", 1_i64, 5_i64))
            .filter(Predicate::is_null("deleted_at"))
            .filter(Predicate::in_list::<i64>("id", vec![]));
        let qb = count_rows("orders", &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM orders WHERE status IN (\
             (jsonb_populate_record(NULL::orders, jsonb_build_object('status', $1::text))).status, \
             (jsonb_populate_record(NULL::orders, jsonb_build_object('status', $2::text))).status) \
             AND price BETWEEN $3 AND $4 AND deleted_at IS NULL AND FALSE"
        );
    }

    #[test]
    fn test_raw_join_and_condition() {
        let query = Query::new()
            .join(RawSql::new("JOIN roles ON roles.role_id = users.role_id AND roles.code = ?").bind("admin"))
            .filter(RawSql::new("users.email = ? OR users.phone = ?").bind("a@b.c").bind("555"));
        let qb = select_rows("users", &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT to_jsonb(users.*) FROM users \
             JOIN roles ON roles.role_id = users.role_id AND roles.code = $1 \
             WHERE users.deleted_at IS NULL AND (users.email = $2 OR users.phone = $3)"
        );
    }

    #[test]
    fn test_raw_argument_mismatch_is_rejected() {
        let query = Query::new().filter(RawSql::new("a = ? AND b = ?").bind(1_i64));
        let err = select_rows("t", &query).err().expect("expected error");
        assert_eq!(err.kind, crate::repository::RepositoryErrorKind::ValidationFailed);
    }

    #[test]
    fn test_nested_conjunction() {
        let query = Query::new().unscoped().filter(Condition::all([
            Predicate::eq("a", 1_i64),
            Predicate::gt("b", 2_i64),
        ]));
        let qb = count_rows("t", &query).unwrap();
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM t WHERE (a = $1 AND b > $2)");
    }

    #[test]
    fn test_text_operands_take_the_column_type() {
        let query = Query::new()
            .unscoped()
            .filter(Predicate::in_list("items.id", vec!["1", "2"]))
            .filter(Predicate::gte("roles.created_at", "2024-01-01T00:00:00Z"));
        let qb = count_rows("items", &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM items WHERE items.id IN (\
             (jsonb_populate_record(NULL::items, jsonb_build_object('id', $1::text))).id, \
             (jsonb_populate_record(NULL::items, jsonb_build_object('id', $2::text))).id) \
             AND roles.created_at >= \
             (jsonb_populate_record(NULL::roles, jsonb_build_object('created_at', $3::text))).created_at"
        );
    }

    #[test]
    fn test_expressions_bind_text_directly() {
        let query = Query::new()
            .unscoped()
            .filter(Predicate::eq("lower(email)", "a@b.c"))
            .filter(Predicate::like("code", "ad%"));
        let qb = count_rows("users", &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM users WHERE lower(email) = $1 AND code LIKE $2"
        );
    }

    #[test]
    fn test_column_target() {
        assert_eq!(column_target("id", "items"), Some(("items", "id")));
        assert_eq!(column_target("roles.code", "items"), Some(("roles", "code")));
        assert_eq!(
            column_target("public.items.id", "items"),
            Some(("public.items", "id"))
        );
        assert_eq!(column_target("lower(email)", "users"), None);
        assert_eq!(column_target("1abc", "users"), None);
    }
}
