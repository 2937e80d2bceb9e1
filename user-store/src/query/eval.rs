//! In-process evaluation of conditions against JSON rows
//!
//! Comparison follows SQL three-valued logic loosely: any comparison with a
//! null or missing column is false. Raw SQL fragments cannot be evaluated
//! and are reported as [`RawSqlUnsupported`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::context::{OrderBy, OrderDirection};
use super::filter::{Condition, FilterOperator, FilterValue, Predicate};
use crate::repository::Row;

/// A raw SQL fragment reached an in-process evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSqlUnsupported;

/// Whether `row` satisfies `condition`
pub fn matches(condition: &Condition, row: &Row) -> Result<bool, RawSqlUnsupported> {
    match condition {
        Condition::Predicate(predicate) => Ok(matches_predicate(predicate, row)),
        Condition::Raw(_) => Err(RawSqlUnsupported),
        Condition::All(items) => {
            for item in items {
                if !matches(item, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

/// Whether `row` satisfies every condition
pub fn matches_all(conditions: &[Condition], row: &Row) -> Result<bool, RawSqlUnsupported> {
    for condition in conditions {
        if !matches(condition, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Look up a possibly table-qualified column
pub fn column_value<'a>(row: &'a Row, column: &str) -> &'a Value {
    let name = column.rsplit('.').next().unwrap_or(column);
    row.get(name).unwrap_or(&Value::Null)
}

fn matches_predicate(predicate: &Predicate, row: &Row) -> bool {
    let actual = column_value(row, &predicate.column);
    let expected = &predicate.value;

    match predicate.operator {
        FilterOperator::IsNull => actual.is_null(),
        FilterOperator::Equal => compare(actual, expected) == Some(Ordering::Equal),
        FilterOperator::GreaterThan => compare(actual, expected) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::LessThan => compare(actual, expected) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::Like | FilterOperator::ILike => match (actual, expected) {
            (Value::String(text), FilterValue::String(pattern)) => {
                like_match(text, pattern, predicate.operator == FilterOperator::ILike)
            }
            _ => false,
        },
        FilterOperator::In => match expected {
            FilterValue::List(items) => items
                .iter()
                .any(|item| compare(actual, item) == Some(Ordering::Equal)),
            _ => false,
        },
        FilterOperator::Between => match expected {
            FilterValue::List(bounds) if bounds.len() == 2 => {
                matches!(
                    compare(actual, &bounds[0]),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    compare(actual, &bounds[1]),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            _ => false,
        },
    }
}

/// Compare a stored value with a filter value
///
/// `None` means the values are not comparable (null, or mismatched types).
pub fn compare(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Null, _) | (_, FilterValue::Null) => None,
        (Value::Number(n), FilterValue::Integer(i)) => match n.as_i64() {
            Some(a) => Some(a.cmp(i)),
            None => n.as_f64()?.partial_cmp(&(*i as f64)),
        },
        (Value::Number(n), FilterValue::Float(f)) => n.as_f64()?.partial_cmp(f),
        (Value::Number(n), FilterValue::String(s)) => {
            n.as_f64()?.partial_cmp(&s.trim().parse::<f64>().ok()?)
        }
        (Value::Bool(a), FilterValue::Boolean(b)) => Some(a.cmp(b)),
        (Value::String(a), FilterValue::Uuid(b)) => Some(Uuid::parse_str(a).ok()?.cmp(b)),
        (Value::String(a), FilterValue::Timestamp(b)) => {
            Some(a.parse::<DateTime<Utc>>().ok()?.cmp(b))
        }
        (Value::String(a), FilterValue::String(b)) => match (
            a.parse::<DateTime<Utc>>(),
            b.parse::<DateTime<Utc>>(),
        ) {
            (Ok(x), Ok(y)) => Some(x.cmp(&y)),
            _ => Some(a.as_str().cmp(b.as_str())),
        },
        _ => None,
    }
}

/// Ordering between two stored values, nulls last
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => {
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Sort rows in place by `order`
pub fn sort_rows(rows: &mut [Row], order: &OrderBy) {
    rows.sort_by(|a, b| {
        let ordering = compare_values(column_value(a, &order.column), column_value(b, &order.column));
        match order.direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        }
    });
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` is one character,
/// and `\` escapes the next character
pub fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let fold = |s: &str| -> Vec<char> {
        if case_insensitive {
            s.to_lowercase().chars().collect()
        } else {
            s.chars().collect()
        }
    };
    let text = fold(text);

    enum Token {
        Any,
        One,
        Lit(char),
    }
    let mut tokens = Vec::new();
    let mut chars = fold(pattern).into_iter();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Lit(chars.next().unwrap_or('\\')),
            c => Token::Lit(c),
        });
    }

    // reachable[j]: the first i tokens can consume exactly j characters
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::Any => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= reachable[j];
                    next[j] = seen;
                }
            }
            Token::One => {
                for j in 0..text.len() {
                    next[j + 1] = reachable[j];
                }
            }
            Token::Lit(c) => {
                for j in 0..text.len() {
                    next[j + 1] = reachable[j] && text[j] == *c;
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::RawSql;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_like_match_wildcards() {
        assert!(like_match("Janet", "%ane%", false));
        assert!(like_match("Janet", "J_net", false));
        assert!(!like_match("Janet", "%ANE%", false));
        assert!(like_match("Janet", "%ANE%", true));
        assert!(like_match("", "%", false));
        assert!(!like_match("abc", "ab", false));
        assert!(like_match("50%", "50\\%", false));
        assert!(!like_match("500", "50\\%", false));
    }

    #[test]
    fn test_equality_and_ranges() {
        let r = row(json!({"age": 30, "name": "Ann", "active": false}));

        assert!(matches(&Predicate::eq("age", 30_i64).into(), &r).unwrap());
        assert!(matches(&Predicate::gte("age", 30_i64).into(), &r).unwrap());
        assert!(!matches(&Predicate::gt("age", 30_i64).into(), &r).unwrap());
        assert!(matches(&Predicate::between("age", 18_i64, 65_i64).into(), &r).unwrap());
        assert!(matches(&Predicate::eq("active", false).into(), &r).unwrap());
        assert!(matches(&Predicate::in_list("name", vec!["Bob", "Ann"]).into(), &r).unwrap());
    }

    #[test]
    fn test_null_never_compares() {
        let r = row(json!({"deleted_at": null}));
        assert!(!matches(&Predicate::eq("deleted_at", "x").into(), &r).unwrap());
        assert!(!matches(&Predicate::eq("missing", 1_i64).into(), &r).unwrap());
        assert!(matches(&Predicate::is_null("deleted_at").into(), &r).unwrap());
        assert!(matches(&Predicate::is_null("missing").into(), &r).unwrap());
    }

    #[test]
    fn test_uuid_and_qualified_columns() {
        let id = Uuid::new_v4();
        let r = row(json!({"user_id": id.to_string()}));
        assert!(matches(&Predicate::eq("users.user_id", id).into(), &r).unwrap());
    }

    #[test]
    fn test_timestamps_compare_chronologically() {
        let r = row(json!({"created_at": "2024-05-01T10:00:00+00:00"}));
        let cutoff: DateTime<Utc> = "2024-05-01T09:00:00Z".parse().unwrap();
        assert!(matches(&Predicate::gt("created_at", cutoff).into(), &r).unwrap());
    }

    #[test]
    fn test_raw_sql_is_rejected() {
        let r = row(json!({}));
        let raw: Condition = RawSql::new("1 = 1").into();
        assert_eq!(matches(&raw, &r), Err(RawSqlUnsupported));
    }

    #[test]
    fn test_sort_rows_nulls_last() {
        let mut rows = vec![
            row(json!({"n": 2})),
            row(json!({"n": null})),
            row(json!({"n": 1})),
        ];
        sort_rows(&mut rows, &OrderBy::asc("n"));
        assert_eq!(rows[0]["n"], json!(1));
        assert_eq!(rows[2]["n"], Value::Null);

        sort_rows(&mut rows, &OrderBy::desc("n"));
        assert_eq!(rows[0]["n"], Value::Null);
    }
}
