// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process predicate evaluation, sorting, and pagination over decoded rows.

use std::cmp::Ordering;

use syncwerk_core::query::{FieldOperator, FieldPredicate, QueryOptions, QueryPredicate, QuerySort, SortOrder};
use syncwerk_core::types::{SerializedRecord, Value};

/// Whether `record` satisfies `predicate`.
pub fn matches(record: &SerializedRecord, predicate: &QueryPredicate) -> bool {
    match predicate {
        QueryPredicate::All => true,
        QueryPredicate::Compare(leaf) => matches_field(record, leaf),
        QueryPredicate::And(preds) => preds.iter().all(|p| matches(record, p)),
        QueryPredicate::Or(preds) => preds.iter().any(|p| matches(record, p)),
        QueryPredicate::Not(pred) => !matches(record, pred),
    }
}

fn field_value<'r>(record: &'r SerializedRecord, field: &str) -> Option<&'r Value> {
    record.field(field)
}

/// Nested records compare by their id, so `author` can be filtered by
/// foreign key.
fn scalar(value: &Value) -> Value {
    match value {
        Value::Record(nested) => Value::String(nested.id.clone()),
        other => other.clone(),
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual.map(scalar) {
        None | Some(Value::Null) => expected.is_null(),
        Some(actual) => match actual.compare(expected) {
            Some(ordering) => ordering == Ordering::Equal,
            None => actual == *expected,
        },
    }
}

fn ordered(actual: Option<&Value>, expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .map(scalar)
        .and_then(|v| v.compare(expected))
        .is_some_and(accept)
}

fn matches_field(record: &SerializedRecord, leaf: &FieldPredicate) -> bool {
    let actual = field_value(record, &leaf.field);
    match &leaf.operator {
        FieldOperator::Equal(v) => equals(actual, v),
        FieldOperator::NotEqual(v) => !equals(actual, v),
        FieldOperator::LessThan(v) => ordered(actual, v, Ordering::is_lt),
        FieldOperator::LessOrEqual(v) => ordered(actual, v, Ordering::is_le),
        FieldOperator::GreaterThan(v) => ordered(actual, v, Ordering::is_gt),
        FieldOperator::GreaterOrEqual(v) => ordered(actual, v, Ordering::is_ge),
        FieldOperator::Between(start, end) => {
            ordered(actual, start, Ordering::is_ge) && ordered(actual, end, Ordering::is_le)
        }
        FieldOperator::BeginsWith(v) => match (actual, v.as_str()) {
            (Some(Value::String(s)), Some(prefix)) => s.starts_with(prefix),
            _ => false,
        },
        FieldOperator::Contains(v) => match actual {
            Some(Value::String(s)) => v.as_str().is_some_and(|needle| s.contains(needle)),
            Some(Value::List(items)) => items.iter().any(|item| equals(Some(item), v)),
            _ => false,
        },
    }
}

/// Ordering used for sorting. Absent and null values sort first;
/// incomparable values keep their relative order.
fn sort_cmp(a: &SerializedRecord, b: &SerializedRecord, sort: &[QuerySort]) -> Ordering {
    for key in sort {
        let left = field_value(a, &key.field).map(scalar).filter(|v| !v.is_null());
        let right = field_value(b, &key.field).map(scalar).filter(|v| !v.is_null());
        let ordering = match (&left, &right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => l.compare(r).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Filter, sort, and paginate `rows` according to `options`.
pub fn apply(rows: Vec<SerializedRecord>, options: &QueryOptions) -> Vec<SerializedRecord> {
    let mut rows: Vec<SerializedRecord> = rows
        .into_iter()
        .filter(|r| matches(r, &options.predicate))
        .collect();

    if !options.sort.is_empty() {
        rows.sort_by(|a, b| sort_cmp(a, b, &options.sort));
    }

    match options.pagination {
        Some(page) => rows
            .into_iter()
            .skip(page.offset())
            .take(page.limit as usize)
            .collect(),
        None => rows,
    }
}

#[cfg(test)]
mod tests {
    use syncwerk_core::query::QueryPagination;

    use super::*;

    fn post(id: &str, title: &str, rating: i64) -> SerializedRecord {
        SerializedRecord::new("Post", id)
            .with_field("title", title)
            .with_field("rating", rating)
    }

    fn rows() -> Vec<SerializedRecord> {
        vec![
            post("p1", "Hello world", 4),
            post("p2", "Goodbye", 2),
            post("p3", "Hello again", 5),
        ]
    }

    fn ids(rows: &[SerializedRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn comparison_operators() {
        let gt = QueryOptions::matching(QueryPredicate::compare(
            "rating",
            FieldOperator::GreaterThan(Value::Int(3)),
        ));
        assert_eq!(ids(&apply(rows(), &gt)), ["p1", "p3"]);

        let between = QueryOptions::matching(QueryPredicate::compare(
            "rating",
            FieldOperator::Between(Value::Int(2), Value::Int(4)),
        ));
        assert_eq!(ids(&apply(rows(), &between)), ["p1", "p2"]);
    }

    #[test]
    fn string_operators() {
        let begins = QueryPredicate::compare("title", FieldOperator::BeginsWith(Value::from("Hello")));
        let contains = QueryPredicate::compare("title", FieldOperator::Contains(Value::from("again")));
        assert_eq!(ids(&apply(rows(), &QueryOptions::matching(begins))), ["p1", "p3"]);
        assert_eq!(ids(&apply(rows(), &QueryOptions::matching(contains))), ["p3"]);
    }

    #[test]
    fn groups_and_negation() {
        let pred = QueryPredicate::Or(vec![
            QueryPredicate::eq("id", "p2"),
            QueryPredicate::not(QueryPredicate::compare(
                "rating",
                FieldOperator::LessThan(Value::Int(5)),
            )),
        ]);
        assert_eq!(ids(&apply(rows(), &QueryOptions::matching(pred))), ["p2", "p3"]);
    }

    #[test]
    fn nested_record_compares_by_id() {
        let comment = SerializedRecord::new("Comment", "c1")
            .with_field("post", SerializedRecord::placeholder("p1"));
        assert!(matches(&comment, &QueryPredicate::eq("post", "p1")));
        assert!(!matches(&comment, &QueryPredicate::eq("post", "p2")));
    }

    #[test]
    fn equality_with_null_matches_absent_fields() {
        let record = SerializedRecord::new("Post", "p1");
        assert!(matches(&record, &QueryPredicate::eq("title", Value::Null)));
        assert!(!matches(&record, &QueryPredicate::eq("title", "x")));
    }

    #[test]
    fn sort_then_paginate() {
        let options = QueryOptions::all()
            .sorted_by("rating", SortOrder::Descending)
            .paginated(QueryPagination { page: 1, limit: 2 });
        assert_eq!(ids(&apply(rows(), &options)), ["p2"]);

        let first = QueryOptions::all()
            .sorted_by("title", SortOrder::Ascending)
            .paginated(QueryPagination { page: 0, limit: 2 });
        assert_eq!(ids(&apply(rows(), &first)), ["p2", "p3"]);
    }

    #[test]
    fn absent_sort_values_come_first() {
        let mut input = rows();
        input.push(SerializedRecord::new("Post", "p4"));
        let options = QueryOptions::all().sorted_by("rating", SortOrder::Ascending);
        assert_eq!(ids(&apply(input, &options)), ["p4", "p2", "p1", "p3"]);
    }
}
