// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Translation of serialized query requests into store `QueryOptions`.
//
// Request shape, every key optional:
//
//   { "queryPredicate":  <predicate>,
//     "querySort":       [ { "field": "title", "order": "ascending" } ],
//     "queryPagination": { "page": 0, "limit": 100 } }
//
// A predicate is exactly one of:
//
//   { "queryPredicateOperation": { "field": "rating",
//                                  "fieldOperation": { "operatorName": "greater_than",
//                                                      "value": 3 } } }
//   { "queryPredicateGroup": { "type": "and" | "or" | "not", "predicates": [ ... ] } }
//   { "queryPredicateConstant": { "type": "all" } }

use serde_json::{Map, Value as Json};

use syncwerk_core::error::{Result, SyncwerkError};
use syncwerk_core::query::{
    FieldOperator, QueryOptions, QueryPagination, QueryPredicate, QuerySort, SortOrder,
};
use syncwerk_core::types::Value;

/// Build store options from the optional predicate, sort, and pagination
/// entries of a `query` request.
pub fn query_options_from_request(request: &Json) -> Result<QueryOptions> {
    let mut options = QueryOptions::all();

    if let Some(predicate) = present(request, "queryPredicate") {
        options.predicate = predicate_from_json(predicate)?;
    }
    if let Some(sort) = present(request, "querySort") {
        options.sort = sort_from_json(sort)?;
    }
    if let Some(pagination) = present(request, "queryPagination") {
        options.pagination = Some(pagination_from_json(pagination)?);
    }

    Ok(options)
}

/// Recursive descent over a serialized predicate tree.
pub fn predicate_from_json(json: &Json) -> Result<QueryPredicate> {
    let map = as_map(json, "queryPredicate")?;

    if let Some(operation) = map.get("queryPredicateOperation") {
        return operation_from_json(operation);
    }
    if let Some(group) = map.get("queryPredicateGroup") {
        return group_from_json(group);
    }
    if let Some(constant) = map.get("queryPredicateConstant") {
        return match constant.get("type").and_then(Json::as_str) {
            Some("all") | None => Ok(QueryPredicate::All),
            Some(other) => Err(malformed(format!("unknown predicate constant {other:?}"))),
        };
    }

    Err(malformed("predicate has no operation, group, or constant"))
}

fn operation_from_json(json: &Json) -> Result<QueryPredicate> {
    let map = as_map(json, "queryPredicateOperation")?;
    let field = map
        .get("field")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("predicate operation has no field"))?;
    let operation = map
        .get("fieldOperation")
        .ok_or_else(|| malformed(format!("predicate on {field} has no fieldOperation")))?;
    let operation = as_map(operation, "fieldOperation")?;
    let name = operation
        .get("operatorName")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed(format!("predicate on {field} has no operatorName")))?;

    let value = || operand(operation, "value", field);
    let operator = match name {
        "equal" => FieldOperator::Equal(value()?),
        "not_equal" => FieldOperator::NotEqual(value()?),
        "less_or_equal" => FieldOperator::LessOrEqual(value()?),
        "less_than" => FieldOperator::LessThan(value()?),
        "greater_or_equal" => FieldOperator::GreaterOrEqual(value()?),
        "greater_than" => FieldOperator::GreaterThan(value()?),
        "contains" => FieldOperator::Contains(value()?),
        "beginsWith" => FieldOperator::BeginsWith(value()?),
        "between" => FieldOperator::Between(
            operand(operation, "start", field)?,
            operand(operation, "end", field)?,
        ),
        other => return Err(malformed(format!("unknown operator {other:?} on {field}"))),
    };

    Ok(QueryPredicate::compare(field, operator))
}

fn group_from_json(json: &Json) -> Result<QueryPredicate> {
    let map = as_map(json, "queryPredicateGroup")?;
    let kind = map
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("predicate group has no type"))?;
    let predicates = map
        .get("predicates")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed(format!("{kind} group has no predicates list")))?
        .iter()
        .map(predicate_from_json)
        .collect::<Result<Vec<_>>>()?;

    match kind {
        "and" => Ok(QueryPredicate::And(predicates)),
        "or" => Ok(QueryPredicate::Or(predicates)),
        "not" => {
            let [inner] = <[QueryPredicate; 1]>::try_from(predicates).map_err(|found| {
                malformed(format!("not group takes one predicate, got {}", found.len()))
            })?;
            Ok(QueryPredicate::not(inner))
        }
        other => Err(malformed(format!("unknown predicate group type {other:?}"))),
    }
}

fn sort_from_json(json: &Json) -> Result<Vec<QuerySort>> {
    let entries = json
        .as_array()
        .ok_or_else(|| malformed("querySort is not a list"))?;

    entries
        .iter()
        .map(|entry| {
            let map = as_map(entry, "querySort entry")?;
            let field = map
                .get("field")
                .and_then(Json::as_str)
                .ok_or_else(|| malformed("sort entry has no field"))?;
            let order = match map.get("order").and_then(Json::as_str) {
                Some("ascending") | None => SortOrder::Ascending,
                Some("descending") => SortOrder::Descending,
                Some(other) => return Err(malformed(format!("unknown sort order {other:?}"))),
            };
            Ok(QuerySort {
                field: field.to_string(),
                order,
            })
        })
        .collect()
}

fn pagination_from_json(json: &Json) -> Result<QueryPagination> {
    let map = as_map(json, "queryPagination")?;
    Ok(QueryPagination {
        page: page_number(map, "page")?.unwrap_or(0),
        limit: page_number(map, "limit")?.unwrap_or(QueryPagination::DEFAULT_LIMIT),
    })
}

// ---- Helpers ----

fn present<'j>(request: &'j Json, key: &str) -> Option<&'j Json> {
    request.get(key).filter(|v| !v.is_null())
}

fn as_map<'j>(json: &'j Json, what: &str) -> Result<&'j Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| malformed(format!("{what} is not a map")))
}

fn operand(operation: &Map<String, Json>, key: &str, field: &str) -> Result<Value> {
    operation
        .get(key)
        .cloned()
        .map(Value::from_json)
        .ok_or_else(|| malformed(format!("predicate on {field} has no {key}")))
}

fn page_number(map: &Map<String, Json>, key: &str) -> Result<Option<u32>> {
    match map.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| malformed(format!("queryPagination.{key} is not a page number"))),
    }
}

fn malformed(detail: impl Into<String>) -> SyncwerkError {
    SyncwerkError::MalformedRequest(detail.into())
}
