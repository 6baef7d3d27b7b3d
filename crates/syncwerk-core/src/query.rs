// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store-native query options: predicate tree, sort, and pagination.
//
// The predicate AST is schema-agnostic. The store decides how to evaluate it
// and enforces its own limit on the number of comparison terms.

use crate::types::{ID_FIELD, Value};

/// Comparison applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperator {
    Equal(Value),
    NotEqual(Value),
    LessOrEqual(Value),
    LessThan(Value),
    GreaterOrEqual(Value),
    GreaterThan(Value),
    Contains(Value),
    BeginsWith(Value),
    Between(Value, Value),
}

/// `field <operator>` leaf of a predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: String,
    pub operator: FieldOperator,
}

/// Predicate tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryPredicate {
    /// Matches every record.
    #[default]
    All,
    Compare(FieldPredicate),
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
}

impl QueryPredicate {
    pub fn compare(field: impl Into<String>, operator: FieldOperator) -> Self {
        Self::Compare(FieldPredicate {
            field: field.into(),
            operator,
        })
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, FieldOperator::Equal(value.into()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(pred: Self) -> Self {
        Self::Not(Box::new(pred))
    }

    /// `id == ids[0] OR id == ids[1] OR ...`.
    ///
    /// A single id collapses to a plain equality and an empty slice matches
    /// nothing.
    pub fn id_in(ids: &[String]) -> Self {
        match ids {
            [] => Self::not(Self::All),
            [only] => Self::eq(ID_FIELD, only.as_str()),
            many => Self::Or(
                many.iter()
                    .map(|id| Self::eq(ID_FIELD, id.as_str()))
                    .collect(),
            ),
        }
    }

    /// Number of comparison terms in the tree, the quantity stores limit.
    pub fn term_count(&self) -> usize {
        match self {
            Self::All => 0,
            Self::Compare(_) => 1,
            Self::And(preds) | Self::Or(preds) => preds.iter().map(Self::term_count).sum(),
            Self::Not(pred) => pred.term_count(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySort {
    pub field: String,
    pub order: SortOrder,
}

/// Zero-based page of `limit` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPagination {
    pub page: u32,
    pub limit: u32,
}

impl QueryPagination {
    /// Default page size when the caller asks for paging without a limit.
    pub const DEFAULT_LIMIT: u32 = 100;

    pub fn first_page() -> Self {
        Self {
            page: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Number of records to skip.
    pub fn offset(&self) -> usize {
        self.page as usize * self.limit as usize
    }
}

/// Everything a single-model store query needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub predicate: QueryPredicate,
    /// Applied in order; earlier entries take precedence.
    pub sort: Vec<QuerySort>,
    /// `None` returns every matching record.
    pub pagination: Option<QueryPagination>,
}

impl QueryOptions {
    /// Unfiltered, unsorted, unpaginated.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matching(predicate: QueryPredicate) -> Self {
        Self {
            predicate,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(QuerySort {
            field: field.into(),
            order,
        });
        self
    }

    pub fn paginated(mut self, pagination: QueryPagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}
