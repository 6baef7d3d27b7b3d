// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Foreign-key id batching.
//
// Ids are deduplicated in first-seen order and split into chunks no larger
// than the store's safe predicate size, so that an association lookup over
// thousands of records never produces a predicate the store rejects.

use std::collections::HashSet;

/// Deduplicated ids in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdBatch {
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl IdBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.ids.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    /// Consecutive chunks of at most `limit` ids. A zero limit is treated
    /// as one.
    pub fn chunks(&self, limit: usize) -> std::slice::Chunks<'_, String> {
        self.ids.chunks(limit.max(1))
    }
}

impl<S: Into<String>> FromIterator<S> for IdBatch {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut batch = Self::new();
        for id in iter {
            batch.insert(id);
        }
        batch
    }
}

/// Deduplicate `ids` and split them into chunks of at most `limit`.
///
/// Every distinct id lands in exactly one chunk, chunks keep first-seen
/// order, and `ceil(distinct / limit)` chunks are produced.
pub fn chunk<I, S>(ids: I, limit: usize) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let batch: IdBatch = ids.into_iter().collect();
    batch.chunks(limit).map(<[String]>::to_vec).collect()
}
