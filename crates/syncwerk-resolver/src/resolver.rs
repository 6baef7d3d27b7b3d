// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Nested association resolution.
//
// A store query returns records whose to-one associations are placeholders
// carrying only the foreign key. The resolver walks the model's association
// metadata and replaces them with the associated records, recursively.
//
// For each `BelongsTo` / `HasOne` field, in field-name order:
//
//   1. collect the foreign keys of every record, deduplicated;
//   2. query the associated model by `id`, one query per chunk of ids;
//   3. resolve the fetched records' own associations (depth-first);
//   4. attach them to their parents, logging keys with no local row.
//
// Each field is finished, including its nested levels, before the next one
// starts. Store calls never overlap. The first failing query aborts the whole
// call and nothing partial is returned.
//
// Every record carries the `(model, id)` keys of the records above it. A
// foreign key naming one of those is a reference cycle and stays unresolved.

use std::collections::{HashMap, HashSet};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, instrument, warn};

use syncwerk_core::config::{DEFAULT_CHUNK_LIMIT, DataStoreConfig};
use syncwerk_core::error::{Result, SyncwerkError};
use syncwerk_core::query::{QueryOptions, QueryPredicate};
use syncwerk_core::schema::ModelAssociation;
use syncwerk_core::traits::{SchemaRegistry, Store};
use syncwerk_core::types::{ResolvedRecord, SerializedRecord};

use crate::chunk::IdBatch;

/// `(model_name, id)` of a record.
type RecordKey = (String, String);

/// A record under resolution and the keys of every record on the path(s)
/// leading to it, its own included.
struct PathNode {
    resolved: ResolvedRecord,
    ancestry: HashSet<RecordKey>,
}

impl PathNode {
    fn new(model_name: &str, record: SerializedRecord, mut ancestry: HashSet<RecordKey>) -> Self {
        ancestry.insert((model_name.to_string(), record.id.clone()));
        Self {
            resolved: ResolvedRecord::unresolved(record),
            ancestry,
        }
    }

    fn foreign_key(&self, field: &str) -> Option<&str> {
        self.resolved.record.nested_id(field)
    }

    fn is_ancestor(&self, model_name: &str, id: &str) -> bool {
        self.ancestry
            .contains(&(model_name.to_string(), id.to_string()))
    }
}

/// Foreign keys of one association field across a page of records.
struct AssociationBatch<'a> {
    field: &'a str,
    associated_model: &'a str,
    ids: IdBatch,
    /// Union of the ancestries of the parents referencing each id.
    inherited: HashMap<String, HashSet<RecordKey>>,
}

impl<'a> AssociationBatch<'a> {
    /// Collect the foreign keys held in `field` by each record. Missing fields
    /// and null placeholders are optional relations and contribute nothing,
    /// keys closing a cycle are logged and skipped.
    fn collect(field: &'a str, association: &'a ModelAssociation, nodes: &[PathNode]) -> Self {
        let associated_model = association.associated_model.as_str();
        let mut ids = IdBatch::new();
        let mut inherited: HashMap<String, HashSet<RecordKey>> = HashMap::new();

        for node in nodes {
            let Some(foreign_key) = node.foreign_key(field) else {
                continue;
            };
            if node.is_ancestor(associated_model, foreign_key) {
                warn!(
                    model = associated_model,
                    id = foreign_key,
                    parent = node.resolved.id(),
                    field,
                    "reference cycle, association left unresolved"
                );
                continue;
            }
            ids.insert(foreign_key);
            inherited
                .entry(foreign_key.to_string())
                .or_default()
                .extend(node.ancestry.iter().cloned());
        }

        Self {
            field,
            associated_model,
            ids,
            inherited,
        }
    }

    /// Wrap a fetched record with the ancestry of its referencing parents.
    fn child(&self, record: SerializedRecord) -> PathNode {
        let ancestry = self.inherited.get(&record.id).cloned().unwrap_or_default();
        PathNode::new(self.associated_model, record, ancestry)
    }
}

/// Hydrates `BelongsTo` / `HasOne` associations of queried records.
pub struct AssociationResolver<'a> {
    store: &'a dyn Store,
    schemas: &'a dyn SchemaRegistry,
    chunk_limit: usize,
    max_depth: Option<usize>,
}

impl<'a> AssociationResolver<'a> {
    /// Resolver with the default chunk limit and no depth cap.
    pub fn new(store: &'a dyn Store, schemas: &'a dyn SchemaRegistry) -> Self {
        Self {
            store,
            schemas,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            max_depth: None,
        }
    }

    /// Build a resolver with the limits from `config`.
    pub fn from_config(
        store: &'a dyn Store,
        schemas: &'a dyn SchemaRegistry,
        config: &DataStoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut resolver = Self::new(store, schemas).with_chunk_limit(config.chunk_limit);
        resolver.max_depth = config.max_nesting_depth;
        Ok(resolver)
    }

    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit.max(1);
        self
    }

    /// Stop hydrating `max_depth` levels below the queried model.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Resolve the associations of `records`, all instances of `model_name`.
    ///
    /// Records without association metadata come back unchanged with empty
    /// associations. Fails with `SyncwerkError::StoreQuery` if any lookup
    /// query fails.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn resolve(
        &self,
        records: Vec<SerializedRecord>,
        model_name: &str,
    ) -> Result<Vec<ResolvedRecord>> {
        let roots = records
            .into_iter()
            .map(|record| PathNode::new(model_name, record, HashSet::new()))
            .collect();
        self.resolve_level(roots, model_name, 0).await
    }

    fn resolve_level<'s>(
        &'s self,
        mut nodes: Vec<PathNode>,
        model_name: &'s str,
        depth: usize,
    ) -> BoxFuture<'s, Result<Vec<ResolvedRecord>>> {
        async move {
            if nodes.is_empty() {
                return Ok(Vec::new());
            }

            if let Some(associations) = self.schemas.associations_for(model_name) {
                for (field, association) in associations {
                    if !association.kind.is_eager() {
                        continue;
                    }

                    let batch = AssociationBatch::collect(field, association, &nodes);
                    if batch.ids.is_empty() {
                        continue;
                    }
                    if self.max_depth.is_some_and(|max| depth >= max) {
                        warn!(
                            model = model_name,
                            field = field.as_str(),
                            ids = batch.ids.len(),
                            depth,
                            "nesting depth limit reached, association left unresolved"
                        );
                        continue;
                    }

                    let children = self
                        .fetch_batch(&batch)
                        .await?
                        .into_iter()
                        .map(|record| batch.child(record))
                        .collect();
                    let nested = self
                        .resolve_level(children, batch.associated_model, depth + 1)
                        .await?;
                    attach(&mut nodes, &batch, nested);
                }
            }

            Ok(nodes.into_iter().map(|node| node.resolved).collect())
        }
        .boxed()
    }

    /// Query the associated model for every id in `batch`, chunk by chunk,
    /// concatenating the results.
    async fn fetch_batch(&self, batch: &AssociationBatch<'_>) -> Result<Vec<SerializedRecord>> {
        let model_name = batch.associated_model;
        let mut results = Vec::with_capacity(batch.ids.len());

        for (index, ids) in batch.ids.chunks(self.chunk_limit).enumerate() {
            let options = QueryOptions::matching(QueryPredicate::id_in(ids));
            let mut rows = self
                .store
                .query(model_name, &options)
                .await
                .map_err(|e| as_query_error(model_name, e))?;
            debug!(
                model = model_name,
                field = batch.field,
                chunk = index,
                requested = ids.len(),
                found = rows.len(),
                "association chunk fetched"
            );
            results.append(&mut rows);
        }

        Ok(results)
    }
}

/// Attach resolved associated records to their parents by foreign key.
fn attach(parents: &mut [PathNode], batch: &AssociationBatch<'_>, nested: Vec<ResolvedRecord>) {
    let by_id: HashMap<String, ResolvedRecord> = nested
        .into_iter()
        .map(|r| (r.record.id.clone(), r))
        .collect();

    for parent in parents.iter_mut() {
        let Some(foreign_key) = parent.foreign_key(batch.field) else {
            continue;
        };
        if parent.is_ancestor(batch.associated_model, foreign_key) {
            continue;
        }
        match by_id.get(foreign_key) {
            Some(target) => {
                parent
                    .resolved
                    .associations
                    .insert(batch.field.to_string(), target.clone());
            }
            None => {
                // Not synced to the local store yet.
                warn!(
                    model = batch.associated_model,
                    id = foreign_key,
                    parent = parent.resolved.id(),
                    field = batch.field,
                    "nested model was not in the local store"
                );
            }
        }
    }
}

fn as_query_error(model_name: &str, err: SyncwerkError) -> SyncwerkError {
    match err {
        SyncwerkError::StoreQuery { .. } => err,
        other => SyncwerkError::store_query(model_name, other.to_string()),
    }
}
