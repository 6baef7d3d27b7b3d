// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability traits for the collaborators Syncwerk wraps.
//
// The native data-store SDK owns persistence, sync, and conflict resolution.
// Syncwerk only reaches it through these seams, injected by the caller.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::query::{QueryOptions, QueryPredicate};
use crate::schema::{ModelAssociation, ModelSchema};
use crate::types::{ChangeEvent, SerializedRecord};

/// Stream of store changes for one subscription. Dropping it unsubscribes.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

/// The local model store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Single-model, predicate-filtered read.
    ///
    /// Fails with `SyncwerkError::StoreQuery`.
    async fn query(&self, model_name: &str, options: &QueryOptions)
    -> Result<Vec<SerializedRecord>>;

    /// Insert or update `record`. When a row with the same id exists,
    /// `predicate` must hold for it or the save is rejected.
    ///
    /// Fails with `SyncwerkError::StoreSave`.
    async fn save(&self, record: &SerializedRecord, predicate: &QueryPredicate) -> Result<()>;

    /// Delete `record` by id.
    ///
    /// A row that is already absent is reported as
    /// `SyncwerkError::DeleteMissingRow`; callers normally treat it as success.
    async fn delete(&self, record: &SerializedRecord) -> Result<()>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;

    /// Subscribe to changes. Each call starts an independent subscription.
    fn observe(&self) -> ChangeStream;
}

/// Per-model schema metadata.
pub trait SchemaRegistry: Send + Sync {
    fn schema(&self, model_name: &str) -> Option<&ModelSchema>;

    /// Association metadata for `model_name`, keyed by field name.
    fn associations_for(&self, model_name: &str) -> Option<&BTreeMap<String, ModelAssociation>> {
        self.schema(model_name).map(|schema| &schema.associations)
    }
}
