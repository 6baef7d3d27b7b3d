// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Syncwerk: Core records, schema metadata, query types, and error definitions
// shared across all crates.

pub mod config;
pub mod error;
pub mod error_payload;
pub mod query;
pub mod schema;
pub mod traits;
pub mod types;

pub use config::{DEFAULT_CHUNK_LIMIT, DEFAULT_MAX_PREDICATE_TERMS, DataStoreConfig};
pub use error::SyncwerkError;
pub use error_payload::{ErrorPayload, to_error_payload};
pub use query::{QueryOptions, QueryPagination, QueryPredicate, QuerySort, SortOrder};
pub use schema::{AssociationKind, ModelAssociation, ModelProvider, ModelSchema};
pub use traits::{ChangeStream, SchemaRegistry, Store};
pub use types::*;
