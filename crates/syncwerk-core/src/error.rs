// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Syncwerk.

use thiserror::Error;

/// Top-level error type for all Syncwerk operations.
#[derive(Debug, Error)]
pub enum SyncwerkError {
    // -- Request errors --
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("method not implemented: {0}")]
    NotImplemented(String),

    #[error("operation cancelled")]
    Cancelled,

    // -- Store errors --
    #[error("query for {model_name} failed: {message}")]
    StoreQuery { model_name: String, message: String },

    #[error("save failed: {0}")]
    StoreSave(String),

    #[error("delete failed: {0}")]
    StoreDelete(String),

    /// The row targeted by a delete was not present locally.
    #[error("wanted to delete one {model_name} row with id {id}, but deleted 0 rows")]
    DeleteMissingRow { model_name: String, id: String },

    #[error("store error: {0}")]
    Store(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncwerkError {
    /// Shorthand for a [`SyncwerkError::StoreQuery`] against `model_name`.
    pub fn store_query(model_name: &str, message: impl Into<String>) -> Self {
        Self::StoreQuery {
            model_name: model_name.to_string(),
            message: message.into(),
        }
    }

    /// Whether this is a delete that found nothing to delete.
    pub fn is_missing_row(&self) -> bool {
        matches!(self, Self::DeleteMissingRow { .. })
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SyncwerkError>;
