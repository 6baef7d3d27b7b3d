// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structured error payloads posted back across the method-call bridge.
//
// Every `SyncwerkError` maps to an error code the app layer switches on, a
// message, and where possible a recovery suggestion. The original error text
// travels along as `underlyingError`.

use serde::{Deserialize, Serialize};

use crate::error::SyncwerkError;

/// Error code for store and runtime failures.
pub const DATASTORE_EXCEPTION: &str = "DataStoreException";
/// Error code for requests that never reached the store.
pub const REQUEST_MALFORMED: &str = "REQUEST_MALFORMED";
/// Error code for operations cancelled through their cancel token.
pub const OPERATION_CANCELLED: &str = "OPERATION_CANCELLED";
/// Error code for unknown bridge methods.
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

/// Error shape the app layer receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying_error: Option<String>,
}

impl ErrorPayload {
    fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
            recovery_suggestion: None,
            underlying_error: None,
        }
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestion = Some(suggestion.into());
        self
    }

    fn caused_by(mut self, err: &SyncwerkError) -> Self {
        self.underlying_error = Some(err.to_string());
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "errorCode": self.error_code, "message": self.message })
        })
    }
}

/// Convert a `SyncwerkError` into the payload posted to the app layer.
pub fn to_error_payload(err: &SyncwerkError) -> ErrorPayload {
    match err {
        // -- Request errors --
        SyncwerkError::MalformedRequest(detail) => {
            ErrorPayload::new(REQUEST_MALFORMED, format!("Received an invalid request: {detail}"))
                .suggest("Check the arguments passed to the data store call and the configured model schemas.")
        }

        SyncwerkError::NotImplemented(method) => {
            ErrorPayload::new(NOT_IMPLEMENTED, format!("Method {method} is not implemented."))
        }

        SyncwerkError::Cancelled => {
            ErrorPayload::new(OPERATION_CANCELLED, "The operation was cancelled.")
        }

        // -- Store errors --
        SyncwerkError::StoreQuery { model_name, .. } => {
            ErrorPayload::new(DATASTORE_EXCEPTION, format!("Query for {model_name} failed."))
                .suggest("Retry the query. If it keeps failing, clear the local store and let it re-sync.")
                .caused_by(err)
        }

        SyncwerkError::StoreSave(_) => ErrorPayload::new(DATASTORE_EXCEPTION, "Save failed.")
            .suggest("Check that the model satisfies its schema and any save condition.")
            .caused_by(err),

        SyncwerkError::StoreDelete(_) | SyncwerkError::DeleteMissingRow { .. } => {
            ErrorPayload::new(DATASTORE_EXCEPTION, "Delete failed.").caused_by(err)
        }

        SyncwerkError::Store(_) | SyncwerkError::Database(_) => {
            ErrorPayload::new(DATASTORE_EXCEPTION, "The local store reported an error.")
                .suggest("Retry the operation. If it keeps failing, clear the local store.")
                .caused_by(err)
        }

        SyncwerkError::Config(_) => {
            ErrorPayload::new(DATASTORE_EXCEPTION, "The data store is misconfigured.")
                .suggest("Check chunk_limit and max_predicate_terms in the data store config.")
                .caused_by(err)
        }

        SyncwerkError::Io(_) | SyncwerkError::Serialization(_) => {
            ErrorPayload::new(DATASTORE_EXCEPTION, "An unexpected error occurred.").caused_by(err)
        }
    }
}
