// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data store bridge configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncwerkError};

/// Ids per association lookup query.
pub const DEFAULT_CHUNK_LIMIT: usize = 995;

/// Comparison terms the local store accepts in one predicate. SQLite rejects
/// expression trees deeper than 1000.
pub const DEFAULT_MAX_PREDICATE_TERMS: usize = 1000;

/// Upper bound for `max_predicate_terms`: SQLite binds at most 32766
/// parameters per statement and an id lookup also binds the model name.
pub const PREDICATE_TERMS_CEILING: usize = 32_765;

/// Persistent bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStoreConfig {
    /// Maximum number of ids per association lookup query.
    pub chunk_limit: usize,
    /// Maximum number of comparison terms the store accepts in one predicate.
    pub max_predicate_terms: usize,
    /// Optional cap on association levels hydrated below the queried model.
    /// Unbounded when unset; reference cycles are cut regardless.
    pub max_nesting_depth: Option<usize>,
    /// `tracing` env-filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Location of the local SQLite database; in-memory when unset.
    pub database_path: Option<PathBuf>,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            max_predicate_terms: DEFAULT_MAX_PREDICATE_TERMS,
            max_nesting_depth: None,
            log_filter: "info".into(),
            database_path: None,
        }
    }
}

impl DataStoreConfig {
    /// Check that the chunking limit fits inside the store's predicate limit
    /// and that the predicate limit fits SQLite's parameter limit.
    pub fn validate(&self) -> Result<()> {
        if self.max_predicate_terms > PREDICATE_TERMS_CEILING {
            return Err(SyncwerkError::Config(format!(
                "max_predicate_terms {} exceeds {PREDICATE_TERMS_CEILING}",
                self.max_predicate_terms
            )));
        }
        if self.chunk_limit == 0 {
            return Err(SyncwerkError::Config("chunk_limit must be at least 1".into()));
        }
        if self.chunk_limit > self.max_predicate_terms {
            return Err(SyncwerkError::Config(format!(
                "chunk_limit {} exceeds max_predicate_terms {}",
                self.chunk_limit, self.max_predicate_terms
            )));
        }
        Ok(())
    }

    /// Read a JSON config file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
