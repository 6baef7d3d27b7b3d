// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Syncwerk Store: SQLite-backed local record store used on desktop, in CI,
// and as the reference implementation of the `Store` capability.

pub mod filter;
pub mod sqlite;

pub use sqlite::SqliteStore;
pub use syncwerk_core::config::DEFAULT_MAX_PREDICATE_TERMS;
