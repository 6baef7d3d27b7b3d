// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Syncwerk Resolver: Nested association resolution, foreign-key chunking,
// and query option translation.

pub mod chunk;
pub mod options;
pub mod resolver;

pub use chunk::{IdBatch, chunk};
pub use options::{predicate_from_json, query_options_from_request};
pub use resolver::AssociationResolver;
pub use syncwerk_core::config::DEFAULT_CHUNK_LIMIT;
