// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tracing subscriber setup for the host process.

use tracing_subscriber::EnvFilter;

/// Target used for data store bridge log lines.
pub const LOG_TARGET: &str = "syncwerk::datastore";

/// Install a formatting subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (usually `DataStoreConfig::log_filter`).
///
/// Returns `false` if a global subscriber was already installed, which is
/// expected when the host app sets up its own.
pub fn init_logging(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(target: LOG_TARGET, "logging initialised");
    }
    installed
}
