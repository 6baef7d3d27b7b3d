// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Syncwerk Bridge: Method-call dispatch between the app layer and the local
// data store, with cancellation, event streams, and logging setup.

pub mod events;
pub mod logging;
pub mod operations;
pub mod plugin;

pub use events::{EventReceivers, EventSinks, HubEvent, ObserveEvent, ObserveSubscription};
pub use logging::{LOG_TARGET, init_logging};
pub use operations::{OperationGuard, OperationsManager};
pub use plugin::DataStorePlugin;
