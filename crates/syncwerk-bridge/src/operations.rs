// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cancellation registry for in-flight bridge operations.
//
// Callers tag long-running requests with an opaque cancel token. A later
// `cancel` call with the same token flips the operation's signal; the
// operation observes it and returns `OPERATION_CANCELLED`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

/// Token → (registration id, cancel sender).
type Registry = HashMap<String, (u64, watch::Sender<bool>)>;

#[derive(Debug, Default)]
pub struct OperationsManager {
    next_id: AtomicU64,
    operations: Mutex<Registry>,
}

impl OperationsManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an operation under `token`. A previous registration with the
    /// same token is replaced and can no longer be cancelled.
    ///
    /// The registration is removed when the returned guard is dropped.
    pub fn register(&self, token: &str) -> OperationGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(false);
        if self.registry().insert(token.to_string(), (id, sender)).is_some() {
            debug!(token, "cancel token reused, previous operation replaced");
        }
        OperationGuard {
            manager: self,
            token: token.to_string(),
            id,
            receiver,
        }
    }

    /// Signal cancellation. Returns whether an operation was registered
    /// under `token`.
    pub fn cancel(&self, token: &str) -> bool {
        match self.registry().get(token) {
            Some((_, sender)) => {
                sender.send_replace(true);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, token: &str) -> bool {
        self.registry().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    fn deregister(&self, token: &str, id: u64) {
        let mut registry = self.registry();
        if registry.get(token).is_some_and(|(current, _)| *current == id) {
            registry.remove(token);
        }
    }
}

/// A registered operation. Deregisters on drop.
#[derive(Debug)]
pub struct OperationGuard<'m> {
    manager: &'m OperationsManager,
    token: String,
    id: u64,
    receiver: watch::Receiver<bool>,
}

impl OperationGuard<'_> {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the operation is cancelled. Never resolves if the
    /// registration was replaced first.
    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.manager.deregister(&self.token, self.id);
    }
}
