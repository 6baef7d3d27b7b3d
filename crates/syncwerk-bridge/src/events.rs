// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event streams pushed from the bridge to the app layer.
//
// Two channels mirror the two platform event channels: `observe` carries
// model change events (or the error that ended a subscription), `hub`
// carries lifecycle notifications.

use futures::StreamExt;
use serde_json::{Value as Json, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use syncwerk_core::error_payload::{ErrorPayload, to_error_payload};
use syncwerk_core::traits::ChangeStream;
use syncwerk_core::types::ChangeEvent;

use crate::logging::LOG_TARGET;

/// Item on the observe channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserveEvent {
    Change(ChangeEvent),
    Error(ErrorPayload),
}

impl ObserveEvent {
    /// `{ item, eventType }` for changes, the error payload otherwise.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Change(change) => change.to_bridge_map(),
            Self::Error(payload) => payload.to_json(),
        }
    }
}

/// Item on the hub channel.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    ModelProviderConfigured { version: String },
    StoreCleared,
    ObserveStarted { subscription_id: Uuid },
    ObserveFailed { subscription_id: Uuid, error: ErrorPayload },
}

impl HubEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ModelProviderConfigured { .. } => "modelProviderConfigured",
            Self::StoreCleared => "storeCleared",
            Self::ObserveStarted { .. } => "observeStarted",
            Self::ObserveFailed { .. } => "observeFailed",
        }
    }

    pub fn to_json(&self) -> Json {
        let payload = match self {
            Self::ModelProviderConfigured { version } => json!({ "modelProviderVersion": version }),
            Self::StoreCleared => Json::Null,
            Self::ObserveStarted { subscription_id } => {
                json!({ "subscriptionId": subscription_id.to_string() })
            }
            Self::ObserveFailed {
                subscription_id,
                error,
            } => json!({
                "subscriptionId": subscription_id.to_string(),
                "error": error.to_json(),
            }),
        };
        json!({ "eventName": self.event_name(), "payload": payload })
    }
}

/// Sending half of both channels. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSinks {
    observe: mpsc::UnboundedSender<ObserveEvent>,
    hub: mpsc::UnboundedSender<HubEvent>,
}

/// Receiving half handed to the app layer.
#[derive(Debug)]
pub struct EventReceivers {
    pub observe: mpsc::UnboundedReceiver<ObserveEvent>,
    pub hub: mpsc::UnboundedReceiver<HubEvent>,
}

/// Create both channels.
pub fn channels() -> (EventSinks, EventReceivers) {
    let (observe_tx, observe_rx) = mpsc::unbounded_channel();
    let (hub_tx, hub_rx) = mpsc::unbounded_channel();
    (
        EventSinks {
            observe: observe_tx,
            hub: hub_tx,
        },
        EventReceivers {
            observe: observe_rx,
            hub: hub_rx,
        },
    )
}

impl EventSinks {
    /// Returns `false` once the app layer has dropped the observe receiver.
    pub fn observe(&self, event: ObserveEvent) -> bool {
        self.observe.send(event).is_ok()
    }

    pub fn hub(&self, event: HubEvent) {
        let name = event.event_name();
        if self.hub.send(event).is_err() {
            debug!(target: LOG_TARGET, event = name, "hub receiver dropped, event discarded");
        }
    }
}

/// A running observe subscription. Aborts its forwarding task on drop.
#[derive(Debug)]
pub struct ObserveSubscription {
    id: Uuid,
    task: JoinHandle<()>,
}

impl ObserveSubscription {
    /// Forward every item of `changes` to the observe channel until the
    /// stream ends, fails, or the receiver goes away.
    pub fn spawn(changes: ChangeStream, sinks: EventSinks) -> Self {
        let id = Uuid::new_v4();
        let task = tokio::spawn(forward(id, changes, sinks));
        Self { id, task }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ObserveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward(id: Uuid, mut changes: ChangeStream, sinks: EventSinks) {
    while let Some(item) = changes.next().await {
        let event = match item {
            Ok(change) => ObserveEvent::Change(change),
            Err(e) => {
                warn!(target: LOG_TARGET, subscription = %id, error = %e, "observe stream failed");
                let payload = to_error_payload(&e);
                sinks.hub(HubEvent::ObserveFailed {
                    subscription_id: id,
                    error: payload.clone(),
                });
                ObserveEvent::Error(payload)
            }
        };
        if !sinks.observe(event) {
            debug!(target: LOG_TARGET, subscription = %id, "observe receiver dropped");
            return;
        }
    }
    debug!(target: LOG_TARGET, subscription = %id, "observe stream ended");
}
