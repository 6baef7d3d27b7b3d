// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Method-call entry point of the data store bridge.
//
// The platform channel delivers `(method, arguments)` pairs. Each call is
// validated, turned into store requests, and answered with either a JSON
// result or a structured `ErrorPayload`. Query results have their to-one
// associations hydrated before they are serialized.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::{Map, Value as Json};
use tracing::{Level, debug, error, info, instrument, warn};

use syncwerk_core::config::DataStoreConfig;
use syncwerk_core::error::{Result, SyncwerkError};
use syncwerk_core::error_payload::{ErrorPayload, to_error_payload};
use syncwerk_core::query::QueryPredicate;
use syncwerk_core::schema::ModelProvider;
use syncwerk_core::traits::Store;
use syncwerk_core::types::{ResolvedRecord, SerializedRecord};
use syncwerk_resolver::{AssociationResolver, query_options_from_request};

use crate::events::{self, EventReceivers, EventSinks, HubEvent, ObserveSubscription};
use crate::logging::{LOG_TARGET, init_logging};
use crate::operations::OperationsManager;

/// The data store plugin: one per app process.
pub struct DataStorePlugin {
    store: Arc<dyn Store>,
    provider: RwLock<Arc<ModelProvider>>,
    config: DataStoreConfig,
    operations: OperationsManager,
    events: EventSinks,
    observer: Mutex<Option<ObserveSubscription>>,
}

impl DataStorePlugin {
    /// Create the plugin over `store`. The returned receivers carry the
    /// observe and hub event streams.
    ///
    /// Installs the `config.log_filter` subscriber unless the host already
    /// set one up.
    pub fn new(store: Arc<dyn Store>, config: DataStoreConfig) -> Result<(Self, EventReceivers)> {
        config.validate()?;
        init_logging(&config.log_filter);
        let (events, receivers) = events::channels();
        let plugin = Self {
            store,
            provider: RwLock::new(Arc::new(ModelProvider::new())),
            config,
            operations: OperationsManager::new(),
            events,
            observer: Mutex::new(None),
        };
        Ok((plugin, receivers))
    }

    /// Replace the registered model schemas.
    pub fn set_model_provider(&self, provider: ModelProvider) {
        *self.provider.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(provider);
    }

    /// Snapshot of the registered model schemas.
    pub fn model_provider(&self) -> Arc<ModelProvider> {
        Arc::clone(&self.provider.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn operations(&self) -> &OperationsManager {
        &self.operations
    }

    /// Dispatch one method call.
    pub async fn handle(&self, method: &str, args: Json) -> std::result::Result<Json, ErrorPayload> {
        let result = match method {
            "query" => self.query(&args).await,
            "save" => self.save(&args).await,
            "delete" => self.delete(&args).await,
            "clear" => self.clear().await,
            "setupObserve" => self.setup_observe(),
            "configureModelProvider" => self.configure_model_provider(&args),
            "cancel" => self.cancel(&args),
            other => Err(SyncwerkError::NotImplemented(other.to_string())),
        };

        result.map_err(|e| {
            let level = failure_level(&e);
            if level == Level::INFO {
                info!(target: LOG_TARGET, method, error = %e, "data store call cancelled");
            } else if level == Level::WARN {
                warn!(target: LOG_TARGET, method, error = %e, "data store call rejected");
            } else {
                error!(target: LOG_TARGET, method, error = %e, "data store call failed");
            }
            to_error_payload(&e)
        })
    }

    // ---- Methods ----

    #[instrument(skip_all)]
    async fn query(&self, args: &Json) -> Result<Json> {
        let request = request_map(args)?;
        let model_name = required_str(request, "modelName")?;
        let provider = self.known_model(model_name)?;
        let options = query_options_from_request(args)?;

        let run = async {
            let records = self.store.query(model_name, &options).await?;
            AssociationResolver::from_config(self.store.as_ref(), provider.as_ref(), &self.config)?
                .resolve(records, model_name)
                .await
        };

        let resolved = match request.get("cancelToken").and_then(Json::as_str) {
            Some(token) => {
                let mut operation = self.operations.register(token);
                tokio::select! {
                    result = run => result,
                    _ = operation.cancelled() => {
                        info!(target: LOG_TARGET, token, model = model_name, "query cancelled");
                        Err(SyncwerkError::Cancelled)
                    }
                }
            }
            None => run.await,
        }?;

        debug!(target: LOG_TARGET, model = model_name, count = resolved.len(), "query answered");
        Ok(Json::Array(
            resolved.iter().map(ResolvedRecord::to_bridge_map).collect(),
        ))
    }

    #[instrument(skip_all)]
    async fn save(&self, args: &Json) -> Result<Json> {
        let record = self.serialized_model(args)?;
        self.store.save(&record, &QueryPredicate::All).await?;
        Ok(Json::Null)
    }

    #[instrument(skip_all)]
    async fn delete(&self, args: &Json) -> Result<Json> {
        let record = self.serialized_model(args)?;
        match self.store.delete(&record).await {
            Ok(()) => {}
            Err(e) if e.is_missing_row() => {
                debug!(target: LOG_TARGET, model = %record.model_name, id = %record.id, "delete of absent row treated as success");
            }
            Err(e) => return Err(e),
        }
        Ok(Json::Null)
    }

    async fn clear(&self) -> Result<Json> {
        self.store.clear().await?;
        self.events.hub(HubEvent::StoreCleared);
        Ok(Json::Null)
    }

    /// Start forwarding store changes, replacing any running subscription.
    fn setup_observe(&self) -> Result<Json> {
        let subscription = ObserveSubscription::spawn(self.store.observe(), self.events.clone());
        let subscription_id = subscription.id();

        let mut observer = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = observer.replace(subscription) {
            debug!(target: LOG_TARGET, previous = %previous.id(), "replacing observe subscription");
        }
        drop(observer);

        info!(target: LOG_TARGET, subscription = %subscription_id, "observe started");
        self.events.hub(HubEvent::ObserveStarted { subscription_id });
        Ok(Json::Bool(true))
    }

    fn configure_model_provider(&self, args: &Json) -> Result<Json> {
        request_map(args)?;
        let provider = ModelProvider::from_configure_request(args)?;
        let version = provider.version().unwrap_or_default().to_string();

        info!(
            target: LOG_TARGET,
            version = %version,
            models = provider.model_names().len(),
            "model provider configured"
        );
        self.set_model_provider(provider);
        self.events.hub(HubEvent::ModelProviderConfigured { version });
        Ok(Json::Null)
    }

    fn cancel(&self, args: &Json) -> Result<Json> {
        let request = request_map(args)?;
        let token = required_str(request, "cancelToken")?;
        Ok(Json::Bool(self.operations.cancel(token)))
    }

    // ---- Request helpers ----

    fn known_model(&self, model_name: &str) -> Result<Arc<ModelProvider>> {
        let provider = self.model_provider();
        if !provider.contains(model_name) {
            return Err(SyncwerkError::MalformedRequest(format!(
                "no schema registered for model {model_name}"
            )));
        }
        Ok(provider)
    }

    /// `{ modelName, serializedModel }` → record of a registered model.
    fn serialized_model(&self, args: &Json) -> Result<SerializedRecord> {
        let request = request_map(args)?;
        let model_name = required_str(request, "modelName")?;
        self.known_model(model_name)?;
        let data = request.get("serializedModel").cloned().ok_or_else(|| {
            SyncwerkError::MalformedRequest("serializedModel is missing".into())
        })?;
        SerializedRecord::from_data_json(model_name, data)
    }
}

fn request_map(args: &Json) -> Result<&Map<String, Json>> {
    args.as_object()
        .ok_or_else(|| SyncwerkError::MalformedRequest("arguments are not a map".into()))
}

fn required_str<'a>(request: &'a Map<String, Json>, key: &str) -> Result<&'a str> {
    request
        .get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| SyncwerkError::MalformedRequest(format!("{key} is missing")))
}

/// Log level for a failed call: cancellation is routine, bad requests are
/// the caller's fault, everything else is a store failure.
fn failure_level(err: &SyncwerkError) -> Level {
    match err {
        SyncwerkError::Cancelled => Level::INFO,
        SyncwerkError::MalformedRequest(_) | SyncwerkError::NotImplemented(_) => Level::WARN,
        _ => Level::ERROR,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use syncwerk_core::error_payload::{NOT_IMPLEMENTED, OPERATION_CANCELLED, REQUEST_MALFORMED};
    use syncwerk_core::query::QueryOptions;
    use syncwerk_core::traits::ChangeStream;
    use syncwerk_store::SqliteStore;

    use super::*;
    use crate::events::ObserveEvent;

    fn configure_request() -> Json {
        json!({
            "modelProviderVersion": "v1",
            "modelSchemas": [
                {
                    "name": "Post",
                    "fields": {
                        "author": {
                            "name": "author",
                            "association": { "associationType": "BelongsTo", "associatedType": "User" }
                        },
                        "comments": {
                            "name": "comments",
                            "association": { "associationType": "HasMany", "associatedType": "Comment" }
                        }
                    }
                },
                {
                    "name": "Comment",
                    "fields": {
                        "post": {
                            "name": "post",
                            "association": { "associationType": "BelongsTo", "associatedType": "Post" }
                        }
                    }
                },
                { "name": "User" }
            ]
        })
    }

    async fn configured() -> (DataStorePlugin, EventReceivers) {
        let store = SqliteStore::open_in_memory().expect("open store");
        let (plugin, receivers) =
            DataStorePlugin::new(Arc::new(store), DataStoreConfig::default()).expect("plugin");
        plugin
            .handle("configureModelProvider", configure_request())
            .await
            .expect("configure");
        (plugin, receivers)
    }

    async fn save(plugin: &DataStorePlugin, model_name: &str, data: Json) {
        plugin
            .handle("save", json!({ "modelName": model_name, "serializedModel": data }))
            .await
            .expect("save");
    }

    #[tokio::test]
    async fn query_hydrates_nested_associations() {
        let (plugin, _events) = configured().await;
        save(&plugin, "User", json!({ "id": "u1", "name": "Ana" })).await;
        save(&plugin, "Post", json!({ "id": "p1", "title": "Hi", "author": { "id": "u1" } })).await;
        save(&plugin, "Comment", json!({ "id": "c1", "post": { "id": "p1" } })).await;
        save(&plugin, "Comment", json!({ "id": "c2", "post": { "id": "p1" } })).await;

        let result = plugin
            .handle("query", json!({ "modelName": "Comment" }))
            .await
            .expect("query");
        let comments = result.as_array().expect("list");
        assert_eq!(comments.len(), 2);

        let post = &comments[0]["serializedData"]["post"];
        assert_eq!(post["title"], "Hi");
        assert_eq!(post["author"], json!({ "id": "u1", "name": "Ana" }));
        assert_eq!(comments[0]["modelName"], "Comment");
    }

    #[tokio::test]
    async fn query_applies_predicate_and_sort() {
        let (plugin, _events) = configured().await;
        for (id, name) in [("u1", "Cleo"), ("u2", "Ana"), ("u3", "Bo")] {
            save(&plugin, "User", json!({ "id": id, "name": name })).await;
        }

        let result = plugin
            .handle(
                "query",
                json!({
                    "modelName": "User",
                    "queryPredicate": {
                        "queryPredicateOperation": {
                            "field": "id",
                            "fieldOperation": { "operatorName": "not_equal", "value": "u3" }
                        }
                    },
                    "querySort": [{ "field": "name", "order": "ascending" }]
                }),
            )
            .await
            .expect("query");

        let ids: Vec<&str> = result
            .as_array()
            .expect("list")
            .iter()
            .filter_map(|r| r["id"].as_str())
            .collect();
        assert_eq!(ids, ["u2", "u1"]);
    }

    #[tokio::test]
    async fn unknown_model_is_malformed() {
        let (plugin, _events) = configured().await;
        let err = plugin
            .handle("query", json!({ "modelName": "Tag" }))
            .await
            .unwrap_err();
        assert_eq!(err.error_code, REQUEST_MALFORMED);
    }

    #[tokio::test]
    async fn non_map_arguments_are_malformed() {
        let (plugin, _events) = configured().await;
        for method in ["query", "save", "delete", "cancel", "configureModelProvider"] {
            let err = plugin.handle(method, json!("Post")).await.unwrap_err();
            assert_eq!(err.error_code, REQUEST_MALFORMED, "{method}");
        }
    }

    #[tokio::test]
    async fn unknown_method_is_not_implemented() {
        let (plugin, _events) = configured().await;
        let err = plugin.handle("sync", Json::Null).await.unwrap_err();
        assert_eq!(err.error_code, NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn deleting_an_absent_row_succeeds() {
        let (plugin, _events) = configured().await;
        let args = json!({ "modelName": "User", "serializedModel": { "id": "ghost" } });
        assert_eq!(plugin.handle("delete", args).await.expect("delete"), Json::Null);
    }

    #[tokio::test]
    async fn observe_forwards_store_changes() {
        let (plugin, mut events) = configured().await;
        assert_eq!(events.hub.recv().await.map(|e| e.event_name()), Some("modelProviderConfigured"));

        assert_eq!(plugin.handle("setupObserve", Json::Null).await.expect("observe"), json!(true));
        assert_eq!(events.hub.recv().await.map(|e| e.event_name()), Some("observeStarted"));

        save(&plugin, "User", json!({ "id": "u1", "name": "Ana" })).await;
        let event = tokio::time::timeout(Duration::from_secs(1), events.observe.recv())
            .await
            .expect("event in time")
            .expect("event");
        let ObserveEvent::Change(change) = &event else {
            panic!("expected change, got {event:?}");
        };
        assert_eq!(change.record.id, "u1");
        assert_eq!(event.to_json()["eventType"], "create");
    }

    #[tokio::test]
    async fn clear_empties_the_store_and_notifies_hub() {
        let (plugin, mut events) = configured().await;
        events.hub.recv().await.expect("configured event");
        save(&plugin, "User", json!({ "id": "u1" })).await;

        plugin.handle("clear", Json::Null).await.expect("clear");
        assert_eq!(events.hub.recv().await, Some(HubEvent::StoreCleared));

        let result = plugin
            .handle("query", json!({ "modelName": "User" }))
            .await
            .expect("query");
        assert_eq!(result, json!([]));
    }

    #[tokio::test]
    async fn configure_requires_version() {
        let store = SqliteStore::open_in_memory().expect("open store");
        let (plugin, _events) =
            DataStorePlugin::new(Arc::new(store), DataStoreConfig::default()).expect("plugin");
        let err = plugin
            .handle("configureModelProvider", json!({ "modelSchemas": [] }))
            .await
            .unwrap_err();
        assert_eq!(err.error_code, REQUEST_MALFORMED);
        assert!(plugin.model_provider().version().is_none());
    }

    /// Store whose queries never complete.
    struct StalledStore;

    #[async_trait]
    impl Store for StalledStore {
        async fn query(&self, _: &str, _: &QueryOptions) -> Result<Vec<SerializedRecord>> {
            std::future::pending().await
        }
        async fn save(&self, _: &SerializedRecord, _: &QueryPredicate) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _: &SerializedRecord) -> Result<()> {
            Ok(())
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
        fn observe(&self) -> ChangeStream {
            futures::stream::empty().boxed()
        }
    }

    #[tokio::test]
    async fn cancel_token_aborts_a_running_query() {
        let (plugin, _events) =
            DataStorePlugin::new(Arc::new(StalledStore), DataStoreConfig::default()).expect("plugin");
        plugin.set_model_provider(
            ModelProvider::new().with_schema(syncwerk_core::schema::ModelSchema::new("Post")),
        );

        let query = plugin.handle("query", json!({ "modelName": "Post", "cancelToken": "t1" }));
        let cancel = async {
            while !plugin.operations().is_registered("t1") {
                tokio::task::yield_now().await;
            }
            plugin.handle("cancel", json!({ "cancelToken": "t1" })).await
        };

        let (query, cancel) = tokio::join!(query, cancel);
        assert_eq!(query.unwrap_err().error_code, OPERATION_CANCELLED);
        assert_eq!(cancel.expect("cancel"), json!(true));
        assert!(plugin.operations().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = DataStoreConfig {
            chunk_limit: 2000,
            ..Default::default()
        };
        assert!(DataStorePlugin::new(Arc::new(StalledStore), config).is_err());
    }

    #[tokio::test]
    async fn new_installs_the_configured_log_filter() {
        let config = DataStoreConfig {
            log_filter: "syncwerk=debug".into(),
            ..Default::default()
        };
        let _plugin = DataStorePlugin::new(Arc::new(StalledStore), config).expect("plugin");
        assert!(!init_logging("info"), "subscriber already installed");
    }

    #[test]
    fn failures_are_logged_by_severity() {
        assert_eq!(failure_level(&SyncwerkError::Cancelled), Level::INFO);
        assert_eq!(failure_level(&SyncwerkError::MalformedRequest("no modelName".into())), Level::WARN);
        assert_eq!(failure_level(&SyncwerkError::NotImplemented("sync".into())), Level::WARN);
        assert_eq!(failure_level(&SyncwerkError::store_query("Post", "disk I/O error")), Level::ERROR);
        assert_eq!(failure_level(&SyncwerkError::StoreSave("constraint failed".into())), Level::ERROR);
    }
}
