// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local record store backed by SQLite.
//
// Every model shares one `records` table; a row holds the record's storage
// JSON keyed by `(model_name, id)`. Id-set lookups are pushed down to SQL,
// every other predicate is evaluated in process after decoding. Writes are
// broadcast to observers as change events.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use syncwerk_core::config::{DEFAULT_MAX_PREDICATE_TERMS, DataStoreConfig, PREDICATE_TERMS_CEILING};
use syncwerk_core::error::{Result, SyncwerkError};
use syncwerk_core::query::{FieldOperator, FieldPredicate, QueryOptions, QueryPredicate};
use syncwerk_core::traits::{ChangeStream, Store};
use syncwerk_core::types::{ChangeEvent, ChangeType, ID_FIELD, SerializedRecord, Value};

use crate::filter;

/// SQLite schema for the records table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        model_name TEXT NOT NULL,
        id TEXT NOT NULL,
        data TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (model_name, id)
    )
"#;

/// Buffered change events per observer before it starts lagging.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// SQLite-backed [`Store`].
///
/// `rusqlite` is synchronous, so every call runs on the blocking pool behind
/// a shared connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<ChangeEvent>,
    max_predicate_terms: usize,
}

impl SqliteStore {
    /// Open (or create) the record database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| SyncwerkError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| SyncwerkError::Database(format!("WAL pragma: {e}")))?;

        let store = Self::with_connection(conn)?;
        info!("record store database opened");
        Ok(store)
    }

    /// Open an in-memory database (tests and previews).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncwerkError::Database(format!("open in-memory: {e}")))?;

        let store = Self::with_connection(conn)?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    /// Open the database named by `config.database_path`, in memory when
    /// unset, with the configured predicate limit.
    pub fn from_config(config: &DataStoreConfig) -> Result<Self> {
        let store = match &config.database_path {
            Some(path) => Self::open(path)?,
            None => Self::open_in_memory()?,
        };
        Ok(store.with_max_predicate_terms(config.max_predicate_terms))
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| SyncwerkError::Database(format!("create table: {e}")))?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
            max_predicate_terms: DEFAULT_MAX_PREDICATE_TERMS,
        })
    }

    /// Set the predicate term limit, capped at what one statement can bind.
    pub fn with_max_predicate_terms(mut self, max_predicate_terms: usize) -> Self {
        self.max_predicate_terms = max_predicate_terms.min(PREDICATE_TERMS_CEILING);
        self
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, what: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| SyncwerkError::Database(format!("{what}: connection lock poisoned")))?;
            op(&guard)
        })
        .await
        .map_err(|e| SyncwerkError::Database(format!("{what}: blocking task failed: {e}")))?
    }

    fn publish(&self, record: SerializedRecord, event_type: ChangeType) {
        // No receivers is not an error.
        let _ = self.changes.send(ChangeEvent { record, event_type });
    }
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip(self, options), fields(terms = options.predicate.term_count()))]
    async fn query(
        &self,
        model_name: &str,
        options: &QueryOptions,
    ) -> Result<Vec<SerializedRecord>> {
        let terms = options.predicate.term_count();
        if terms > self.max_predicate_terms {
            return Err(SyncwerkError::store_query(
                model_name,
                format!(
                    "predicate has {terms} terms, the store accepts at most {}",
                    self.max_predicate_terms
                ),
            ));
        }

        let model = model_name.to_string();
        let options = options.clone();
        let rows = self
            .with_conn("query", move |conn| {
                let rows = match id_lookup(&options.predicate) {
                    Some(ids) => select_by_ids(conn, &model, &ids),
                    None => select_all(conn, &model),
                }
                .map_err(|e| SyncwerkError::store_query(&model, e.to_string()))?;

                let records = rows
                    .into_iter()
                    .map(|data| decode(&model, &data))
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| SyncwerkError::store_query(&model, e.to_string()))?;
                Ok(filter::apply(records, &options))
            })
            .await?;

        debug!(model = model_name, count = rows.len(), "query complete");
        Ok(rows)
    }

    #[instrument(skip(self, record, predicate), fields(model = %record.model_name, id = %record.id))]
    async fn save(&self, record: &SerializedRecord, predicate: &QueryPredicate) -> Result<()> {
        let owned = record.clone();
        let predicate = predicate.clone();
        let change = self
            .with_conn("save", move |conn| {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT data FROM records WHERE model_name = ?1 AND id = ?2",
                        params![owned.model_name, owned.id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| SyncwerkError::StoreSave(format!("read existing row: {e}")))?;

                if let Some(data) = &existing {
                    let current = decode(&owned.model_name, data)
                        .map_err(|e| SyncwerkError::StoreSave(e.to_string()))?;
                    if !filter::matches(&current, &predicate) {
                        return Err(SyncwerkError::StoreSave(format!(
                            "condition not met for {} {}",
                            owned.model_name, owned.id
                        )));
                    }
                }

                let data = serde_json::to_string(&owned.data_json())
                    .map_err(|e| SyncwerkError::StoreSave(format!("serialize record: {e}")))?;
                conn.execute(
                    "INSERT INTO records (model_name, id, data, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (model_name, id)
                     DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                    params![owned.model_name, owned.id, data, Utc::now().to_rfc3339()],
                )
                .map_err(|e| SyncwerkError::StoreSave(format!("write row: {e}")))?;

                Ok(if existing.is_some() {
                    ChangeType::Update
                } else {
                    ChangeType::Create
                })
            })
            .await?;

        info!(change = change.as_str(), "record saved");
        self.publish(record.clone(), change);
        Ok(())
    }

    #[instrument(skip(self, record), fields(model = %record.model_name, id = %record.id))]
    async fn delete(&self, record: &SerializedRecord) -> Result<()> {
        let model = record.model_name.clone();
        let id = record.id.clone();
        let deleted = self
            .with_conn("delete", move |conn| {
                conn.execute(
                    "DELETE FROM records WHERE model_name = ?1 AND id = ?2",
                    params![model, id],
                )
                .map_err(|e| SyncwerkError::StoreDelete(format!("delete row: {e}")))
            })
            .await?;

        if deleted == 0 {
            return Err(SyncwerkError::DeleteMissingRow {
                model_name: record.model_name.clone(),
                id: record.id.clone(),
            });
        }

        info!("record deleted");
        self.publish(record.clone(), ChangeType::Delete);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let removed = self
            .with_conn("clear", |conn| {
                conn.execute("DELETE FROM records", [])
                    .map_err(|e| SyncwerkError::Store(format!("clear records: {e}")))
            })
            .await?;

        info!(removed, "record store cleared");
        Ok(())
    }

    fn observe(&self) -> ChangeStream {
        let receiver = self.changes.subscribe();
        futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer lagged behind the store");
                    let err = SyncwerkError::Store(format!("observer missed {skipped} change events"));
                    Some((Err(err), receiver))
                }
                Err(RecvError::Closed) => None,
            }
        })
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Row access
// ---------------------------------------------------------------------------

/// The ids named by a pure id-set predicate (`id == a OR id == b ...`).
fn id_lookup(predicate: &QueryPredicate) -> Option<Vec<String>> {
    fn id_term(predicate: &QueryPredicate) -> Option<String> {
        match predicate {
            QueryPredicate::Compare(FieldPredicate {
                field,
                operator: FieldOperator::Equal(Value::String(id)),
            }) if field == ID_FIELD => Some(id.clone()),
            _ => None,
        }
    }

    match predicate {
        QueryPredicate::Or(terms) if !terms.is_empty() => terms.iter().map(id_term).collect(),
        single => id_term(single).map(|id| vec![id]),
    }
}

fn select_all(conn: &Connection, model_name: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT data FROM records WHERE model_name = ?1 ORDER BY rowid")?;
    let rows = stmt
        .query_map(params![model_name], |row| row.get(0))?
        .collect();
    rows
}

fn select_by_ids(conn: &Connection, model_name: &str, ids: &[String]) -> rusqlite::Result<Vec<String>> {
    let placeholders = (0..ids.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT data FROM records WHERE model_name = ?1 AND id IN ({placeholders}) ORDER BY rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let bound = std::iter::once(model_name).chain(ids.iter().map(String::as_str));
    let rows = stmt
        .query_map(params_from_iter(bound), |row| row.get(0))?
        .collect();
    rows
}

fn decode(model_name: &str, data: &str) -> Result<SerializedRecord> {
    let json: serde_json::Value = serde_json::from_str(data)?;
    SerializedRecord::from_data_json(model_name, json)
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use syncwerk_core::query::SortOrder;

    use super::*;

    fn user(id: &str, name: &str) -> SerializedRecord {
        SerializedRecord::new("User", id).with_field("name", name)
    }

    async fn seeded(n: usize) -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("open");
        for i in 0..n {
            store
                .save(&user(&format!("u{i}"), &format!("name {i}")), &QueryPredicate::All)
                .await
                .expect("save");
        }
        store
    }

    #[tokio::test]
    async fn save_then_query_by_id() {
        let store = seeded(3).await;
        let found = store
            .query("User", &QueryOptions::matching(QueryPredicate::eq("id", "u1")))
            .await
            .expect("query");
        assert_eq!(found, vec![user("u1", "name 1")]);
    }

    #[tokio::test]
    async fn id_set_lookup_returns_only_requested_rows() {
        let store = seeded(10).await;
        let ids: Vec<String> = ["u2", "u7", "missing"].iter().map(|s| s.to_string()).collect();
        let found = store
            .query("User", &QueryOptions::matching(QueryPredicate::id_in(&ids)))
            .await
            .expect("query");
        let found: Vec<&str> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(found, ["u2", "u7"]);
    }

    #[tokio::test]
    async fn models_do_not_leak_into_each_other() {
        let store = seeded(2).await;
        store
            .save(&SerializedRecord::new("Post", "u0"), &QueryPredicate::All)
            .await
            .expect("save post");
        assert_eq!(store.query("Post", &QueryOptions::all()).await.expect("query").len(), 1);
        assert_eq!(store.query("User", &QueryOptions::all()).await.expect("query").len(), 2);
    }

    #[tokio::test]
    async fn oversized_predicate_is_rejected() {
        let store = seeded(1).await.with_max_predicate_terms(1000);
        let ids: Vec<String> = (0..1001).map(|i| format!("u{i}")).collect();
        let err = store
            .query("User", &QueryOptions::matching(QueryPredicate::id_in(&ids)))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncwerkError::StoreQuery { .. }));

        let ok: Vec<String> = (0..995).map(|i| format!("u{i}")).collect();
        store
            .query("User", &QueryOptions::matching(QueryPredicate::id_in(&ok)))
            .await
            .expect("995 terms are accepted");
    }

    #[tokio::test]
    async fn predicate_limit_is_capped_at_bindable_parameters() {
        let store = seeded(3).await.with_max_predicate_terms(usize::MAX);
        let ids: Vec<String> = (0..PREDICATE_TERMS_CEILING).map(|i| format!("u{i}")).collect();
        let found = store
            .query("User", &QueryOptions::matching(QueryPredicate::id_in(&ids)))
            .await
            .expect("largest bindable id set is accepted");
        assert_eq!(found.len(), 3);

        let too_many: Vec<String> = (0..=PREDICATE_TERMS_CEILING).map(|i| format!("u{i}")).collect();
        let err = store
            .query("User", &QueryOptions::matching(QueryPredicate::id_in(&too_many)))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncwerkError::StoreQuery { .. }));
    }

    #[tokio::test]
    async fn sorted_and_paginated_query() {
        let store = seeded(5).await;
        let options = QueryOptions::all()
            .sorted_by("name", SortOrder::Descending)
            .paginated(syncwerk_core::query::QueryPagination { page: 0, limit: 2 });
        let found = store.query("User", &options).await.expect("query");
        let names: Vec<&str> = found
            .iter()
            .filter_map(|r| r.field("name").and_then(Value::as_str))
            .collect();
        assert_eq!(names, ["name 4", "name 3"]);
    }

    #[tokio::test]
    async fn nested_placeholders_survive_storage() {
        let store = SqliteStore::open_in_memory().expect("open");
        let post = SerializedRecord::new("Post", "p1").with_field("author", SerializedRecord::placeholder("u1"));
        store.save(&post, &QueryPredicate::All).await.expect("save");

        let found = store.query("Post", &QueryOptions::all()).await.expect("query");
        assert_eq!(found[0].nested_id("author"), Some("u1"));
    }

    #[tokio::test]
    async fn conditional_save_checks_existing_row() {
        let store = seeded(1).await;
        let condition = QueryPredicate::eq("name", "someone else");
        let err = store
            .save(&user("u0", "renamed"), &condition)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncwerkError::StoreSave(_)));

        store
            .save(&user("u0", "renamed"), &QueryPredicate::eq("name", "name 0"))
            .await
            .expect("condition holds");

        // A new row has nothing to check the condition against.
        store
            .save(&user("u9", "fresh"), &condition)
            .await
            .expect("insert ignores condition");
    }

    #[tokio::test]
    async fn deleting_a_missing_row_is_reported() {
        let store = seeded(1).await;
        store.delete(&user("u0", "")).await.expect("delete");
        let err = store.delete(&user("u0", "")).await.unwrap_err();
        assert!(err.is_missing_row());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = seeded(3).await;
        store.clear().await.expect("clear");
        assert!(store.query("User", &QueryOptions::all()).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn observers_see_create_update_delete() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut changes = store.observe();

        store.save(&user("u1", "Ana"), &QueryPredicate::All).await.expect("create");
        store.save(&user("u1", "Ana B"), &QueryPredicate::All).await.expect("update");
        store.delete(&user("u1", "Ana B")).await.expect("delete");

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let event = changes.next().await.expect("event").expect("ok event");
            kinds.push(event.event_type);
        }
        assert_eq!(kinds, [ChangeType::Create, ChangeType::Update, ChangeType::Delete]);
    }

    #[tokio::test]
    async fn on_disk_database_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("records.db");
        {
            let store = SqliteStore::open(&path).expect("open");
            store.save(&user("u1", "Ana"), &QueryPredicate::All).await.expect("save");
        }

        let reopened = SqliteStore::from_config(&DataStoreConfig {
            database_path: Some(path),
            ..Default::default()
        })
        .expect("reopen");
        let found = reopened.query("User", &QueryOptions::all()).await.expect("query");
        assert_eq!(found, vec![user("u1", "Ana")]);
    }
}
