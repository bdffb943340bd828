//! Webhook configuration persistence.
//!
//! [`WebhookConfigStore`] is the only way the dispatcher reaches
//! configuration records. Two implementations are provided:
//!
//! - [`MemoryWebhookStore`]: a process-local map, for tests and embedding
//! - [`SqliteWebhookStore`]: a `SQLite` table with an atomic health update
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE webhook_configs (
//!     id TEXT PRIMARY KEY,
//!     workspace_id TEXT NOT NULL,
//!     name TEXT NOT NULL,
//!     description TEXT,
//!     url TEXT NOT NULL,
//!     events TEXT NOT NULL,        -- JSON array
//!     headers TEXT NOT NULL,       -- JSON object
//!     secret TEXT,
//!     active INTEGER NOT NULL,
//!     last_triggered INTEGER,      -- unix millis
//!     failure_count INTEGER NOT NULL,
//!     channel TEXT,
//!     created_at INTEGER NOT NULL  -- unix millis
//! );
//! ```

use super::config::{AttemptOutcome, DeliveryHealth, NewWebhookConfiguration, WebhookConfiguration};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

/// Generates a new configuration id.
#[must_use]
pub fn new_webhook_id() -> String {
    format!("wh_{}", uuid::Uuid::new_v4().simple())
}

/// Persistence collaborator for webhook configurations.
pub trait WebhookConfigStore: Send + Sync {
    /// Loads a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; a missing id is `Ok(None)`.
    fn get(&self, id: &str) -> Result<Option<WebhookConfiguration>>;

    /// Lists configurations, optionally restricted to one workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn list(&self, workspace_id: Option<&str>) -> Result<Vec<WebhookConfiguration>>;

    /// Persists a validated configuration and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn create(&self, config: NewWebhookConfiguration) -> Result<WebhookConfiguration>;

    /// Overwrites the health fields of a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is unknown.
    fn save_health(&self, id: &str, health: DeliveryHealth) -> Result<()>;

    /// Applies the outcome of one attempt to the stored health and returns
    /// the new health.
    ///
    /// The default is read-modify-write through [`save_health`]; two
    /// concurrent attempts may lose one update. Backends that can do better
    /// override it.
    ///
    /// [`save_health`]: WebhookConfigStore::save_health
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is unknown.
    fn record_attempt(
        &self,
        id: &str,
        outcome: AttemptOutcome,
        at: DateTime<Utc>,
    ) -> Result<DeliveryHealth> {
        let config = self.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))?;
        let health = config.health().after(outcome, at);
        self.save_health(id, health)?;
        Ok(health)
    }
}

fn op_failed(operation: &str, cause: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: cause.to_string(),
    }
}

/// In-memory configuration store.
#[derive(Default)]
pub struct MemoryWebhookStore {
    configs: Mutex<HashMap<String, WebhookConfiguration>>,
}

impl MemoryWebhookStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a full record as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn insert(&self, config: WebhookConfiguration) -> Result<()> {
        self.configs
            .lock()
            .map_err(|e| op_failed("lock_webhook_store", e))?
            .insert(config.id.clone(), config);
        Ok(())
    }
}

impl WebhookConfigStore for MemoryWebhookStore {
    fn get(&self, id: &str) -> Result<Option<WebhookConfiguration>> {
        let configs = self
            .configs
            .lock()
            .map_err(|e| op_failed("lock_webhook_store", e))?;
        Ok(configs.get(id).cloned())
    }

    fn list(&self, workspace_id: Option<&str>) -> Result<Vec<WebhookConfiguration>> {
        let configs = self
            .configs
            .lock()
            .map_err(|e| op_failed("lock_webhook_store", e))?;

        let mut listed: Vec<WebhookConfiguration> = configs
            .values()
            .filter(|c| workspace_id.is_none_or(|ws| c.workspace_id == ws))
            .cloned()
            .collect();
        drop(configs);

        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(listed)
    }

    fn create(&self, config: NewWebhookConfiguration) -> Result<WebhookConfiguration> {
        let stored = config.into_configuration(new_webhook_id(), Utc::now());
        self.insert(stored.clone())?;
        Ok(stored)
    }

    fn save_health(&self, id: &str, health: DeliveryHealth) -> Result<()> {
        let mut configs = self
            .configs
            .lock()
            .map_err(|e| op_failed("lock_webhook_store", e))?;

        let config = configs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        config.apply_health(health);
        Ok(())
    }
}

/// `SQLite`-backed configuration store.
pub struct SqliteWebhookStore {
    /// `SQLite` connection.
    conn: Mutex<Connection>,
}

/// Raw column values of one `webhook_configs` row.
struct StoredRow {
    id: String,
    workspace_id: String,
    name: String,
    description: Option<String>,
    url: String,
    events: String,
    headers: String,
    secret: Option<String>,
    active: bool,
    last_triggered: Option<i64>,
    failure_count: i64,
    channel: Option<String>,
    created_at: i64,
}

impl StoredRow {
    const COLUMNS: &'static str = "id, workspace_id, name, description, url, events, headers, \
                                   secret, active, last_triggered, failure_count, channel, created_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            url: row.get(4)?,
            events: row.get(5)?,
            headers: row.get(6)?,
            secret: row.get(7)?,
            active: row.get(8)?,
            last_triggered: row.get(9)?,
            failure_count: row.get(10)?,
            channel: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_configuration(self) -> Result<WebhookConfiguration> {
        let events: BTreeSet<String> =
            serde_json::from_str(&self.events).map_err(|e| op_failed("decode_events", e))?;
        let headers: BTreeMap<String, String> =
            serde_json::from_str(&self.headers).map_err(|e| op_failed("decode_headers", e))?;

        Ok(WebhookConfiguration {
            id: self.id,
            workspace_id: self.workspace_id,
            name: self.name,
            description: self.description,
            url: self.url,
            events,
            headers,
            secret: self.secret.map(SecretString::from),
            active: self.active,
            last_triggered: self.last_triggered.and_then(DateTime::from_timestamp_millis),
            failure_count: u32::try_from(self.failure_count).unwrap_or(u32::MAX),
            channel: self.channel,
            created_at: DateTime::from_timestamp_millis(self.created_at).unwrap_or_default(),
        })
    }
}

// Mutex guards are held for the duration of database operations, which is correct behavior
#[allow(clippy::significant_drop_tightening)]
impl SqliteWebhookStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| op_failed("create_store_dir", e))?;
        }

        let conn = Connection::open(db_path).map_err(|e| op_failed("open_webhook_db", e))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| op_failed("configure_webhook_db", e))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| op_failed("open_memory_db", e))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| op_failed("lock_webhook_db", e))?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS webhook_configs (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                url TEXT NOT NULL,
                events TEXT NOT NULL,
                headers TEXT NOT NULL,
                secret TEXT,
                active INTEGER NOT NULL,
                last_triggered INTEGER,
                failure_count INTEGER NOT NULL DEFAULT 0,
                channel TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_webhook_configs_workspace
                ON webhook_configs(workspace_id);
            ",
        )
        .map_err(|e| op_failed("create_webhook_schema", e))?;

        Ok(())
    }
}

// Mutex guards are held for the duration of database operations, which is correct behavior
#[allow(clippy::significant_drop_tightening)]
impl WebhookConfigStore for SqliteWebhookStore {
    fn get(&self, id: &str) -> Result<Option<WebhookConfiguration>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| op_failed("lock_webhook_db", e))?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM webhook_configs WHERE id = ?1", StoredRow::COLUMNS),
                params![id],
                StoredRow::from_row,
            )
            .optional()
            .map_err(|e| op_failed("get_webhook_config", e))?;

        row.map(StoredRow::into_configuration).transpose()
    }

    fn list(&self, workspace_id: Option<&str>) -> Result<Vec<WebhookConfiguration>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| op_failed("lock_webhook_db", e))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM webhook_configs \
                 WHERE ?1 IS NULL OR workspace_id = ?1 \
                 ORDER BY created_at, id",
                StoredRow::COLUMNS
            ))
            .map_err(|e| op_failed("prepare_list_query", e))?;

        let rows = stmt
            .query_map(params![workspace_id], StoredRow::from_row)
            .map_err(|e| op_failed("list_webhook_configs", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| op_failed("list_webhook_configs", e))?;

        rows.into_iter().map(StoredRow::into_configuration).collect()
    }

    fn create(&self, config: NewWebhookConfiguration) -> Result<WebhookConfiguration> {
        let stored = config.into_configuration(new_webhook_id(), Utc::now());

        let events =
            serde_json::to_string(&stored.events).map_err(|e| op_failed("encode_events", e))?;
        let headers =
            serde_json::to_string(&stored.headers).map_err(|e| op_failed("encode_headers", e))?;

        let conn = self
            .conn
            .lock()
            .map_err(|e| op_failed("lock_webhook_db", e))?;

        conn.execute(
            &format!(
                "INSERT INTO webhook_configs ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                StoredRow::COLUMNS
            ),
            params![
                stored.id,
                stored.workspace_id,
                stored.name,
                stored.description,
                stored.url,
                events,
                headers,
                stored.secret.as_ref().map(|s| s.expose_secret().to_string()),
                stored.active,
                stored.last_triggered.map(|t| t.timestamp_millis()),
                i64::from(stored.failure_count),
                stored.channel,
                stored.created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| op_failed("insert_webhook_config", e))?;

        tracing::info!(webhook_id = %stored.id, workspace_id = %stored.workspace_id, "Created webhook configuration");
        Ok(stored)
    }

    fn save_health(&self, id: &str, health: DeliveryHealth) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| op_failed("lock_webhook_db", e))?;

        let updated = conn
            .execute(
                "UPDATE webhook_configs SET last_triggered = ?2, failure_count = ?3 WHERE id = ?1",
                params![
                    id,
                    health.last_triggered.map(|t| t.timestamp_millis()),
                    i64::from(health.failure_count),
                ],
            )
            .map_err(|e| op_failed("save_webhook_health", e))?;

        if updated == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn record_attempt(
        &self,
        id: &str,
        outcome: AttemptOutcome,
        at: DateTime<Utc>,
    ) -> Result<DeliveryHealth> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| op_failed("lock_webhook_db", e))?;

        let row: Option<(Option<i64>, i64)> = conn
            .query_row(
                r"
                UPDATE webhook_configs
                SET last_triggered = ?2,
                    failure_count = CASE WHEN ?3 THEN 0
                                         ELSE MIN(failure_count + 1, 4294967295) END
                WHERE id = ?1
                RETURNING last_triggered, failure_count
                ",
                params![
                    id,
                    at.timestamp_millis(),
                    outcome == AttemptOutcome::Success
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| op_failed("record_webhook_attempt", e))?;

        let (last_triggered, failure_count) = row.ok_or_else(|| Error::NotFound(id.to_string()))?;

        Ok(DeliveryHealth {
            last_triggered: last_triggered.and_then(DateTime::from_timestamp_millis),
            failure_count: u32::try_from(failure_count).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::validate_webhook_config;
    use secrecy::ExposeSecret;
    use serde_json::json;
    use std::sync::Arc;

    fn new_config(workspace: &str) -> NewWebhookConfiguration {
        validate_webhook_config(&json!({
            "workspaceId": workspace,
            "name": "crm-sync",
            "url": "https://crm.example.com/hooks",
            "events": ["call.scheduled"],
            "headers": { "X-Tenant": "acme" },
            "secret": "s3cret"
        }))
        .expect("valid")
    }

    fn stores() -> Vec<Box<dyn WebhookConfigStore>> {
        vec![
            Box::new(MemoryWebhookStore::new()),
            Box::new(SqliteWebhookStore::in_memory().expect("sqlite")),
        ]
    }

    #[test]
    fn test_create_and_get() {
        for store in stores() {
            let created = store.create(new_config("ws_1")).expect("create");
            assert!(created.id.starts_with("wh_"));
            assert_eq!(created.failure_count, 0);
            assert!(created.last_triggered.is_none());

            let loaded = store.get(&created.id).expect("get").expect("present");
            assert_eq!(loaded.name, "crm-sync");
            assert_eq!(loaded.events, created.events);
            assert_eq!(loaded.headers.get("X-Tenant").map(String::as_str), Some("acme"));
            assert_eq!(
                loaded.secret.as_ref().map(|s| s.expose_secret().to_string()),
                Some("s3cret".to_string())
            );
            assert!(loaded.active);
        }
    }

    #[test]
    fn test_get_missing_is_none() {
        for store in stores() {
            assert!(store.get("wh_missing").expect("get").is_none());
        }
    }

    #[test]
    fn test_list_filters_by_workspace() {
        for store in stores() {
            store.create(new_config("ws_1")).expect("create");
            store.create(new_config("ws_1")).expect("create");
            store.create(new_config("ws_2")).expect("create");

            assert_eq!(store.list(None).expect("list").len(), 3);
            assert_eq!(store.list(Some("ws_1")).expect("list").len(), 2);
            assert_eq!(store.list(Some("ws_3")).expect("list").len(), 0);
        }
    }

    #[test]
    fn test_record_attempt_transitions() {
        for store in stores() {
            let created = store.create(new_config("ws_1")).expect("create");
            let at = Utc::now();

            let health = store
                .record_attempt(&created.id, AttemptOutcome::Failure, at)
                .expect("failure");
            assert_eq!(health.failure_count, 1);

            let health = store
                .record_attempt(&created.id, AttemptOutcome::Failure, at)
                .expect("failure");
            assert_eq!(health.failure_count, 2);

            let health = store
                .record_attempt(&created.id, AttemptOutcome::Success, at)
                .expect("success");
            assert_eq!(health.failure_count, 0);

            let loaded = store.get(&created.id).expect("get").expect("present");
            assert_eq!(loaded.failure_count, 0);
            assert_eq!(
                loaded.last_triggered.map(|t| t.timestamp_millis()),
                Some(at.timestamp_millis())
            );
        }
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        for store in stores() {
            let err = store
                .record_attempt("wh_missing", AttemptOutcome::Success, Utc::now())
                .expect_err("missing");
            assert!(matches!(err, Error::NotFound(_)));

            let err = store
                .save_health("wh_missing", DeliveryHealth::default())
                .expect_err("missing");
            assert!(matches!(err, Error::NotFound(_)));
        }
    }

    #[test]
    fn test_sqlite_concurrent_failures_are_not_lost() {
        let store = Arc::new(SqliteWebhookStore::in_memory().expect("sqlite"));
        let id = store.create(new_config("ws_1")).expect("create").id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .record_attempt(&id, AttemptOutcome::Failure, Utc::now())
                            .expect("record");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        let loaded = store.get(&id).expect("get").expect("present");
        assert_eq!(loaded.failure_count, 200);
    }

    #[test]
    fn test_sqlite_store_persists_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("callhook.db");

        let id = {
            let store = SqliteWebhookStore::open(&path).expect("open");
            store.create(new_config("ws_1")).expect("create").id
        };

        let reopened = SqliteWebhookStore::open(&path).expect("reopen");
        assert!(reopened.get(&id).expect("get").is_some());
    }
}
