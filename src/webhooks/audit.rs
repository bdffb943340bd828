//! Webhook delivery audit log.
//!
//! Every delivery attempt the dispatcher makes is recorded here, success or
//! failure, so operators can answer "did the CRM get that call?" after the
//! fact. Records can be purged per workspace.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE webhook_deliveries (
//!     id TEXT PRIMARY KEY,
//!     webhook_id TEXT NOT NULL,
//!     workspace_id TEXT NOT NULL,
//!     event_kind TEXT,
//!     url TEXT NOT NULL,
//!     success INTEGER NOT NULL,
//!     status_code INTEGER,
//!     error TEXT,
//!     duration_ms INTEGER NOT NULL,
//!     timestamp INTEGER NOT NULL
//! );
//! ```

use super::config::WebhookConfiguration;
use super::delivery::DeliveryResult;
use crate::{Error, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// A webhook delivery audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    /// Unique record ID.
    pub id: String,
    /// Configuration the attempt was made for.
    pub webhook_id: String,
    /// Owning workspace.
    pub workspace_id: String,
    /// Event kind of the delivered message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_kind: Option<String>,
    /// Target URL.
    pub url: String,
    /// Whether the endpoint answered 2xx.
    pub success: bool,
    /// HTTP status code (if available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Failure class (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempt duration in milliseconds.
    pub duration_ms: u64,
    /// Unix timestamp (seconds) of the attempt.
    pub timestamp: i64,
}

impl DeliveryRecord {
    /// Creates a record for one attempt against `config`.
    #[must_use]
    pub fn new(
        config: &WebhookConfiguration,
        event_kind: Option<&str>,
        result: &DeliveryResult,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            webhook_id: config.id.clone(),
            workspace_id: config.workspace_id.clone(),
            event_kind: event_kind.map(str::to_string),
            url: config.url.clone(),
            success: result.success,
            status_code: result.status_code,
            error: result.error.map(|kind| kind.as_str().to_string()),
            duration_ms: result.duration_ms,
            timestamp: result.attempted_at.timestamp(),
        }
    }
}

/// Statistics for a webhook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    /// Total number of deliveries.
    pub total: usize,
    /// Number of successful deliveries.
    pub success: usize,
    /// Number of failed deliveries.
    pub failed: usize,
    /// Average duration in milliseconds.
    pub avg_duration_ms: f64,
}

/// Trait for delivery audit storage backends.
pub trait DeliveryAuditLog: Send + Sync {
    /// Stores a delivery record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    fn store(&self, record: &DeliveryRecord) -> Result<()>;

    /// Gets the most recent records for a webhook, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be retrieved.
    fn history(&self, webhook_id: &str, limit: usize) -> Result<Vec<DeliveryRecord>>;

    /// Aggregates outcomes for a webhook.
    ///
    /// # Errors
    ///
    /// Returns an error if the stats cannot be computed.
    fn stats(&self, webhook_id: &str) -> Result<DeliveryStats>;

    /// Deletes all records of a workspace and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be deleted.
    fn delete_workspace_logs(&self, workspace_id: &str) -> Result<usize>;
}

fn op_failed(operation: &str, cause: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: cause.to_string(),
    }
}

/// `SQLite`-backed delivery audit log.
pub struct SqliteAuditLog {
    /// `SQLite` connection.
    conn: Mutex<Connection>,
}

// Mutex guards are held for the duration of database operations, which is correct behavior
#[allow(clippy::significant_drop_tightening)]
impl SqliteAuditLog {
    /// Opens (or creates) the audit log at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| op_failed("create_audit_dir", e))?;
        }

        let conn = Connection::open(db_path).map_err(|e| op_failed("open_audit_db", e))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| op_failed("configure_audit_db", e))?;

        let log = Self {
            conn: Mutex::new(conn),
        };
        log.create_schema()?;
        Ok(log)
    }

    /// Creates an in-memory audit log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| op_failed("open_memory_db", e))?;

        let log = Self {
            conn: Mutex::new(conn),
        };
        log.create_schema()?;
        Ok(log)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| op_failed("lock_audit_db", e))?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS webhook_deliveries (
                id TEXT PRIMARY KEY,
                webhook_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                event_kind TEXT,
                url TEXT NOT NULL,
                success INTEGER NOT NULL,
                status_code INTEGER,
                error TEXT,
                duration_ms INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_webhook_id
                ON webhook_deliveries(webhook_id);
            CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_workspace_id
                ON webhook_deliveries(workspace_id);
            CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_timestamp
                ON webhook_deliveries(timestamp);
            ",
        )
        .map_err(|e| op_failed("create_audit_schema", e))?;

        Ok(())
    }
}

// Mutex guards are held for the duration of database operations, which is correct behavior
#[allow(clippy::significant_drop_tightening)]
impl DeliveryAuditLog for SqliteAuditLog {
    fn store(&self, record: &DeliveryRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| op_failed("lock_audit_db", e))?;

        conn.execute(
            r"
            INSERT INTO webhook_deliveries
                (id, webhook_id, workspace_id, event_kind, url, success,
                 status_code, error, duration_ms, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                record.id,
                record.webhook_id,
                record.workspace_id,
                record.event_kind,
                record.url,
                record.success,
                record.status_code,
                record.error,
                i64::try_from(record.duration_ms).unwrap_or(i64::MAX),
                record.timestamp,
            ],
        )
        .map_err(|e| op_failed("store_delivery_record", e))?;

        Ok(())
    }

    fn history(&self, webhook_id: &str, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let conn = self.conn.lock().map_err(|e| op_failed("lock_audit_db", e))?;

        let mut stmt = conn
            .prepare(
                r"
                SELECT id, webhook_id, workspace_id, event_kind, url, success,
                       status_code, error, duration_ms, timestamp
                FROM webhook_deliveries
                WHERE webhook_id = ?1
                ORDER BY timestamp DESC, rowid DESC
                LIMIT ?2
                ",
            )
            .map_err(|e| op_failed("prepare_history_query", e))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![webhook_id, limit_i64], |row| {
                Ok(DeliveryRecord {
                    id: row.get(0)?,
                    webhook_id: row.get(1)?,
                    workspace_id: row.get(2)?,
                    event_kind: row.get(3)?,
                    url: row.get(4)?,
                    success: row.get(5)?,
                    status_code: row.get(6)?,
                    error: row.get(7)?,
                    duration_ms: u64::try_from(row.get::<_, i64>(8)?).unwrap_or(0),
                    timestamp: row.get(9)?,
                })
            })
            .map_err(|e| op_failed("query_history", e))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(records)
    }

    fn stats(&self, webhook_id: &str) -> Result<DeliveryStats> {
        let conn = self.conn.lock().map_err(|e| op_failed("lock_audit_db", e))?;

        let mut stmt = conn
            .prepare(
                r"
                SELECT
                    COUNT(*) as total,
                    SUM(CASE WHEN success THEN 1 ELSE 0 END) as success,
                    SUM(CASE WHEN success THEN 0 ELSE 1 END) as failed,
                    AVG(duration_ms) as avg_duration
                FROM webhook_deliveries
                WHERE webhook_id = ?1
                ",
            )
            .map_err(|e| op_failed("prepare_stats_query", e))?;

        let stats = stmt
            .query_row(params![webhook_id], |row| {
                Ok(DeliveryStats {
                    total: usize::try_from(row.get::<_, i64>(0).unwrap_or(0)).unwrap_or(0),
                    success: usize::try_from(row.get::<_, i64>(1).unwrap_or(0)).unwrap_or(0),
                    failed: usize::try_from(row.get::<_, i64>(2).unwrap_or(0)).unwrap_or(0),
                    avg_duration_ms: row.get::<_, f64>(3).unwrap_or(0.0),
                })
            })
            .map_err(|e| op_failed("query_stats", e))?;

        Ok(stats)
    }

    fn delete_workspace_logs(&self, workspace_id: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| op_failed("lock_audit_db", e))?;

        let count = conn
            .execute(
                "DELETE FROM webhook_deliveries WHERE workspace_id = ?1",
                params![workspace_id],
            )
            .map_err(|e| op_failed("delete_workspace_logs", e))?;

        tracing::info!(workspace_id, deleted = count, "Purged webhook delivery history");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::delivery::DeliveryFailure;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn config(id: &str, workspace: &str) -> WebhookConfiguration {
        WebhookConfiguration {
            id: id.to_string(),
            workspace_id: workspace.to_string(),
            name: "crm".to_string(),
            description: None,
            url: "https://crm.example.com/hook".to_string(),
            events: BTreeSet::new(),
            headers: BTreeMap::new(),
            secret: None,
            active: true,
            last_triggered: None,
            failure_count: 0,
            channel: None,
            created_at: Utc::now(),
        }
    }

    fn log(audit: &SqliteAuditLog, config: &WebhookConfiguration, result: &DeliveryResult) {
        audit
            .store(&DeliveryRecord::new(config, Some("call.scheduled"), result))
            .expect("store");
    }

    #[test]
    fn test_empty_stats() {
        let audit = SqliteAuditLog::in_memory().expect("create log");
        let stats = audit.stats("wh_1").expect("stats");
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success, 0);
    }

    #[test]
    fn test_store_and_history() {
        let audit = SqliteAuditLog::in_memory().expect("create log");
        let cfg = config("wh_1", "ws_1");

        log(&audit, &cfg, &DeliveryResult::success(200, Utc::now(), 40));
        log(
            &audit,
            &cfg,
            &DeliveryResult::failure(&DeliveryFailure::HttpStatus { code: 500 }, Utc::now(), 60),
        );

        let history = audit.history("wh_1", 10).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status_code, Some(500));
        assert_eq!(history[0].error.as_deref(), Some("HttpStatusError"));
        assert!(!history[0].success);
        assert!(history[1].success);
        assert_eq!(history[1].event_kind.as_deref(), Some("call.scheduled"));

        assert_eq!(audit.history("wh_1", 1).expect("history").len(), 1);
        assert!(audit.history("wh_2", 10).expect("history").is_empty());
    }

    #[test]
    fn test_stats() {
        let audit = SqliteAuditLog::in_memory().expect("create log");
        let cfg = config("wh_1", "ws_1");

        log(&audit, &cfg, &DeliveryResult::success(200, Utc::now(), 100));
        log(&audit, &cfg, &DeliveryResult::success(204, Utc::now(), 200));
        log(
            &audit,
            &cfg,
            &DeliveryResult::failure(&DeliveryFailure::Timeout, Utc::now(), 300),
        );

        let stats = audit.stats("wh_1").expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failed, 1);
        assert!((stats.avg_duration_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delete_workspace_logs() {
        let audit = SqliteAuditLog::in_memory().expect("create log");
        let ok = DeliveryResult::success(200, Utc::now(), 10);

        log(&audit, &config("wh_1", "ws_1"), &ok);
        log(&audit, &config("wh_2", "ws_1"), &ok);
        log(&audit, &config("wh_3", "ws_2"), &ok);

        assert_eq!(audit.delete_workspace_logs("ws_1").expect("delete"), 2);
        assert!(audit.history("wh_1", 10).expect("history").is_empty());
        assert_eq!(audit.history("wh_3", 10).expect("history").len(), 1);
    }

    #[test]
    fn test_file_backed_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audit = SqliteAuditLog::open(&dir.path().join("audit.db")).expect("open");
        log(&audit, &config("wh_1", "ws_1"), &DeliveryResult::success(200, Utc::now(), 5));
        assert_eq!(audit.stats("wh_1").expect("stats").total, 1);
    }
}
