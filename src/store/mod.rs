//! Persisted step log
//!
//! Every outcome of a web-triggered Run is written to the `run_logs` table,
//! keyed by session identifier and a per-session sequence number. The
//! identifier counter of the HTTP service is recovered from this table at
//! startup.

mod sink;

pub use sink::{LogWriter, StoreSink};

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use sqlx::Row;

use crate::runner::StepOutcome;

pub const SESSION_PREFIX: &str = "TestandoSite_";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS run_logs (
    session_id VARCHAR(64) NOT NULL,
    seq INTEGER NOT NULL,
    timestamp VARCHAR(32) NOT NULL,
    step VARCHAR(64) NOT NULL,
    status VARCHAR(32) NOT NULL,
    response_time DOUBLE PRECISION NULL,
    message TEXT NULL,
    error_message TEXT NULL
)";

pub fn session_id(number: u64) -> String {
    format!("{}{}", SESSION_PREFIX, number)
}

/// Numeric suffix of a `TestandoSite_<n>` identifier
pub fn parse_session_number(id: &str) -> Option<u64> {
    id.strip_prefix(SESSION_PREFIX)?.parse().ok()
}

/// One outcome queued for persistence
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub session_id: String,
    pub seq: i64,
    pub outcome: StepOutcome,
}

/// One persisted row, as read back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    #[serde(skip)]
    pub session_id: String,
    #[serde(skip)]
    pub seq: i64,
    #[serde(skip)]
    pub timestamp: String,
    pub step: String,
    pub status: String,
    pub response_time: Option<f64>,
    pub message: Option<String>,
    pub error_message: Option<String>,
}

/// Handle to the `run_logs` table over any supported SQL backend
#[derive(Clone)]
pub struct LogStore {
    pool: AnyPool,
}

impl LogStore {
    /// Connect to `url` (`sqlite:` or `mysql:`) and make sure the table exists
    pub async fn connect(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        // In-memory SQLite is per connection
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to log database {}", url))?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .context("Failed to create run_logs table")?;
        Ok(())
    }

    pub async fn append(&self, entry: &LogEntry) -> Result<()> {
        let outcome = &entry.outcome;
        sqlx::query(
            "INSERT INTO run_logs \
             (session_id, seq, timestamp, step, status, response_time, message, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.session_id.as_str())
        .bind(entry.seq)
        .bind(outcome.timestamp.format(TIMESTAMP_FORMAT).to_string())
        .bind(outcome.step.label())
        .bind(outcome.status.as_str())
        .bind(outcome.response_time)
        .bind(outcome.message.clone())
        .bind(outcome.error_message.clone())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store log row for {}", entry.session_id))?;
        Ok(())
    }

    /// Rows of one session in production order. `seq` is authoritative;
    /// local timestamps may repeat or go backwards across a clock change.
    pub async fn session_rows(&self, session_id: &str) -> Result<Vec<LogRow>> {
        let rows = sqlx::query(
            "SELECT session_id, seq, timestamp, step, status, response_time, message, error_message \
             FROM run_logs WHERE session_id = ? ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read log rows for {}", session_id))?;

        rows.iter()
            .map(|row| {
                Ok(LogRow {
                    session_id: row.try_get("session_id")?,
                    seq: row.try_get("seq")?,
                    timestamp: row.try_get("timestamp")?,
                    step: row.try_get("step")?,
                    status: row.try_get("status")?,
                    response_time: row.try_get("response_time")?,
                    message: row.try_get("message")?,
                    error_message: row.try_get("error_message")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("Malformed run_logs row")
    }

    /// Highest `n` among stored `TestandoSite_<n>` identifiers
    pub async fn max_session_number(&self) -> Result<Option<u64>> {
        let rows = sqlx::query("SELECT DISTINCT session_id FROM run_logs WHERE session_id LIKE ?")
            .bind(format!("{}%", SESSION_PREFIX))
            .fetch_all(&self.pool)
            .await
            .context("Failed to scan session identifiers")?;

        let mut max = None;
        for row in &rows {
            let id: String = row.try_get("session_id")?;
            match parse_session_number(&id) {
                Some(n) => max = max.max(Some(n)),
                None => debug!("Ignoring non-numeric session id {}", id),
            }
        }
        Ok(max)
    }
}
