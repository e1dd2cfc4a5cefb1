//! # Action Journal
//!
//! Append-only SQLite audit trail of every wallet step. The journal is a
//! record of what happened, never a source of truth for progress: resuming
//! a batch is driven entirely by the wallet database.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{ConfigError, JournalError};

/// One step outcome as written to the journal.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub wallet_address: String,
    pub mode: String,
    pub action: String,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalRow {
    pub id: i64,
    pub wallet_address: String,
    pub mode: String,
    pub action: String,
    pub status: String,
    pub message: String,
    pub duration_ms: i64,
    pub timestamp: i64,
}

#[derive(Debug, Default)]
pub struct JournalMetrics {
    pub total_inserts: AtomicU64,
    pub total_selects: AtomicU64,
    pub total_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalMetricsSnapshot {
    pub total_inserts: u64,
    pub total_selects: u64,
    pub total_errors: u64,
}

#[derive(Debug)]
pub struct ActionJournal {
    pool: SqlitePool,
    metrics: JournalMetrics,
}

impl ActionJournal {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;
    pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
                    path: parent.display().to_string(),
                    msg: e.to_string(),
                })?;
            }
        }
        if !db_path.exists() {
            std::fs::File::create(db_path).map_err(|e| ConfigError::IoError {
                path: db_path.display().to_string(),
                msg: e.to_string(),
            })?;
            info!("Created new journal file: {}", db_path.display());
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_millis(Self::DEFAULT_TIMEOUT_MS))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode=WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous=NORMAL;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("sqlite://{}", db_path.display()))
            .await
            .map_err(|e| JournalError::OpenFailed {
                path: db_path.display().to_string(),
                msg: e.to_string(),
            })?;

        let journal = Self {
            pool,
            metrics: JournalMetrics::default(),
        };
        journal.init_schema().await?;
        debug!("Action journal ready at {}", db_path.display());
        Ok(journal)
    }

    async fn init_schema(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|_| JournalError::PoolExhausted {
                max_size: Self::DEFAULT_MAX_CONNECTIONS,
            })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS action_log (
                id INTEGER PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                mode TEXT NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_action_log_wallet ON action_log(wallet_address);
            CREATE INDEX IF NOT EXISTS idx_action_log_mode ON action_log(mode);",
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| JournalError::QueryFailed { msg: e.to_string() })?;

        Ok(())
    }

    pub async fn record(&self, entry: &JournalEntry) -> Result<()> {
        let status = if entry.success { "SUCCESS" } else { "FAILED" };
        let timestamp = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO action_log (wallet_address, mode, action, status, message, duration_ms, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.wallet_address)
        .bind(&entry.mode)
        .bind(&entry.action)
        .bind(status)
        .bind(&entry.message)
        .bind(entry.duration_ms as i64)
        .bind(timestamp)
        .execute(&self.pool)
        .await;

        self.metrics.total_inserts.fetch_add(1, Ordering::SeqCst);
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.metrics.total_errors.fetch_add(1, Ordering::SeqCst);
                error!("Failed to journal step for {}: {}", entry.wallet_address, e);
                Err(e).context("Failed to insert journal entry")
            }
        }
    }

    /// Number of successful entries for a wallet in a given mode.
    pub async fn success_count(&self, wallet: &str, mode: &str) -> Result<i64> {
        self.metrics.total_selects.fetch_add(1, Ordering::SeqCst);
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM action_log WHERE wallet_address = ? AND mode = ? AND status = 'SUCCESS'",
        )
        .bind(wallet)
        .bind(mode)
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok((count,)) => Ok(count),
            Err(e) => {
                self.metrics.total_errors.fetch_add(1, Ordering::SeqCst);
                Err(e).context("Failed to count journal entries")
            }
        }
    }

    /// Most recent entries for a wallet, newest first.
    pub async fn recent(&self, wallet: &str, limit: u32) -> Result<Vec<JournalRow>> {
        self.metrics.total_selects.fetch_add(1, Ordering::SeqCst);
        let rows = sqlx::query_as::<_, JournalRow>(
            "SELECT id, wallet_address, mode, action, status, message, duration_ms, timestamp
             FROM action_log WHERE wallet_address = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(wallet)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => Ok(rows),
            Err(e) => {
                self.metrics.total_errors.fetch_add(1, Ordering::SeqCst);
                Err(e).context("Failed to read journal entries")
            }
        }
    }

    pub fn metrics(&self) -> JournalMetricsSnapshot {
        JournalMetricsSnapshot {
            total_inserts: self.metrics.total_inserts.load(Ordering::SeqCst),
            total_selects: self.metrics.total_selects.load(Ordering::SeqCst),
            total_errors: self.metrics.total_errors.load(Ordering::SeqCst),
        }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
