//! SQLite-backed record store.
//!
//! All cross-request state (sessions, users, settings, share links, login
//! attempts, audit entries) lives here. The pool is capped at a single
//! connection so every read-modify-write runs against an effectively
//! single-writer store; the two operations that need true atomicity
//! (session rotation, login-failure accounting) additionally run inside
//! transactions.

use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use thiserror::Error;

pub mod audit;
pub mod login_attempts;
pub mod sessions;
pub mod settings;
pub mod share_links;
pub mod types;
pub mod users;

const DB_FILE: &str = "lanshare.db";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("share link expired or revoked")]
    LinkGone,
    #[error("cannot disable or remove the last active admin")]
    LastAdminProtection,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Open (or create) the database under `data_dir` and run migrations.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir {}", data_dir.display()))?;
        let path = data_dir.join(DB_FILE);
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .context("parse sqlite options")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors.
            .busy_timeout(Duration::from_secs(5));
        Self::connect(opts).await
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parse sqlite options")?
            .foreign_keys(true);
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> Result<Self> {
        // One connection keeps the store single-writer; SQLite serializes
        // everything behind it and transactions see no interleaving.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .context("open sqlite")?;
        let store = Self { pool };
        store.migrate().await?;
        store.ensure_default_settings().await?;
        Ok(store)
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        let queries = [
            r"CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                disabled INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            r"CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NULL,
                csrf_token TEXT NOT NULL,
                remember INTEGER NOT NULL DEFAULT 0,
                ip TEXT NOT NULL DEFAULT '',
                user_agent TEXT NOT NULL DEFAULT '',
                expires_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL,
                FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            r"CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            r"CREATE TABLE IF NOT EXISTS share_links (
                token TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                mode TEXT NOT NULL,
                created_by INTEGER NULL,
                expires_at INTEGER NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_accessed_at INTEGER NULL,
                FOREIGN KEY(created_by) REFERENCES users(id) ON DELETE SET NULL
            )",
            r"CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_user_id INTEGER NULL,
                action TEXT NOT NULL,
                target TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                FOREIGN KEY(actor_user_id) REFERENCES users(id) ON DELETE SET NULL
            )",
            r"CREATE TABLE IF NOT EXISTS login_attempts (
                key TEXT PRIMARY KEY,
                failed_count INTEGER NOT NULL DEFAULT 0,
                locked_until INTEGER NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)",
            "CREATE INDEX IF NOT EXISTS idx_share_links_expiry ON share_links(expires_at)",
            "CREATE INDEX IF NOT EXISTS idx_audit_created_at ON audit_logs(created_at)",
        ];
        for query in queries {
            sqlx::query(query)
                .execute(&self.pool)
                .await
                .context("migrate failed")?;
        }
        Ok(())
    }
}

/// Current wall-clock time as unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
