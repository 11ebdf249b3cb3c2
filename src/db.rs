//! SQLite storage shared by the lookup cache and the processing ledger.
//!
//! The database file lives under the destination library (see
//! [`crate::config::Config::database_path`]) so the cache and the ledger travel
//! with the library they describe. Connections use WAL mode and a busy
//! timeout; migrations are embedded and run on open.
//!
//! # Example
//!
//! ```no_run
//! use bookshelf_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("bookshelf.db")).await?;
//! db.checkpoint().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// SQLite locks the whole file for writes; a handful of connections is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Coarse class of a `sqlx` failure, used in logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Another connection holds the lock.
    BusyOrLocked,
    /// A CHECK, UNIQUE, NOT NULL or foreign-key rule rejected the write.
    ConstraintViolation,
    PoolTimeout,
    PoolClosed,
    RowNotFound,
    Io,
    Other,
}

impl DbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(db_error) => Self::from_database(db_error.as_ref()),
            _ => Self::Other,
        }
    }

    fn from_database(db_error: &(dyn sqlx::error::DatabaseError + 'static)) -> Self {
        // SQLite primary result codes: 5 = BUSY, 6 = LOCKED, 19 = CONSTRAINT.
        let code = db_error.code();
        let code = code.as_deref().unwrap_or_default();
        if matches!(code, "5" | "6" | "SQLITE_BUSY" | "SQLITE_LOCKED") {
            return Self::BusyOrLocked;
        }
        if !matches!(db_error.kind(), sqlx::error::ErrorKind::Other)
            || code.starts_with("SQLITE_CONSTRAINT")
        {
            return Self::ConstraintViolation;
        }
        let message = db_error.message().to_ascii_lowercase();
        if message.contains("database is locked") || message.contains("database is busy") {
            Self::BusyOrLocked
        } else {
            Self::Other
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure to open or migrate the library database.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Pooled handle on the library database, cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `db_path` in WAL mode and
    /// applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] when the file cannot be opened and
    /// [`DbError::Migration`] when the schema cannot be brought up to date.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    /// Private in-memory database; a single connection so every query sees
    /// the same data.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether the connection reports WAL journaling.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma query fails.
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    /// Folds the write-ahead log back into the main file.
    ///
    /// Called when a run ends so the library carries one self-contained file.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma fails.
    #[instrument(skip(self))]
    pub async fn checkpoint(&self) -> Result<(), DbError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
