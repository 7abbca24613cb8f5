//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for concurrency (WAL mode, busy timeout) and integrity (foreign keys), and
//! retrying the initial open according to a [`RetryPolicy`].

use std::path::{Path, PathBuf};

use tokio_rusqlite::Connection;

use super::retry::{RetryPolicy, retry};
use crate::Error;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;
     PRAGMA busy_timeout=5000;";

/// Database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Cloning is cheap and shares the connection.
#[derive(Clone, Debug)]
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open a database at the specified path, retrying transient failures.
    ///
    /// Creates the file if it doesn't exist and applies pragmas. Migrations
    /// are not run here; see [`crate::migrate::MigrationRunner`].
    pub async fn connect(path: impl AsRef<Path>, policy: &RetryPolicy) -> Result<Self, Error> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let db = retry(policy, "database connect", || Self::open(path.clone())).await?;
        tracing::info!(path = %path.display(), "database ready");
        Ok(db)
    }

    /// Open a database at the specified path with a single attempt.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| Error::ConnectionFailure(e.to_string()))?;
        Self::configure(conn).await
    }

    /// Open an in-memory database for testing.
    ///
    /// Creates a private in-memory SQLite database with the same
    /// pragma configuration as file-based databases.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::ConnectionFailure(e.to_string()))?;
        Self::configure(conn).await
    }

    /// Round-trip a trivial query through the connection thread.
    pub async fn ping(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn configure(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
        .map_err(|e: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| Error::ConnectionFailure(e.to_string()))?;

        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let version = db
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_ping() {
        let db = Database::open_in_memory().await.unwrap();
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::open_in_memory().await.unwrap();
        let enabled: i64 = db
            .conn
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("school.sqlite");
        Database::connect(&path, &RetryPolicy::immediate(1)).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_connect_fails_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("school.sqlite");
        let result = Database::connect(&path, &RetryPolicy::immediate(2)).await;
        assert!(matches!(result, Err(Error::ConnectionFailure(_))));
    }
}
