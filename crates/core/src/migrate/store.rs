//! Persisted migration state.
//!
//! The `schema_migrations` table holds at most one row `(version, dirty)`.
//! No table or no row means no migration has ever been applied; a clean
//! version of 0 is stored as "no row" so the two are indistinguishable.

use std::fmt;

use tokio_rusqlite::rusqlite::{self, OptionalExtension, TransactionBehavior};
use tokio_rusqlite::{Connection, params};

use crate::{Database, Error};

/// Migration state recorded in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// Every step up to and including this version completed.
    Clean(u64),
    /// A step started on top of this (last good) version and never completed.
    Dirty(u64),
}

impl SchemaState {
    pub fn version(&self) -> u64 {
        match *self {
            SchemaState::Clean(v) | SchemaState::Dirty(v) => v,
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, SchemaState::Dirty(_))
    }

    /// The clean version, or `Error::DirtyState`.
    pub fn ensure_clean(self) -> Result<u64, Error> {
        match self {
            SchemaState::Clean(v) => Ok(v),
            SchemaState::Dirty(version) => Err(Error::DirtyState { version }),
        }
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaState::Clean(v) => write!(f, "{v} (clean)"),
            SchemaState::Dirty(v) => write!(f, "{v} (dirty)"),
        }
    }
}

fn read_state(conn: &rusqlite::Connection) -> Result<Option<SchemaState>, Error> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(None);
    }

    let row = conn
        .query_row("SELECT version, dirty FROM schema_migrations LIMIT 1", [], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?))
        })
        .optional()?;

    Ok(row.map(|(version, dirty)| {
        let version = version as u64;
        if dirty { SchemaState::Dirty(version) } else { SchemaState::Clean(version) }
    }))
}

fn write_state(conn: &rusqlite::Connection, state: SchemaState) -> Result<(), Error> {
    let version = i64::try_from(state.version())
        .map_err(|_| Error::Validation(format!("version {} is out of range", state.version())))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER NOT NULL,
            dirty INTEGER NOT NULL
        );
        DELETE FROM schema_migrations;",
    )?;

    if state != SchemaState::Clean(0) {
        conn.execute(
            "INSERT INTO schema_migrations (version, dirty) VALUES (?1, ?2)",
            params![version, state.is_dirty()],
        )?;
    }
    Ok(())
}

/// Single source of truth for migration state.
#[derive(Clone, Debug)]
pub struct SchemaVersionStore {
    conn: Connection,
}

impl SchemaVersionStore {
    pub fn new(db: &Database) -> Self {
        Self { conn: db.conn.clone() }
    }

    /// Read the recorded state.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` if no tracking record exists yet.
    pub async fn current(&self) -> Result<SchemaState, Error> {
        self.conn
            .call(|conn| -> Result<Option<SchemaState>, Error> { read_state(conn) })
            .await
            .map_err(Error::from)?
            .ok_or(Error::NotInitialized)
    }

    /// Atomically overwrite the recorded state.
    pub async fn set_state(&self, state: SchemaState) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                write_state(&tx, state)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Run one step: re-check the state, execute `script` and record `after`,
    /// all inside a single IMMEDIATE transaction.
    ///
    /// A concurrent runner blocks on the write lock until this commits, so it
    /// never observes a step in flight. If the script fails the transaction
    /// rolls back and `Dirty(expected.version())` is recorded in a follow-up
    /// transaction. Scripts must not issue their own BEGIN/COMMIT.
    pub(crate) async fn apply_step(
        &self,
        expected: SchemaState,
        script: String,
        after: SchemaState,
    ) -> Result<StepResult, Error> {
        self.conn
            .call(move |conn| -> Result<StepResult, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let actual = read_state(&tx)?.unwrap_or(SchemaState::Clean(0));
                if actual != expected {
                    return Ok(StepResult::Moved(actual));
                }

                if let Err(e) = tx.execute_batch(&script) {
                    drop(tx);
                    mark_dirty(conn, expected)?;
                    return Ok(StepResult::Failed(e.to_string()));
                }
                write_state(&tx, after)?;
                tx.commit()?;
                Ok(StepResult::Applied)
            })
            .await
            .map_err(Error::from)
    }
}

/// What [`SchemaVersionStore::apply_step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepResult {
    Applied,
    /// Another process changed the state since it was planned; nothing ran.
    Moved(SchemaState),
    /// The script failed and was rolled back; the schema is marked dirty.
    Failed(String),
}

/// Record `Dirty` on top of `expected`, unless someone else moved the state
/// after the failed step released the lock.
fn mark_dirty(conn: &mut rusqlite::Connection, expected: SchemaState) -> Result<(), Error> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if read_state(&tx)?.unwrap_or(SchemaState::Clean(0)) == expected {
        write_state(&tx, SchemaState::Dirty(expected.version()))?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SchemaVersionStore {
        let db = Database::open_in_memory().await.unwrap();
        SchemaVersionStore::new(&db)
    }

    async fn has_table(store: &SchemaVersionStore, name: &str) -> bool {
        let name = name.to_string();
        store
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                    [name],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_is_not_initialized() {
        let store = store().await;
        assert!(matches!(store.current().await, Err(Error::NotInitialized)));
    }

    #[tokio::test]
    async fn test_set_and_read_state() {
        let store = store().await;
        store.set_state(SchemaState::Clean(3)).await.unwrap();
        assert_eq!(store.current().await.unwrap(), SchemaState::Clean(3));

        store.set_state(SchemaState::Dirty(3)).await.unwrap();
        assert_eq!(store.current().await.unwrap(), SchemaState::Dirty(3));
    }

    #[tokio::test]
    async fn test_clean_zero_clears_record() {
        let store = store().await;
        store.set_state(SchemaState::Clean(2)).await.unwrap();
        store.set_state(SchemaState::Clean(0)).await.unwrap();
        assert!(matches!(store.current().await, Err(Error::NotInitialized)));
    }

    #[tokio::test]
    async fn test_dirty_zero_is_recorded() {
        let store = store().await;
        store.set_state(SchemaState::Dirty(0)).await.unwrap();
        assert_eq!(store.current().await.unwrap(), SchemaState::Dirty(0));
    }

    #[tokio::test]
    async fn test_apply_step_refuses_when_state_moved() {
        let store = store().await;
        store.set_state(SchemaState::Clean(2)).await.unwrap();

        let result = store
            .apply_step(SchemaState::Clean(1), "CREATE TABLE t2 (id INTEGER);".into(), SchemaState::Clean(2))
            .await
            .unwrap();
        assert_eq!(result, StepResult::Moved(SchemaState::Clean(2)));
        assert!(!has_table(&store, "t2").await);
    }

    #[tokio::test]
    async fn test_apply_step_records_clean_after() {
        let store = store().await;
        let result = store
            .apply_step(SchemaState::Clean(0), "CREATE TABLE t1 (id INTEGER);".into(), SchemaState::Clean(1))
            .await
            .unwrap();
        assert_eq!(result, StepResult::Applied);
        assert_eq!(store.current().await.unwrap(), SchemaState::Clean(1));
        assert!(has_table(&store, "t1").await);
    }

    #[tokio::test]
    async fn test_failed_step_leaves_dirty_and_rolls_back_script() {
        let store = store().await;
        let result = store
            .apply_step(
                SchemaState::Clean(0),
                "CREATE TABLE t1 (id INTEGER); THIS IS NOT SQL;".into(),
                SchemaState::Clean(1),
            )
            .await
            .unwrap();
        assert!(matches!(result, StepResult::Failed(_)));
        assert_eq!(store.current().await.unwrap(), SchemaState::Dirty(0));
        assert!(!has_table(&store, "t1").await);
    }

    #[test]
    fn test_ensure_clean() {
        assert_eq!(SchemaState::Clean(4).ensure_clean().unwrap(), 4);
        assert!(matches!(SchemaState::Dirty(4).ensure_clean(), Err(Error::DirtyState { version: 4 })));
    }

    #[test]
    fn test_display() {
        assert_eq!(SchemaState::Clean(7).to_string(), "7 (clean)");
        assert_eq!(SchemaState::Dirty(7).to_string(), "7 (dirty)");
    }
}
