//! Schema gate run before the listener is bound.

use schoolhouse_core::{Error, MigrationRunner, StepLimit};

/// Apply pending migrations when `auto_migrate` is set, then require a clean
/// schema with nothing left to apply. Returns the schema version.
///
/// # Errors
///
/// `DirtyState` if a previous run failed mid-step, `Internal` if steps are
/// still pending, or whatever the runner reported while migrating.
pub async fn ensure_schema(runner: &MigrationRunner, auto_migrate: bool) -> Result<u64, Error> {
    if auto_migrate {
        let outcome = runner.up(StepLimit::All).await?;
        tracing::info!(%outcome, "startup migration");
    }

    let version = match runner.version().await? {
        Some(state) => state.ensure_clean()?,
        None => 0,
    };

    let pending = runner.pending().await?;
    if let Some(next) = pending.first() {
        return Err(Error::Internal(format!(
            "{} migration(s) pending starting at {}; run `schoolhouse-migrate up`",
            pending.len(),
            next.version
        )));
    }

    tracing::info!(version, "schema ready");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use schoolhouse_core::migrate::{SchemaState, SchemaVersionStore, source};
    use schoolhouse_core::Database;

    use super::*;

    async fn runner() -> (Database, MigrationRunner) {
        let db = Database::open_in_memory().await.unwrap();
        let runner = MigrationRunner::new(&db, source::builtin().unwrap());
        (db, runner)
    }

    #[tokio::test]
    async fn test_auto_migrate_reaches_latest() {
        let (_db, runner) = runner().await;
        let latest = runner.steps().last().unwrap().version;
        assert_eq!(ensure_schema(&runner, true).await.unwrap(), latest);
        assert_eq!(ensure_schema(&runner, true).await.unwrap(), latest);
    }

    #[tokio::test]
    async fn test_pending_without_auto_migrate_fails() {
        let (_db, runner) = runner().await;
        runner.up(StepLimit::Count(1)).await.unwrap();
        assert!(matches!(ensure_schema(&runner, false).await, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_dirty_schema_fails() {
        let (db, runner) = runner().await;
        runner.up(StepLimit::All).await.unwrap();
        SchemaVersionStore::new(&db).set_state(SchemaState::Dirty(2)).await.unwrap();
        assert!(matches!(
            ensure_schema(&runner, false).await,
            Err(Error::DirtyState { version: 2 })
        ));
    }
}
