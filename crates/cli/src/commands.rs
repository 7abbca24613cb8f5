//! Command implementations. Each returns the line to print on success.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use schoolhouse_core::migrate::{self, MigrationRunner, StepLimit};

pub async fn up(runner: &MigrationRunner, steps: usize) -> Result<String> {
    let outcome = runner.up(StepLimit::from(steps)).await?;
    Ok(outcome.to_string())
}

pub async fn down(runner: &MigrationRunner, steps: usize) -> Result<String> {
    let outcome = runner.down(StepLimit::from(steps)).await?;
    Ok(outcome.to_string())
}

pub async fn version(runner: &MigrationRunner) -> Result<String> {
    Ok(match runner.version().await? {
        Some(state) => format!("version: {state}"),
        None => "no migrations have been applied yet".to_string(),
    })
}

pub async fn force(runner: &MigrationRunner, version: u64) -> Result<String> {
    anyhow::ensure!(version > 0, "a version is required; use `down` to revert everything");
    runner.force(version).await?;
    Ok(format!("forced version {version} (clean)"))
}

pub fn create(dir: Option<&Path>, name: &str) -> Result<String> {
    let dir = dir.context("`create` needs --migrations-dir (or SCHOOLHOUSE_MIGRATIONS_DIR)")?;
    let created = migrate::create(dir, name, Utc::now())?;
    Ok(format!(
        "created {}\ncreated {}",
        created.up_path.display(),
        created.down_path.display()
    ))
}

#[cfg(test)]
mod tests {
    use schoolhouse_core::Database;
    use schoolhouse_core::migrate::{SchemaState, source};

    use super::*;

    async fn runner() -> MigrationRunner {
        let db = Database::open_in_memory().await.unwrap();
        MigrationRunner::new(&db, source::builtin().unwrap())
    }

    #[tokio::test]
    async fn test_version_before_and_after_up() {
        let runner = runner().await;
        assert_eq!(version(&runner).await.unwrap(), "no migrations have been applied yet");

        up(&runner, 2).await.unwrap();
        assert_eq!(version(&runner).await.unwrap(), "version: 2 (clean)");
    }

    #[tokio::test]
    async fn test_up_twice_reports_no_change() {
        let runner = runner().await;
        up(&runner, 0).await.unwrap();
        assert_eq!(up(&runner, 0).await.unwrap(), "no change");
    }

    #[tokio::test]
    async fn test_down_one_step() {
        let runner = runner().await;
        up(&runner, 0).await.unwrap();
        let latest = runner.steps().last().unwrap().version;
        down(&runner, 1).await.unwrap();
        assert_eq!(version(&runner).await.unwrap(), format!("version: {} (clean)", latest - 1));
    }

    #[tokio::test]
    async fn test_force_then_version() {
        let runner = runner().await;
        force(&runner, 3).await.unwrap();
        assert_eq!(runner.version().await.unwrap(), Some(SchemaState::Clean(3)));
    }

    #[tokio::test]
    async fn test_force_zero_leaves_state_alone() {
        let runner = runner().await;
        up(&runner, 2).await.unwrap();
        assert!(force(&runner, 0).await.is_err());
        assert_eq!(runner.version().await.unwrap(), Some(SchemaState::Clean(2)));
    }

    #[test]
    fn test_create_requires_dir() {
        assert!(create(None, "add lockers").is_err());
    }

    #[test]
    fn test_create_writes_pair() {
        let dir = tempfile::tempdir().unwrap();
        let out = create(Some(dir.path()), "Add lockers").unwrap();
        assert!(out.contains("_add_lockers.up.sql"));
        assert!(out.contains("_add_lockers.down.sql"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
