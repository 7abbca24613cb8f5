//! Applying and reverting migration steps.
//!
//! Every step runs in one write-locked transaction that re-checks the planned
//! state, executes the script and records the new clean version. Another
//! runner waits on that lock and then re-plans from whatever was committed.
//! A failing script is rolled back and the schema is marked dirty; every
//! later `up`/`down` refuses to run until an operator repairs the schema and
//! calls [`MigrationRunner::force`].

use std::fmt;

use super::source::MigrationStep;
use super::store::{SchemaState, SchemaVersionStore, StepResult};
use crate::{Database, Error};

/// How many steps a single `up` or `down` may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepLimit {
    #[default]
    All,
    Count(usize),
}

impl StepLimit {
    fn allows(self, applied: usize) -> bool {
        match self {
            StepLimit::All => true,
            StepLimit::Count(n) => applied < n,
        }
    }
}

/// `0` means no limit.
impl From<usize> for StepLimit {
    fn from(n: usize) -> Self {
        if n == 0 { StepLimit::All } else { StepLimit::Count(n) }
    }
}

/// Result of an `up` or `down` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing was pending. Not an error.
    NoChange,
    Migrated { from: u64, to: u64, applied: usize },
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOutcome::NoChange => write!(f, "no change"),
            MigrationOutcome::Migrated { from, to, applied } => {
                write!(f, "migrated {from} -> {to} ({applied} step{})", if *applied == 1 { "" } else { "s" })
            }
        }
    }
}

/// Drives a set of migration steps against one database.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    store: SchemaVersionStore,
    steps: Vec<MigrationStep>,
}

impl MigrationRunner {
    pub fn new(db: &Database, mut steps: Vec<MigrationStep>) -> Self {
        steps.sort_by_key(|s| s.version);
        Self { store: SchemaVersionStore::new(db), steps }
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// The recorded state, or `None` if no migration has ever been applied.
    pub async fn version(&self) -> Result<Option<SchemaState>, Error> {
        match self.store.current().await {
            Ok(state) => Ok(Some(state)),
            Err(Error::NotInitialized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn state(&self) -> Result<SchemaState, Error> {
        Ok(self.version().await?.unwrap_or(SchemaState::Clean(0)))
    }

    /// Steps newer than the current clean version, in application order.
    pub async fn pending(&self) -> Result<Vec<&MigrationStep>, Error> {
        let current = self.state().await?.ensure_clean()?;
        Ok(self.steps.iter().filter(|s| s.version > current).collect())
    }

    /// Apply pending steps in ascending order.
    ///
    /// # Errors
    ///
    /// `Error::DirtyState` if the schema is dirty (nothing runs), or
    /// `Error::StepFailed` naming the step that failed. Steps applied before
    /// the failure stay applied.
    pub async fn up(&self, limit: StepLimit) -> Result<MigrationOutcome, Error> {
        let start = self.state().await?.ensure_clean()?;
        let mut current = start;
        let mut applied = 0;

        while limit.allows(applied) {
            let Some(step) = self.steps.iter().find(|s| s.version > current) else {
                break;
            };

            tracing::info!(version = step.version, name = %step.name, "applying migration");
            match self.run(current, step.version, step.up.clone(), SchemaState::Clean(step.version)).await? {
                Some(moved) => current = moved,
                None => {
                    current = step.version;
                    applied += 1;
                }
            }
        }

        Ok(outcome(start, current, applied))
    }

    /// Revert applied steps in descending order.
    ///
    /// After reverting step `v` the recorded version becomes the next lower
    /// known step, or 0 once the first step is reverted.
    ///
    /// # Errors
    ///
    /// `Error::DirtyState` if the schema is dirty, `Error::MissingStep` if the
    /// recorded version has no known step, or `Error::StepFailed`.
    pub async fn down(&self, limit: StepLimit) -> Result<MigrationOutcome, Error> {
        let start = self.state().await?.ensure_clean()?;
        let mut current = start;
        let mut applied = 0;

        while current > 0 && limit.allows(applied) {
            let index = self
                .steps
                .iter()
                .position(|s| s.version == current)
                .ok_or(Error::MissingStep(current))?;
            let step = &self.steps[index];
            let target = index.checked_sub(1).map_or(0, |i| self.steps[i].version);

            tracing::info!(version = step.version, name = %step.name, "reverting migration");
            match self.run(current, step.version, step.down.clone(), SchemaState::Clean(target)).await? {
                Some(moved) => current = moved,
                None => {
                    current = target;
                    applied += 1;
                }
            }
        }

        Ok(outcome(start, current, applied))
    }

    /// Overwrite the recorded state with a clean `version` without running
    /// any script. `0` clears the record.
    ///
    /// This is the operator's escape hatch after repairing a dirty schema by
    /// hand; it works regardless of the current state.
    pub async fn force(&self, version: u64) -> Result<(), Error> {
        let previous = self.version().await?;
        self.store.set_state(SchemaState::Clean(version)).await?;
        tracing::warn!(
            previous = previous.map(|s| s.to_string()).unwrap_or_else(|| "none".into()),
            version,
            "forced schema version"
        );
        Ok(())
    }

    /// Apply one step planned from `Clean(current)`.
    ///
    /// Returns `Some(version)` when another process moved the state first;
    /// the caller re-plans from that clean version.
    async fn run(&self, current: u64, version: u64, script: String, after: SchemaState) -> Result<Option<u64>, Error> {
        match self.store.apply_step(SchemaState::Clean(current), script, after).await? {
            StepResult::Applied => Ok(None),
            StepResult::Moved(state) => {
                tracing::debug!(state = %state, "schema version changed concurrently, re-planning");
                state.ensure_clean().map(Some)
            }
            StepResult::Failed(reason) => {
                tracing::error!(version, error = %reason, "migration failed, schema left dirty");
                Err(Error::StepFailed { version, reason })
            }
        }
    }
}

fn outcome(from: u64, to: u64, applied: usize) -> MigrationOutcome {
    if applied == 0 { MigrationOutcome::NoChange } else { MigrationOutcome::Migrated { from, to, applied } }
}
