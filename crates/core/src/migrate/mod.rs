//! Versioned schema migrations.
//!
//! - [`source`] discovers paired up/down scripts (built-in or from a directory)
//! - [`store`] persists the `Clean`/`Dirty` schema state
//! - [`runner`] applies and reverts steps, one transaction per step
//! - [`scaffold`] creates new timestamped script pairs

pub mod runner;
pub mod scaffold;
pub mod source;
pub mod store;

pub use runner::{MigrationOutcome, MigrationRunner, StepLimit};
pub use scaffold::{ScaffoldedMigration, create};
pub use source::MigrationStep;
pub use store::{SchemaState, SchemaVersionStore};
