//! Core types and shared functionality for schoolhouse.
//!
//! This crate provides:
//! - SQLite database handle with startup retry
//! - Versioned schema migrations with clean/dirty state tracking
//! - In-process GET response cache with TTL and bulk invalidation
//! - Entity repositories (students, users, attendance, grades, forum)
//! - Password hashing and session tokens
//! - Unified error types and configuration

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;

pub use cache::{CacheSettings, ResponseCache};
pub use config::AppConfig;
pub use db::{Database, RetryPolicy};
pub use error::Error;
pub use migrate::{MigrationOutcome, MigrationRunner, SchemaState, StepLimit};
