//! Unified error types for schoolhouse.
//!
//! Every fallible operation in the core crate returns [`Error`]. The HTTP
//! layer maps variants to status codes; the migration CLI maps any of them to
//! a non-zero exit.

use tokio_rusqlite::rusqlite;

/// Unified error types for the schoolhouse backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database could not be reached or opened. Retried at startup.
    #[error("CONNECTION_FAILURE: {0}")]
    ConnectionFailure(String),

    /// An entity with the given identifier does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Malformed or incomplete input.
    #[error("VALIDATION_FAILED: {0}")]
    Validation(String),

    /// A uniqueness rule was violated (e.g. duplicate username).
    #[error("CONFLICT: {0}")]
    Conflict(String),

    /// Missing, malformed, unknown or expired credentials.
    #[error("UNAUTHORIZED: {0}")]
    Unauthorized(String),

    /// Authenticated caller lacks a permitted role.
    #[error("FORBIDDEN: {0}")]
    Forbidden(String),

    /// Database operation failed.
    #[error("DATABASE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// The schema tracking record does not exist yet.
    #[error("NOT_INITIALIZED: no migrations have been applied")]
    NotInitialized,

    /// A previous migration step started but never completed.
    #[error("DIRTY_STATE: schema is dirty after version {version}; fix the database and run `force`")]
    DirtyState { version: u64 },

    /// A single migration script failed; the remaining sequence was aborted.
    #[error("STEP_FAILED: migration {version} failed: {reason}")]
    StepFailed { version: u64, reason: String },

    /// The migration directory or built-in set is malformed.
    #[error("MIGRATION_SOURCE: {0}")]
    MigrationSource(String),

    /// The recorded version has no matching migration step.
    #[error("MISSING_STEP: no migration found for version {0}")]
    MissingStep(u64),

    /// Creating migration files failed.
    #[error("SCAFFOLD_FAILED: {0}")]
    Scaffold(String),

    /// Unexpected internal failure (hashing, serialization).
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ConnectionFailure(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("student abc123".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_step_failure_names_version() {
        let err = Error::StepFailed { version: 20240102030405, reason: "syntax error".into() };
        assert!(err.to_string().contains("20240102030405"));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_only_connection_failures_are_transient() {
        assert!(Error::ConnectionFailure("refused".into()).is_transient());
        assert!(!Error::DirtyState { version: 3 }.is_transient());
        assert!(!Error::Validation("name".into()).is_transient());
    }

    #[test]
    fn test_rusqlite_error_converts_to_database() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Database(_)));
    }
}
