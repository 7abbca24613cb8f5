//! Entity repositories.
//!
//! Each submodule adds `impl Database` methods for one table group. Ids are
//! UUID v4 strings and timestamps are RFC 3339 strings, as stored.

pub mod attendance;
pub mod forum;
pub mod grades;
pub mod sessions;
pub mod students;
pub mod users;

pub use attendance::{Attendance, AttendanceStatus, NewAttendance};
pub use forum::{ForumComment, ForumPost, NewComment, NewPost};
pub use grades::{Assignment, Grade, GradeStatus, NewAssignment, NewGrade};
pub use students::{NewStudent, Student};
pub use users::{NewUser, Role, User, UserUpdate};

use tokio_rusqlite::rusqlite::{self, ErrorCode};

use crate::Error;

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn now() -> String {
    timestamp(chrono::Utc::now())
}

/// Reject empty or whitespace-only required text fields.
pub(crate) fn require(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Map SQLite constraint violations onto client-facing errors.
///
/// Unique violations become `Conflict`, foreign key and check violations
/// become `Validation`; anything else stays a database error.
pub(crate) fn constraint(err: rusqlite::Error, what: &str) -> Error {
    let extended = match &err {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation => {
            failure.extended_code
        }
        _ => return err.into(),
    };

    match extended {
        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            Error::Conflict(format!("{what} already exists"))
        }
        rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::Validation(format!("{what} references an unknown record")),
        _ => Error::Validation(format!("{what} is invalid: {err}")),
    }
}

#[cfg(test)]
pub(crate) async fn migrated_db() -> crate::Database {
    use crate::migrate::{MigrationRunner, StepLimit, source};

    let db = crate::Database::open_in_memory().await.unwrap();
    MigrationRunner::new(&db, source::builtin().unwrap())
        .up(StepLimit::All)
        .await
        .unwrap();
    db
}

#[cfg(test)]
pub(crate) fn new_user(username: &str, role: Role) -> NewUser {
    NewUser {
        username: username.into(),
        email: format!("{username}@school.test"),
        password: "password123".into(),
        first_name: "Test".into(),
        last_name: "User".into(),
        role,
        student_ids: Vec::new(),
    }
}
