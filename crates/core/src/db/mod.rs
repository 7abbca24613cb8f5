//! SQLite database access.
//!
//! [`Database`] is the shared handle used by the entity repositories and the
//! migration machinery. Opening is retried with a [`RetryPolicy`] so a
//! database that is briefly unavailable at startup does not abort the process.

pub mod connection;
pub mod retry;

pub use connection::Database;
pub use retry::{RetryPolicy, retry};
