//! Bearer sessions issued at login.
//!
//! Only the SHA-256 digest of a token is stored; the plaintext token is
//! returned once from [`Database::create_session`].

use chrono::{Duration, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

use super::timestamp;
use super::users::{User, fetch_user};
use crate::auth::{generate_session_token, is_well_formed_token, token_digest};
use crate::{Database, Error};

impl Database {
    /// Issue a new token for `user_id`, valid for `ttl`.
    pub async fn create_session(&self, user_id: &str, ttl: Duration) -> Result<String, Error> {
        let token = generate_session_token();
        let digest = token_digest(&token);
        let user_id = user_id.to_string();
        let created = Utc::now();
        let expires = created
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::Validation(format!("session ttl of {ttl} is out of range")))?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO sessions (token_digest, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                    params![digest, user_id, timestamp(created), timestamp(expires)],
                )
                .map_err(|e| super::constraint(e, "session"))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(token)
    }

    /// Resolve a bearer token to its user.
    ///
    /// Returns None for malformed, unknown or expired tokens.
    pub async fn session_user(&self, token: &str) -> Result<Option<User>, Error> {
        if !is_well_formed_token(token) {
            return Ok(None);
        }
        let digest = token_digest(token);
        let now = timestamp(Utc::now());

        self.conn
            .call(move |conn| -> Result<Option<User>, Error> {
                let user_id: Option<String> = conn
                    .query_row(
                        "SELECT user_id FROM sessions WHERE token_digest = ?1 AND expires_at > ?2",
                        params![digest, now],
                        |row| row.get(0),
                    )
                    .optional()?;
                match user_id {
                    Some(id) => fetch_user(conn, &id),
                    None => Ok(None),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Revoke a token. Returns whether it existed.
    pub async fn delete_session(&self, token: &str) -> Result<bool, Error> {
        let digest = token_digest(token);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                Ok(conn.execute("DELETE FROM sessions WHERE token_digest = ?1", params![digest])? > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove expired sessions. Returns how many were deleted.
    pub async fn purge_expired_sessions(&self) -> Result<usize, Error> {
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, migrated_db, new_user};

    #[tokio::test]
    async fn test_session_round_trip() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("teacher", Role::Faculty)).await.unwrap();

        let token = db.create_session(&user.id, Duration::hours(1)).await.unwrap();
        assert!(token.starts_with("sess_"));

        let resolved = db.session_user(&token).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.role, Role::Faculty);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_tokens() {
        let db = migrated_db().await;
        assert!(db.session_user("garbage").await.unwrap().is_none());
        assert!(db.session_user(&generate_session_token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_purged() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("late", Role::Staff)).await.unwrap();
        let token = db.create_session(&user.id, Duration::seconds(-1)).await.unwrap();

        assert!(db.session_user(&token).await.unwrap().is_none());
        assert_eq!(db.purge_expired_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("forever", Role::Staff)).await.unwrap();
        let result = db.create_session(&user.id, Duration::MAX).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_session() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("leaver", Role::Parent)).await.unwrap();
        let token = db.create_session(&user.id, Duration::hours(1)).await.unwrap();

        assert!(db.delete_session(&token).await.unwrap());
        assert!(db.session_user(&token).await.unwrap().is_none());
        assert!(!db.delete_session(&token).await.unwrap());
    }
}
