//! Credential primitives: password hashing and opaque session tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Session tokens are random
//! and only their SHA-256 digest is persisted, so a leaked `sessions` table
//! cannot be replayed as bearer credentials.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::Error;

const TOKEN_PREFIX: &str = "sess_";

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC hash.
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is malformed");
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Generate a new bearer token: `sess_` followed by 64 hex characters.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

/// SHA-256 digest of a token, as stored in `sessions.token_digest`.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a string has the shape of a token from [`generate_session_token`].
pub fn is_well_formed_token(token: &str) -> bool {
    token
        .strip_prefix(TOKEN_PREFIX)
        .is_some_and(|rest| rest.len() == 64 && rest.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        assert_ne!(hash_password("pw").unwrap(), hash_password("pw").unwrap());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("pw", "not-a-phc-string"));
    }

    #[test]
    fn test_session_token_shape() {
        let token = generate_session_token();
        assert!(is_well_formed_token(&token));
        assert_ne!(token, generate_session_token());
        assert!(!is_well_formed_token("sess_abc"));
        assert!(!is_well_formed_token(&token.replace("sess_", "tok_")));
    }

    #[test]
    fn test_token_digest_is_stable_hex() {
        let digest = token_digest("sess_00");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest("sess_00"));
        assert_ne!(digest, token_digest("sess_01"));
    }
}
