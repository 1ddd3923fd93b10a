//! Password hashing and bearer sessions.
//!
//! Tokens are handed to the client once; only their SHA-256 digest is stored.

use anyhow::{Context, Result};
use chrono::{Duration, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use vitals_core::db::Database;
use vitals_core::error::VitalsError;
use vitals_core::models::User;

pub const MAX_USERNAME_LEN: usize = 50;

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn generate_token() -> String {
    use rand::Rng;

    let bytes: [u8; 32] = rand::rng().random();
    to_hex(&bytes)
}

pub fn token_digest(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

fn validate_credentials(username: &str, password: &str) -> Result<()> {
    let len = username.trim().chars().count();
    if len == 0 || len > MAX_USERNAME_LEN {
        return Err(VitalsError::validation(format!(
            "Username must be between 1 and {MAX_USERNAME_LEN} characters"
        ))
        .into());
    }
    if password.is_empty() {
        return Err(VitalsError::validation("Password cannot be empty").into());
    }
    Ok(())
}

/// Validate a new account's credentials and hash the password.
pub fn hash_credentials(username: &str, password: &str, cost: u32) -> Result<String> {
    validate_credentials(username, password)?;
    hash_password(password, cost)
}

pub fn register(db: &Database, username: &str, password: &str, cost: u32) -> Result<User> {
    let hash = hash_credentials(username, password, cost)?;
    db.create_user(username, &hash)
}

/// Run a bcrypt hash or verify on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Password hashing task failed")
}

fn lock(db: &Mutex<Database>) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Check credentials and open a session. `None` when the username is
/// unknown or the password does not match.
///
/// The lock is taken only for the lookup and the session insert, never
/// while bcrypt runs.
pub async fn login(
    db: &Mutex<Database>,
    username: &str,
    password: &str,
    session_days: i64,
) -> Result<Option<String>> {
    let credentials = lock(db).find_credentials(username)?;
    let Some((user, hash)) = credentials else {
        debug!("login for unknown user");
        return Ok(None);
    };
    let password = password.to_string();
    if !blocking(move || verify_password(&password, &hash)).await? {
        debug!(user_id = user.id, "login with wrong password");
        return Ok(None);
    }
    open_session(&lock(db), user.id, session_days).map(Some)
}

/// Issue a fresh token for `user_id`, dropping expired sessions on the way.
pub fn open_session(db: &Database, user_id: i64, session_days: i64) -> Result<String> {
    let now = Utc::now();
    db.purge_expired_sessions(&timestamp(now))?;

    let token = generate_token();
    let expires_at = timestamp(now + Duration::days(session_days));
    db.create_session(user_id, &token_digest(&token), &expires_at)?;
    info!(user_id, "session opened");
    Ok(token)
}

/// The user id behind a live token.
pub fn authenticate(db: &Database, token: &str) -> Result<Option<i64>> {
    db.session_user(&token_digest(token), &timestamp(Utc::now()))
}

pub fn logout(db: &Database, token: &str) -> Result<bool> {
    db.delete_session(&token_digest(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_core::error::find_vitals_error;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_digest_is_sha256() {
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter2", TEST_COST).unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("Hunter2", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }

    #[test]
    fn test_register_validation() {
        let db = Database::open_in_memory().unwrap();
        let err = register(&db, "  ", "pw", TEST_COST).unwrap_err();
        assert!(matches!(find_vitals_error(&err), Some(VitalsError::Validation(_))));
        let err = register(&db, "alice", "", TEST_COST).unwrap_err();
        assert_eq!(err.to_string(), "Password cannot be empty");
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let user = register(&lock(&db), "alice", "s3cret", TEST_COST).unwrap();

        assert!(login(&db, "alice", "wrong", 7).await.unwrap().is_none());
        assert!(login(&db, "bob", "s3cret", 7).await.unwrap().is_none());

        let token = login(&db, "alice", "s3cret", 7).await.unwrap().unwrap();
        let db = db.into_inner().unwrap();
        assert_eq!(authenticate(&db, &token).unwrap(), Some(user.id));
        assert_eq!(authenticate(&db, "forged").unwrap(), None);

        assert!(logout(&db, &token).unwrap());
        assert_eq!(authenticate(&db, &token).unwrap(), None);
    }

    #[tokio::test]
    async fn test_blocking_hash_roundtrip() {
        let hash = blocking(|| hash_password("hunter2", TEST_COST))
            .await
            .unwrap()
            .unwrap();
        assert!(blocking(move || verify_password("hunter2", &hash)).await.unwrap());
    }

    #[test]
    fn test_expired_session_rejected() {
        let db = Database::open_in_memory().unwrap();
        let user = register(&db, "alice", "s3cret", TEST_COST).unwrap();
        let token = generate_token();
        db.create_session(user.id, &token_digest(&token), "2000-01-01T00:00:00Z")
            .unwrap();
        assert_eq!(authenticate(&db, &token).unwrap(), None);
    }
}
