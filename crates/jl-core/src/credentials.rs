use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("argon2 hash failed: {}", err))?
        .to_string();
    Ok(hash)
}

/// `Ok(false)` for a wrong password; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(password_hash).map_err(|err| anyhow!("invalid password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Runs one argon2 verification against a throwaway hash so a lookup miss costs
/// about as much as a wrong password. Always `false`.
pub fn verify_against_placeholder(password: &str) -> bool {
    static PLACEHOLDER: OnceLock<Option<String>> = OnceLock::new();
    let Some(hash) = PLACEHOLDER.get_or_init(|| hash_password("joylet-placeholder").ok()) else {
        return false;
    };
    let _ = verify_password(password, hash);
    false
}

/// Opaque value handed to the client; only its digest is persisted.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_session_token(ttl: Duration) -> SessionToken {
    let token = Uuid::new_v4().to_string();
    let token_hash = hash_session_token(&token);
    SessionToken {
        token,
        token_hash,
        expires_at: Utc::now() + ttl,
    }
}

pub fn hash_session_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
