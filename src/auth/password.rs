//! Argon2id password hashing. Hashes are stored as PHC strings, which carry
//! their own salt and parameters.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

fn argon2() -> Argon2<'static> {
    Argon2::default()
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2()
        .hash_password(plain.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {e}"))
}

/// Fails closed: a stored value that is not a PHC string never matches.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => argon2().verify_password(plain.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            error!(error = %e, "stored password hash is unreadable");
            false
        }
    }
}

pub async fn hash_password_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain)).await?
}

pub async fn verify_password_blocking(plain: String, stored: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&plain, &stored))
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "password verification task failed");
            false
        })
}
