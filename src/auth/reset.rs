//! Single-use, time-limited password reset tokens.
//!
//! Only the SHA-256 of a token is stored. The raw value leaves this module
//! exactly once, as the return value of [`issue`].

use rand::RngCore;
use sha2::{Digest, Sha256};
use time::Duration;
use tracing::{info, warn};

use super::password::hash_password_blocking;
use crate::{
    clock::Clock,
    error::{ApiError, ApiResult},
    users::{
        repo::UserRepo,
        repo_types::User,
    },
};

pub const RESET_TTL: Duration = Duration::minutes(10);

pub const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Creates a reset token for the account registered under `email` (already
/// normalized). Replaces any earlier outstanding token.
pub async fn issue(
    repo: &dyn UserRepo,
    clock: &dyn Clock,
    email: &str,
) -> ApiResult<(User, String)> {
    let user = repo
        .find_by_email(email)
        .await?
        .ok_or(ApiError::NotFound("No account with that email"))?;

    let raw = generate_reset_token();
    let expires_at = clock.now() + RESET_TTL;
    if !repo
        .set_reset_token(user.id, &hash_reset_token(&raw), expires_at)
        .await?
    {
        // deleted between lookup and write
        return Err(ApiError::NotFound("No account with that email"));
    }

    info!(user_id = %user.id, %expires_at, "reset token issued");
    Ok((user, raw))
}

/// Sets a new password if `raw` names a live reset token. Unknown, used and
/// expired tokens all produce the same error.
pub async fn consume(
    repo: &dyn UserRepo,
    clock: &dyn Clock,
    raw: &str,
    new_password: &str,
) -> ApiResult<User> {
    if raw.is_empty() {
        return Err(ApiError::validation(INVALID_RESET_TOKEN));
    }
    let token_hash = hash_reset_token(raw);

    // cheap pre-check so dead tokens never cost an argon2 run
    let live = repo
        .find_by_reset_token(&token_hash)
        .await?
        .and_then(|u| u.reset_token_expiry)
        .is_some_and(|exp| exp > clock.now());
    if !live {
        warn!("reset token rejected");
        return Err(ApiError::validation(INVALID_RESET_TOKEN));
    }

    let new_hash = hash_password_blocking(new_password.to_string()).await?;
    match repo
        .consume_reset_token(&token_hash, clock.now(), &new_hash)
        .await?
    {
        Some(user) => {
            info!(user_id = %user.id, "password reset via token");
            Ok(user)
        }
        None => {
            warn!("reset token rejected");
            Err(ApiError::validation(INVALID_RESET_TOKEN))
        }
    }
}
