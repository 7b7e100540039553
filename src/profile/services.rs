use tracing::{info, warn};

use super::dto::{DeleteAccountRequest, UpdateProfileRequest};
use crate::{
    auth::{
        extractors::CurrentUser,
        password::{hash_password_blocking, verify_password_blocking},
        services::{check_password_policy, parse_email},
    },
    error::{ApiError, ApiResult},
    state::AppState,
    users::{
        dto::PublicUser,
        repo_types::{PasswordSwap, UserPatch},
    },
};

const WRONG_CURRENT_PASSWORD: &str = "Current password is incorrect";

pub fn get_profile(caller: &CurrentUser) -> PublicUser {
    caller.user().into()
}

/// Self-service update of name, email, avatar and password. The role can
/// never change through this path.
pub async fn update_profile(
    state: &AppState,
    caller: &CurrentUser,
    req: UpdateProfileRequest,
) -> ApiResult<PublicUser> {
    let me = caller.user();
    if req.role.is_some() {
        warn!(user_id = %me.id, "ignoring role in self-service profile update");
    }

    let mut patch = UserPatch::default();

    if let Some(name) = req.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Name cannot be empty"));
        }
        if name != me.name {
            patch.name = Some(name.to_string());
        }
    }

    if let Some(email) = req.email {
        let email = parse_email(&email)?;
        if email != me.email {
            if let Some(other) = state.users.find_by_email(&email).await? {
                if other.id != me.id {
                    return Err(ApiError::email_taken());
                }
            }
            patch.email = Some(email);
        }
    }

    patch.avatar = req.avatar;

    if let Some(new_password) = req.new_password.filter(|p| !p.is_empty()) {
        let current = req
            .current_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ApiError::validation("Current password is required to change password")
            })?;
        check_password_policy(&new_password)?;
        if !verify_password_blocking(current, me.password_hash.clone()).await {
            warn!(user_id = %me.id, "profile update with wrong current password");
            return Err(ApiError::Authentication(WRONG_CURRENT_PASSWORD));
        }
        patch.password = Some(PasswordSwap {
            expected_hash: me.password_hash.clone(),
            new_hash: hash_password_blocking(new_password).await?,
        });
    }

    if patch.is_empty() {
        return Ok(me.into());
    }

    let changes_password = patch.password.is_some();
    match state.users.update(me.id, patch).await? {
        Some(updated) => {
            info!(user_id = %updated.id, changes_password, "profile updated");
            Ok(updated.into())
        }
        // the stored hash moved after we verified against it
        None if changes_password => Err(ApiError::Authentication(WRONG_CURRENT_PASSWORD)),
        None => Err(ApiError::NotFound("User not found")),
    }
}

/// Permanently removes the caller's own account after re-checking the
/// password.
pub async fn delete_own_account(
    state: &AppState,
    caller: &CurrentUser,
    req: DeleteAccountRequest,
) -> ApiResult<()> {
    let me = caller.user();
    if req.password.is_empty() {
        return Err(ApiError::validation("Password is required to delete account"));
    }
    if !verify_password_blocking(req.password, me.password_hash.clone()).await {
        warn!(user_id = %me.id, "account deletion with wrong password");
        return Err(ApiError::Authentication("Incorrect password"));
    }
    match state.users.delete(me.id, Some(&me.password_hash)).await? {
        Some(_) => {
            info!(user_id = %me.id, "account deleted by owner");
            Ok(())
        }
        None => Err(ApiError::Authentication("Incorrect password")),
    }
}
