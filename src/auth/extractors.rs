//! Access control gate.
//!
//! Two ordered guards: [`authenticate`] turns a bearer token into the
//! caller's current record, [`require_role`] checks that record's role.
//! [`CurrentUser`] and [`AdminUser`] wrap them as axum extractors, so a
//! handler that names one of them never runs for a rejected request.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    users::repo_types::{Role, User},
};

/// An authenticated caller, re-read from the credential store on every
/// request.
#[derive(Debug, Clone)]
pub struct CurrentUser(User);

/// A caller that passed the admin role check.
#[derive(Debug, Clone)]
pub struct AdminUser(User);

impl CurrentUser {
    pub fn user(&self) -> &User {
        &self.0
    }
}

impl AdminUser {
    pub fn user(&self) -> &User {
        &self.0
    }
}

/// Extracts `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn authenticate(state: &AppState, token: Option<&str>) -> ApiResult<CurrentUser> {
    let token = token.ok_or_else(|| {
        warn!("missing bearer token");
        ApiError::unauthenticated()
    })?;

    let claims = state.jwt.verify(token, state.clock.now()).map_err(|e| {
        warn!(reason = %e, "session token rejected");
        ApiError::unauthenticated()
    })?;

    match state.users.find_by_id(claims.sub).await? {
        Some(user) => Ok(CurrentUser(user)),
        None => {
            warn!(user_id = %claims.sub, "session token for missing user");
            Err(ApiError::unauthenticated())
        }
    }
}

pub fn require_role(caller: &CurrentUser, required: Role) -> ApiResult<()> {
    if caller.0.role.satisfies(required) {
        Ok(())
    } else {
        warn!(user_id = %caller.0.id, role = %caller.0.role, %required, "insufficient role");
        Err(ApiError::Authorization("Insufficient permissions"))
    }
}

pub fn require_admin(caller: CurrentUser) -> ApiResult<AdminUser> {
    require_role(&caller, Role::Admin)?;
    Ok(AdminUser(caller.0))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, bearer_token(&parts.headers)).await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = CurrentUser::from_request_parts(parts, state).await?;
        require_admin(caller)
    }
}
