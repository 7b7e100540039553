use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{
    dto::{AuthResponse, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest},
    password::{hash_password_blocking, verify_password_blocking},
    reset,
};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    users::{
        dto::PublicUser,
        repo_types::{NewUser, Role, User},
    },
};

pub const MIN_PASSWORD_LEN: usize = 6;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

// verified against when the email is unknown so both login failures cost the same
static DUMMY_HASH: OnceCell<Option<String>> = OnceCell::const_new();

async fn dummy_hash() -> Option<&'static str> {
    DUMMY_HASH
        .get_or_init(|| async {
            hash_password_blocking("dummy-password-for-timing".into())
                .await
                .ok()
        })
        .await
        .as_deref()
}

/// Computes the unknown-email comparison hash ahead of the first login.
pub async fn prepare_login() {
    if dummy_hash().await.is_none() {
        warn!("could not prepare login timing hash");
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Emails are compared trimmed and ASCII-lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Normalizes and validates an email supplied by a client.
pub(crate) fn parse_email(raw: &str) -> ApiResult<String> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    Ok(email)
}

pub(crate) fn check_password_policy(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn issue_session(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let token = state.jwt.sign(user.id, state.clock.now())?;
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

/// Creates the account record. Shared by signup, admin create and the admin
/// bootstrap.
pub(crate) async fn register(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> ApiResult<User> {
    let name = name.trim();
    if name.is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::validation(
            "Please provide name, email and password",
        ));
    }
    let email = parse_email(email)?;
    check_password_policy(password)?;

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::email_taken());
    }

    let password_hash = hash_password_blocking(password.to_string()).await?;
    // the unique index settles races the check above lets through
    let user = state
        .users
        .insert(NewUser {
            name: name.to_string(),
            email,
            password_hash,
            role,
        })
        .await?;
    Ok(user)
}

pub async fn signup(state: &AppState, req: SignupRequest) -> ApiResult<AuthResponse> {
    let user = register(state, &req.name, &req.email, &req.password, Role::User).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    issue_session(state, user)
}

pub async fn login(state: &AppState, req: LoginRequest) -> ApiResult<AuthResponse> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Please provide email and password"));
    }
    let email = normalize_email(&req.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        if let Some(dummy) = dummy_hash().await {
            verify_password_blocking(req.password, dummy.to_string()).await;
        }
        warn!(email = %email, "login unknown email");
        return Err(ApiError::invalid_credentials());
    };

    if !verify_password_blocking(req.password, user.password_hash.clone()).await {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::invalid_credentials());
    }

    info!(user_id = %user.id, "user logged in");
    issue_session(state, user)
}

/// Sessions are stateless; the client discards its token and the server
/// has nothing to revoke.
pub fn logout() {
    info!("logout");
}

/// Issues a reset token and hands it to the notifier. Returns the raw token
/// to the caller; exposing it any further is the caller's decision.
pub async fn request_password_reset(
    state: &AppState,
    req: ForgotPasswordRequest,
) -> ApiResult<String> {
    if req.email.trim().is_empty() {
        return Err(ApiError::validation("Please provide email"));
    }
    let email = normalize_email(&req.email);
    let (user, raw) = reset::issue(state.users.as_ref(), state.clock.as_ref(), &email).await?;
    state.notifier.send_password_reset(&user, &raw)?;
    Ok(raw)
}

pub async fn reset_password(
    state: &AppState,
    raw_token: &str,
    req: ResetPasswordRequest,
) -> ApiResult<PublicUser> {
    if req.new_password.is_empty() {
        return Err(ApiError::validation("Please provide a new password"));
    }
    check_password_policy(&req.new_password)?;
    let user = reset::consume(
        state.users.as_ref(),
        state.clock.as_ref(),
        raw_token,
        &req.new_password,
    )
    .await?;
    Ok(user.into())
}
