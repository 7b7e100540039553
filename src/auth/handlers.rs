use axum::{
    extract::State,
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest,
            ResetPasswordRequest, SignupRequest,
        },
        services,
    },
    error::ApiResult,
    extract::{AppJson, AppPath},
    response::Envelope,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", put(reset_password))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<AuthResponse>>)> {
    let res = services::signup(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message("User created successfully", res)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> ApiResult<Json<Envelope<AuthResponse>>> {
    let res = services::login(&state, payload).await?;
    Ok(Json(Envelope::with_message("Login successful", res)))
}

#[instrument]
pub async fn logout() -> Json<Envelope<Value>> {
    services::logout();
    Json(Envelope::with_message("Logout successful", json!({})))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> ApiResult<Json<Envelope<ForgotPasswordResponse>>> {
    let raw = services::request_password_reset(&state, payload).await?;
    let data = ForgotPasswordResponse {
        reset_token: state.config.expose_reset_token.then_some(raw),
    };
    Ok(Json(Envelope::with_message(
        "Password reset instructions sent",
        data,
    )))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> ApiResult<Json<Envelope<Value>>> {
    let user = services::reset_password(&state, &token, payload).await?;
    Ok(Json(Envelope::with_message(
        "Password reset successful",
        json!({ "id": user.id }),
    )))
}
