use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::instrument;

use super::{
    dto::{DeleteAccountRequest, UpdateProfileRequest},
    services,
};
use crate::{
    auth::CurrentUser, error::ApiResult, extract::AppJson, response::Envelope,
    state::AppState, users::dto::PublicUser,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route(
        "/profile",
        get(get_profile).put(update_profile).delete(delete_own_account),
    )
}

#[instrument(skip(caller))]
pub async fn get_profile(caller: CurrentUser) -> Json<Envelope<PublicUser>> {
    Json(Envelope::ok(services::get_profile(&caller)))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    caller: CurrentUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let user = services::update_profile(&state, &caller, payload).await?;
    Ok(Json(Envelope::with_message("Profile updated successfully", user)))
}

#[instrument(skip(state, caller, payload))]
pub async fn delete_own_account(
    State(state): State<AppState>,
    caller: CurrentUser,
    payload: Option<AppJson<DeleteAccountRequest>>,
) -> ApiResult<Json<Envelope<Value>>> {
    // a bodiless DELETE is reported as a missing password
    let payload = payload.map(|AppJson(p)| p).unwrap_or_default();
    services::delete_own_account(&state, &caller, payload).await?;
    Ok(Json(Envelope::with_message(
        "Account deleted successfully",
        json!({}),
    )))
}
