use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, PublicUser, UpdateUserRequest},
    services,
};
use crate::{
    auth::AdminUser,
    error::ApiResult,
    extract::{AppJson, AppPath},
    response::Envelope,
    state::AppState,
};

// every route here takes AdminUser, so the gate runs before the body is read

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, admin))]
pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminUser,
) -> ApiResult<Json<Envelope<Vec<PublicUser>>>> {
    let users = services::list_users(&state, &admin).await?;
    Ok(Json(Envelope::list(users)))
}

#[instrument(skip(state, admin))]
pub async fn get_user(
    State(state): State<AppState>,
    admin: AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let user = services::get_user(&state, &admin, id).await?;
    Ok(Json(Envelope::ok(user)))
}

#[instrument(skip(state, admin, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    admin: AdminUser,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<PublicUser>>)> {
    let user = services::create_user(&state, &admin, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message("User created successfully", user)),
    ))
}

#[instrument(skip(state, admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let user = services::update_user(&state, &admin, id, payload).await?;
    Ok(Json(Envelope::with_message("User updated successfully", user)))
}

#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let user = services::delete_user(&state, &admin, id).await?;
    Ok(Json(Envelope::with_message("User deleted successfully", user)))
}
