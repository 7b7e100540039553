//! Error taxonomy shared by every account operation.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::users::repo::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Bad credentials or a missing/invalid/expired session token. The
    /// message is the only thing the caller sees, so it must not reveal
    /// which check failed.
    #[error("{0}")]
    Authentication(&'static str),

    /// Authenticated, but not allowed to do this.
    #[error("{0}")]
    Authorization(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub const INVALID_CREDENTIALS: &'static str = "Invalid email or password";
    pub const NOT_AUTHENTICATED: &'static str = "Not authenticated";
    pub const EMAIL_TAKEN: &'static str = "Email already exists";

    pub fn invalid_credentials() -> Self {
        Self::Authentication(Self::INVALID_CREDENTIALS)
    }

    pub fn unauthenticated() -> Self {
        Self::Authentication(Self::NOT_AUTHENTICATED)
    }

    pub fn email_taken() -> Self {
        Self::Conflict(Self::EMAIL_TAKEN)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => ApiError::email_taken(),
            StoreError::Other(e) => ApiError::Internal(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(reason = %rejection.body_text(), "rejected request body");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::validation("Request body must be JSON")
            }
            JsonRejection::JsonSyntaxError(_) => ApiError::validation("Malformed JSON body"),
            JsonRejection::JsonDataError(e) => {
                ApiError::validation(format!("Invalid request body: {}", e.body_text()))
            }
            _ => ApiError::validation("Invalid request body"),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::warn!(reason = %rejection.body_text(), "rejected path parameter");
        ApiError::validation("Invalid path parameter")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Validation(msg) => msg.as_str(),
            ApiError::Authentication(msg)
            | ApiError::Authorization(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg,
            ApiError::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "internal error");
                "Internal server error"
            }
        };

        let body = json!({ "success": false, "message": message });
        (status, axum::Json(body)).into_response()
    }
}
