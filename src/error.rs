use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failure taxonomy for the operation surface.
///
/// Validation outcomes are expected results and map to 4xx with user-safe
/// messages. Anything from a store, the codec or the mail channel collapses
/// to a generic 500; the detail stays in the server log and never reaches
/// the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Verification code is incorrect or expired")]
    InvalidCode,
    #[error("Email already registered")]
    EmailAlreadyRegistered,
    #[error("This email is not registered")]
    AccountNotFound,
    #[error("Email or password is incorrect")]
    InvalidCredentials,
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("Email service is not configured")]
    MailNotConfigured,
    #[error("Internal server error")]
    Upstream(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCode | ApiError::InvalidCredentials | ApiError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::AccountNotFound => StatusCode::NOT_FOUND,
            ApiError::EmailAlreadyRegistered => StatusCode::CONFLICT,
            ApiError::MailNotConfigured | ApiError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Upstream(ref source) = self {
            error!(error = ?source, "request failed upstream");
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
