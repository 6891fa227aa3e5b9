//! Endpoint failure vocabulary.
//!
//! One variant per way a request can fail in this service; the status-code
//! mapping lives next to the variants instead of being repeated per handler.
//! Every variant renders as the same `{error, message}` JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, expired, or unresolvable credentials.
    #[error("{0}")]
    Unauthenticated(String),
    /// The referenced meeting record does not exist.
    #[error("Meeting not found")]
    UnknownMeeting,
    /// The request cannot be accepted: bad fields, unsupported document
    /// format, malformed multipart body.
    #[error("{0}")]
    Rejected(String),
    /// Database, filesystem, or task fault behind the endpoint.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::UnknownMeeting => StatusCode::NOT_FOUND,
            Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
