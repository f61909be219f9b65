//! Shared error handling and response envelope for API endpoints.
//!
//! Every response, success or failure, is shaped `{success, data, message}`.
//! Failures carry `data: null` and a human-readable message; internal causes
//! stay in the logs.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::session::SessionError;

/// Response envelope shared by every endpoint.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
}

/// Build a success response with the given status, payload, and message.
pub fn ok<T: Serialize>(status: StatusCode, data: T, message: &str) -> (StatusCode, Json<Envelope<T>>) {
    (
        status,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: message.to_string(),
        }),
    )
}

/// API error type with automatic response conversion.
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SessionError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            SessionError::NotFound(msg) => ApiError::NotFound(msg),
            SessionError::Conflict(msg) => ApiError::Conflict(msg),
            SessionError::UploadFailed(msg) => ApiError::BadGateway(msg),
            SessionError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (
            status,
            Json(Envelope::<()> {
                success: false,
                data: None,
                message,
            }),
        )
            .into_response()
    }
}
