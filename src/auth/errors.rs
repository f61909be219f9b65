//! Authentication rejection for protected endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Why an access token was rejected. All kinds surface as 401 with a generic
/// message; the distinction exists for internal logging only.
#[derive(Debug)]
pub(super) enum AuthErrorKind {
    MissingToken,
    InvalidToken,
}

/// Rejection returned by the access-token extractor.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        tracing::debug!(kind = ?self.kind, "Request not authenticated");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "success": false,
                "data": null,
                "message": "Unauthorized",
            })),
        )
            .into_response()
    }
}
