//! Account and session endpoints.
//!
//! - POST `/register` - Create an account (multipart: text fields + avatar/cover files)
//! - POST `/login` - Exchange credentials for an access+refresh token pair
//! - POST `/refresh` - Rotate the refresh token and issue a new pair
//! - POST `/logout` - Clear the stored refresh token and both cookies

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Request, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use super::error::{ApiError, ok};
use crate::auth::{
    ACCESS_COOKIE_NAME, ApiAuth, HasAuthState, REFRESH_COOKIE_NAME, clear_cookie, get_cookie,
    session_cookie,
};
use crate::blobstore;
use crate::db::AccountView;
use crate::jwt::JwtConfig;
use crate::session::{Registration, SessionManager};

/// Largest accepted request body: covers an avatar plus a cover image.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Largest accepted JSON body for the refresh fallback.
const MAX_REFRESH_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AccountsState {
    pub sessions: Arc<SessionManager>,
    pub jwt: Arc<JwtConfig>,
    pub secure_cookies: bool,
    pub upload_dir: PathBuf,
}

impl HasAuthState for AccountsState {
    fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }
}

pub fn router(state: AccountsState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

// --- Register ---

#[derive(Default)]
struct RegisterForm {
    fullname: String,
    email: String,
    username: String,
    password: String,
    avatar: Option<PathBuf>,
    cover_image: Option<PathBuf>,
}

async fn register(
    State(state): State<AccountsState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = match read_register_form(&state.upload_dir, multipart).await {
        Ok(form) => form,
        Err((saved, err)) => {
            for path in &saved {
                blobstore::discard(path);
            }
            return Err(err);
        }
    };

    let view = state
        .sessions
        .register(Registration {
            full_name: form.fullname,
            email: form.email,
            username: form.username,
            password: form.password,
            avatar: form.avatar,
            cover_image: form.cover_image,
        })
        .await?;

    Ok(ok(
        StatusCode::CREATED,
        view,
        "User registered successfully",
    ))
}

/// Read the registration multipart form, spooling file fields to the upload
/// directory. On error, returns the paths already written so the caller can
/// discard them.
async fn read_register_form(
    upload_dir: &PathBuf,
    mut multipart: Multipart,
) -> Result<RegisterForm, (Vec<PathBuf>, ApiError)> {
    let mut form = RegisterForm::default();
    let mut saved: Vec<PathBuf> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => {
                return Err((saved, ApiError::bad_request("Invalid multipart data")));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "fullname" | "email" | "username" | "password" => {
                let text = match field.text().await {
                    Ok(text) => text,
                    Err(_) => {
                        return Err((
                            saved,
                            ApiError::bad_request(format!("Failed to read field {}", name)),
                        ));
                    }
                };
                match name.as_str() {
                    "fullname" => form.fullname = text,
                    "email" => form.email = text,
                    "username" => form.username = text,
                    _ => form.password = text,
                }
            }
            "avatar" | "coverImage" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(_) => {
                        return Err((
                            saved,
                            ApiError::bad_request(format!("Failed to read file {}", name)),
                        ));
                    }
                };
                let path = upload_dir.join(format!(
                    "{}-{}",
                    uuid::Uuid::new_v4(),
                    sanitize_file_name(&file_name)
                ));
                if tokio::fs::write(&path, &data).await.is_err() {
                    return Err((
                        saved,
                        ApiError::Internal("Failed to store uploaded file".into()),
                    ));
                }
                saved.push(path.clone());
                if name == "avatar" {
                    form.avatar = Some(path);
                } else {
                    form.cover_image = Some(path);
                }
            }
            // Unknown fields are ignored, matching lenient form handling.
            _ => {}
        }
    }

    Ok(form)
}

/// Keep only characters that are safe in a locally spooled file name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

// --- Login ---

#[derive(Deserialize)]
struct LoginRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct LoginData {
    user: AccountView,
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

async fn login(
    State(state): State<AccountsState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .sessions
        .login(
            payload.username.as_deref(),
            payload.email.as_deref(),
            payload.password.as_deref().unwrap_or(""),
        )
        .await?;

    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            session_cookie(
                ACCESS_COOKIE_NAME,
                &outcome.access.token,
                outcome.access.ttl_secs,
                state.secure_cookies,
            ),
        ),
        (
            SET_COOKIE,
            session_cookie(
                REFRESH_COOKIE_NAME,
                &outcome.refresh.token,
                outcome.refresh.ttl_secs,
                state.secure_cookies,
            ),
        ),
    ]);

    Ok((
        cookies,
        ok(
            StatusCode::OK,
            LoginData {
                user: outcome.account,
                access_token: outcome.access.token,
                refresh_token: outcome.refresh.token,
            },
            "User logged in successfully",
        ),
    ))
}

// --- Refresh ---

#[derive(Deserialize)]
struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct RefreshData {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

/// The refresh token arrives in the cookie or, failing that, the JSON body.
async fn refresh(
    State(state): State<AccountsState>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let (parts, body) = request.into_parts();

    let presented = match get_cookie(&parts.headers, REFRESH_COOKIE_NAME) {
        Some(token) => token.to_string(),
        None => token_from_body(body)
            .await
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?,
    };

    let pair = state.sessions.refresh(&presented).await?;

    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            session_cookie(
                ACCESS_COOKIE_NAME,
                &pair.access.token,
                pair.access.ttl_secs,
                state.secure_cookies,
            ),
        ),
        (
            SET_COOKIE,
            session_cookie(
                REFRESH_COOKIE_NAME,
                &pair.refresh.token,
                pair.refresh.ttl_secs,
                state.secure_cookies,
            ),
        ),
    ]);

    Ok((
        cookies,
        ok(
            StatusCode::OK,
            RefreshData {
                access_token: pair.access.token,
                refresh_token: pair.refresh.token,
            },
            "Access token refreshed successfully",
        ),
    ))
}

async fn token_from_body(body: Body) -> Option<String> {
    let bytes = axum::body::to_bytes(body, MAX_REFRESH_BODY_BYTES).await.ok()?;
    serde_json::from_slice::<RefreshRequest>(&bytes)
        .ok()?
        .refresh_token
        .filter(|t| !t.is_empty())
}

// --- Logout ---

async fn logout(
    State(state): State<AccountsState>,
    ApiAuth(auth): ApiAuth,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(auth.account_uuid()).await?;

    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies),
        ),
        (
            SET_COOKIE,
            clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies),
        ),
    ]);

    Ok((
        cookies,
        ok(
            StatusCode::OK,
            serde_json::json!({}),
            "User logged out successfully",
        ),
    ))
}
