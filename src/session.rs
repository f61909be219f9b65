//! Session orchestration: registration, login, refresh rotation, logout.
//!
//! Each operation either fully succeeds or leaves account state untouched.
//! The one accepted gap: a blob already uploaded by a registration that fails
//! at a later step is not deleted remotely (logged, not retried).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::blobstore::{self, BlobStore};
use crate::db::{AccountError, AccountView, Database, NewAccount};
use crate::jwt::{IssuedToken, JwtConfig, TokenKind};

/// Session operation failures, mapped onto HTTP statuses by the transport.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UploadFailed(String),
    #[error("{0}")]
    Internal(String),
}

/// Registration input. File paths reference local temp artifacts whose
/// ownership passes to the blob store client on upload.
#[derive(Debug)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

/// A successful login: the account's public view plus a fresh credential pair.
pub struct LoginOutcome {
    pub account: AccountView,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// A successful refresh rotation: the new credential pair.
pub struct RefreshedPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Orchestrates account and credential state transitions. No in-process
/// locks: the refresh compare-and-swap lives in the account store.
pub struct SessionManager {
    db: Database,
    jwt: Arc<JwtConfig>,
    blobs: Arc<dyn BlobStore>,
}

impl SessionManager {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, jwt, blobs }
    }

    /// Register a new account. Fail-fast validation order: text fields,
    /// uniqueness, avatar presence, avatar upload, cover upload, create.
    /// No account record exists after any failure.
    pub async fn register(&self, reg: Registration) -> Result<AccountView, SessionError> {
        let full_name = reg.full_name.trim();
        let email = reg.email.trim();
        let username = reg.username.trim();
        let password = reg.password.trim();

        if [full_name, email, username, password]
            .iter()
            .any(|field| field.is_empty())
        {
            discard_artifacts(&reg.avatar, &reg.cover_image);
            return Err(SessionError::InvalidInput("All fields are required".into()));
        }

        let username = username.to_lowercase();

        // Pre-check for a friendly error; the unique constraint below is the
        // real guarantee if a concurrent registration races this one.
        let taken = self
            .db
            .accounts()
            .exists_by_username_or_email(&username, email)
            .await
            .map_err(internal("Failed to check account uniqueness"))?;
        if taken {
            discard_artifacts(&reg.avatar, &reg.cover_image);
            return Err(SessionError::Conflict("User already exists".into()));
        }

        if reg.avatar.is_none() {
            discard_artifacts(&reg.avatar, &reg.cover_image);
            return Err(SessionError::InvalidInput("Please upload avatar".into()));
        }

        let avatar_url = blobstore::upload(self.blobs.as_ref(), reg.avatar)
            .await
            .map_err(|e| {
                error!(error = %e, "Avatar upload failed");
                discard_artifacts(&None, &reg.cover_image);
                SessionError::UploadFailed("Avatar upload failed".into())
            })?
            .ok_or_else(|| SessionError::UploadFailed("Avatar upload failed".into()))?;

        let cover_image_url = blobstore::upload(self.blobs.as_ref(), reg.cover_image)
            .await
            .map_err(|e| {
                // The avatar blob is already remote; tolerated as an orphan.
                error!(error = %e, orphaned_avatar = %avatar_url, "Cover image upload failed");
                SessionError::UploadFailed("Cover image upload failed".into())
            })?
            .unwrap_or_default();

        let account = self
            .db
            .accounts()
            .create(NewAccount {
                username,
                email: email.to_string(),
                full_name: full_name.to_string(),
                password: password.to_string(),
                avatar_url: avatar_url.clone(),
                cover_image_url,
            })
            .await
            .map_err(|e| match e {
                AccountError::Conflict => {
                    warn!(orphaned_avatar = %avatar_url, "Registration lost a uniqueness race");
                    SessionError::Conflict("User already exists".into())
                }
                other => {
                    error!(error = %other, "Failed to create account");
                    SessionError::Internal("User creation failed".into())
                }
            })?;

        Ok(account.into())
    }

    /// Log in with a username or email plus password. On success the issued
    /// refresh token overwrites the account's single slot, invalidating any
    /// session that was holding the previous one.
    pub async fn login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: &str,
    ) -> Result<LoginOutcome, SessionError> {
        let username = username.map(str::trim).filter(|s| !s.is_empty());
        let email = email.map(str::trim).filter(|s| !s.is_empty());

        if username.is_none() && email.is_none() {
            return Err(SessionError::InvalidInput(
                "Username or email is required".into(),
            ));
        }
        if password.is_empty() {
            return Err(SessionError::InvalidInput("Password is required".into()));
        }

        let username = username.map(|u| u.to_lowercase());
        let account = self
            .db
            .accounts()
            .find_by_username_or_email(username.as_deref(), email)
            .await
            .map_err(internal("Failed to look up account"))?
            .ok_or_else(|| SessionError::NotFound("User not found".into()))?;

        if !self.db.accounts().verify_password(&account, password) {
            return Err(SessionError::Unauthorized("Invalid password".into()));
        }

        let (access, refresh) = self.issue_pair(&account.uuid, &account.username)?;

        self.db
            .accounts()
            .set_refresh_token(&account.uuid, Some(&refresh.token))
            .await
            .map_err(internal("Failed to persist refresh token"))?;

        Ok(LoginOutcome {
            account: account.into(),
            access,
            refresh,
        })
    }

    /// Exchange a refresh token for a new credential pair, rotating the
    /// stored token. The presented token must both verify and exactly match
    /// the account's stored slot; all verification failures surface as
    /// `Unauthorized` so callers learn nothing about which check failed.
    pub async fn refresh(&self, presented: &str) -> Result<RefreshedPair, SessionError> {
        let claims = self.jwt.verify_refresh(presented).map_err(|e| {
            debug!(cause = %e, "Refresh token rejected");
            SessionError::Unauthorized("Invalid or expired refresh token".into())
        })?;

        let account = self
            .db
            .accounts()
            .get_by_uuid(&claims.sub)
            .await
            .map_err(internal("Failed to look up account"))?
            .ok_or_else(|| SessionError::NotFound("Invalid refresh token".into()))?;

        let (access, refresh) = self.issue_pair(&account.uuid, &account.username)?;

        // Atomic compare-and-swap on the stored slot. Of two concurrent
        // rotations with the same token, exactly one lands here with `true`.
        let rotated = self
            .db
            .accounts()
            .rotate_refresh_token(&account.uuid, presented, &refresh.token)
            .await
            .map_err(internal("Failed to rotate refresh token"))?;

        if !rotated {
            return Err(SessionError::Unauthorized("Refresh token expired".into()));
        }

        Ok(RefreshedPair { access, refresh })
    }

    /// Log out: clear the stored refresh token so nothing can match it.
    /// The caller's identity comes from upstream access-token verification.
    pub async fn logout(&self, account_uuid: &str) -> Result<(), SessionError> {
        self.db
            .accounts()
            .set_refresh_token(account_uuid, None)
            .await
            .map_err(internal("Failed to clear refresh token"))
    }

    fn issue_pair(
        &self,
        uuid: &str,
        username: &str,
    ) -> Result<(IssuedToken, IssuedToken), SessionError> {
        let access = self.jwt.issue(TokenKind::Access, uuid, username);
        let refresh = self.jwt.issue(TokenKind::Refresh, uuid, username);
        match (access, refresh) {
            (Ok(access), Ok(refresh)) => Ok((access, refresh)),
            (Err(e), _) | (_, Err(e)) => {
                // Log the cause; the outward message must not carry key material.
                error!(error = %e, "Token generation failed");
                Err(SessionError::Internal("Token generation failed".into()))
            }
        }
    }
}

/// Map an infrastructure error to `Internal`, logging the cause.
fn internal(context: &'static str) -> impl Fn(sqlx::Error) -> SessionError {
    move |e| {
        error!(error = %e, "{}", context);
        SessionError::Internal("Something went wrong".into())
    }
}

/// Drop temp artifacts that will never reach an upload attempt.
fn discard_artifacts(avatar: &Option<PathBuf>, cover: &Option<PathBuf>) {
    if let Some(path) = avatar {
        blobstore::discard(path);
    }
    if let Some(path) = cover {
        blobstore::discard(path);
    }
}
