mod accounts;
mod error;

use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;

use crate::jwt::JwtConfig;
use crate::session::SessionManager;

/// Create the API router.
pub fn create_api_router(
    sessions: Arc<SessionManager>,
    jwt: Arc<JwtConfig>,
    secure_cookies: bool,
    upload_dir: PathBuf,
) -> Router {
    let accounts_state = accounts::AccountsState {
        sessions,
        jwt,
        secure_cookies,
        upload_dir,
    };

    Router::new().nest("/users", accounts::router(accounts_state))
}
