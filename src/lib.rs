pub mod api;
pub mod auth;
pub mod blobstore;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod session;

use api::create_api_router;
use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::Response,
};
use blobstore::BlobStore;
use db::Database;
use jwt::JwtConfig;
use session::SessionManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Blob store the media uploads go to
    pub blobs: Arc<dyn BlobStore>,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_ttl_secs: u64,
    /// Secret for signing refresh tokens
    pub refresh_secret: Vec<u8>,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: u64,
    /// Directory where uploaded files are spooled before reaching the blob store
    pub upload_dir: PathBuf,
    /// Allowed CORS origin, if any
    pub cors_origin: Option<String>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(
        &config.access_secret,
        config.access_ttl_secs,
        &config.refresh_secret,
        config.refresh_ttl_secs,
    ));

    let sessions = Arc::new(SessionManager::new(
        config.db.clone(),
        jwt.clone(),
        config.blobs.clone(),
    ));

    let api_router = create_api_router(
        sessions,
        jwt,
        config.secure_cookies,
        config.upload_dir.clone(),
    );

    Router::new()
        .nest("/api/v1", api_router)
        .layer(middleware::from_fn_with_state(
            config.cors_origin.clone(),
            cors_headers,
        ))
}

/// Minimal CORS layer: one configured origin, credentials allowed.
async fn cors_headers(
    State(origin): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    if let Some(origin) = origin {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            let headers = response.headers_mut();
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    response
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
