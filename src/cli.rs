//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::blobstore::HttpBlobStore;
use crate::db::Database;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Cliptube",
    about = "Account and session backend with media uploads"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "cliptube.db")]
    pub database: String,

    /// Allowed CORS origin (e.g., "https://app.example.com")
    #[arg(long, env = "CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value = "900")]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value = "864000")]
    pub refresh_token_ttl: u64,

    /// Blob store upload endpoint
    #[arg(long, env = "BLOB_UPLOAD_URL")]
    pub blob_upload_url: String,

    /// Blob store credential, sent as a bearer token
    #[arg(long, env = "BLOB_API_KEY", hide_env_values = true)]
    pub blob_api_key: Option<String>,

    /// Directory for spooling uploads before they reach the blob store
    #[arg(long, default_value = "public/temp")]
    pub upload_dir: PathBuf,

    /// Do not set the Secure flag on cookies (local development only)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a token secret from the named environment variable.
/// Returns None and logs an error if the secret is missing or too short.
pub fn load_token_secret(var: &str) -> Option<Vec<u8>> {
    let Ok(secret) = std::env::var(var) else {
        error!("{} is required. Set it in the environment before starting", var);
        return None;
    };
    // Clear the environment variable to prevent leaking.
    // SAFETY: We're single-threaded at this point during startup,
    // and no other code is reading this environment variable.
    unsafe { std::env::remove_var(var) };

    if secret.len() < MIN_TOKEN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            var, MIN_TOKEN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret.into_bytes())
}

/// Parse and validate the blob store upload URL.
pub fn validate_blob_url(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            error!(url = %raw, error = %e, "Invalid blob upload URL");
            None
        }
    }
}

/// Ensure the upload spool directory exists.
pub fn ensure_upload_dir(dir: &PathBuf) -> bool {
    match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            error!(path = %dir.display(), error = %e, "Failed to create upload directory");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    blob_url: Url,
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
) -> ServerConfig {
    ServerConfig {
        db,
        blobs: Arc::new(HttpBlobStore::new(blob_url, args.blob_api_key.clone())),
        access_secret,
        access_ttl_secs: args.access_token_ttl,
        refresh_secret,
        refresh_ttl_secs: args.refresh_token_ttl,
        upload_dir: args.upload_dir.clone(),
        cors_origin: args.cors_origin.clone(),
        secure_cookies: !args.insecure_cookies,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
