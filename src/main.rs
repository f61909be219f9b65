use std::net::SocketAddr;

use clap::Parser;
use cliptube::cli::{
    Args, build_config, ensure_upload_dir, init_logging, load_token_secret, open_database,
    validate_blob_url,
};
use cliptube::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(access_secret) = load_token_secret("ACCESS_TOKEN_SECRET") else {
        std::process::exit(1);
    };
    let Some(refresh_secret) = load_token_secret("REFRESH_TOKEN_SECRET") else {
        std::process::exit(1);
    };

    let Some(blob_url) = validate_blob_url(&args.blob_upload_url) else {
        std::process::exit(1);
    };

    if !ensure_upload_dir(&args.upload_dir) {
        std::process::exit(1);
    }

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap();

    let config = build_config(&args, db, blob_url, access_secret, refresh_secret);
    let app = create_app(&config);

    info!(address = %local_addr, "Listening");

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
