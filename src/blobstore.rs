//! Durable blob storage for uploaded media.
//!
//! The store itself is an opaque collaborator behind [`BlobStore`]; the
//! production implementation pushes the file to an HTTP upload endpoint.
//! What this module owns is the local artifact contract: a temporary file
//! handed to [`upload`] is removed on every exit path, including
//! cancellation mid-request, and removal failures are logged rather than
//! surfaced so they can never mask the upload outcome.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;
use url::Url;

/// A blob accepted by the remote store.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Plain URL of the stored blob.
    pub url: String,
    /// HTTPS variant, when the store offers one. Preferred over `url`.
    pub secure_url: Option<String>,
}

/// Errors from blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Remote media storage. Implementations take a local file and return the
/// URL(s) it is reachable at.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_file(&self, path: &Path) -> Result<StoredBlob, BlobError>;
}

/// Upload a local temporary file and return its stable URL.
///
/// `None` means "no artifact" and is not an error, so optional media (e.g. a
/// cover image) goes through the same path as required media. The local file
/// is deleted whether the upload succeeds or fails; the secure URL variant is
/// preferred when the store offers both.
pub async fn upload(
    store: &dyn BlobStore,
    local_path: Option<PathBuf>,
) -> Result<Option<String>, BlobError> {
    let Some(path) = local_path else {
        return Ok(None);
    };

    // Dropped on every exit path, including cancellation of the await below.
    let _cleanup = TempArtifact(path.clone());

    let blob = store.put_file(&path).await?;
    Ok(Some(blob.secure_url.unwrap_or(blob.url)))
}

/// Remove a temporary artifact that never reached an upload attempt (e.g.
/// the request failed validation first). Swallows and logs removal errors.
pub fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temp artifact");
        }
    }
}

/// Owns a local temp file for the duration of one upload attempt.
struct TempArtifact(PathBuf);

impl Drop for TempArtifact {
    fn drop(&mut self) {
        discard(&self.0);
    }
}

/// Blob store backed by an HTTP upload endpoint. The file is sent as a
/// multipart form; the endpoint replies with `{"url": ..., "secure_url": ...}`.
pub struct HttpBlobStore {
    client: reqwest::Client,
    upload_url: Url,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct UploadReply {
    url: String,
    secure_url: Option<String>,
}

impl HttpBlobStore {
    pub fn new(upload_url: Url, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn put_file(&self, path: &Path) -> Result<StoredBlob, BlobError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BlobError::Upload(format!("cannot read local file: {}", e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let mut request = self.client.post(self.upload_url.clone()).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BlobError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BlobError::Upload(format!(
                "remote store rejected upload: {}",
                response.status()
            )));
        }

        let reply: UploadReply = response
            .json()
            .await
            .map_err(|e| BlobError::Upload(format!("bad upload reply: {}", e)))?;

        Ok(StoredBlob {
            url: reply.url,
            secure_url: reply.secure_url,
        })
    }
}
