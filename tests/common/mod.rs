#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use axum::body::Body;
use axum::http::{Request, Response, header};
use cliptube::blobstore::{BlobError, BlobStore, StoredBlob};
use cliptube::db::Database;
use cliptube::{ServerConfig, create_app};
use tower::ServiceExt;

/// Blob store double: records every upload and can be told to start failing
/// at the nth call.
pub struct MockBlobStore {
    calls: AtomicUsize,
    fail_from: usize,
    pub uploads: Mutex<Vec<PathBuf>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::failing_from(usize::MAX)
    }

    /// Calls with index >= `fail_from` (zero-based) fail.
    pub fn failing_from(fail_from: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl BlobStore for MockBlobStore {
    async fn put_file(&self, path: &Path) -> Result<StoredBlob, BlobError> {
        assert!(
            path.exists(),
            "local file must still exist when the store is called"
        );
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().push(path.to_path_buf());
        if index >= self.fail_from {
            return Err(BlobError::Upload("mock store refused".into()));
        }
        let id = uuid::Uuid::new_v4();
        Ok(StoredBlob {
            url: format!("http://blobs.test/{}", id),
            secure_url: Some(format!("https://blobs.test/{}", id)),
        })
    }
}

pub struct TestContext {
    pub app: axum::Router,
    pub db: Database,
    pub blobs: Arc<MockBlobStore>,
    pub upload_dir: tempfile::TempDir,
}

impl TestContext {
    /// Number of files still sitting in the upload spool directory.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }
}

pub async fn setup() -> TestContext {
    setup_with_store(Arc::new(MockBlobStore::new())).await
}

pub async fn setup_with_failing_store(fail_from: usize) -> TestContext {
    setup_with_store(Arc::new(MockBlobStore::failing_from(fail_from))).await
}

async fn setup_with_store(blobs: Arc<MockBlobStore>) -> TestContext {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");

    let config = ServerConfig {
        db: db.clone(),
        blobs: blobs.clone(),
        access_secret: b"access-secret-long-enough-for-tests".to_vec(),
        access_ttl_secs: 300,
        refresh_secret: b"refresh-secret-long-enough-for-tests".to_vec(),
        refresh_ttl_secs: 3600,
        upload_dir: upload_dir.path().to_path_buf(),
        cors_origin: None,
        secure_cookies: false,
    };

    TestContext {
        app: create_app(&config),
        db,
        blobs,
        upload_dir,
    }
}

pub const BOUNDARY: &str = "cliptube-test-boundary";

/// Registration form inputs. Text fields are always sent; files only when
/// the flags are set.
pub struct RegisterForm<'a> {
    pub fullname: &'a str,
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub avatar: bool,
    pub cover: bool,
}

impl Default for RegisterForm<'_> {
    fn default() -> Self {
        Self {
            fullname: "Ada L",
            email: "ada@x.io",
            username: "AdaL",
            password: "p@ss",
            avatar: true,
            cover: false,
        }
    }
}

/// Build a multipart/form-data body for the register endpoint.
pub fn multipart_body(form: &RegisterForm) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in [
        ("fullname", form.fullname),
        ("email", form.email),
        ("username", form.username),
        ("password", form.password),
    ] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if form.avatar {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"avatar.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"fake avatar bytes\r\n");
    }

    if form.cover {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"coverImage\"; filename=\"cover.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"fake cover bytes\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST the registration form and return the response.
pub async fn post_register(ctx: &TestContext, form: &RegisterForm<'_>) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/register")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(form)))
        .unwrap();

    ctx.app.clone().oneshot(request).await.unwrap()
}

/// POST a JSON login request and return the response.
pub async fn post_login(ctx: &TestContext, payload: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    ctx.app.clone().oneshot(request).await.unwrap()
}

/// POST to the refresh endpoint with the token in the cookie.
pub async fn post_refresh_with_cookie(ctx: &TestContext, refresh_token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/refresh")
        .header(header::COOKIE, format!("refreshToken={refresh_token}"))
        .body(Body::empty())
        .unwrap();

    ctx.app.clone().oneshot(request).await.unwrap()
}

/// POST to the refresh endpoint with the token in the JSON body.
pub async fn post_refresh_with_body(ctx: &TestContext, refresh_token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/refresh")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "refreshToken": refresh_token }).to_string(),
        ))
        .unwrap();

    ctx.app.clone().oneshot(request).await.unwrap()
}

/// POST to the logout endpoint with the given access token cookie.
pub async fn post_logout(ctx: &TestContext, access_token: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/v1/users/logout");
    if let Some(token) = access_token {
        builder = builder.header(header::COOKIE, format!("accessToken={token}"));
    }
    let request = builder.body(Body::empty()).unwrap();

    ctx.app.clone().oneshot(request).await.unwrap()
}

/// Read the response body as the `{success, data, message}` envelope.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract a cookie value from the response's Set-Cookie headers.
pub fn response_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    for value in response.headers().get_all(header::SET_COOKIE) {
        let value = value.to_str().ok()?;
        if let Some(rest) = value.strip_prefix(&format!("{name}=")) {
            return Some(rest.split(';').next().unwrap_or("").to_string());
        }
    }
    None
}

/// Register an account and log in, returning (access_token, refresh_token).
pub async fn register_and_login(
    ctx: &TestContext,
    username: &str,
    email: &str,
    password: &str,
) -> (String, String) {
    let response = post_register(
        ctx,
        &RegisterForm {
            fullname: "Test Account",
            email,
            username,
            password,
            avatar: true,
            cover: false,
        },
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);

    let response = post_login(
        ctx,
        serde_json::json!({ "username": username, "password": password }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let access = response_cookie(&response, "accessToken").expect("access cookie");
    let refresh = response_cookie(&response, "refreshToken").expect("refresh cookie");
    (access, refresh)
}
