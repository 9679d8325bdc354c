use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::FromRef,
    http::{header, Request, Response, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    auth::JwtKeys,
    config::AppConfig,
    oauth::fake::FakeIdentityProvider,
    state::AppState,
    storage::UserStorage,
    store::memory::MemoryStore,
};

pub const GOOGLE_EMAIL: &str = "Jane.Doe@Gmail.com";
pub const GOOGLE_NAME: &str = "Jane Doe";

/// Full router over an in-memory store, a fake identity provider and a
/// throwaway user root.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::default()), |tmp| tmp.to_path_buf())
    }

    /// Builds an app over `store` whose user root is `user_root(<fresh temp dir>)`.
    pub fn with_store(
        store: Arc<MemoryStore>,
        user_root: impl FnOnce(&Path) -> PathBuf,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(AppConfig::for_tests(user_root(dir.path())));
        let storage = UserStorage::new(&config.user_common_path, &config.backend_url);
        let state = AppState::from_parts(
            store.clone(),
            config,
            Arc::new(FakeIdentityProvider::new(GOOGLE_EMAIL, GOOGLE_NAME)),
            storage,
        );

        Self {
            router: build_app(state.clone()),
            state,
            store,
            _dir: dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    /// Sends `req` and decodes the body as JSON (`Null` when empty).
    pub async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.send(req).await;
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        JwtKeys::from_ref(&self.state).sign(user_id).unwrap()
    }

    /// Registers a password account and returns `(user_id, token)`.
    pub async fn signup(&self, email: &str, password: &str, username: &str) -> (Uuid, String) {
        let (status, body) = self
            .call(json_request(
                "POST",
                "/api/signup",
                serde_json::json!({ "email": email, "password": password, "username": username }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let user_id = body["data"]["userId"].as_str().unwrap().parse().unwrap();
        let token = body["data"]["token"].as_str().unwrap().to_string();
        (user_id, token)
    }
}

/// A user root that cannot hold directories: a regular file.
pub fn file_as_root(tmp: &Path) -> PathBuf {
    let file = tmp.join("not-a-dir");
    std::fs::write(&file, b"").unwrap();
    file
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    req
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
