use axum::{
    extract::{rejection::JsonRejection, FromRef, Query, State},
    response::Redirect,
    Json,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{dto::SessionPayload, email::normalize_email, services, JwtKeys},
    error::{AppError, AppResult, Envelope},
    state::AppState,
    store::{LoginGrant, PendingAuthorization},
};

const PENDING_TTL: Duration = Duration::minutes(10);
const GRANT_TTL: Duration = Duration::minutes(2);
const GRANT_CODE_LEN: usize = 48;

#[derive(Debug, Serialize)]
pub struct AuthorizationUrl {
    pub authorization_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExchangeRequest {
    pub code: Option<String>,
}

#[instrument(skip(state))]
pub async fn google_login(
    State(state): State<AppState>,
) -> AppResult<Json<Envelope<AuthorizationUrl>>> {
    let request = state.identity.authorization_request();
    state
        .store
        .save_pending_authorization(&PendingAuthorization {
            csrf_state: request.csrf_state,
            pkce_verifier: request.pkce_verifier,
            expires_at: OffsetDateTime::now_utc() + PENDING_TTL,
        })
        .await?;

    Ok(Envelope::ok(
        "Authorization URL created",
        AuthorizationUrl {
            authorization_url: request.url,
        },
    ))
}

/// Redirect target registered with Google.
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> AppResult<Redirect> {
    if let Some(error) = params.error {
        warn!(%error, "google sign-in refused");
        return Err(AppError::bad_request(format!(
            "Google sign-in failed: {}",
            error
        )));
    }
    let (Some(code), Some(csrf_state)) = (params.code, params.state) else {
        return Err(AppError::bad_request("Missing code or state"));
    };

    let pending = state
        .store
        .take_pending_authorization(&csrf_state)
        .await?
        .ok_or_else(|| {
            warn!("unknown or expired oauth state");
            AppError::bad_request("Unknown or expired OAuth state")
        })?;

    let identity = state
        .identity
        .exchange_code(&code, &pending.pkce_verifier)
        .await?;
    debug!(subject = %identity.subject, "provider identity received");
    let email = normalize_email(&identity.email)
        .map_err(|e| anyhow::anyhow!("provider returned an unusable email: {}", e))?;
    let username = identity
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default());

    let user = services::find_or_create_federated(&state, &email, username).await?;

    let grant = LoginGrant {
        code: grant_code(),
        user_id: user.id,
        expires_at: OffsetDateTime::now_utc() + GRANT_TTL,
    };
    state.store.save_login_grant(&grant).await?;

    let mut location = reqwest::Url::parse(&state.config.frontend_url)
        .map_err(|e| anyhow::anyhow!("FRONTEND_URL is not a valid URL: {}", e))?;
    location.query_pairs_mut().append_pair("code", &grant.code);

    info!(user_id = %user.id, "google sign-in complete");
    Ok(Redirect::to(location.as_str()))
}

/// Trades the one-time code from the callback redirect for a session.
#[instrument(skip_all)]
pub async fn exchange(
    State(state): State<AppState>,
    payload: Result<Json<ExchangeRequest>, JsonRejection>,
) -> AppResult<Json<Envelope<SessionPayload>>> {
    let Json(payload) = payload?;
    let code = payload
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("code is required"))?;

    let grant = state
        .store
        .take_login_grant(&code)
        .await?
        .ok_or_else(|| {
            warn!("invalid or expired login code");
            AppError::unauthorized("Invalid or expired login code")
        })?;

    let user = state
        .store
        .find_user_by_id(grant.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let session = services::session_for(&JwtKeys::from_ref(&state), &user)?;
    info!(user_id = %user.id, "login code exchanged");
    Ok(Envelope::ok("Login successful", session))
}

fn grant_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GRANT_CODE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};
    use serde_json::json;
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    use crate::store::{LoginGrant, PendingAuthorization, Store};

    use crate::test_support::{file_as_root, get, json_request, TestApp, GOOGLE_NAME};

    /// Starts a sign-in and returns the CSRF state embedded in the URL.
    async fn begin(app: &TestApp) -> String {
        let (status, body) = app.call(get("/api/google_login")).await;
        assert_eq!(status, StatusCode::OK);
        let url = reqwest::Url::parse(body["data"]["authorization_url"].as_str().unwrap()).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    /// Completes the callback and returns the one-time code from the redirect.
    async fn finish(app: &TestApp, state: &str) -> String {
        let res = app
            .send(get(&format!("/api/callback?code=provider-code&state={}", state)))
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let location = res.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("http://localhost:5173"));
        assert!(!location.contains("token"));
        let location = reqwest::Url::parse(location).unwrap();
        location
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn google_sign_in_round_trip() {
        let app = TestApp::new();
        let state = begin(&app).await;
        let code = finish(&app, &state).await;

        let (status, body) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": code })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login successful");
        assert_eq!(body["data"]["email"], "jane.doe@gmail.com");
        assert_eq!(body["data"]["username"], GOOGLE_NAME);
        assert_eq!(body["data"]["role"], "user");

        let user_id: Uuid = body["data"]["userId"].as_str().unwrap().parse().unwrap();
        let token = body["data"]["token"].as_str().unwrap();
        assert!(app.state.storage.paths(user_id).canvas.is_dir());

        let (status, _) = app
            .call(crate::test_support::authed(get("/api/get_projects"), token))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn repeat_sign_in_reuses_account() {
        let app = TestApp::new();

        let first = begin(&app).await;
        let code = finish(&app, &first).await;
        let (_, a) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": code })))
            .await;

        let second = begin(&app).await;
        assert_ne!(first, second);
        let code = finish(&app, &second).await;
        let (_, b) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": code })))
            .await;

        assert_eq!(a["data"]["userId"], b["data"]["userId"]);
        assert_eq!(app.store.user_count(), 1);
    }

    #[tokio::test]
    async fn existing_password_account_is_linked_by_email() {
        let app = TestApp::new();
        let (user_id, _) = app
            .signup("jane.doe@gmail.com", "correct horse", "jane")
            .await;

        let state = begin(&app).await;
        let code = finish(&app, &state).await;
        let (_, body) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": code })))
            .await;
        assert_eq!(body["data"]["userId"], user_id.to_string());
        assert_eq!(body["data"]["username"], "jane");
        assert_eq!(app.store.user_count(), 1);
    }

    #[tokio::test]
    async fn callback_rejects_unknown_or_replayed_state() {
        let app = TestApp::new();

        let (status, body) = app
            .call(get("/api/callback?code=provider-code&state=forged"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unknown or expired OAuth state");

        let state = begin(&app).await;
        finish(&app, &state).await;
        let (status, _) = app
            .call(get(&format!("/api/callback?code=provider-code&state={}", state)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.user_count(), 1);
    }

    #[tokio::test]
    async fn callback_requires_code_and_state() {
        let app = TestApp::new();
        for uri in [
            "/api/callback",
            "/api/callback?code=abc",
            "/api/callback?state=abc",
            "/api/callback?error=access_denied",
        ] {
            let (status, body) = app.call(get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["success"], false);
        }
        assert_eq!(app.store.user_count(), 0);
    }

    #[tokio::test]
    async fn callback_without_namespace_creates_no_account() {
        let broken = TestApp::with_store(Default::default(), file_as_root);
        let state = begin(&broken).await;
        let (status, _) = broken
            .call(get(&format!("/api/callback?code=provider-code&state={}", state)))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.store.user_count(), 0);

        let app = TestApp::with_store(broken.store.clone(), |tmp| tmp.to_path_buf());
        let state = begin(&app).await;
        let code = finish(&app, &state).await;
        let (_, body) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": code })))
            .await;
        let user_id: Uuid = body["data"]["userId"].as_str().unwrap().parse().unwrap();
        assert!(app.state.storage.paths(user_id).canvas.is_dir());
        assert_eq!(app.store.user_count(), 1);
    }

    #[tokio::test]
    async fn failed_code_exchange_is_internal_error() {
        let app = TestApp::new();
        let state = begin(&app).await;
        let (status, body) = app
            .call(get(&format!("/api/callback?code=bad-code&state={}", state)))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("An error occurred: "));
        assert_eq!(app.store.user_count(), 0);
    }

    #[tokio::test]
    async fn login_code_is_single_use() {
        let app = TestApp::new();
        let state = begin(&app).await;
        let code = finish(&app, &state).await;

        let (status, _) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": code })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": code })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired login code");

        let (status, _) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expired_entries_are_purged_on_write() {
        let app = TestApp::new();
        let past = OffsetDateTime::now_utc() - Duration::minutes(1);
        app.store
            .save_pending_authorization(&PendingAuthorization {
                csrf_state: "stale".into(),
                pkce_verifier: "fake-verifier".into(),
                expires_at: past,
            })
            .await
            .unwrap();
        assert_eq!(app.store.pending_count(), 1);

        let state = begin(&app).await;
        assert_eq!(app.store.pending_count(), 1);
        let (status, _) = app
            .call(get("/api/callback?code=provider-code&state=stale"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (user_id, _) = app.signup("ada@example.com", "correct horse", "ada").await;
        app.store
            .save_login_grant(&LoginGrant {
                code: "stale-grant".into(),
                user_id,
                expires_at: past,
            })
            .await
            .unwrap();
        assert_eq!(app.store.grant_count(), 1);

        finish(&app, &state).await;
        assert_eq!(app.store.pending_count(), 0);
        assert_eq!(app.store.grant_count(), 1);
        let (status, _) = app
            .call(json_request("POST", "/api/oauth/exchange", json!({ "code": "stale-grant" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn grant_codes_are_long_and_distinct() {
        let a = super::grant_code();
        let b = super::grant_code();
        assert_eq!(a.len(), super::GRANT_CODE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
