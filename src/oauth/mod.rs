//! Google sign-in.
//!
//! `GET /google_login` hands out an authorization URL and remembers the CSRF
//! state and PKCE verifier for it. Google sends the browser back to
//! `GET /callback`, which trades the code for an identity, finds or creates
//! the local account and redirects to the frontend with a one-time code. The
//! frontend swaps that code for a session at `POST /oauth/exchange`, so no
//! token ever travels in a URL.

use async_trait::async_trait;
use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod google;
pub mod handlers;

/// Everything needed to send a browser to the provider and finish the flow later.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// Identity asserted by a verified provider token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Exchanges an authorization code and returns the verified identity.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> anyhow::Result<VerifiedIdentity>;
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/google_login", get(handlers::google_login))
        .route("/callback", get(handlers::callback))
        .route("/oauth/exchange", post(handlers::exchange))
}
