use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AuthorizationRequest, IdentityProvider, VerifiedIdentity};
use crate::config::GoogleConfig;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// The `id_token` Google returns next to the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenFields {
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type GoogleTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    BasicErrorResponse,
    GoogleTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

/// Google identity provider. Holds only immutable configuration; every flow
/// gets its own client and its own PKCE pair.
pub struct GoogleOAuth {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(cfg: &GoogleConfig) -> anyhow::Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build http client")?;

        Ok(Self {
            client_id: ClientId::new(cfg.client_id.clone()),
            client_secret: ClientSecret::new(cfg.client_secret.clone()),
            auth_url: AuthUrl::new(AUTH_URL.to_string()).context("google auth url")?,
            token_url: TokenUrl::new(TOKEN_URL.to_string()).context("google token url")?,
            redirect_url: RedirectUrl::new(cfg.redirect_url.clone())
                .context("GOOGLE_REDIRECT_URL is not a valid URL")?,
            http,
        })
    }

    fn client(&self) -> ConfiguredClient {
        oauth2::Client::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
    }

    async fn signing_keys(&self) -> anyhow::Result<JwkSet> {
        let keys = self
            .http
            .get(JWKS_URL)
            .send()
            .await
            .context("fetch google signing keys")?
            .error_for_status()
            .context("fetch google signing keys")?
            .json::<JwkSet>()
            .await
            .context("parse google signing keys")?;
        Ok(keys)
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf_state) = self
            .client()
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> anyhow::Result<VerifiedIdentity> {
        let token = self
            .client()
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| anyhow::anyhow!("Token exchange failed: {}", e))?;

        let id_token = token
            .extra_fields()
            .id_token
            .as_deref()
            .context("Google returned no id_token")?;
        debug!("google token exchange complete");

        let keys = self.signing_keys().await?;
        let identity = verify_id_token(id_token, &keys, self.client_id.as_str())?;
        info!(email = %identity.email, "google identity verified");
        Ok(identity)
    }
}

/// Checks an identity token's RS256 signature against `keys`, its audience
/// and its issuer, and requires a verified email.
pub fn verify_id_token(
    id_token: &str,
    keys: &JwkSet,
    client_id: &str,
) -> anyhow::Result<VerifiedIdentity> {
    let header = decode_header(id_token).context("decode id_token header")?;
    let kid = header.kid.context("id_token has no key id")?;
    let jwk = keys
        .find(&kid)
        .with_context(|| format!("no Google signing key with id {}", kid))?;
    let key = DecodingKey::from_jwk(jwk).context("unusable Google signing key")?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[client_id]);
    validation.set_issuer(&ISSUERS);
    let data = decode::<IdTokenClaims>(id_token, &key, &validation).context("verify id_token")?;

    identity_from_claims(data.claims)
}

fn identity_from_claims(claims: IdTokenClaims) -> anyhow::Result<VerifiedIdentity> {
    let email = claims.email.context("id_token carries no email")?;
    anyhow::ensure!(claims.email_verified, "Google account email is not verified");
    Ok(VerifiedIdentity {
        subject: claims.sub,
        email,
        name: claims.name,
    })
}
