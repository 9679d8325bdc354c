//! Persistence seam. Handlers only ever talk to `dyn Store`; `PgStore`
//! (see `crate::db`) backs it in production and `memory::MemoryStore`
//! backs it in tests.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;

pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailTaken,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Other(e.into())
    }
}

/// How an account proves its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProvider {
    Password,
    Google,
}

impl AuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthProvider::Password => "password",
            AuthProvider::Google => "google",
        }
    }
}

/// User record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>, // Argon2 PHC string; None for federated accounts
    pub provider: String,
    pub role: String,
    pub bookmarked: Vec<String>,
    pub image_url: String,
    pub created_at: OffsetDateTime,
}

/// `id` is chosen by the caller so the namespace can exist before the row does.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub provider: AuthProvider,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_name: String,
    pub project_data: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// An authorization URL handed out by `/google_login` that has not come back yet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingAuthorization {
    pub csrf_state: String,
    pub pkce_verifier: String,
    pub expires_at: OffsetDateTime,
}

/// One-time code the frontend trades for a session after the OAuth redirect.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginGrant {
    pub code: String,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Fails with `StoreError::EmailTaken` when the email is already registered.
    async fn create_user(&self, new: NewUser<'_>) -> Result<User, StoreError>;

    /// Returns false when no such user exists.
    async fn set_image_url(&self, user_id: Uuid, image_url: &str) -> Result<bool, StoreError>;

    /// Also drops every entry that has already expired.
    async fn save_pending_authorization(
        &self,
        pending: &PendingAuthorization,
    ) -> Result<(), StoreError>;

    /// Removes and returns the entry for `csrf_state` if it has not expired.
    async fn take_pending_authorization(
        &self,
        csrf_state: &str,
    ) -> Result<Option<PendingAuthorization>, StoreError>;

    /// Also drops every grant that has already expired.
    async fn save_login_grant(&self, grant: &LoginGrant) -> Result<(), StoreError>;

    /// Removes and returns the grant for `code` if it has not expired.
    async fn take_login_grant(&self, code: &str) -> Result<Option<LoginGrant>, StoreError>;

    async fn insert_project(
        &self,
        user_id: Uuid,
        project_name: &str,
        project_data: &serde_json::Value,
    ) -> Result<Project, StoreError>;

    /// Returns None when the project does not exist or belongs to someone else.
    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        project_name: &str,
        project_data: &serde_json::Value,
    ) -> Result<Option<Project>, StoreError>;

    /// Newest first by `updated_at`.
    async fn list_projects(&self, user_id: Uuid) -> Result<Vec<Project>, StoreError>;
}
