use anyhow::anyhow;
use tracing::{info, warn};
use uuid::Uuid;

use super::{dto::SessionPayload, jwt::JwtKeys};
use crate::{
    state::AppState,
    store::{AuthProvider, NewUser, StoreError, User},
};

/// Signs a token for `user` and packs what the frontend needs.
pub fn session_for(keys: &JwtKeys, user: &User) -> anyhow::Result<SessionPayload> {
    Ok(SessionPayload {
        email: user.email.clone(),
        token: keys.sign(user.id)?,
        role: user.role.clone(),
        username: user.username.clone(),
        user_id: user.id,
    })
}

/// Provisions the filesystem namespace under `new.id`, then inserts the
/// record. A user row never exists without its namespace.
pub async fn create_account(state: &AppState, new: NewUser<'_>) -> Result<User, StoreError> {
    state.storage.provision(new.id).await?;
    let user = match state.store.create_user(new).await {
        Ok(user) => user,
        Err(e) => {
            if let Err(cleanup) = state.storage.discard(new.id).await {
                warn!(user_id = %new.id, error = %cleanup, "orphan namespace left behind");
            }
            return Err(e);
        }
    };
    info!(
        user_id = %user.id,
        email = %user.email,
        provider = %user.provider,
        "account created"
    );
    Ok(user)
}

/// Returns the account for a federated email, creating it on first sight.
/// Two callbacks racing for the same new email end up with one record.
pub async fn find_or_create_federated(
    state: &AppState,
    email: &str,
    username: &str,
) -> Result<User, StoreError> {
    if let Some(user) = state.store.find_user_by_email(email).await? {
        return Ok(user);
    }

    let new = NewUser {
        id: Uuid::new_v4(),
        username,
        email,
        password_hash: None,
        provider: AuthProvider::Google,
    };
    match create_account(state, new).await {
        Err(StoreError::EmailTaken) => state
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| StoreError::Other(anyhow!("user {} vanished after conflict", email))),
        other => other,
    }
}
