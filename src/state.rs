use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::db::PgStore;
use crate::oauth::{google::GoogleOAuth, IdentityProvider};
use crate::storage::UserStorage;
use crate::store::Store;

/// Collaborators shared by every request. Built once in `main` and injected
/// through axum state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: UserStorage,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::connect(&config.database_url).await?;
        if let Err(e) = store.migrate().await {
            warn!(error = %e, "migration failed; continuing");
        }

        let identity = Arc::new(GoogleOAuth::new(&config.google)?) as Arc<dyn IdentityProvider>;
        let storage = UserStorage::new(&config.user_common_path, &config.backend_url);

        Ok(Self::from_parts(Arc::new(store), config, identity, storage))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        identity: Arc<dyn IdentityProvider>,
        storage: UserStorage,
    ) -> Self {
        Self {
            store,
            config,
            identity,
            storage,
        }
    }
}
