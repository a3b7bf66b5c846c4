use crate::{
    auth::{AuthState, ConfiguredIdentity, IdentityProvider},
    bus::EventBus,
    config::Config,
    store::{DocumentStore, Store},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Everything the views need from the outside world, owned explicitly
/// and handed to whoever needs it.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub auth: Arc<AuthState>,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let auth = Arc::new(AuthState::new(config.session_ttl));
        Self {
            config: Arc::new(config),
            store,
            identity,
            auth,
        }
    }

    /// Open the store and wire up the identity provider from `config`.
    pub async fn start(config: Config) -> Result<Self> {
        let bus = Arc::new(EventBus::new());

        info!("Initializing store at {}", config.db_path.display());
        let store = Store::new(&config.db_path, bus).await?;
        store.init().await?;
        store.watch_external_writes(config.poll_interval);

        let identity = ConfiguredIdentity::new(config.identity.clone());
        if config.identity.is_none() {
            info!("No CHAT_USER_ID configured, sign-in will be refused.");
        }

        Ok(Self::new(config, Arc::new(store), Arc::new(identity)))
    }

    pub async fn shutdown(self) {
        self.auth.clear();
        self.store.close().await;
        info!("Context shut down");
    }
}
