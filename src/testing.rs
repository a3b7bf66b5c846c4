//! Shared fixtures for the unit tests.

use crate::{
    auth::{ConfiguredIdentity, IdentityProvider},
    bus::{Event, EventBus},
    chat::{Message, NewMessage},
    config::Config,
    context::AppContext,
    entity::UserProfile,
    error::ChatError,
    store::{DocumentStore, Store},
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

pub fn test_config(identity: Option<UserProfile>) -> Config {
    let mut config = Config::from_lookup(|_| None).expect("default config");
    config.identity = identity;
    config
}

pub async fn memory_store() -> Arc<Store> {
    Arc::new(
        Store::new_in_memory(Arc::new(EventBus::new()))
            .await
            .expect("in-memory store"),
    )
}

pub async fn test_context(identity: Option<UserProfile>) -> AppContext {
    let provider = ConfiguredIdentity::new(identity.clone());
    AppContext::new(
        test_config(identity),
        memory_store().await,
        Arc::new(provider),
    )
}

/// Reads work, every append is rejected.
pub struct RejectingWrites(pub Arc<Store>);

#[async_trait]
impl DocumentStore for RejectingWrites {
    async fn append(&self, _draft: NewMessage) -> Result<Message> {
        bail!("permission denied")
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Message>> {
        self.0.recent(limit).await
    }

    fn changes(&self) -> broadcast::Receiver<Event> {
        self.0.changes()
    }

    async fn close(&self) {
        self.0.close().await;
    }
}

pub struct RejectingIdentity;

#[async_trait]
impl IdentityProvider for RejectingIdentity {
    async fn authenticate(&self) -> Result<UserProfile, ChatError> {
        Err(ChatError::Auth("popup closed by user".into()))
    }

    async fn sign_out(&self, _user: &UserProfile) -> Result<(), ChatError> {
        Err(ChatError::Auth("network unreachable".into()))
    }
}
