use crate::entity::{Session, UserProfile};
use crate::error::ChatError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Performs the authentication handshake on behalf of the sign-in control.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self) -> Result<UserProfile, ChatError>;

    async fn sign_out(&self, user: &UserProfile) -> Result<(), ChatError>;
}

/// Hands out the profile configured for this client.
pub struct ConfiguredIdentity {
    profile: Option<UserProfile>,
}

impl ConfiguredIdentity {
    pub fn new(profile: Option<UserProfile>) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl IdentityProvider for ConfiguredIdentity {
    async fn authenticate(&self) -> Result<UserProfile, ChatError> {
        self.profile
            .clone()
            .ok_or_else(|| ChatError::Auth("no identity configured, set CHAT_USER_ID".into()))
    }

    async fn sign_out(&self, _user: &UserProfile) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Process-wide auth state. Written only by sign-in, sign-out and expiry.
pub struct AuthState {
    tx: watch::Sender<Session>,
    // Bumped on every transition so a stale expiry timer can tell it lost
    generation: AtomicU64,
    ttl: Option<Duration>,
}

impl AuthState {
    pub fn new(ttl: Option<Duration>) -> Self {
        let (tx, _rx) = watch::channel(Session::SignedOut);
        Self {
            tx,
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub fn establish(self: &Arc<Self>, user: UserProfile) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Session established for {}", user);
        self.tx.send_replace(Session::SignedIn(user));

        if let Some(ttl) = self.ttl {
            let state = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                if state.generation.load(Ordering::SeqCst) == generation {
                    info!("Session expired after {:?}", ttl);
                    state.clear();
                }
            });
        }
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.tx.send_replace(Session::SignedOut);
        if let Session::SignedIn(user) = previous {
            info!("Session cleared for {}", user);
        }
    }
}
