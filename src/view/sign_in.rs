use crate::context::AppContext;
use tracing::{error, info};

/// The sign-in / sign-out buttons.
///
/// Failures are logged and swallowed: the visitor simply stays where they
/// were, and the session gate picks up any successful change on its own.
pub struct SignInControl {
    ctx: AppContext,
}

impl SignInControl {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn sign_in(&self) {
        match self.ctx.identity.authenticate().await {
            Ok(user) => {
                info!("Signed in as {}", user);
                self.ctx.auth.establish(user);
            }
            Err(e) => {
                error!("Error signing in: {}", e);
            }
        }
    }

    pub async fn sign_out(&self) {
        let Some(user) = self.ctx.auth.current().user().cloned() else {
            return;
        };

        if let Err(e) = self.ctx.identity.sign_out(&user).await {
            error!("Error signing out: {}", e);
            return;
        }

        self.ctx.auth.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Session, UserProfile};
    use crate::testing::{test_context, RejectingIdentity};
    use std::sync::Arc;

    fn alice() -> UserProfile {
        UserProfile::new("alice", "Alice", Some("https://img.example/alice.png".into()))
    }

    #[tokio::test]
    async fn successful_sign_in_establishes_session() {
        let ctx = test_context(Some(alice())).await;
        SignInControl::new(ctx.clone()).sign_in().await;

        assert_eq!(ctx.auth.current(), Session::SignedIn(alice()));
    }

    #[tokio::test]
    async fn failed_sign_in_stays_signed_out() {
        let ctx = test_context(None).await;
        SignInControl::new(ctx.clone()).sign_in().await;

        assert_eq!(ctx.auth.current(), Session::SignedOut);
    }

    #[tokio::test]
    async fn sign_out_clears_session() {
        let ctx = test_context(Some(alice())).await;
        let control = SignInControl::new(ctx.clone());

        control.sign_in().await;
        control.sign_out().await;

        assert_eq!(ctx.auth.current(), Session::SignedOut);
    }

    #[tokio::test]
    async fn rejected_sign_out_keeps_session() {
        let mut ctx = test_context(Some(alice())).await;
        ctx.auth.establish(alice());
        ctx.identity = Arc::new(RejectingIdentity);

        SignInControl::new(ctx.clone()).sign_out().await;

        assert!(ctx.auth.current().is_authenticated());
    }
}
