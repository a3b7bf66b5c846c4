use crate::auth::AuthState;
use crate::entity::{Session, UserProfile};
use serde::Serialize;
use tokio::sync::watch;

/// What the body of the page shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    ChatRoom(UserProfile),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub title: String,
    pub show_sign_out: bool,
}

/// Routes the visitor to the sign-in prompt or the chat room,
/// following the live auth state.
pub struct SessionGate {
    rx: watch::Receiver<Session>,
    authenticated: bool,
}

impl SessionGate {
    pub fn new(auth: &AuthState) -> Self {
        let rx = auth.subscribe();
        let authenticated = rx.borrow().is_authenticated();
        Self { rx, authenticated }
    }

    pub fn current_session(&self) -> Session {
        self.rx.borrow().clone()
    }

    pub fn screen(&self) -> Screen {
        match self.current_session() {
            Session::SignedOut => Screen::SignIn,
            Session::SignedIn(user) => Screen::ChatRoom(user),
        }
    }

    pub fn header(&self, title: &str) -> Header {
        Header {
            title: title.to_string(),
            show_sign_out: self.rx.borrow().is_authenticated(),
        }
    }

    /// Wait until the session flips between signed in and signed out.
    /// Returns `None` if the auth state has been dropped.
    pub async fn changed(&mut self) -> Option<Session> {
        loop {
            self.rx.changed().await.ok()?;
            let session = self.rx.borrow_and_update().clone();
            if session.is_authenticated() != self.authenticated {
                self.authenticated = session.is_authenticated();
                return Some(session);
            }
        }
    }
}
