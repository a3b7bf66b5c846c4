use std::{convert::Infallible, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, Json, Redirect,
    },
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    context::AppContext,
    entity::UserProfile,
    view::{
        gate::{Header, Screen, SessionGate},
        room::{ChatRoom, RenderedMessage},
        sign_in::SignInControl,
    },
};

// -----------------------------------------------------------------------------
// Templates
// -----------------------------------------------------------------------------

pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("feed.html", include_str!("../../templates/feed.html"))
            .context("Failed to load feed template")?;
        env.add_template("index.html", include_str!("../../templates/index.html"))
            .context("Failed to load page template")?;
        Ok(Self { env })
    }

    pub fn index(
        &self,
        header: &Header,
        viewer: Option<&UserProfile>,
        messages: &[RenderedMessage],
    ) -> Result<String> {
        self.env
            .get_template("index.html")?
            .render(context! { header, viewer, messages })
            .context("Failed to render page")
    }

    pub fn feed(&self, messages: &[RenderedMessage]) -> Result<String> {
        self.env
            .get_template("feed.html")?
            .render(context! { messages })
            .context("Failed to render feed")
    }
}

// -----------------------------------------------------------------------------
// Server State
// -----------------------------------------------------------------------------

#[derive(Clone)]
pub struct WebState {
    pub ctx: AppContext,
    pub pages: Arc<Pages>,
}

#[derive(Debug, Deserialize)]
pub struct ComposeForm {
    #[serde(default)]
    pub text: String,
}

/// The composer after a submission, for the page to apply.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComposerState {
    pub input: String,
    pub scroll_to_latest: bool,
}

// -----------------------------------------------------------------------------
// Implementation
// -----------------------------------------------------------------------------

pub struct WebInterface {
    ctx: AppContext,
}

impl WebInterface {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn router(&self) -> Result<Router> {
        let state = WebState {
            ctx: self.ctx.clone(),
            pages: Arc::new(Pages::new()?),
        };

        Ok(Router::new()
            .route("/", get(index_handler))
            .route("/sign-in", post(sign_in_handler))
            .route("/sign-out", post(sign_out_handler))
            .route("/messages", post(send_message_handler))
            .route("/feed", get(feed_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http()))
    }
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    error!("Request failed: {:#}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn index_handler(State(state): State<WebState>) -> Result<Html<String>, StatusCode> {
    let gate = SessionGate::new(&state.ctx.auth);
    let header = gate.header(&state.ctx.config.title);

    let page = match gate.screen() {
        Screen::SignIn => state.pages.index(&header, None, &[]),
        Screen::ChatRoom(user) => {
            let mut room = ChatRoom::new(state.ctx.clone(), user);
            if let Err(e) = room.mount().await {
                error!("{}", e);
            }
            let messages = room.render();
            room.unmount();
            state.pages.index(&header, Some(room.viewer()), &messages)
        }
    };

    page.map(Html).map_err(internal_error)
}

async fn sign_in_handler(State(state): State<WebState>) -> Redirect {
    SignInControl::new(state.ctx.clone()).sign_in().await;
    Redirect::to("/")
}

async fn sign_out_handler(State(state): State<WebState>) -> Redirect {
    SignInControl::new(state.ctx.clone()).sign_out().await;
    Redirect::to("/")
}

async fn send_message_handler(
    State(state): State<WebState>,
    Form(form): Form<ComposeForm>,
) -> Result<Json<ComposerState>, StatusCode> {
    // The composer only exists behind the session gate
    let Screen::ChatRoom(user) = SessionGate::new(&state.ctx.auth).screen() else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let mut room = ChatRoom::new(state.ctx.clone(), user);
    room.set_input(form.text);
    room.send_message().await;

    Ok(Json(ComposerState {
        input: room.input().to_string(),
        scroll_to_latest: room.take_scroll_request(),
    }))
}

/// Carriage returns cannot be carried in an SSE data field, so line endings
/// are folded to `\n` before the fragment is framed.
fn feed_event(html: &str) -> Event {
    let html = html.replace("\r\n", "\n").replace('\r', "\n");
    Event::default().event("feed").data(html)
}

enum Wake {
    Session(bool),
    Feed(bool),
}

async fn feed_handler(
    State(state): State<WebState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let mut gate = SessionGate::new(&state.ctx.auth);
    let Screen::ChatRoom(user) = gate.screen() else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    info!("New feed connection for {}", user);
    let mut room = ChatRoom::new(state.ctx.clone(), user);
    let pages = state.pages.clone();

    let stream = async_stream::stream! {
        match room.mount().await {
            Ok(()) => loop {
                match pages.feed(&room.render()) {
                    Ok(html) => yield Ok(feed_event(&html)),
                    Err(e) => error!("{:#}", e),
                }

                let wake = tokio::select! {
                    session = gate.changed() => Wake::Session(session.is_some()),
                    updated = room.next_update() => Wake::Feed(updated),
                };

                match wake {
                    Wake::Feed(true) => {}
                    Wake::Session(true) => {
                        // Let the page re-route through the gate
                        yield Ok(Event::default().event("session").data("changed"));
                        break;
                    }
                    Wake::Session(false) | Wake::Feed(false) => break,
                }
            },
            Err(e) => error!("{}", e),
        }

        room.unmount();
        info!("Feed connection for {} closed", room.viewer());
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
