use crate::{
    chat::{Message, MessageClass, NewMessage, FEED_LIMIT},
    context::AppContext,
    entity::UserProfile,
    error::ChatError,
    feed::FeedSubscription,
};
use serde::Serialize;
use tracing::{debug, error, warn};

/// One message as the list displays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub id: String,
    pub text: String,
    pub class: MessageClass,
    pub avatar_url: String,
}

pub fn render_message(msg: &Message, viewer: &UserProfile) -> RenderedMessage {
    RenderedMessage {
        id: msg.id.clone(),
        text: msg.text.clone(),
        class: msg.class_for(viewer),
        avatar_url: msg.avatar_url().to_string(),
    }
}

enum RoomState {
    Unsubscribed,
    Subscribed(FeedSubscription),
}

/// The message list plus composer. Only reachable with a signed-in viewer.
pub struct ChatRoom {
    ctx: AppContext,
    viewer: UserProfile,
    state: RoomState,
    messages: Vec<Message>,
    input: String,
    scroll_requested: bool,
}

impl ChatRoom {
    pub fn new(ctx: AppContext, viewer: UserProfile) -> Self {
        Self {
            ctx,
            viewer,
            state: RoomState::Unsubscribed,
            messages: Vec::new(),
            input: String::new(),
            scroll_requested: false,
        }
    }

    pub fn viewer(&self) -> &UserProfile {
        &self.viewer
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self.state, RoomState::Subscribed(_))
    }

    /// Subscribe to the feed and load the current window.
    pub async fn mount(&mut self) -> Result<(), ChatError> {
        if self.is_subscribed() {
            return Ok(());
        }

        let mut feed = FeedSubscription::new(self.ctx.store.clone(), FEED_LIMIT);
        match feed.next_snapshot().await? {
            Some(snapshot) => self.messages = snapshot,
            None => return Err(ChatError::Subscription("change stream closed".into())),
        }

        self.state = RoomState::Subscribed(feed);
        Ok(())
    }

    /// Wait for the next feed snapshot. Returns `false` once the room is
    /// no longer subscribed; a failed or closed feed unsubscribes it.
    pub async fn next_update(&mut self) -> bool {
        let RoomState::Subscribed(feed) = &mut self.state else {
            return false;
        };

        match feed.next_snapshot().await {
            Ok(Some(snapshot)) => {
                self.messages = snapshot;
                true
            }
            Ok(None) => {
                warn!("Feed for {} ended", self.viewer);
                self.state = RoomState::Unsubscribed;
                false
            }
            Err(e) => {
                error!("{}", e);
                self.state = RoomState::Unsubscribed;
                false
            }
        }
    }

    pub fn unmount(&mut self) {
        self.state = RoomState::Unsubscribed;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn render(&self) -> Vec<RenderedMessage> {
        self.messages()
            .iter()
            .map(|msg| render_message(msg, &self.viewer))
            .collect()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: impl Into<String>) {
        self.input = value.into();
    }

    /// The send button is disabled while the input is empty.
    pub fn can_submit(&self) -> bool {
        !self.input.is_empty()
    }

    /// Append the current input as a new message.
    ///
    /// A failed write is only logged; the input is cleared and a scroll to
    /// the newest message requested either way.
    pub async fn send_message(&mut self) {
        if !self.can_submit() {
            return;
        }

        let draft = NewMessage::from_author(self.input.clone(), &self.viewer);
        match self.ctx.store.append(draft).await {
            Ok(msg) => debug!("Message {} sent by {}", msg.id, self.viewer),
            Err(e) => error!("{}", ChatError::write(e)),
        }

        self.input.clear();
        self.scroll_requested = true;
    }

    /// Consume a pending scroll-to-newest request.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }
}
