use crate::entity::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Size of the feed window kept in sync with the view.
pub const FEED_LIMIT: usize = 25;

/// Rendered in place of a missing author avatar.
pub const FALLBACK_AVATAR_URL: &str = "https://api.adorable.io/avatars/23/abott@adorable.png";

/// A stored chat message. `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn avatar_url(&self) -> &str {
        self.author_avatar_url
            .as_deref()
            .unwrap_or(FALLBACK_AVATAR_URL)
    }

    pub fn class_for(&self, viewer: &UserProfile) -> MessageClass {
        if self.author_id == viewer.id {
            MessageClass::Sent
        } else {
            MessageClass::Received
        }
    }
}

/// A message as submitted by the client, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub text: String,
    pub author_id: String,
    pub author_avatar_url: Option<String>,
}

impl NewMessage {
    pub fn from_author(text: impl Into<String>, author: &UserProfile) -> Self {
        Self {
            text: text.into(),
            author_id: author.id.clone(),
            author_avatar_url: author.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    Sent,
    Received,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(author_id: &str, avatar: Option<&str>) -> Message {
        Message {
            id: "m1".into(),
            text: "hello".into(),
            author_id: author_id.into(),
            author_avatar_url: avatar.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn own_messages_are_sent() {
        let viewer = UserProfile::new("alice", "Alice", None);

        assert_eq!(message("alice", None).class_for(&viewer), MessageClass::Sent);
        assert_eq!(message("bob", None).class_for(&viewer), MessageClass::Received);
        assert_eq!(serde_json::to_string(&MessageClass::Received).unwrap(), "\"received\"");
    }

    #[test]
    fn missing_avatar_falls_back() {
        assert_eq!(message("bob", None).avatar_url(), FALLBACK_AVATAR_URL);
        assert_eq!(
            message("bob", Some("https://img.example/bob.png")).avatar_url(),
            "https://img.example/bob.png"
        );
    }

    #[test]
    fn new_message_takes_author_from_profile() {
        let author = UserProfile::new("alice", "Alice", Some("https://img.example/a.png".into()));
        let draft = NewMessage::from_author("hi", &author);

        assert_eq!(draft.author_id, "alice");
        assert_eq!(draft.author_avatar_url.as_deref(), Some("https://img.example/a.png"));
    }
}
