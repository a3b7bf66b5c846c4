use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url,
        }
    }
}

impl fmt::Display for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Whether, and as whom, the local visitor is authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Session {
    #[default]
    SignedOut,
    SignedIn(UserProfile),
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::SignedIn(_))
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Session::SignedOut => None,
            Session::SignedIn(user) => Some(user),
        }
    }
}
