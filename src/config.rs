use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::entity::UserProfile;

pub const DEFAULT_TITLE: &str = "Chat Application";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub title: String,
    /// Profile handed out by the configured identity provider.
    /// `None` means every sign-in attempt fails.
    pub identity: Option<UserProfile>,
    pub session_ttl: Option<Duration>,
    /// How often the store checks for messages written by other processes.
    pub poll_interval: Duration,
}

impl Config {
    /// Read the configuration from the process environment.
    /// A `.env` file is loaded first when present.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            // Not fatal, the environment may already be set
            tracing::debug!("No .env file loaded: {}", e);
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // We use ~/.chatroom/chatroom.db unless told otherwise
        let db_path = match lookup("CHAT_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let home_dir = lookup("HOME").unwrap_or_else(|| ".".into());
                PathBuf::from(home_dir).join(".chatroom").join("chatroom.db")
            }
        };

        let port = match lookup("CHAT_PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid CHAT_PORT: {}", port))?,
            None => DEFAULT_PORT,
        };

        let session_ttl = lookup("CHAT_SESSION_TTL_SECS")
            .map(|secs| {
                secs.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("Invalid CHAT_SESSION_TTL_SECS: {}", secs))
            })
            .transpose()?;

        let poll_interval = match lookup("CHAT_POLL_INTERVAL_MS") {
            Some(ms) => ms
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .with_context(|| format!("Invalid CHAT_POLL_INTERVAL_MS: {}", ms))?,
            None => DEFAULT_POLL_INTERVAL,
        };

        let identity = lookup("CHAT_USER_ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(|id| {
                let display_name = lookup("CHAT_USER_NAME").unwrap_or_else(|| id.clone());
                let avatar_url = lookup("CHAT_USER_AVATAR").filter(|url| !url.trim().is_empty());
                UserProfile::new(id, display_name, avatar_url)
            });

        Ok(Self {
            db_path,
            host: lookup("CHAT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            title: lookup("CHAT_TITLE").unwrap_or_else(|| DEFAULT_TITLE.into()),
            identity,
            session_ttl,
            poll_interval,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
