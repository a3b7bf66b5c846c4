use thiserror::Error;

/// Failures the client catches, logs and carries on from.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The sign-in handshake was rejected or errored.
    #[error("sign-in failed: {0}")]
    Auth(String),

    /// Appending a message to the store was rejected or errored.
    #[error("failed to send message: {0}")]
    Write(String),

    /// The live feed could not be (re)read or its change stream closed.
    #[error("feed subscription failed: {0}")]
    Subscription(String),
}

impl ChatError {
    pub fn write(err: impl std::fmt::Display) -> Self {
        Self::Write(format!("{:#}", err))
    }

    pub fn subscription(err: impl std::fmt::Display) -> Self {
        Self::Subscription(format!("{:#}", err))
    }
}
