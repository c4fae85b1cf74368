use std::error::Error as StdError;

/// Crate-wide result type for chat operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed failures of an outbound send or history fetch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No channel reference is configured and none was supplied.
    #[error("no channel configured")]
    NoChannelConfigured,

    /// The chat service does not know the channel reference.
    #[error("channel not found: {channel_ref}")]
    ChannelNotFound { channel_ref: String },

    /// Refusing to post an empty message.
    #[error("message is empty")]
    EmptyMessage,

    /// The client has not connected yet, or has disconnected.
    #[error("chat client is not connected")]
    NotConnected,

    /// Wrapped source error from the chat transport.
    #[error("chat transport failed: {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn channel_not_found(channel_ref: impl std::fmt::Display) -> Self {
        Self::ChannelNotFound {
            channel_ref: channel_ref.to_string(),
        }
    }

    #[must_use]
    pub fn transport(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Channel-resolution failures (as opposed to transport failures).
    pub fn is_channel_resolution(&self) -> bool {
        matches!(self, Self::NoChannelConfigured | Self::ChannelNotFound { .. })
    }
}
