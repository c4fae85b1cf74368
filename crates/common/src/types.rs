use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// A chat message observed on (or fetched from) the bridged channel.
///
/// Produced by the chat client and handed to adapters read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Display name of the sender.
    pub author: String,
    pub channel_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_ref: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        channel_ref: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            channel_ref: channel_ref.into(),
            guild_ref: None,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_guild(mut self, guild_ref: impl Into<String>) -> Self {
        self.guild_ref = Some(guild_ref.into());
        self
    }

    /// Single-line rendering used by stdout and the output file: `[author] content`.
    pub fn render(&self) -> String {
        format!("[{}] {}", self.author, self.content)
    }
}
