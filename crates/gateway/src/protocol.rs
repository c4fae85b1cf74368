//! Newline-delimited JSON requests and replies spoken on the control socket.

use {
    chatbridge_common::Message,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

pub const DEFAULT_MESSAGE_LIMIT: usize = 10;
pub const MAX_MESSAGE_LIMIT: usize = 100;

/// Longest accepted request line, newline excluded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Send {
        content: String,
    },
    Status,
    GetMessages {
        #[serde(default = "default_limit")]
        limit: usize,
    },
}

fn default_limit() -> usize {
    DEFAULT_MESSAGE_LIMIT
}

impl Request {
    /// Parse one request line.
    ///
    /// Distinguishes malformed JSON, unknown commands and known commands
    /// with bad fields, each with its own reply.
    pub fn parse(line: &[u8]) -> Result<Self, Response> {
        let Ok(value) = serde_json::from_slice::<Value>(line) else {
            return Err(Response::error("Invalid JSON message"));
        };
        let name = match value.get("command") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        if !matches!(name.as_str(), "send" | "status" | "get_messages") {
            return Err(Response::error(format!("Unknown command: {name}")));
        }
        serde_json::from_value(value).map_err(|e| Response::error(e.to_string()))
    }
}

/// A message as reported by `get_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub content: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            content: m.content,
            author: m.author,
            timestamp: m.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Sent {
        success: bool,
        message: String,
    },
    Status {
        connected: bool,
        running: bool,
        channel: Option<String>,
        connections: usize,
    },
    Messages {
        messages: Vec<MessageView>,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Serialized form plus the trailing newline.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"internal serialization error"}"#.to_string());
        line.push('\n');
        line
    }
}
