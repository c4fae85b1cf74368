use chatbridge_common::Message;

/// Identity of whatever triggered an execution, exported to scripts as
/// `CHATBRIDGE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub message_id: String,
    pub author: String,
    pub channel_ref: String,
    pub guild_ref: String,
    pub content: String,
}

impl InvocationContext {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            author: message.author.clone(),
            channel_ref: message.channel_ref.clone(),
            guild_ref: message.guild_ref.clone().unwrap_or_default(),
            content: message.content.clone(),
        }
    }

    /// Context for invocations that did not come from chat (CLI, tests).
    pub fn direct(content: impl Into<String>) -> Self {
        Self {
            message_id: "direct".into(),
            author: "system".into(),
            channel_ref: String::new(),
            guild_ref: String::new(),
            content: content.into(),
        }
    }

    pub fn env(&self, args: &[String]) -> Vec<(String, String)> {
        vec![
            ("CHATBRIDGE_MESSAGE_ID".into(), self.message_id.clone()),
            ("CHATBRIDGE_AUTHOR".into(), self.author.clone()),
            ("CHATBRIDGE_CHANNEL_ID".into(), self.channel_ref.clone()),
            ("CHATBRIDGE_GUILD_ID".into(), self.guild_ref.clone()),
            ("CHATBRIDGE_MESSAGE_CONTENT".into(), self.content.clone()),
            ("CHATBRIDGE_ARGS".into(), args.join(" ")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_fields_are_exported() {
        let msg = Message::new("77", "alice", "chan", "!deploy prod").with_guild("g1");
        let env = InvocationContext::from_message(&msg).env(&["prod".into()]);
        let get = |k: &str| env.iter().find(|(n, _)| n == k).map(|(_, v)| v.as_str());
        assert_eq!(get("CHATBRIDGE_MESSAGE_ID"), Some("77"));
        assert_eq!(get("CHATBRIDGE_AUTHOR"), Some("alice"));
        assert_eq!(get("CHATBRIDGE_CHANNEL_ID"), Some("chan"));
        assert_eq!(get("CHATBRIDGE_GUILD_ID"), Some("g1"));
        assert_eq!(get("CHATBRIDGE_MESSAGE_CONTENT"), Some("!deploy prod"));
        assert_eq!(get("CHATBRIDGE_ARGS"), Some("prod"));
    }

    #[test]
    fn direct_uses_placeholders() {
        let ctx = InvocationContext::direct("!pwd");
        assert_eq!(ctx.message_id, "direct");
        assert_eq!(ctx.author, "system");
        assert!(ctx.channel_ref.is_empty());
        assert!(ctx.guild_ref.is_empty());
    }
}
