//! In-process chat client.
//!
//! Keeps per-channel history in memory and lets the host inject inbound
//! messages. Used when no remote transport is linked into the binary, and as
//! the test double for every adapter.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {async_trait::async_trait, chatbridge_common::Message, tracing::info};

use crate::{ChatClient, Error, InboundSender, Result};

const DEFAULT_HISTORY_LIMIT: usize = 500;

/// A message the loopback client was asked to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_ref: String,
    pub text: String,
}

#[derive(Default)]
struct LoopbackState {
    inbound: Option<InboundSender>,
    history: HashMap<String, VecDeque<Message>>,
    sent: Vec<SentMessage>,
}

pub struct LoopbackClient {
    bot_name: String,
    /// Known channels. Empty means every channel reference resolves.
    channels: HashSet<String>,
    history_limit: usize,
    connected: AtomicBool,
    next_id: AtomicU64,
    state: Mutex<LoopbackState>,
}

impl LoopbackClient {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            channels: HashSet::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            state: Mutex::new(LoopbackState::default()),
        }
    }

    /// Restrict resolution to the given channel (call repeatedly for several).
    #[must_use]
    pub fn with_channel(mut self, channel_ref: impl Into<String>) -> Self {
        self.channels.insert(channel_ref.into());
        self
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Simulate a message posted by someone else.
    ///
    /// Recorded in history and delivered to the inbound sink.
    pub fn inject(
        &self,
        author: impl Into<String>,
        channel_ref: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Message> {
        let channel_ref = channel_ref.into();
        self.resolve(&channel_ref)?;
        let message = Message::new(self.next_id(), author, channel_ref, content);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(inbound) = state.inbound.clone() else {
            return Err(Error::NotConnected);
        };
        self.record(&mut state, message.clone());
        inbound.send(message.clone()).map_err(|_| Error::NotConnected)?;
        Ok(message)
    }

    /// Everything passed to [`ChatClient::send`] so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sent
            .clone()
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn resolve(&self, channel_ref: &str) -> Result<()> {
        if self.channels.is_empty() || self.channels.contains(channel_ref) {
            Ok(())
        } else {
            Err(Error::channel_not_found(channel_ref))
        }
    }

    fn record(&self, state: &mut LoopbackState, message: Message) {
        let history = state
            .history
            .entry(message.channel_ref.clone())
            .or_default();
        history.push_back(message);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }
}

#[async_trait]
impl ChatClient for LoopbackClient {
    fn id(&self) -> &str {
        "loopback"
    }

    async fn connect(&self, inbound: InboundSender) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.inbound = Some(inbound);
        self.connected.store(true, Ordering::SeqCst);
        info!(bot = %self.bot_name, "loopback chat client connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.inbound = None;
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(bot = %self.bot_name, "loopback chat client disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, channel_ref: &str, text: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.resolve(channel_ref)?;
        let message = Message::new(self.next_id(), self.bot_name.clone(), channel_ref, text);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sent.push(SentMessage {
            channel_ref: channel_ref.to_string(),
            text: text.to_string(),
        });
        self.record(&mut state, message);
        Ok(())
    }

    async fn fetch_recent(&self, channel_ref: &str, limit: usize) -> Result<Vec<Message>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.resolve(channel_ref)?;
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .history
            .get(channel_ref)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, tokio::sync::mpsc};

    #[tokio::test]
    async fn inject_requires_connection() {
        let client = LoopbackClient::new("bot");
        assert!(matches!(
            client.inject("alice", "c", "hi"),
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn injected_messages_arrive_in_order() {
        let client = LoopbackClient::new("bot");
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.connect(tx).await.unwrap();

        client.inject("alice", "c", "one").unwrap();
        client.inject("bob", "c", "two").unwrap();

        assert_eq!(rx.recv().await.unwrap().content, "one");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.author, "bob");
        assert_eq!(second.content, "two");
    }

    #[tokio::test]
    async fn history_is_newest_first_and_bounded() {
        let client = LoopbackClient::new("bot").with_history_limit(3);
        client.connect(mpsc::unbounded_channel().0).await.unwrap();
        for i in 0..5 {
            client.send("c", &format!("m{i}")).await.unwrap();
        }

        let recent = client.fetch_recent("c", 10).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2"]);
        assert!(recent.iter().all(|m| m.author == "bot"));

        assert_eq!(client.fetch_recent("c", 1).await.unwrap().len(), 1);
        assert!(client.fetch_recent("empty", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restricted_channels_reject_unknown_refs() {
        let client = LoopbackClient::new("bot").with_channel("known");
        client.connect(mpsc::unbounded_channel().0).await.unwrap();
        assert!(client.send("known", "x").await.is_ok());
        assert!(matches!(
            client.send("other", "x").await,
            Err(Error::ChannelNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_stops_sends() {
        let client = LoopbackClient::new("bot");
        client.connect(mpsc::unbounded_channel().0).await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
        assert!(matches!(client.send("c", "x").await, Err(Error::NotConnected)));
    }
}
