use {async_trait::async_trait, chatbridge_common::Message, tokio::sync::mpsc};

use crate::Result;

/// Sender half handed to a client at connect time; every inbound chat event
/// is pushed here in the order the service emits it.
pub type InboundSender = mpsc::UnboundedSender<Message>;

/// Receiver half drained by the supervisor's dispatcher.
pub type InboundReceiver = mpsc::UnboundedReceiver<Message>;

/// Connection to the remote chat service.
///
/// The wire protocol lives behind this trait; the bridge only needs to
/// connect, post text, read recent history and receive inbound messages.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Transport identifier (e.g. "loopback").
    fn id(&self) -> &str;

    /// Open the connection and start delivering inbound messages to `inbound`.
    async fn connect(&self, inbound: InboundSender) -> Result<()>;

    /// Close the connection. Inbound delivery stops.
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Post `text` to `channel_ref`.
    async fn send(&self, channel_ref: &str, text: &str) -> Result<()>;

    /// Most recent messages in `channel_ref`, newest first.
    async fn fetch_recent(&self, channel_ref: &str, limit: usize) -> Result<Vec<Message>>;
}
