use std::{sync::Arc, time::Duration};

use {
    chatbridge_common::Message,
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

use crate::{ChatClient, Error, Result};

/// The single funnel every adapter uses to post text into the chat channel.
///
/// Sends are serialized: one in flight at a time, later callers wait in
/// arrival order (tokio's mutex is fair). Failures are returned as-is, there
/// is no retry here.
pub struct OutboundGate {
    client: Arc<dyn ChatClient>,
    channel_ref: Option<String>,
    serial: Mutex<()>,
}

impl OutboundGate {
    /// `channel_ref` is the configured default target; blank values count as unset.
    pub fn new(client: Arc<dyn ChatClient>, channel_ref: Option<String>) -> Self {
        Self {
            client,
            channel_ref: channel_ref.filter(|c| !c.trim().is_empty()),
            serial: Mutex::new(()),
        }
    }

    pub fn channel_ref(&self) -> Option<&str> {
        self.channel_ref.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Send to the configured channel.
    pub async fn send(&self, text: &str) -> Result<()> {
        self.send_to(None, text).await
    }

    /// Send to `channel_ref`, falling back to the configured channel.
    pub async fn send_to(&self, channel_ref: Option<&str>, text: &str) -> Result<()> {
        let Some(target) = channel_ref
            .filter(|c| !c.trim().is_empty())
            .or(self.channel_ref.as_deref())
        else {
            warn!("outbound send dropped: no channel configured");
            return Err(Error::NoChannelConfigured);
        };
        if text.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }

        let _turn = self.serial.lock().await;
        match self.client.send(target, text).await {
            Ok(()) => {
                debug!(channel = target, len = text.len(), "outbound message sent");
                Ok(())
            },
            Err(e) => {
                warn!(channel = target, error = %e, "outbound send failed");
                Err(e)
            },
        }
    }

    /// Recent history of the configured channel, newest first.
    pub async fn fetch_recent(&self, limit: usize) -> Result<Vec<Message>> {
        let target = self.channel_ref().ok_or(Error::NoChannelConfigured)?;
        self.client.fetch_recent(target, limit).await
    }

    /// Wait until every send queued before this call has finished.
    ///
    /// Returns `false` if `grace` elapsed first.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.serial.lock()).await.is_ok()
    }
}
