use std::sync::Arc;

use {async_trait::async_trait, chatbridge_common::Message, tracing::warn};

/// Something that wants to see every inbound chat message.
#[async_trait]
pub trait InboundObserver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn on_message(&self, message: &Message) -> anyhow::Result<()>;
}

/// Ordered list of observers the supervisor notifies per inbound message.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn InboundObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn InboundObserver>) {
        self.observers.push(observer);
    }

    pub fn names(&self) -> Vec<&str> {
        self.observers.iter().map(|o| o.name()).collect()
    }

    /// Deliver `message` to every observer in registration order.
    ///
    /// A failing observer is logged and skipped; the rest still see the
    /// message. Returns the number of observers that failed.
    pub async fn dispatch(&self, message: &Message) -> usize {
        let mut failures = 0;
        for observer in &self.observers {
            if let Err(e) = observer.on_message(message).await {
                failures += 1;
                warn!(
                    observer = observer.name(),
                    message_id = %message.id,
                    error = %e,
                    "inbound observer failed"
                );
            }
        }
        failures
    }
}
