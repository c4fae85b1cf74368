//! Routes prefixed chat messages into the command sandbox and posts the
//! replies back through the gate.

use std::sync::Arc;

use {
    async_trait::async_trait,
    chatbridge_channels::{InboundObserver, OutboundGate},
    chatbridge_common::Message,
    chatbridge_sandbox::{CommandSandbox, parse},
    tokio_util::task::TaskTracker,
    tracing::{debug, warn},
};

pub struct SandboxObserver {
    sandbox: Arc<CommandSandbox>,
    gate: Arc<OutboundGate>,
    executions: TaskTracker,
}

impl SandboxObserver {
    pub fn new(sandbox: Arc<CommandSandbox>, gate: Arc<OutboundGate>) -> Self {
        Self {
            sandbox,
            gate,
            executions: TaskTracker::new(),
        }
    }

    pub fn sandbox(&self) -> &Arc<CommandSandbox> {
        &self.sandbox
    }

    /// In-flight executions, for shutdown.
    pub fn executions(&self) -> &TaskTracker {
        &self.executions
    }
}

#[async_trait]
impl InboundObserver for SandboxObserver {
    fn name(&self) -> &str {
        "sandbox"
    }

    /// Returns as soon as the execution is spawned so a slow script does not
    /// hold up the messages behind it.
    async fn on_message(&self, message: &Message) -> anyhow::Result<()> {
        if parse(&message.content, self.sandbox.prefix()).is_none() {
            return Ok(());
        }
        if self.executions.is_closed() {
            debug!(message_id = %message.id, "sandbox closed, command ignored");
            return Ok(());
        }

        let sandbox = Arc::clone(&self.sandbox);
        let gate = Arc::clone(&self.gate);
        let message = message.clone();
        self.executions.spawn(async move {
            let Some(reply) = sandbox.handle_message(&message).await else {
                return;
            };
            if let Err(e) = gate.send_to(Some(&message.channel_ref), &reply).await {
                warn!(message_id = %message.id, error = %e, "command reply not delivered");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        chatbridge_channels::{ChatClient, LoopbackClient},
        chatbridge_config::ServiceConfig,
        std::time::Duration,
    };

    #[tokio::test]
    async fn replies_go_to_the_triggering_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(LoopbackClient::new("bot"));
        client
            .connect(tokio::sync::mpsc::unbounded_channel().0)
            .await
            .unwrap();
        let gate = Arc::new(OutboundGate::new(client.clone(), Some("main".into())));
        let config = ServiceConfig {
            enabled: true,
            script_directory: tmp.path().join("scripts"),
            allowed_commands: vec!["pwd".into()],
            working_directory: tmp.path().to_path_buf(),
            ..ServiceConfig::default()
        };
        let sandbox = Arc::new(CommandSandbox::new(config, "!").unwrap());
        let observer = SandboxObserver::new(sandbox, gate);

        observer
            .on_message(&Message::new("1", "alice", "side", "just chatting"))
            .await
            .unwrap();
        observer
            .on_message(&Message::new("2", "alice", "side", "!rm -rf /"))
            .await
            .unwrap();

        observer.executions().close();
        tokio::time::timeout(Duration::from_secs(5), observer.executions().wait())
            .await
            .unwrap();

        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel_ref, "side");
        assert_eq!(sent[0].text, "Command 'rm' not allowed");
    }
}
