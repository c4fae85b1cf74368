//! Standard input/output bridge.
//!
//! Each non-blank stdin line is posted through the gate; every inbound chat
//! message is printed as `[author] content`.

use std::sync::Arc;

use {
    async_trait::async_trait,
    chatbridge_channels::{InboundObserver, OutboundGate},
    chatbridge_common::Message,
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout},
        sync::Mutex,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

/// Forwards lines from a reader to the gate until EOF or cancellation.
pub struct StdioAdapter<R> {
    gate: Arc<OutboundGate>,
    reader: R,
}

impl StdioAdapter<BufReader<Stdin>> {
    pub fn stdin(gate: Arc<OutboundGate>) -> Self {
        Self::new(gate, BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> StdioAdapter<R> {
    pub fn new(gate: Arc<OutboundGate>, reader: R) -> Self {
        Self { gate, reader }
    }

    /// Read loop. Returns the number of lines successfully sent.
    ///
    /// Cancellation is only observed between lines, so a send that has
    /// started always finishes.
    pub async fn run(self, cancel: CancellationToken) -> usize {
        let mut lines = self.reader.lines();
        let mut sent = 0;
        info!("stdio adapter reading");

        loop {
            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("stdio adapter cancelled");
                    break;
                },
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("stdin closed");
                    break;
                },
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                },
            };

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match self.gate.send(text).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(error = %e, "stdin line not delivered"),
            }
        }
        sent
    }
}

/// Prints inbound messages, one line each, flushed immediately.
pub struct StdoutObserver<W> {
    writer: Mutex<W>,
}

impl StdoutObserver<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> StdoutObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + Sync> InboundObserver for StdoutObserver<W> {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn on_message(&self, message: &Message) -> anyhow::Result<()> {
        let mut line = message.render();
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        chatbridge_channels::{ChatClient, LoopbackClient},
        std::time::Duration,
        tokio::io::{AsyncWriteExt, duplex},
    };

    async fn connected_gate() -> (Arc<LoopbackClient>, Arc<OutboundGate>) {
        let client = Arc::new(LoopbackClient::new("bot"));
        client
            .connect(tokio::sync::mpsc::unbounded_channel().0)
            .await
            .unwrap();
        let gate = Arc::new(OutboundGate::new(client.clone(), Some("c".into())));
        (client, gate)
    }

    #[tokio::test]
    async fn lines_are_trimmed_and_blank_lines_skipped() {
        let (client, gate) = connected_gate().await;
        let input: &[u8] = b"  hello  \n\n   \nworld\n";
        let sent = StdioAdapter::new(gate, input)
            .run(CancellationToken::new())
            .await;

        assert_eq!(sent, 2);
        let texts: Vec<_> = client.sent().into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn send_failures_do_not_stop_reading() {
        let client = Arc::new(LoopbackClient::new("bot"));
        let gate = Arc::new(OutboundGate::new(client.clone(), Some("c".into())));
        let input: &[u8] = b"one\ntwo\n";
        let sent = StdioAdapter::new(gate, input)
            .run(CancellationToken::new())
            .await;
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_reader() {
        let (_client, gate) = connected_gate().await;
        let (reader, mut writer) = duplex(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(StdioAdapter::new(gate, BufReader::new(reader)).run(cancel.clone()));

        writer.write_all(b"first\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let sent = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn observer_renders_messages_in_order() {
        let observer = StdoutObserver::new(Vec::new());
        observer
            .on_message(&Message::new("1", "alice", "c", "hi"))
            .await
            .unwrap();
        observer
            .on_message(&Message::new("2", "bob", "c", "yo"))
            .await
            .unwrap();
        let out = String::from_utf8(observer.into_inner()).unwrap();
        assert_eq!(out, "[alice] hi\n[bob] yo\n");
    }
}
