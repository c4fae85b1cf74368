//! File pair adapter.
//!
//! The input file is drained into the gate whenever it changes; inbound chat
//! messages are appended to the output file.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use {
    async_trait::async_trait,
    chatbridge_channels::{InboundObserver, OutboundGate},
    chatbridge_common::Message,
    chatbridge_config::FileConfig,
    encoding_rs::Encoding,
    tokio::{
        fs::{File, OpenOptions},
        io::AsyncWriteExt,
        sync::{Mutex, mpsc},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::error::{Error, Result};

/// What a single drain attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Fingerprint matches the last acknowledged state.
    Unchanged,
    /// Only whitespace was present; the file was cleared without sending.
    Blank,
    /// The content was sent and removed from the file.
    Sent,
    /// The gate refused the content; the file is left as is.
    SendFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

impl Fingerprint {
    fn of(meta: &std::fs::Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

pub struct FileAdapter {
    gate: Arc<OutboundGate>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    encoding: &'static Encoding,
    interval: Duration,
    /// Last fingerprint the drain acknowledged.
    drained: Mutex<Option<Fingerprint>>,
    writer: Mutex<Option<File>>,
}

impl FileAdapter {
    /// Check paths and prepare the input file.
    ///
    /// The input file (and its parents) is created if missing. The output
    /// file's directory must already exist.
    pub fn new(config: &FileConfig, gate: Arc<OutboundGate>) -> Result<Self> {
        let encoding = Encoding::for_label(config.file_encoding.as_bytes()).ok_or_else(|| {
            Error::UnknownEncoding {
                label: config.file_encoding.clone(),
            }
        })?;

        if let Some(ref output) = config.output_file
            && let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
            && !parent.is_dir()
        {
            return Err(Error::filesystem(
                "output directory does not exist",
                parent,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        if let Some(ref input) = config.input_file
            && !input.exists()
        {
            if let Some(parent) = input.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::filesystem("create input directory", parent, e))?;
            }
            std::fs::File::create(input)
                .map_err(|e| Error::filesystem("create input file", input, e))?;
            info!(path = %input.display(), "created input file");
        }

        Ok(Self {
            gate,
            input: config.input_file.clone(),
            output: config.output_file.clone(),
            encoding,
            interval: Duration::from_millis(config.watch_interval_ms.max(1)),
            drained: Mutex::new(None),
            writer: Mutex::new(None),
        })
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Watch-and-poll loop for the input file. Returns on cancellation.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(input) = self.input.clone() else {
            return;
        };
        let (_watcher, mut changes) = start_watcher(&input);
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            path = %input.display(),
            interval_ms = self.interval.as_millis() as u64,
            "file adapter draining"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(()) = changes.recv() => {},
                _ = tick.tick() => {},
            }
            match self.drain_once().await {
                Ok(DrainOutcome::Unchanged) => {},
                Ok(outcome) => debug!(?outcome, "input file drained"),
                Err(e) => warn!(error = %e, "input drain failed"),
            }
        }
        debug!("file adapter stopped");
    }

    /// Send the input file's content if it changed, then remove what was sent.
    pub async fn drain_once(&self) -> Result<DrainOutcome> {
        let Some(ref input) = self.input else {
            return Ok(DrainOutcome::Unchanged);
        };
        let mut drained = self.drained.lock().await;

        let meta = match tokio::fs::metadata(input).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DrainOutcome::Unchanged);
            },
            Err(e) => return Err(Error::filesystem("stat input file", input, e)),
        };
        if *drained == Some(Fingerprint::of(&meta)) {
            return Ok(DrainOutcome::Unchanged);
        }

        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| Error::filesystem("read input file", input, e))?;
        if bytes.is_empty() {
            *drained = Some(Fingerprint::of(&meta));
            return Ok(DrainOutcome::Unchanged);
        }

        let (decoded, _, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            warn!(
                path = %input.display(),
                encoding = self.encoding.name(),
                "input contained undecodable bytes"
            );
        }
        let text = decoded.trim();

        let outcome = if text.is_empty() {
            DrainOutcome::Blank
        } else {
            match self.gate.send(text).await {
                Ok(()) => DrainOutcome::Sent,
                Err(e) => {
                    warn!(path = %input.display(), error = %e, "input file content not delivered");
                    return Ok(DrainOutcome::SendFailed);
                },
            }
        };

        *drained = remove_prefix(input, &bytes).await?;
        Ok(outcome)
    }

    /// Append `[author] content` to the output file.
    pub async fn append(&self, message: &Message) -> Result<()> {
        let Some(ref output) = self.output else {
            return Ok(());
        };
        let mut writer = self.writer.lock().await;
        if writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(output)
                .await
                .map_err(|e| Error::filesystem("open output file", output, e))?;
            *writer = Some(file);
        }
        let mut line = message.render();
        line.push('\n');
        if let Some(file) = writer.as_mut() {
            let written = async {
                file.write_all(line.as_bytes()).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                // Reopen on the next message.
                *writer = None;
                return Err(Error::filesystem("append output file", output, e));
            }
        }
        Ok(())
    }

    /// Flush and drop the output handle.
    pub async fn close(&self) {
        if let Some(mut file) = self.writer.lock().await.take()
            && let Err(e) = file.flush().await
        {
            warn!(error = %e, "output file flush failed");
        }
    }
}

#[async_trait]
impl InboundObserver for FileAdapter {
    fn name(&self) -> &str {
        "file"
    }

    async fn on_message(&self, message: &Message) -> anyhow::Result<()> {
        self.append(message).await?;
        Ok(())
    }
}

/// Drop the first `drained.len()` bytes if they are still the file's prefix,
/// keeping anything appended since.
///
/// Returns the new fingerprint when the file is now empty, `None` when
/// leftover content still needs a drain.
async fn remove_prefix(path: &Path, drained: &[u8]) -> Result<Option<Fingerprint>> {
    let current = tokio::fs::read(path)
        .await
        .map_err(|e| Error::filesystem("re-read input file", path, e))?;
    let rest = if current.starts_with(drained) {
        &current[drained.len()..]
    } else {
        // Replaced wholesale since the read; the new content is drained next round.
        &current[..]
    };
    tokio::fs::write(path, rest)
        .await
        .map_err(|e| Error::filesystem("truncate input file", path, e))?;
    if !rest.is_empty() {
        return Ok(None);
    }
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::filesystem("stat input file", path, e))?;
    Ok(Some(Fingerprint::of(&meta)))
}

#[cfg(feature = "file-watcher")]
fn start_watcher(
    input: &Path,
) -> (
    Option<crate::file_watcher::InputWatcher>,
    mpsc::UnboundedReceiver<()>,
) {
    match crate::file_watcher::InputWatcher::start(input) {
        Ok((watcher, rx)) => (Some(watcher), rx),
        Err(e) => {
            warn!(error = %e, "input watcher unavailable, polling only");
            (None, mpsc::unbounded_channel().1)
        },
    }
}

#[cfg(not(feature = "file-watcher"))]
fn start_watcher(_input: &Path) -> (Option<()>, mpsc::UnboundedReceiver<()>) {
    (None, mpsc::unbounded_channel().1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        chatbridge_channels::{ChatClient, LoopbackClient},
    };

    async fn setup(dir: &Path) -> (Arc<LoopbackClient>, FileAdapter) {
        let client = Arc::new(LoopbackClient::new("bot"));
        client
            .connect(mpsc::unbounded_channel().0)
            .await
            .unwrap();
        let gate = Arc::new(OutboundGate::new(client.clone(), Some("c".into())));
        let config = FileConfig {
            enabled: true,
            input_file: Some(dir.join("in/input.txt")),
            output_file: Some(dir.join("output.txt")),
            ..FileConfig::default()
        };
        (client, FileAdapter::new(&config, gate).unwrap())
    }

    #[tokio::test]
    async fn input_file_is_created_with_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let (_client, adapter) = setup(tmp.path()).await;
        assert!(adapter.input().unwrap().is_file());
    }

    #[tokio::test]
    async fn missing_output_directory_is_a_filesystem_error() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(LoopbackClient::new("bot"));
        let gate = Arc::new(OutboundGate::new(client, None));
        let config = FileConfig {
            enabled: true,
            output_file: Some(tmp.path().join("missing/out.txt")),
            ..FileConfig::default()
        };
        let err = FileAdapter::new(&config, gate).err().unwrap();
        assert!(err.is_filesystem());
    }

    #[tokio::test]
    async fn drain_sends_trimmed_content_once() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, adapter) = setup(tmp.path()).await;
        let input = adapter.input().unwrap().to_path_buf();

        std::fs::write(&input, "  deploy done \n").unwrap();
        assert_eq!(adapter.drain_once().await.unwrap(), DrainOutcome::Sent);
        assert_eq!(adapter.drain_once().await.unwrap(), DrainOutcome::Unchanged);

        let texts: Vec<_> = client.sent().into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["deploy done"]);
        assert_eq!(std::fs::read_to_string(&input).unwrap(), "");
    }

    #[tokio::test]
    async fn whitespace_only_is_cleared_without_sending() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, adapter) = setup(tmp.path()).await;
        let input = adapter.input().unwrap().to_path_buf();

        std::fs::write(&input, " \n\t\n").unwrap();
        assert_eq!(adapter.drain_once().await.unwrap(), DrainOutcome::Blank);
        assert!(client.sent().is_empty());
        assert_eq!(std::fs::read_to_string(&input).unwrap(), "");
    }

    #[tokio::test]
    async fn failed_send_keeps_content_for_retry() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, adapter) = setup(tmp.path()).await;
        let input = adapter.input().unwrap().to_path_buf();

        client.disconnect().await.unwrap();
        std::fs::write(&input, "pending").unwrap();
        assert_eq!(adapter.drain_once().await.unwrap(), DrainOutcome::SendFailed);
        assert_eq!(std::fs::read_to_string(&input).unwrap(), "pending");

        client.connect(mpsc::unbounded_channel().0).await.unwrap();
        assert_eq!(adapter.drain_once().await.unwrap(), DrainOutcome::Sent);
        assert_eq!(client.sent()[0].text, "pending");
    }

    #[tokio::test]
    async fn non_utf8_input_is_decoded() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(LoopbackClient::new("bot"));
        client
            .connect(mpsc::unbounded_channel().0)
            .await
            .unwrap();
        let gate = Arc::new(OutboundGate::new(client.clone(), Some("c".into())));
        let config = FileConfig {
            enabled: true,
            input_file: Some(tmp.path().join("latin1.txt")),
            file_encoding: "latin1".into(),
            ..FileConfig::default()
        };
        let adapter = FileAdapter::new(&config, gate).unwrap();

        std::fs::write(tmp.path().join("latin1.txt"), b"caf\xe9").unwrap();
        adapter.drain_once().await.unwrap();
        assert_eq!(client.sent()[0].text, "café");
    }

    #[tokio::test]
    async fn inbound_messages_are_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let (_client, adapter) = setup(tmp.path()).await;

        adapter
            .on_message(&Message::new("1", "alice", "c", "first"))
            .await
            .unwrap();
        adapter
            .on_message(&Message::new("2", "bob", "c", "second"))
            .await
            .unwrap();
        adapter.close().await;

        let out = std::fs::read_to_string(adapter.output().unwrap()).unwrap();
        assert_eq!(out, "[alice] first\n[bob] second\n");
    }

    #[tokio::test]
    async fn run_loop_picks_up_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, adapter) = setup(tmp.path()).await;
        let adapter = Arc::new(adapter);
        let input = adapter.input().unwrap().to_path_buf();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&adapter).run(cancel.clone()));

        std::fs::write(&input, "from the loop\n").unwrap();
        let mut delivered = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if !client.sent().is_empty() {
                delivered = true;
                break;
            }
        }
        cancel.cancel();
        task.await.unwrap();

        assert!(delivered);
        assert_eq!(client.sent().len(), 1);
        assert_eq!(client.sent()[0].text, "from the loop");
    }
}
