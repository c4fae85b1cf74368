//! Unix domain socket control server.
//!
//! Newline-delimited JSON, one reply line per request line. Every accepted
//! connection runs in its own task and owns its reassembly buffer; a broken
//! client never affects the others.

use std::{
    collections::HashMap,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    chatbridge_channels::OutboundGate,
    chatbridge_config::SocketConfig,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{UnixListener, UnixStream},
    },
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    protocol::{MAX_LINE_BYTES, MAX_MESSAGE_LIMIT, MessageView, Request, Response},
};

/// One unit produced by [`LineBuffer::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(Vec<u8>),
    /// A line exceeded the limit; its remaining bytes are discarded.
    TooLarge,
}

/// Reassembles newline-terminated lines from arbitrary read chunks.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            discarding: false,
        }
    }

    pub fn push(&mut self, mut data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        while !data.is_empty() {
            let (segment, complete) = match data.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    let segment = &data[..i];
                    data = &data[i + 1..];
                    (segment, true)
                },
                None => {
                    let segment = data;
                    data = &[];
                    (segment, false)
                },
            };

            if self.discarding {
                self.discarding = !complete;
                continue;
            }
            if self.buf.len() + segment.len() > self.limit {
                self.buf.clear();
                frames.push(Frame::TooLarge);
                self.discarding = !complete;
                continue;
            }
            self.buf.extend_from_slice(segment);
            if complete {
                frames.push(Frame::Line(std::mem::take(&mut self.buf)));
            }
        }
        frames
    }
}

struct Shared {
    gate: Arc<OutboundGate>,
    running: Arc<AtomicBool>,
    connections: Mutex<HashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
}

impl Shared {
    fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    async fn handle(&self, line: &[u8]) -> Response {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(reply) => return reply,
        };
        match request {
            Request::Send { content } => match self.gate.send(&content).await {
                Ok(()) => Response::Sent {
                    success: true,
                    message: content,
                },
                Err(e) => {
                    warn!(error = %e, "socket send failed");
                    Response::Sent {
                        success: false,
                        message: content,
                    }
                },
            },
            Request::Status => Response::Status {
                connected: self.gate.is_connected(),
                running: self.running.load(Ordering::SeqCst),
                channel: self.gate.channel_ref().map(str::to_string),
                connections: self.connection_count(),
            },
            Request::GetMessages { limit } => {
                let limit = limit.min(MAX_MESSAGE_LIMIT);
                let messages = match self.gate.fetch_recent(limit).await {
                    Ok(messages) => messages.into_iter().map(MessageView::from).collect(),
                    Err(e) => {
                        warn!(error = %e, "get_messages fetch failed");
                        Vec::new()
                    },
                };
                Response::Messages { messages }
            },
        }
    }
}

pub struct SocketServer {
    listener: UnixListener,
    path: PathBuf,
    max_connections: usize,
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl SocketServer {
    /// Remove any stale socket file, bind and apply the configured mode.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        config: &SocketConfig,
        gate: Arc<OutboundGate>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let path = config.socket_path.clone();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::filesystem("create socket directory", parent, e))?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(Error::filesystem("remove stale socket", &path, e)),
        }

        let listener =
            UnixListener::bind(&path).map_err(|e| Error::filesystem("bind socket", &path, e))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(config.socket_mode))
            .map_err(|e| Error::filesystem("set socket permissions", &path, e))?;
        info!(
            path = %path.display(),
            mode = %format_args!("{:o}", config.socket_mode),
            max_connections = config.max_connections,
            "socket server listening"
        );

        Ok(Self {
            listener,
            path,
            max_connections: config.max_connections.max(1),
            shared: Arc::new(Shared {
                gate,
                running,
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
            tracker: TaskTracker::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept until `cancel` fires, then close every connection, wait up to
    /// `grace` for them to finish and remove the socket file.
    pub async fn run(self, cancel: CancellationToken, grace: Duration) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => self.admit(stream),
                    Err(e) => warn!(error = %e, "socket accept failed"),
                },
            }
        }

        drop(self.listener);
        let open: Vec<CancellationToken> = self
            .shared
            .connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        info!(connections = open.len(), "socket server shutting down");
        for token in open {
            token.cancel();
        }
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!("socket connections still open after grace period");
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove socket file"),
        }
    }

    fn admit(&self, stream: UnixStream) {
        let token = CancellationToken::new();
        let id = {
            let mut connections = self
                .shared
                .connections
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if connections.len() >= self.max_connections {
                warn!(
                    max_connections = self.max_connections,
                    "socket connection rejected: at capacity"
                );
                return;
            }
            let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
            connections.insert(id, token.clone());
            id
        };

        let shared = Arc::clone(&self.shared);
        self.tracker.spawn(async move {
            debug!(connection = id, "socket client connected");
            if let Err(e) = serve_connection(stream, &shared, &token).await {
                debug!(connection = id, error = %e, "socket connection ended with error");
            }
            shared
                .connections
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            debug!(connection = id, "socket client disconnected");
        });
    }
}

async fn serve_connection(
    stream: UnixStream,
    shared: &Shared,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut lines = LineBuffer::new(MAX_LINE_BYTES);
    let mut chunk = vec![0u8; 8 * 1024];

    loop {
        let n = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            read = reader.read(&mut chunk) => read?,
        };
        if n == 0 {
            return Ok(());
        }

        for frame in lines.push(&chunk[..n]) {
            let reply = match frame {
                Frame::Line(line) if line.iter().all(u8::is_ascii_whitespace) => continue,
                Frame::Line(line) => shared.handle(&line).await,
                Frame::TooLarge => Response::error("Message too large"),
            };
            writer.write_all(reply.to_line().as_bytes()).await?;
        }
        writer.flush().await?;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_split_lines() {
        let mut buf = LineBuffer::new(64);
        assert!(buf.push(b"{\"comm").is_empty());
        assert_eq!(buf.push(b"and\":1}\n{\"a\""), vec![Frame::Line(
            b"{\"command\":1}".to_vec()
        )]);
        assert_eq!(buf.push(b":2}\n"), vec![Frame::Line(b"{\"a\":2}".to_vec())]);
    }

    #[test]
    fn pipelined_lines_in_one_chunk() {
        let mut buf = LineBuffer::new(64);
        let frames = buf.push(b"a\n\nb\n");
        assert_eq!(frames, vec![
            Frame::Line(b"a".to_vec()),
            Frame::Line(Vec::new()),
            Frame::Line(b"b".to_vec()),
        ]);
    }

    #[test]
    fn oversized_line_is_reported_once_and_skipped() {
        let mut buf = LineBuffer::new(4);
        assert_eq!(buf.push(b"abc"), Vec::<Frame>::new());
        assert_eq!(buf.push(b"defg"), vec![Frame::TooLarge]);
        assert!(buf.push(b"hijk").is_empty());
        assert_eq!(buf.push(b"lmn\nok\n"), vec![Frame::Line(b"ok".to_vec())]);
    }

    #[test]
    fn line_at_limit_is_accepted() {
        let mut buf = LineBuffer::new(4);
        assert_eq!(buf.push(b"abcd\n"), vec![Frame::Line(b"abcd".to_vec())]);
        assert_eq!(buf.push(b"abcde\nx\n"), vec![
            Frame::TooLarge,
            Frame::Line(b"x".to_vec())
        ]);
    }
}
