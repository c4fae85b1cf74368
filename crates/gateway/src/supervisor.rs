//! Bridge lifecycle: builds the gate and adapters, connects the chat client,
//! fans inbound messages out and tears everything down in reverse.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    chatbridge_channels::{ChatClient, InboundReceiver, ObserverSet, OutboundGate},
    chatbridge_config::BridgeConfig,
    chatbridge_sandbox::CommandSandbox,
    tokio::{
        io::{AsyncBufRead, AsyncWrite, BufReader},
        sync::mpsc,
        task::JoinHandle,
        time::Instant,
    },
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    file::FileAdapter,
    service::SandboxObserver,
    socket::SocketServer,
    stdio::{StdioAdapter, StdoutObserver},
};

pub type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send + Sync>;

/// How long killed executions get to report back after force-cancellation.
const KILL_SETTLE: Duration = Duration::from_secs(1);

pub struct Supervisor {
    config: Arc<BridgeConfig>,
    client: Arc<dyn ChatClient>,
    stdio: Option<(BoxedReader, BoxedWriter)>,
}

impl Supervisor {
    pub fn new(config: Arc<BridgeConfig>, client: Arc<dyn ChatClient>) -> Self {
        Self {
            config,
            client,
            stdio: None,
        }
    }

    /// Replace process stdin/stdout for the stdio adapter.
    #[must_use]
    pub fn with_stdio(mut self, reader: BoxedReader, writer: BoxedWriter) -> Self {
        self.stdio = Some((reader, writer));
        self
    }

    /// Start adapters, connect the client and begin dispatching.
    ///
    /// An adapter whose paths are unusable is logged and left out; only a
    /// failed client connection aborts startup.
    pub async fn start(self) -> Result<Bridge> {
        let Self {
            config,
            client,
            stdio,
        } = self;
        let running = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(OutboundGate::new(
            Arc::clone(&client),
            config.bot.channel_id.clone(),
        ));
        if gate.channel_ref().is_none() {
            warn!("no channel configured; outbound messages will be dropped");
        }

        let grace = Duration::from_millis(config.runtime.shutdown_grace_ms);
        let ingress = CancellationToken::new();
        let executions_cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        let mut observers = ObserverSet::new();

        if config.stdio.enabled {
            let (reader, writer): (BoxedReader, BoxedWriter) = stdio.unwrap_or_else(|| {
                (
                    Box::new(BufReader::new(tokio::io::stdin())),
                    Box::new(tokio::io::stdout()),
                )
            });
            observers.push(Arc::new(StdoutObserver::new(writer)));
            tasks.spawn(StdioAdapter::new(Arc::clone(&gate), reader).run(ingress.clone()));
            info!("stdio adapter started");
        }

        let mut file_adapter = None;
        if config.file.enabled {
            match FileAdapter::new(&config.file, Arc::clone(&gate)) {
                Ok(adapter) => {
                    let adapter = Arc::new(adapter);
                    if adapter.output().is_some() {
                        observers.push(adapter.clone());
                    }
                    tasks.spawn(Arc::clone(&adapter).run(ingress.clone()));
                    info!(
                        input = ?adapter.input(),
                        output = ?adapter.output(),
                        "file adapter started"
                    );
                    file_adapter = Some(adapter);
                },
                Err(e) => warn!(error = %e, "file adapter disabled"),
            }
        }

        let mut socket_path = None;
        if config.socket.enabled {
            match SocketServer::bind(&config.socket, Arc::clone(&gate), Arc::clone(&running)) {
                Ok(server) => {
                    socket_path = Some(server.path().to_path_buf());
                    tasks.spawn(server.run(ingress.clone(), grace));
                },
                Err(e) => warn!(error = %e, "socket adapter disabled"),
            }
        }

        let mut sandbox_observer = None;
        if config.service.enabled {
            match CommandSandbox::new(config.service.clone(), config.bot.prefix.clone()) {
                Ok(sandbox) => {
                    let sandbox = Arc::new(
                        sandbox
                            .with_client(Arc::clone(&client))
                            .with_cancellation(executions_cancel.clone()),
                    );
                    let observer = Arc::new(SandboxObserver::new(sandbox, Arc::clone(&gate)));
                    observers.push(observer.clone());
                    info!(
                        scripts = observer.sandbox().registry().len(),
                        allowed = config.service.allowed_commands.len(),
                        "command sandbox started"
                    );
                    sandbox_observer = Some(observer);
                },
                Err(e) => warn!(error = %e, "command sandbox disabled"),
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        if let Err(e) = client.connect(inbound_tx).await {
            warn!(client = client.id(), error = %e, "chat client failed to connect");
            ingress.cancel();
            tasks.close();
            let _ = tokio::time::timeout(grace, tasks.wait()).await;
            return Err(e.into());
        }
        info!(client = client.id(), "chat client connected");

        running.store(true, Ordering::SeqCst);
        if let Some(ref observer) = sandbox_observer {
            observer.sandbox().set_running(true);
        }

        info!(observers = ?observers.names(), "dispatching inbound messages");
        let dispatcher = tokio::spawn(dispatch(
            inbound_rx,
            observers,
            gate.channel_ref().map(str::to_string),
            ingress.clone(),
        ));

        Ok(Bridge {
            client,
            gate,
            running,
            grace,
            ingress,
            executions_cancel,
            tasks,
            dispatcher,
            file_adapter,
            sandbox_observer,
            socket_path,
        })
    }

    /// Start, wait for SIGINT or SIGTERM, shut down.
    pub async fn run(self) -> Result<()> {
        let bridge = self.start().await?;
        shutdown_signal().await;
        bridge.shutdown().await;
        Ok(())
    }
}

/// A started bridge.
pub struct Bridge {
    client: Arc<dyn ChatClient>,
    gate: Arc<OutboundGate>,
    running: Arc<AtomicBool>,
    grace: Duration,
    ingress: CancellationToken,
    executions_cancel: CancellationToken,
    tasks: TaskTracker,
    dispatcher: JoinHandle<()>,
    file_adapter: Option<Arc<FileAdapter>>,
    sandbox_observer: Option<Arc<SandboxObserver>>,
    socket_path: Option<PathBuf>,
}

impl Bridge {
    pub fn gate(&self) -> &Arc<OutboundGate> {
        &self.gate
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn sandbox(&self) -> Option<&Arc<CommandSandbox>> {
        self.sandbox_observer.as_ref().map(|o| o.sandbox())
    }

    /// Bound socket path, when the socket adapter is running.
    pub fn socket_path(&self) -> Option<&std::path::Path> {
        self.socket_path.as_deref()
    }

    pub fn file_adapter_active(&self) -> bool {
        self.file_adapter.is_some()
    }

    /// Stop ingress, let in-flight work finish within the grace period,
    /// force-cancel what is left, then disconnect and release resources.
    ///
    /// Returns `true` when everything finished before the deadline.
    pub async fn shutdown(self) -> bool {
        info!(grace_ms = self.grace.as_millis() as u64, "shutting down");
        let deadline = Instant::now() + self.grace;
        let mut clean = true;

        self.running.store(false, Ordering::SeqCst);
        self.ingress.cancel();

        if tokio::time::timeout_at(deadline, self.dispatcher).await.is_err() {
            warn!("inbound dispatcher did not stop in time");
            clean = false;
        }

        self.tasks.close();
        if tokio::time::timeout_at(deadline, self.tasks.wait())
            .await
            .is_err()
        {
            warn!("adapters still busy at grace deadline");
            clean = false;
        }

        if let Some(ref observer) = self.sandbox_observer {
            observer.sandbox().set_running(false);
            let executions = observer.executions();
            executions.close();
            if tokio::time::timeout_at(deadline, executions.wait())
                .await
                .is_err()
            {
                warn!(
                    in_flight = executions.len(),
                    "cancelling executions at grace deadline"
                );
                clean = false;
                self.executions_cancel.cancel();
                let _ = tokio::time::timeout(KILL_SETTLE, executions.wait()).await;
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if !self.gate.drain(remaining).await {
            warn!("outbound sends still pending at grace deadline");
            clean = false;
        }

        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "chat client disconnect failed");
        }
        if let Some(ref adapter) = self.file_adapter {
            adapter.close().await;
        }
        info!(clean, "bridge stopped");
        clean
    }
}

async fn dispatch(
    mut inbound: InboundReceiver,
    observers: ObserverSet,
    channel: Option<String>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => {
                    debug!("inbound stream closed");
                    break;
                },
            },
        };
        if let Some(ref channel) = channel
            && message.channel_ref != *channel
        {
            debug!(
                message_id = %message.id,
                channel = %message.channel_ref,
                "ignoring message from other channel"
            );
            continue;
        }
        observers.dispatch(&message).await;
    }
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    tokio::select! {
        () = interrupt => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
