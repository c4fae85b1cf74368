//! Gateway: the local surfaces of the bridge and the supervisor that runs them.
//!
//! Lifecycle:
//! 1. Build the outbound gate around the chat client
//! 2. Start each enabled adapter (stdio, file pair, control socket, sandbox)
//! 3. Connect the chat client
//! 4. Fan inbound messages out to every observer until shutdown
//!
//! Shutdown runs the same steps in reverse with a bounded grace period.

pub mod error;
pub mod file;
#[cfg(feature = "file-watcher")]
pub mod file_watcher;
pub mod protocol;
pub mod service;
pub mod socket;
pub mod socket_client;
pub mod stdio;
pub mod supervisor;

pub use {
    error::{Error, Result},
    file::{DrainOutcome, FileAdapter},
    protocol::{MessageView, Request, Response},
    service::SandboxObserver,
    socket::{LineBuffer, SocketServer},
    stdio::{StdioAdapter, StdoutObserver},
    supervisor::{Bridge, Supervisor, shutdown_signal},
};
