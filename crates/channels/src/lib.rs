//! Chat-side plumbing shared by every adapter.
//!
//! [`ChatClient`] abstracts the remote chat service, [`OutboundGate`] is the
//! single path for posting text into the channel, and [`ObserverSet`] fans
//! inbound messages out to the adapters that want them.

pub mod client;
pub mod error;
pub mod gate;
pub mod loopback;
pub mod observer;

pub use {
    client::{ChatClient, InboundReceiver, InboundSender},
    error::{Error, Result},
    gate::OutboundGate,
    loopback::{LoopbackClient, SentMessage},
    observer::{InboundObserver, ObserverSet},
};
