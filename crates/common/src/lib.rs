//! Shared types used across all chatbridge crates.

pub mod types;

pub use types::Message;
