//! Prefixed chat commands executed as local scripts or allow-listed system
//! commands, with a deadline and captured output.

pub mod command;
pub mod context;
pub mod error;
pub mod exec;
pub mod registry;
pub mod sandbox;

pub use {
    command::{ParsedCommand, parse},
    context::InvocationContext,
    error::{Error, Result},
    exec::{ExecOpts, ExecResult, run_bounded},
    registry::{ScriptRegistry, ScriptSnapshot},
    sandbox::CommandSandbox,
};
