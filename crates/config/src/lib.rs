//! Configuration loading, env substitution, env overrides and validation.
//!
//! Config files: `chatbridge.toml`, `chatbridge.yaml`, `chatbridge.yml` or
//! `chatbridge.json`, searched in `./`, `~/.config/chatbridge/` and
//! `/etc/chatbridge/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw
//! file, then `CHATBRIDGE_*` overrides on the parsed values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod overrides;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, default_config_path, discover_and_load, load_config, save_config},
    overrides::{apply_env_overrides_with, is_truthy},
    schema::{
        BotConfig, BridgeConfig, FileConfig, LoggingConfig, RuntimeConfig, ServiceConfig,
        SocketConfig, StdioConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
