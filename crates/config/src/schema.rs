/// Config schema types (bot, adapters, service sandbox, runtime, logging).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer, Serialize, Serializer},
};

/// Root configuration.
///
/// Built once at startup (defaults < file < env < flags) and shared read-only
/// behind an `Arc` afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bot: BotConfig,
    pub stdio: StdioConfig,
    pub file: FileConfig,
    pub socket: SocketConfig,
    pub service: ServiceConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Chat connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token handed to the chat transport. Never logged.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    /// Channel every outbound send targets. Outbound is disabled without it.
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    /// Prefix marking a chat message as a sandbox command. Defaults to "!".
    pub prefix: String,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: None,
            guild_id: None,
            prefix: "!".into(),
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 5_000,
        }
    }
}

impl BotConfig {
    pub fn has_token(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().trim().is_empty())
    }
}

/// Standard input/output bridging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StdioConfig {
    pub enabled: bool,
}

/// Watched input file / appended output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    /// Fallback poll interval for the input file, in milliseconds.
    pub watch_interval_ms: u64,
    /// WHATWG encoding label used for both files (e.g. "utf-8", "latin1").
    pub file_encoding: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            input_file: None,
            output_file: None,
            watch_interval_ms: 1_000,
            file_encoding: "utf-8".into(),
        }
    }
}

/// Unix domain socket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub enabled: bool,
    pub socket_path: PathBuf,
    /// Permission bits applied to the socket file. Accepts `384`, `"0600"` or `"0o600"`.
    #[serde(
        serialize_with = "serialize_mode",
        deserialize_with = "deserialize_mode"
    )]
    pub socket_mode: u32,
    /// Connections beyond this limit are closed immediately.
    pub max_connections: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            socket_path: PathBuf::from("/tmp/chatbridge.sock"),
            socket_mode: 0o600,
            max_connections: 10,
        }
    }
}

/// Command/script sandbox ("service mode").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub enabled: bool,
    /// Directory scanned (non-recursively) for executable scripts.
    pub script_directory: PathBuf,
    /// System commands that may be run directly.
    pub allowed_commands: Vec<String>,
    pub max_execution_time_ms: u64,
    /// Per-stream cap on captured output.
    pub max_output_bytes: usize,
    pub working_directory: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            script_directory: PathBuf::from("./scripts"),
            allowed_commands: Vec::new(),
            max_execution_time_ms: 30_000,
            max_output_bytes: 64 * 1024,
            working_directory: PathBuf::from("."),
        }
    }
}

/// Process lifecycle knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How long shutdown waits for in-flight sends, connections and scripts.
    pub shutdown_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Logging sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Optional file that receives a copy of every log line. Rotated daily.
    pub file: Option<PathBuf>,
    /// Rotated log files kept next to `file`; older ones are deleted.
    pub max_log_files: usize,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
            max_log_files: 5,
            json: false,
        }
    }
}

// ── Serde helpers ───────────────────────────────────────────────────────────

fn serialize_option_secret<S: Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

fn serialize_mode<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0o{mode:o}"))
}

fn deserialize_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mode {
        Int(u32),
        Text(String),
    }

    match Mode::deserialize(deserializer)? {
        Mode::Int(v) => Ok(v),
        Mode::Text(s) => parse_mode(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse an octal permission string: `"0o600"`, `"0600"` or `"600"`.
pub fn parse_mode(raw: &str) -> Result<u32, String> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0o")
        .or_else(|| raw.strip_prefix("0O"))
        .unwrap_or(raw);
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode '{raw}': {e}"))
}
