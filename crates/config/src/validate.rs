//! Semantic validation of a merged [`BridgeConfig`].
//!
//! Errors abort startup; warnings are logged and the bridge keeps running
//! with the affected surface disabled.

use crate::schema::BridgeConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "socket.socket_mode"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    fn error(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path,
            message: message.into(),
        });
    }

    fn warn(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path,
            message: message.into(),
        });
    }
}

pub fn validate(config: &BridgeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !config.bot.has_token() {
        result.warn(
            "bot.token",
            "no bot token configured; remote chat transports will refuse to connect",
        );
    }
    if config.bot.channel_id.as_deref().is_none_or(|c| c.trim().is_empty()) {
        result.warn(
            "bot.channel_id",
            "no channel configured; outbound sends are disabled",
        );
    }
    if config.bot.prefix.trim().is_empty() {
        result.error("bot.prefix", "command prefix must not be empty");
    }

    let file = &config.file;
    if file.enabled {
        if file.input_file.is_none() && file.output_file.is_none() {
            result.error(
                "file",
                "file adapter enabled but neither input_file nor output_file is set",
            );
        }
        if file.watch_interval_ms == 0 {
            result.error("file.watch_interval_ms", "watch interval must be > 0");
        }
        if encoding_rs::Encoding::for_label(file.file_encoding.as_bytes()).is_none() {
            result.error(
                "file.file_encoding",
                format!("unknown text encoding '{}'", file.file_encoding),
            );
        }
    }

    let socket = &config.socket;
    if socket.enabled {
        if socket.socket_mode > 0o777 {
            result.error(
                "socket.socket_mode",
                format!("mode 0o{:o} is not a permission mask", socket.socket_mode),
            );
        } else if socket.socket_mode & 0o007 != 0 {
            result.warn(
                "socket.socket_mode",
                format!(
                    "mode 0o{:o} lets any local user talk to the bridge",
                    socket.socket_mode
                ),
            );
        }
        if socket.max_connections == 0 {
            result.error("socket.max_connections", "max_connections must be > 0");
        }
        if socket.socket_path.as_os_str().is_empty() {
            result.error("socket.socket_path", "socket path must not be empty");
        }
    }

    if config.service.enabled {
        if config.service.max_execution_time_ms == 0 {
            result.error(
                "service.max_execution_time_ms",
                "max execution time must be > 0",
            );
        }
        if config.service.max_output_bytes == 0 {
            result.error("service.max_output_bytes", "max output bytes must be > 0");
        }
    }

    if let Some(file) = &config.logging.file {
        if file.file_name().is_none() {
            result.error(
                "logging.file",
                format!("'{}' does not name a file", file.display()),
            );
        }
        if config.logging.max_log_files == 0 {
            result.error("logging.max_log_files", "must keep at least one log file");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use {super::*, std::path::PathBuf};

    fn paths(result: &ValidationResult, severity: Severity) -> Vec<&'static str> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.path)
            .collect()
    }

    #[test]
    fn defaults_only_warn() {
        let result = validate(&BridgeConfig::default());
        assert!(!result.has_errors());
        assert_eq!(
            paths(&result, Severity::Warning),
            vec!["bot.token", "bot.channel_id"]
        );
    }

    #[test]
    fn file_adapter_without_paths_is_an_error() {
        let mut cfg = BridgeConfig::default();
        cfg.file.enabled = true;
        cfg.file.watch_interval_ms = 0;
        cfg.file.file_encoding = "klingon".into();
        let result = validate(&cfg);
        assert_eq!(
            paths(&result, Severity::Error),
            vec!["file", "file.watch_interval_ms", "file.file_encoding"]
        );
    }

    #[test]
    fn log_file_checks() {
        let mut cfg = BridgeConfig::default();
        cfg.logging.max_log_files = 0;
        assert!(!validate(&cfg).has_errors());

        cfg.logging.file = Some(PathBuf::from("/"));
        let result = validate(&cfg);
        assert_eq!(
            paths(&result, Severity::Error),
            vec!["logging.file", "logging.max_log_files"]
        );
    }

    #[test]
    fn socket_checks() {
        let mut cfg = BridgeConfig::default();
        cfg.socket.enabled = true;
        cfg.socket.socket_mode = 0o1777;
        cfg.socket.max_connections = 0;
        cfg.socket.socket_path = PathBuf::new();
        let result = validate(&cfg);
        assert_eq!(
            paths(&result, Severity::Error),
            vec![
                "socket.socket_mode",
                "socket.max_connections",
                "socket.socket_path"
            ]
        );

        cfg.socket.socket_mode = 0o666;
        cfg.socket.max_connections = 1;
        cfg.socket.socket_path = PathBuf::from("/tmp/a.sock");
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert!(paths(&result, Severity::Warning).contains(&"socket.socket_mode"));
    }

    #[test]
    fn service_and_prefix_errors() {
        let mut cfg = BridgeConfig::default();
        cfg.bot.prefix = " ".into();
        cfg.service.enabled = true;
        cfg.service.max_execution_time_ms = 0;
        let result = validate(&cfg);
        assert_eq!(
            paths(&result, Severity::Error),
            vec!["bot.prefix", "service.max_execution_time_ms"]
        );
    }
}
