use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::BridgeConfig,
};

/// Standard config file names, checked in order within each directory.
const CONFIG_FILENAMES: &[&str] = &[
    "chatbridge.toml",
    "chatbridge.yaml",
    "chatbridge.yml",
    "chatbridge.json",
];

/// System-wide config directory, searched last.
const SYSTEM_CONFIG_DIR: &str = "/etc/chatbridge";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Resolve and load the config file.
///
/// An explicit path must exist. Otherwise the search order is:
/// 1. `./chatbridge.{toml,yaml,yml,json}`
/// 2. `~/.config/chatbridge/chatbridge.{toml,yaml,yml,json}`
/// 3. `/etc/chatbridge/chatbridge.{toml,yaml,yml,json}`
///
/// Returns defaults (and `None` as the source path) when nothing is found.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<(BridgeConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let cfg = load_config(&path)?;
            Ok((cfg, Some(path)))
        },
        None => {
            debug!("no config file found, using defaults");
            Ok((BridgeConfig::default(), None))
        },
    }
}

fn find_config_file() -> Option<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(dir) = config_dir() {
        dirs.push(dir);
    }
    dirs.push(PathBuf::from(SYSTEM_CONFIG_DIR));

    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/chatbridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "chatbridge").map(|d| d.config_dir().to_path_buf())
}

/// Default location for a freshly written config file.
pub fn default_config_path() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatbridge.toml")
}

/// Serialize `config` to TOML and write it to `path`.
///
/// Creates parent directories if needed.
pub fn save_config(config: &BridgeConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| Error::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => {
            // An empty YAML document means "all defaults".
            if raw.trim().is_empty() {
                return Ok(BridgeConfig::default());
            }
            serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e))
        },
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        other => Err(Error::UnsupportedFormat {
            ext: other.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatbridge.yaml");
        std::fs::write(
            &path,
            "bot:\n  token: t0k\n  channel_id: \"42\"\nsocket:\n  enabled: true\n  socket_mode: \"0o660\"\nservice:\n  allowed_commands: [pwd, uptime]\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.bot.token.unwrap().expose_secret(), "t0k");
        assert_eq!(cfg.bot.channel_id.as_deref(), Some("42"));
        assert!(cfg.socket.enabled);
        assert_eq!(cfg.socket.socket_mode, 0o660);
        assert_eq!(cfg.service.allowed_commands, vec!["pwd", "uptime"]);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.file.watch_interval_ms, 1_000);
    }

    #[test]
    fn loads_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("c.toml");
        std::fs::write(&toml_path, "[bot]\nprefix = \"$\"\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().bot.prefix, "$");

        let json_path = dir.path().join("c.json");
        std::fs::write(&json_path, r#"{"stdio":{"enabled":true}}"#).unwrap();
        assert!(load_config(&json_path).unwrap().stdio.enabled);
    }

    #[test]
    fn empty_yaml_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.yml");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(load_config(&path).unwrap().bot.prefix, "!");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(
            discover_and_load(Some(&path)),
            Err(Error::Read { .. })
        ));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chatbridge.toml");
        let mut cfg = BridgeConfig::default();
        cfg.bot.channel_id = Some("99".into());
        cfg.service.allowed_commands = vec!["pwd".into()];
        save_config(&cfg, &path).unwrap();

        let back = load_config(&path).unwrap();
        assert_eq!(back.bot.channel_id.as_deref(), Some("99"));
        assert_eq!(back.service.allowed_commands, vec!["pwd"]);
        assert_eq!(back.socket.socket_mode, 0o600);
    }
}
