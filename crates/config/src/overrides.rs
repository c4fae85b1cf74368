use std::path::PathBuf;

use secrecy::Secret;

use crate::schema::BridgeConfig;

/// Apply `CHATBRIDGE_*` overrides on top of file values.
///
/// `lookup` resolves a variable name; the binary passes `std::env::var`, tests
/// pass a map so they never mutate the process environment.
pub fn apply_env_overrides_with(config: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = var("CHATBRIDGE_BOT_TOKEN") {
        config.bot.token = Some(Secret::new(token));
    }
    if let Some(channel) = var("CHATBRIDGE_CHANNEL_ID") {
        config.bot.channel_id = Some(channel);
    }
    if let Some(guild) = var("CHATBRIDGE_GUILD_ID") {
        config.bot.guild_id = Some(guild);
    }
    if let Some(prefix) = var("CHATBRIDGE_PREFIX") {
        config.bot.prefix = prefix;
    }

    if let Some(path) = var("CHATBRIDGE_INPUT_FILE") {
        config.file.input_file = Some(PathBuf::from(path));
    }
    if let Some(path) = var("CHATBRIDGE_OUTPUT_FILE") {
        config.file.output_file = Some(PathBuf::from(path));
    }
    if var("CHATBRIDGE_FILE_ENABLED").is_some_and(|v| is_truthy(&v)) {
        config.file.enabled = true;
    }
    if var("CHATBRIDGE_STDIO_ENABLED").is_some_and(|v| is_truthy(&v)) {
        config.stdio.enabled = true;
    }

    if let Some(path) = var("CHATBRIDGE_SOCKET_PATH") {
        config.socket.socket_path = PathBuf::from(path);
    }
    if var("CHATBRIDGE_SOCKET_ENABLED").is_some_and(|v| is_truthy(&v)) {
        config.socket.enabled = true;
    }

    if let Some(dir) = var("CHATBRIDGE_SCRIPT_DIR") {
        config.service.script_directory = PathBuf::from(dir);
    }
    if var("CHATBRIDGE_SERVICE_ENABLED").is_some_and(|v| is_truthy(&v)) {
        config.service.enabled = true;
    }

    if let Some(level) = var("CHATBRIDGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(file) = var("CHATBRIDGE_LOG_FILE") {
        config.logging.file = Some(PathBuf::from(file));
    }
}

/// `true`, `1` and `yes` (any case) enable a flag; anything else is ignored.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest, secrecy::ExposeSecret, std::collections::HashMap};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn overrides_bot_and_paths() {
        let mut cfg = BridgeConfig::default();
        cfg.bot.channel_id = Some("from-file".into());
        apply_env_overrides_with(
            &mut cfg,
            env(&[
                ("CHATBRIDGE_BOT_TOKEN", "secret"),
                ("CHATBRIDGE_CHANNEL_ID", "from-env"),
                ("CHATBRIDGE_INPUT_FILE", "/tmp/in.txt"),
                ("CHATBRIDGE_SOCKET_PATH", "/tmp/x.sock"),
                ("CHATBRIDGE_SCRIPT_DIR", "/opt/scripts"),
                ("CHATBRIDGE_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(cfg.bot.token.unwrap().expose_secret(), "secret");
        assert_eq!(cfg.bot.channel_id.as_deref(), Some("from-env"));
        assert_eq!(cfg.file.input_file, Some(PathBuf::from("/tmp/in.txt")));
        assert_eq!(cfg.socket.socket_path, PathBuf::from("/tmp/x.sock"));
        assert_eq!(cfg.service.script_directory, PathBuf::from("/opt/scripts"));
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn empty_values_do_not_override() {
        let mut cfg = BridgeConfig::default();
        cfg.bot.channel_id = Some("keep".into());
        apply_env_overrides_with(&mut cfg, env(&[("CHATBRIDGE_CHANNEL_ID", "  ")]));
        assert_eq!(cfg.bot.channel_id.as_deref(), Some("keep"));
    }

    #[rstest]
    #[case("true", true)]
    #[case("YES", true)]
    #[case("1", true)]
    #[case("false", false)]
    #[case("0", false)]
    #[case("on", false)]
    fn enable_flags(#[case] raw: &str, #[case] enabled: bool) {
        let mut cfg = BridgeConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            env(&[
                ("CHATBRIDGE_SOCKET_ENABLED", raw),
                ("CHATBRIDGE_SERVICE_ENABLED", raw),
                ("CHATBRIDGE_FILE_ENABLED", raw),
            ]),
        );
        assert_eq!(cfg.socket.enabled, enabled);
        assert_eq!(cfg.service.enabled, enabled);
        assert_eq!(cfg.file.enabled, enabled);
    }
}
