use std::path::{Path, PathBuf};

use {
    anyhow::{Result, bail},
    chatbridge_config::{BridgeConfig, Severity, validate},
    clap::Subcommand,
    secrecy::Secret,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (token redacted).
    Show,
    /// Validate the effective configuration and report errors/warnings.
    Check,
    /// Write a default configuration file.
    Init {
        /// Destination (defaults to ~/.config/chatbridge/chatbridge.toml).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config(
    action: ConfigAction,
    config: &BridgeConfig,
    source: Option<&Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => show(config, source),
        ConfigAction::Check => check(config, source),
        ConfigAction::Init { path, force } => init(path, force),
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn show(config: &BridgeConfig, source: Option<&Path>) -> Result<()> {
    let mut shown = config.clone();
    if shown.bot.token.is_some() {
        shown.bot.token = Some(Secret::new("[REDACTED]".to_string()));
    }
    match source {
        Some(path) => eprintln!("# loaded from {}", path.display()),
        None => eprintln!("# no config file found; defaults plus overrides"),
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

fn check(config: &BridgeConfig, source: Option<&Path>) -> Result<()> {
    match source {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let result = validate(config);
    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
    }

    let errors = result.errors().count();
    let warnings = result.warnings().count();
    if !result.diagnostics.is_empty() {
        eprintln!();
    }
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}

fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(chatbridge_config::default_config_path);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    chatbridge_config::save_config(&BridgeConfig::default(), &path)?;
    eprintln!("Wrote default configuration to {}", path.display());
    Ok(())
}
