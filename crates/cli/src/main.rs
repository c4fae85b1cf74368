mod config_commands;
mod socket_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::{Context, bail},
    chatbridge_channels::LoopbackClient,
    chatbridge_config::{BridgeConfig, apply_env_overrides_with, discover_and_load},
    chatbridge_gateway::Supervisor,
    chatbridge_sandbox::CommandSandbox,
    clap::{Parser, Subcommand},
    secrecy::Secret,
    tracing::{info, warn},
    tracing_appender::{
        non_blocking::WorkerGuard,
        rolling::{RollingFileAppender, Rotation},
    },
    tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "chatbridge", about = "chatbridge: chat channel bridge and command runner")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (overrides discovery in ./, ~/.config/chatbridge/, /etc/chatbridge/).
    #[arg(long, global = true, env = "CHATBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Bot token.
    #[arg(long, global = true)]
    token: Option<String>,
    /// Channel every outbound message targets.
    #[arg(long, global = true)]
    channel_id: Option<String>,
    #[arg(long, global = true)]
    guild_id: Option<String>,
    /// Command prefix (default "!").
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Bridge stdin/stdout.
    #[arg(long, global = true)]
    stdin: bool,
    /// Watch this file and post its contents (enables the file adapter).
    #[arg(long, global = true)]
    file_input: Option<PathBuf>,
    /// Append inbound messages to this file (enables the file adapter).
    #[arg(long, global = true)]
    file_output: Option<PathBuf>,
    /// Serve the control socket at this path.
    #[arg(long, global = true)]
    socket_path: Option<PathBuf>,
    /// Run chat commands in the sandbox.
    #[arg(long, global = true)]
    service: bool,
    /// Script directory (enables the sandbox).
    #[arg(long, global = true)]
    script_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default when no subcommand is provided).
    Run,
    /// Run one sandbox command locally and print the reply.
    Exec {
        /// Command line, with or without the prefix.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Talk to a running bridge over its control socket.
    Socket {
        #[command(subcommand)]
        action: socket_commands::SocketAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

impl Cli {
    /// Layer command-line flags over an already env-overridden config.
    fn apply_to(&self, config: &mut BridgeConfig) {
        if let Some(token) = &self.token {
            config.bot.token = Some(Secret::new(token.clone()));
        }
        if let Some(channel) = &self.channel_id {
            config.bot.channel_id = Some(channel.clone());
        }
        if let Some(guild) = &self.guild_id {
            config.bot.guild_id = Some(guild.clone());
        }
        if let Some(prefix) = &self.prefix {
            config.bot.prefix = prefix.clone();
        }
        if self.stdin {
            config.stdio.enabled = true;
        }
        if let Some(path) = &self.file_input {
            config.file.input_file = Some(path.clone());
            config.file.enabled = true;
        }
        if let Some(path) = &self.file_output {
            config.file.output_file = Some(path.clone());
            config.file.enabled = true;
        }
        if let Some(path) = &self.socket_path {
            config.socket.socket_path = path.clone();
            config.socket.enabled = true;
        }
        if self.service {
            config.service.enabled = true;
        }
        if let Some(dir) = &self.script_dir {
            config.service.script_directory = dir.clone();
            config.service.enabled = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

/// Defaults < config file < `CHATBRIDGE_*` env < flags.
fn resolve_config(
    cli: &Cli,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<(BridgeConfig, Option<PathBuf>)> {
    let (mut config, source) = discover_and_load(cli.config.as_deref())?;
    apply_env_overrides_with(&mut config, lookup);
    cli.apply_to(&mut config);
    Ok((config, source))
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file writer on drop; keep it alive for
/// the whole process.
fn init_telemetry(
    level: &str,
    json: bool,
    log_file: Option<&Path>,
    max_log_files: usize,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let appender = rolling_appender(path, max_log_files)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer).boxed()),
                Some(guard),
            )
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Daily-rotated appender writing `<file>.<date>` next to `path`.
fn rolling_appender(path: &Path, max_log_files: usize) -> anyhow::Result<RollingFileAppender> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        bail!("log file {} has no usable file name", path.display());
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(name)
        .max_log_files(max_log_files.max(1))
        .build(dir)
        .with_context(|| format!("opening log file {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (config, source) = resolve_config(&cli, |name| std::env::var(name).ok())?;

    // `config` subcommands print their own diagnostics and skip telemetry.
    let command = match cli.command {
        Some(Commands::Config { action }) => {
            return config_commands::handle_config(action, &config, source.as_deref());
        },
        other => other,
    };

    let log_guard = init_telemetry(
        &config.logging.level,
        config.logging.json,
        config.logging.file.as_deref(),
        config.logging.max_log_files,
    )?;
    if let Some(path) = &source {
        info!(path = %path.display(), "loaded config");
    }

    match command {
        None | Some(Commands::Run) => {
            let stdio = config.stdio.enabled;
            let result = run(config).await;
            // The blocking stdin reader can outlive the runtime; flush the log
            // writer and exit explicitly.
            if stdio && result.is_ok() {
                drop(log_guard);
                std::process::exit(0);
            }
            result
        },
        Some(Commands::Exec { words }) => exec(config, &words.join(" ")).await,
        Some(Commands::Socket { action }) => {
            socket_commands::handle_socket(action, &config.socket.socket_path).await
        },
        Some(Commands::Config { .. }) => Ok(()),
    }
}

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let result = chatbridge_config::validate(&config);
    for d in result.warnings() {
        warn!(path = d.path, "{}", d.message);
    }
    if result.has_errors() {
        for d in result.errors() {
            eprintln!("{d}");
        }
        bail!("invalid configuration (run `chatbridge config check` for details)");
    }

    let client = Arc::new(LoopbackClient::new("chatbridge"));
    Supervisor::new(Arc::new(config), client).run().await?;
    Ok(())
}

async fn exec(config: BridgeConfig, line: &str) -> anyhow::Result<()> {
    let sandbox = CommandSandbox::new(config.service.clone(), config.bot.prefix.clone())?;
    sandbox.set_running(true);
    match sandbox.execute_direct(line).await {
        Some(reply) => {
            println!("{reply}");
            Ok(())
        },
        None => bail!("no command in {line:?}"),
    }
}
