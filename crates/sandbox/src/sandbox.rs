use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    chatbridge_channels::ChatClient,
    chatbridge_common::Message,
    chatbridge_config::ServiceConfig,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    command::{self, ParsedCommand},
    context::InvocationContext,
    error::{Error, Result},
    exec::{ExecOpts, ExecResult, run_bounded},
    registry::ScriptRegistry,
};

const BUILTINS: &[(&str, &str)] = &[
    ("help", "Show this help message"),
    ("list", "List available scripts"),
    ("status", "Show bridge status"),
    ("reload", "Rescan the script directory"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Script,
    Command,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Self::Script => "Script",
            Self::Command => "Command",
        }
    }
}

/// Runs prefixed chat commands against an allow-list, a script directory and
/// a handful of built-ins.
///
/// Every outcome is rendered as reply text; nothing here fails the caller.
pub struct CommandSandbox {
    config: ServiceConfig,
    prefix: String,
    registry: ScriptRegistry,
    client: Option<Arc<dyn ChatClient>>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl CommandSandbox {
    /// Build a sandbox and load the script directory.
    pub fn new(config: ServiceConfig, prefix: impl Into<String>) -> Result<Self> {
        let registry = ScriptRegistry::open(&config.script_directory)?;
        Ok(Self {
            config,
            prefix: prefix.into(),
            registry,
            client: None,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Chat client whose connectivity `status` reports.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Token that kills in-flight executions when cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Handle an inbound chat message. `None` when it is not a command.
    pub async fn handle_message(&self, message: &Message) -> Option<String> {
        self.handle_line(&message.content, &InvocationContext::from_message(message))
            .await
    }

    pub async fn handle_line(&self, line: &str, ctx: &InvocationContext) -> Option<String> {
        let ParsedCommand { name, args } = command::parse(line, &self.prefix)?;
        Some(self.execute(&name, &args, ctx).await)
    }

    /// Run a command line that did not come from chat. The prefix is optional.
    pub async fn execute_direct(&self, line: &str) -> Option<String> {
        let line = line.trim();
        let line = if line.starts_with(&self.prefix) {
            line.to_string()
        } else {
            format!("{}{line}", self.prefix)
        };
        let ctx = InvocationContext::direct(line.clone());
        self.handle_line(&line, &ctx).await
    }

    /// Run a registered script by name, bypassing the parser.
    pub async fn execute_script_direct(&self, name: &str, args: &[String]) -> String {
        let Some(path) = self.registry.get(name) else {
            return format!("Script '{name}' not found");
        };
        let content = std::iter::once(name.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        let ctx = InvocationContext::direct(content);
        self.run(Kind::Script, name, &path, args, &ctx).await
    }

    /// Authorize and dispatch one parsed command.
    pub async fn execute(&self, name: &str, args: &[String], ctx: &InvocationContext) -> String {
        if let Some(reply) = self.builtin(name).await {
            return reply;
        }

        // Resolve against one snapshot so a concurrent reload cannot change
        // the path mid-execution.
        let scripts = self.registry.snapshot();
        if let Some(path) = scripts.get(name) {
            return self.run(Kind::Script, name, path, args, ctx).await;
        }

        if !self.config.allowed_commands.iter().any(|c| c == name) {
            info!(command = name, author = %ctx.author, "command rejected");
            return format!("Command '{name}' not allowed");
        }

        match resolve_system_command(name) {
            Ok(path) => self.run(Kind::Command, name, &path, args, ctx).await,
            Err(e) => {
                warn!(command = name, error = %e, "allowed command unavailable");
                format!("Error executing {name}: {e}")
            },
        }
    }

    async fn run(
        &self,
        kind: Kind,
        name: &str,
        program: &Path,
        args: &[String],
        ctx: &InvocationContext,
    ) -> String {
        info!(
            kind = kind.label(),
            command = name,
            author = %ctx.author,
            args = args.len(),
            "executing"
        );
        let opts = ExecOpts {
            timeout: Duration::from_millis(self.config.max_execution_time_ms),
            max_output_bytes: self.config.max_output_bytes,
            working_dir: Some(self.config.working_directory.clone()),
            env: ctx.env(args),
        };
        match run_bounded(program, args, &opts, Some(&self.cancel)).await {
            Ok(result) => self.render(kind, name, &result),
            Err(e) => {
                warn!(command = name, error = %e, "execution failed to start");
                format!("Error executing {name}: {e}")
            },
        }
    }

    fn render(&self, kind: Kind, name: &str, result: &ExecResult) -> String {
        if result.timed_out {
            return format!(
                "{name} timed out after {}ms",
                self.config.max_execution_time_ms
            );
        }
        if result.cancelled {
            return format!("{name} was cancelled during shutdown");
        }

        let stdout = result.stdout.trim();
        let stderr = result.stderr.trim();
        match result.exit_code {
            Some(0) if stdout.is_empty() => format!("{} executed successfully", kind.label()),
            Some(0) => stdout.to_string(),
            code => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                let detail = if stderr.is_empty() {
                    stdout
                } else {
                    stderr
                };
                format!("{} failed (exit code {code}):\n{detail}", kind.label())
            },
        }
    }

    async fn builtin(&self, name: &str) -> Option<String> {
        let reply = match name {
            "help" => self.help(),
            "list" => self.list(),
            "status" => self.status(),
            "reload" => match self.registry.reload().await {
                Ok(count) => format!("Scripts reloaded ({count} available)"),
                Err(e) => {
                    warn!(error = %e, "script reload failed");
                    format!("Reload failed: {e}")
                },
            },
            _ => return None,
        };
        debug!(builtin = name, "builtin handled");
        Some(reply)
    }

    fn help(&self) -> String {
        let mut out = String::from("Available commands:\n");
        for (name, about) in BUILTINS {
            let _ = writeln!(out, "  {}{name} - {about}", self.prefix);
        }

        out.push_str("\nAllowed system commands:\n");
        if self.config.allowed_commands.is_empty() {
            out.push_str("  (none)\n");
        } else {
            let _ = writeln!(out, "  {}", self.config.allowed_commands.join(", "));
        }

        out.push_str("\nScripts:\n");
        let scripts = self.registry.snapshot();
        if scripts.is_empty() {
            out.push_str("  No scripts available");
        } else {
            let names: Vec<_> = scripts.keys().map(|n| format!("  {n}")).collect();
            out.push_str(&names.join("\n"));
        }
        out
    }

    fn list(&self) -> String {
        let scripts = self.registry.snapshot();
        if scripts.is_empty() {
            return "No scripts available".into();
        }
        let lines: Vec<_> = scripts
            .iter()
            .map(|(name, path)| format!("  {name} ({})", path.display()))
            .collect();
        format!("Available scripts:\n{}", lines.join("\n"))
    }

    fn status(&self) -> String {
        let connected = self.client.as_ref().is_some_and(|c| c.is_connected());
        [
            format!("Bot connected: {connected}"),
            format!("Service running: {}", self.is_running()),
            format!("Scripts loaded: {}", self.registry.len()),
            format!(
                "Working directory: {}",
                self.config.working_directory.display()
            ),
            format!("Max execution time: {}ms", self.config.max_execution_time_ms),
        ]
        .join("\n")
    }
}

fn resolve_system_command(name: &str) -> Result<PathBuf> {
    // An allow-listed name containing a slash is taken as a path.
    if name.contains('/') {
        return Ok(PathBuf::from(name));
    }
    which::which(name).map_err(|_| Error::NotOnPath {
        name: name.to_string(),
    })
}
