use std::path::Path;

use {
    anyhow::{Result, bail},
    chatbridge_gateway::{Request, Response, socket_client},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum SocketAction {
    /// Post a message through a running bridge.
    Send {
        /// Message text (words are joined with spaces).
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Show the running bridge's status.
    Status,
    /// Print recent channel messages, newest first.
    Messages {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

pub async fn handle_socket(action: SocketAction, socket_path: &Path) -> Result<()> {
    let request = match action {
        SocketAction::Send { text } => Request::Send {
            content: text.join(" "),
        },
        SocketAction::Status => Request::Status,
        SocketAction::Messages { limit } => Request::GetMessages { limit },
    };

    match socket_client::request(socket_path, &request).await? {
        Response::Sent { success: true, .. } => println!("sent"),
        Response::Sent {
            success: false,
            message,
        } => bail!("send failed: {message}"),
        Response::Status {
            connected,
            running,
            channel,
            connections,
        } => {
            println!("connected:   {connected}");
            println!("running:     {running}");
            println!("channel:     {}", channel.as_deref().unwrap_or("(none)"));
            println!("connections: {connections}");
        },
        Response::Messages { messages } => {
            if messages.is_empty() {
                println!("No messages.");
            }
            for m in messages {
                println!(
                    "{} [{}] {}",
                    m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    m.author,
                    m.content
                );
            }
        },
        Response::Error { error } => bail!("bridge replied with an error: {error}"),
    }
    Ok(())
}
