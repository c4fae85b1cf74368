//! Client side of the control socket, used by the CLI's `socket` commands.

use std::{path::Path, time::Duration};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::UnixStream,
    },
};

use crate::protocol::{Request, Response};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Send one request and wait for its reply line.
pub async fn request(socket_path: &Path, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connecting to {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let mut reply = String::new();
    let read = tokio::time::timeout(
        REQUEST_TIMEOUT,
        BufReader::new(reader).read_line(&mut reply),
    )
    .await
    .context("timed out waiting for the bridge to reply")??;
    if read == 0 {
        bail!("bridge closed the connection without replying");
    }
    serde_json::from_str(reply.trim()).with_context(|| format!("unexpected reply: {}", reply.trim()))
}
