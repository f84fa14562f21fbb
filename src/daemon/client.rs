//! Client side of the daemon socket.

use crate::event::{AgentEvent, Command};
use crate::{Result, VigilError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::unix::OwnedWriteHalf;

/// Client for talking to the vigil daemon
pub struct DaemonClient {
    socket_path: PathBuf,
}

/// Events arriving on one connection.
pub struct EventStream {
    lines: Lines<BufReader<OwnedReadHalf>>,
    // the daemon drops a client whose write half closes
    _writer: OwnedWriteHalf,
}

impl EventStream {
    /// Next event, or `None` once the daemon hangs up. Lines that don't
    /// decode are skipped.
    pub async fn next_event(&mut self) -> Result<Option<AgentEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            match serde_json::from_str(&line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => tracing::debug!("Skipping undecodable event {:?}: {}", line, e),
            }
        }
        Ok(None)
    }
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path).await.map_err(|e| {
            VigilError::Daemon(format!(
                "cannot reach daemon at {}: {} (is `vigil serve` running?)",
                self.socket_path.display(),
                e
            ))
        })
    }

    /// Open a connection that receives every published event.
    pub async fn subscribe(&self) -> Result<EventStream> {
        let (reader, writer) = self.connect().await?.into_split();
        Ok(EventStream {
            lines: BufReader::new(reader).lines(),
            _writer: writer,
        })
    }

    /// Fire a command without waiting for anything back.
    pub async fn send(&self, command: &Command) -> Result<()> {
        let mut stream = self.connect().await?;
        write_command(&mut stream, command).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Send a command and wait for the first event `matches` accepts.
    /// `None` if nothing matched within `timeout`.
    pub async fn request<F>(
        &self,
        command: &Command,
        matches: F,
        timeout: Duration,
    ) -> Result<Option<AgentEvent>>
    where
        F: Fn(&AgentEvent) -> bool,
    {
        let (reader, mut writer) = self.connect().await?.into_split();
        write_command(&mut writer, command).await?;
        let mut stream = EventStream {
            lines: BufReader::new(reader).lines(),
            _writer: writer,
        };

        let wait = async {
            while let Some(event) = stream.next_event().await? {
                if matches(&event) {
                    return Ok(Some(event));
                }
            }
            Ok(None)
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }
}

async fn write_command<W: AsyncWriteExt + Unpin>(writer: &mut W, command: &Command) -> Result<()> {
    let mut line = serde_json::to_string(command)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
