//! Daemon: the orchestrator behind a Unix socket
//!
//! Clients speak newline-delimited JSON. Each line a client writes is a
//! [`Command`]; every [`AgentEvent`] the orchestrator publishes is written
//! to every connected client.
//!
//! ```text
//! ┌─────────────────┐   commands   ┌─────────────────┐  LoopEvent  ┌──────────────┐
//! │  CLI / UI       │─────────────►│     Daemon      │────────────►│ Orchestrator │
//! │  (client)       │◄─────────────│  (per-client    │◄────────────│   (loop)     │
//! └─────────────────┘    events    │    tasks)       │  broadcast  └──────────────┘
//!                                  └─────────────────┘
//! ```

mod client;

pub use client::DaemonClient;

use crate::event::{AgentEvent, Command};
use crate::orchestrator::OrchestratorHandle;
use crate::{Result, VigilError};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Directory under the home directory holding vigil's runtime files.
const VIGIL_DIR: &str = ".vigil";
const SOCKET_NAME: &str = "vigil.sock";

/// `~/.vigil/vigil.sock`, creating `~/.vigil` if necessary.
pub fn default_socket_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        VigilError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        ))
    })?;
    let dir = home.join(VIGIL_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(SOCKET_NAME))
}

/// The vigil daemon server
pub struct Daemon {
    handle: OrchestratorHandle,
    socket_path: PathBuf,
}

impl Daemon {
    pub fn new(socket_path: PathBuf, handle: OrchestratorHandle) -> Self {
        Self { handle, socket_path }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one.
    pub fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .map_err(|e| VigilError::Daemon(e.to_string()))?;
        }
        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| VigilError::Daemon(e.to_string()))?;
        info!("Daemon listening on {:?}", self.socket_path);
        Ok(listener)
    }

    /// Accept clients until the task is dropped.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: UnixListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let handle = self.handle.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handle).await {
                            error!("Client handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Serve one client: forward its command lines to the loop and stream
/// published events back. A line that doesn't parse gets an `error` event
/// sent to that client only.
async fn handle_client(stream: UnixStream, handle: OrchestratorHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut events = handle.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<AgentEvent>();
    debug!("Client connected");

    let forward = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Client fell behind; skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(event) = reply_rx.recv() => event,
            };
            let Ok(mut line) = serde_json::to_string(&event) else {
                continue;
            };
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle.send(command)?,
            Err(e) => {
                debug!("Rejected client line {:?}: {}", line, e);
                let _ = reply_tx.send(AgentEvent::Error {
                    message: format!("Invalid command: {}", e),
                });
            }
        }
    }

    debug!("Client disconnected");
    forward.abort();
    Ok(())
}
