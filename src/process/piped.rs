//! Fallback for hosts without a usable PTY: plain pipes on stdin.

use super::{AgentProcess, LaunchSpec, ProcessMode};
use crate::orchestrator::LoopEvent;
use crate::{Result, VigilError};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub struct PipedProcess {
    stdin: mpsc::UnboundedSender<String>,
    kill: Option<oneshot::Sender<()>>,
    pid: Option<u32>,
}

impl PipedProcess {
    pub fn spawn(spec: &LaunchSpec, exits: mpsc::UnboundedSender<LoopEvent>) -> Result<Self> {
        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VigilError::Launch("child has no stdin".to_string()))?;

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = stdin_rx.recv().await {
                if stdin.write_all(text.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let agent = spec.agent;
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let (success, code) = match status {
                Ok(status) => (status.success(), status.code()),
                Err(e) => {
                    debug!("Wait on agent {} failed: {}", agent, e);
                    (false, None)
                }
            };
            let _ = exits.send(LoopEvent::ProcessExited { agent, success, code });
        });

        Ok(Self {
            stdin: stdin_tx,
            kill: Some(kill_tx),
            pid,
        })
    }
}

impl AgentProcess for PipedProcess {
    fn submit(&mut self, text: &str) -> Result<()> {
        self.stdin
            .send(format!("{}\n", text))
            .map_err(|_| VigilError::Launch("agent stdin is closed".to_string()))
    }

    fn kill(&mut self) -> Result<()> {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        Ok(())
    }

    fn mode(&self) -> ProcessMode {
        ProcessMode::Piped
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}
