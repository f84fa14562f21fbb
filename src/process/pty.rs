//! Agent CLI running in a pseudo-terminal

use super::buffer::RingBuffer;
use super::{AgentProcess, LaunchSpec, ProcessMode};
use crate::orchestrator::LoopEvent;
use crate::{Result, VigilError};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Bytes of terminal output kept for diagnostics.
const OUTPUT_HISTORY_BYTES: usize = 16 * 1024;

const BRACKETED_PASTE_START: &[u8] = b"\x1b[200~";
const BRACKETED_PASTE_END: &[u8] = b"\x1b[201~";

pub struct PtyProcess {
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
    output: Arc<Mutex<RingBuffer>>,
}

impl PtyProcess {
    /// Spawn the CLI in a fresh PTY.
    ///
    /// Two helper threads run until the child goes away: one drains terminal
    /// output into a ring buffer (a full PTY would block the CLI), the other
    /// waits on the child and reports the exit to the loop.
    pub fn spawn(spec: &LaunchSpec, exits: UnboundedSender<LoopEvent>) -> Result<Self> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows: 40,
            cols: 120,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system
            .openpty(size)
            .map_err(|e| VigilError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&spec.command);
        cmd.args(&spec.args);
        cmd.cwd(&spec.workdir);
        cmd.env("TERM", "xterm-256color");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| VigilError::Pty(e.to_string()))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| VigilError::Pty(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| VigilError::Pty(e.to_string()))?;
        let killer = child.clone_killer();
        let pid = child.process_id();

        let output = Arc::new(Mutex::new(RingBuffer::new(OUTPUT_HISTORY_BYTES)));
        let sink = output.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut history) = sink.lock() {
                            history.write(&buf[..n]);
                        }
                    }
                }
            }
        });

        let agent = spec.agent;
        std::thread::spawn(move || {
            let (success, code) = match child.wait() {
                Ok(status) => (status.success(), Some(status.exit_code() as i32)),
                Err(e) => {
                    debug!("Wait on agent {} failed: {}", agent, e);
                    (false, None)
                }
            };
            let _ = exits.send(LoopEvent::ProcessExited { agent, success, code });
        });

        Ok(Self {
            _master: pair.master,
            writer,
            killer,
            pid,
            output,
        })
    }
}

impl AgentProcess for PtyProcess {
    /// Type `text` into the terminal and press enter. Multi-line text goes
    /// in as a bracketed paste so the CLI doesn't submit each line.
    fn submit(&mut self, text: &str) -> Result<()> {
        let multiline = text.contains('\n');
        if multiline {
            self.writer.write_all(BRACKETED_PASTE_START)?;
        }
        self.writer.write_all(text.as_bytes())?;
        if multiline {
            self.writer.write_all(BRACKETED_PASTE_END)?;
        }
        self.writer.write_all(b"\r")?;
        self.writer.flush()?;
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.killer.kill()?;
        Ok(())
    }

    fn mode(&self) -> ProcessMode {
        ProcessMode::Pty
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn last_output_line(&self) -> Option<String> {
        self.output.lock().ok()?.last_line()
    }
}
