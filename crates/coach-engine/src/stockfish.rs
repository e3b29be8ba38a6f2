//! Line-based link to a UCI engine process (async I/O)

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::uci;

/// Outbound commands and inbound lines of one engine.
///
/// A spawned Stockfish process is driven by a reader task and a writer task;
/// tests build a link straight from channels and script the engine side.
pub struct EngineLink {
    commands: mpsc::UnboundedSender<String>,
    lines: mpsc::UnboundedReceiver<String>,
    process: Option<Child>,
}

impl EngineLink {
    /// Spawn the engine binary and wire its stdin/stdout to channels.
    pub fn spawn(path: &str) -> Result<Self, EngineError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Unavailable(format!("failed to spawn {path}: {e}")))?;

        let mut stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("failed to get engine stdin".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("failed to get engine stdout".into()))?;

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
        let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();

        // Writer: one command per line
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                if let Err(e) = stdin.write_all(format!("{cmd}\n").as_bytes()).await {
                    warn!(error = %e, "Failed to write to engine");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    warn!(error = %e, "Failed to flush engine stdin");
                    break;
                }
            }
        });

        // Reader: dropping `line_tx` on EOF tells the controller the engine is gone
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        debug!(line = trimmed, "SF >");
                        if line_tx.send(trimmed.to_string()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read from engine");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            commands: command_tx,
            lines: line_rx,
            process: Some(process),
        })
    }

    /// Link over plain channels, with no process behind it.
    pub fn from_channels(
        commands: mpsc::UnboundedSender<String>,
        lines: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            commands,
            lines,
            process: None,
        }
    }

    pub fn send(&self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.commands
            .send(cmd.to_string())
            .map_err(|_| EngineError::Io("engine input closed".into()))
    }

    /// Next line from the engine; `None` once the engine has gone away.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Ask the engine to quit, then make sure the process is gone.
    pub async fn terminate(mut self) {
        let _ = self.send(uci::QUIT);
        if let Some(mut process) = self.process.take() {
            if tokio::time::timeout(Duration::from_secs(1), process.wait())
                .await
                .is_err()
            {
                let _ = process.kill().await;
            }
        }
    }
}

impl Drop for EngineLink {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            let _ = process.start_kill();
        }
    }
}
