// ABOUTME: Interactive terminal bridge between the operator and the primary container
// ABOUTME: Raw-mode guard plus two byte pumps raced until the first one finishes

use crate::config::Settings;
use crate::engine::{ContainerEngine, EngineError, ExecChannel, ExecSpec};
use crate::error::TerminalError;
use futures::StreamExt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Controls the operator terminal's line discipline
pub trait TerminalMode: Send + Sync {
    fn is_raw(&self) -> io::Result<bool>;
    fn set_raw(&self, raw: bool) -> io::Result<()>;
}

/// The process's controlling terminal, via crossterm
pub struct CrosstermTerminal;

impl TerminalMode for CrosstermTerminal {
    fn is_raw(&self) -> io::Result<bool> {
        crossterm::terminal::is_raw_mode_enabled()
    }

    fn set_raw(&self, raw: bool) -> io::Result<()> {
        if raw {
            crossterm::terminal::enable_raw_mode()
        } else {
            crossterm::terminal::disable_raw_mode()
        }
    }
}

/// For input that is not a terminal (pipes, redirected files)
pub struct DetachedTerminal;

impl TerminalMode for DetachedTerminal {
    fn is_raw(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn set_raw(&self, _raw: bool) -> io::Result<()> {
        Ok(())
    }
}

/// Holds the terminal in raw mode and restores the prior mode when dropped
pub struct RawModeGuard<'a> {
    mode: &'a dyn TerminalMode,
    was_raw: bool,
}

impl<'a> RawModeGuard<'a> {
    pub fn enter(mode: &'a dyn TerminalMode) -> io::Result<Self> {
        let was_raw = mode.is_raw()?;
        if !was_raw {
            mode.set_raw(true)?;
        }
        Ok(Self { mode, was_raw })
    }
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        if !self.was_raw {
            if let Err(e) = self.mode.set_raw(false) {
                warn!("Failed to restore terminal mode: {}", e);
            }
        }
    }
}

pub struct TerminalBridge {
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
    mode: Arc<dyn TerminalMode>,
}

impl TerminalBridge {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        settings: Settings,
        mode: Arc<dyn TerminalMode>,
    ) -> Self {
        Self {
            engine,
            settings,
            mode,
        }
    }

    /// Run an interactive shell in the container until either direction ends
    ///
    /// The input pump half-closes the session when `stdin` reaches EOF. The
    /// pump that loses the race is dropped at its pending await.
    pub async fn attach<R, W>(
        &self,
        container_id: &str,
        mut stdin: R,
        mut stdout: W,
    ) -> Result<(), TerminalError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let _raw = RawModeGuard::enter(self.mode.as_ref()).map_err(TerminalError::RawMode)?;

        let spec = ExecSpec {
            command: vec![self.settings.shell.clone()],
            tty: true,
            attach_stdio: true,
        };
        let exec_id = self
            .engine
            .create_exec(container_id, &spec)
            .await
            .map_err(|source| TerminalError::ExecCreate {
                container_id: container_id.to_string(),
                source,
            })?;

        let ExecChannel {
            mut output,
            mut input,
        } = self
            .engine
            .attach_exec(&exec_id, spec.tty)
            .await
            .map_err(|source| TerminalError::Attach {
                exec_id: exec_id.clone(),
                source,
            })?;
        debug!("Attached to exec {} in {}", exec_id, container_id);

        let input_pump = async {
            let copied = tokio::io::copy(&mut stdin, &mut input)
                .await
                .map_err(TerminalError::InputPump)?;
            debug!("Operator input closed after {} bytes", copied);
            input.shutdown().await.map_err(TerminalError::InputPump)
        };

        let output_pump = async {
            while let Some(chunk) = output.next().await {
                let chunk = chunk.map_err(|e| {
                    TerminalError::OutputPump(match e {
                        EngineError::Io(e) => e,
                        other => io::Error::other(other),
                    })
                })?;
                stdout
                    .write_all(&chunk)
                    .await
                    .map_err(TerminalError::OutputPump)?;
                stdout.flush().await.map_err(TerminalError::OutputPump)?;
            }
            debug!("Session output closed");
            Ok(())
        };

        tokio::select! {
            result = input_pump => result,
            result = output_pump => result,
        }
    }
}
