//! Reference-counted system sleep prevention.
//!
//! [`SleepPreventer::acquire`] returns a [`WakeGuard`]; the OS primitive is
//! engaged by the outermost acquisition and torn down when the last guard
//! drops, including during unwinding. A backend that cannot engage only logs
//! a warning: the session runs on without sleep prevention.

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use miette::Diagnostic;
use thiserror::Error;

/// Errors from engaging a sleep-prevention backend.
#[derive(Debug, Error, Diagnostic)]
pub enum AwakeError {
    #[error("sleep prevention is not supported on {platform}")]
    #[diagnostic(
        code(sleepwalker::awake::unsupported),
        help("The session continues, but the machine may sleep while it runs.")
    )]
    Unsupported { platform: String },

    #[error("failed to start {command}")]
    #[diagnostic(
        code(sleepwalker::awake::spawn),
        help("Ensure {command} is installed and on PATH.")
    )]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// The OS-facing half of sleep prevention.
pub trait WakeBackend: Send {
    fn engage(&mut self) -> Result<(), AwakeError>;

    fn release(&mut self);
}

/// Holds an inhibitor child process for as long as sleep is prevented.
///
/// macOS uses `caffeinate`, Linux uses `systemd-inhibit`.
#[derive(Debug, Default)]
pub struct ProcessWakeBackend {
    child: Option<Child>,
}

impl ProcessWakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn inhibitor_command() -> Result<Command, AwakeError> {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("caffeinate");
            cmd.arg("-dimsu")
                .arg("-w")
                .arg(std::process::id().to_string());
            Ok(cmd)
        } else if cfg!(target_os = "linux") {
            let mut cmd = Command::new("systemd-inhibit");
            cmd.args([
                "--what=idle:sleep",
                "--who=sleepwalker",
                "--why=Exploring and dreaming",
                "--mode=block",
                "sleep",
                "infinity",
            ]);
            Ok(cmd)
        } else {
            Err(AwakeError::Unsupported {
                platform: std::env::consts::OS.to_string(),
            })
        }
    }
}

impl WakeBackend for ProcessWakeBackend {
    fn engage(&mut self) -> Result<(), AwakeError> {
        if self.child.is_some() {
            return Ok(());
        }
        let mut cmd = Self::inhibitor_command()?;
        let program = cmd.get_program().to_string_lossy().into_owned();
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AwakeError::Spawn {
                command: program.clone(),
                source: e,
            })?;
        tracing::debug!(command = %program, pid = child.id(), "sleep inhibitor started");
        self.child = Some(child);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "sleep inhibitor already gone");
            }
            let _ = child.wait();
            tracing::debug!("sleep inhibitor stopped");
        }
    }
}

impl Drop for ProcessWakeBackend {
    fn drop(&mut self) {
        self.release();
    }
}

/// A backend that does nothing. Useful for tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWakeBackend;

impl WakeBackend for NoopWakeBackend {
    fn engage(&mut self) -> Result<(), AwakeError> {
        Ok(())
    }

    fn release(&mut self) {}
}

struct Inner {
    backend: Box<dyn WakeBackend>,
    depth: usize,
    activations: u64,
    engaged: bool,
}

/// Shared, nestable sleep prevention.
#[derive(Clone)]
pub struct SleepPreventer {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for SleepPreventer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SleepPreventer")
            .field("depth", &inner.depth)
            .field("activations", &inner.activations)
            .field("engaged", &inner.engaged)
            .finish()
    }
}

impl SleepPreventer {
    pub fn new(backend: Box<dyn WakeBackend>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                backend,
                depth: 0,
                activations: 0,
                engaged: false,
            })),
        }
    }

    /// Preventer using the platform inhibitor process.
    pub fn system() -> Self {
        Self::new(Box::new(ProcessWakeBackend::new()))
    }

    pub fn noop() -> Self {
        Self::new(Box::new(NoopWakeBackend))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enter a keep-awake scope. Only the outermost scope touches the backend.
    pub fn acquire(&self) -> WakeGuard {
        let mut inner = self.lock();
        inner.depth += 1;
        inner.activations += 1;
        if inner.depth == 1 {
            match inner.backend.engage() {
                Ok(()) => {
                    inner.engaged = true;
                    tracing::info!("sleep prevention active");
                }
                Err(e) => {
                    inner.engaged = false;
                    tracing::warn!(error = %e, "continuing without sleep prevention");
                }
            }
        }
        WakeGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Is any scope currently held?
    pub fn is_active(&self) -> bool {
        self.lock().depth > 0
    }

    /// Did the backend actually engage for the current outermost scope?
    pub fn is_engaged(&self) -> bool {
        self.lock().engaged
    }

    pub fn depth(&self) -> usize {
        self.lock().depth
    }

    /// Acquisitions made over the preventer's lifetime.
    pub fn activation_count(&self) -> u64 {
        self.lock().activations
    }
}

/// Releases its scope on drop.
#[must_use = "sleep prevention ends when the guard is dropped"]
pub struct WakeGuard {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for WakeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeGuard").finish_non_exhaustive()
    }
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.depth = inner.depth.saturating_sub(1);
        if inner.depth == 0 && inner.engaged {
            inner.backend.release();
            inner.engaged = false;
            tracing::info!("sleep prevention released");
        }
    }
}
