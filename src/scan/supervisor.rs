//! Consumer process lifecycle
//!
//! The consumer (`fastcci_build_db` by default) is started before any query
//! runs, reads TSV on stdin until EOF, and then builds its database. Its own
//! stdout and stderr are routed to our stderr so they never mix with data.

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::error::{ConsumerError, Result};

/// Lifecycle state of the consumer process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    NotStarted,
    Running,
    Terminating,
    Exited(i32),
}

/// Owns the consumer process from spawn to exit
pub struct ChildSupervisor {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
    state: ChildState,
}

impl ChildSupervisor {
    pub fn new(config: &ConsumerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            child: None,
            state: ChildState::NotStarted,
        }
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start the consumer and hand back its stdin
    ///
    /// A missing executable maps to [`ConsumerError::NotFound`].
    pub fn spawn(&mut self) -> Result<ChildStdin> {
        if self.state != ChildState::NotStarted {
            return Err(ConsumerError::SpawnFailed {
                program: self.program.clone(),
                source: std::io::Error::other("consumer already started"),
            }
            .into());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConsumerError::NotFound(self.program.clone()),
                _ => ConsumerError::SpawnFailed {
                    program: self.program.clone(),
                    source: e,
                },
            })?;

        let stdin = child.stdin.take().ok_or_else(|| ConsumerError::SpawnFailed {
            program: self.program.clone(),
            source: std::io::Error::other("stdin was not captured"),
        })?;

        info!("Started {} (pid {:?})", self.program, child.id());
        self.child = Some(child);
        self.state = ChildState::Running;
        Ok(stdin)
    }

    /// Ask the consumer to stop right away
    ///
    /// Best effort and idempotent: does nothing unless the process is running.
    pub fn terminate(&mut self) {
        if self.state != ChildState::Running {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            match child.start_kill() {
                Ok(()) => warn!("Terminating {}", self.program),
                Err(e) => debug!("Kill of {} failed (already gone?): {}", self.program, e),
            }
        }
        self.state = ChildState::Terminating;
    }

    /// Wait for the consumer to exit and return its exit code
    ///
    /// Expects the consumer's stdin to be closed already, otherwise a
    /// running consumer waits for more input forever.
    pub async fn wait(&mut self) -> Result<i32> {
        if let ChildState::Exited(code) = self.state {
            return Ok(code);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(0);
        };

        let status = child.wait().await?;
        let code = exit_code(status);
        debug!("{} exited with {}", self.program, code);
        self.child = None;
        self.state = ChildState::Exited(code);
        Ok(code)
    }
}

/// Exit code of a finished process; signal deaths map to 128 + signal
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
