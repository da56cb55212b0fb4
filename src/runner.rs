//! Narrow seam over external commands -- spawn, capture, enforce a deadline.
//!
//! Every tool wrapper goes through [`CommandRunner`] so tests can substitute
//! canned output instead of spawning real processes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, if the process terminated normally.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("'{program}' not found on PATH")]
    NotFound { program: String },

    #[error("'{program}' did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run an external program with arguments and capture stdout/stderr/exit code.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError>;
}

/// [`CommandRunner`] backed by the real OS process API.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        debug!(%program, ?args, ?timeout, "spawning external command");

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on deadline expiry must not leave the child behind.
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => {
                return Err(RunnerError::TimedOut {
                    program: program.to_string(),
                    timeout,
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RunnerError::NotFound {
                    program: program.to_string(),
                })
            }
            Ok(Err(e)) => {
                return Err(RunnerError::Launch {
                    program: program.to_string(),
                    source: e,
                })
            }
            Ok(Ok(out)) => out,
        };

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Check that a string is safe to hand to an external command as a target:
/// hostname or IP literal characters only, and nothing a tool could mistake
/// for a flag.
pub fn is_valid_target(target: &str) -> bool {
    if target.is_empty() || target.starts_with('-') {
        return false;
    }
    // Allow alphanumeric, dot, hyphen, colon (IPv6)
    target
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':')
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Canned-output runner for wrapper tests. Records every invocation.
    pub struct FakeRunner {
        pub status: Option<i32>,
        pub stdout: String,
        pub stderr: String,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeRunner {
        pub fn succeeding(stdout: &str) -> Self {
            Self {
                status: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(status: i32, stderr: &str) -> Self {
            Self {
                status: Some(status),
                stdout: String::new(),
                stderr: stderr.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<CommandOutput, RunnerError> {
            self.calls
                .lock()
                .expect("calls mutex")
                .push((program.to_string(), args.to_vec()));
            Ok(CommandOutput {
                status: self.status,
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
            })
        }
    }

    /// Runner that pretends the program is not installed.
    pub struct MissingRunner;

    #[async_trait]
    impl CommandRunner for MissingRunner {
        async fn run(
            &self,
            program: &str,
            _args: &[String],
            _timeout: Duration,
        ) -> Result<CommandOutput, RunnerError> {
            Err(RunnerError::NotFound {
                program: program.to_string(),
            })
        }
    }
}
