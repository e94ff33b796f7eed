//! Utilities for running and checking external commands.
//!
//! Command strings from rule configuration are split into an argv with
//! `shlex` and exec'd directly; a rule that needs shell features writes
//! `sh -c '...'` into its own command template.
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A parsed command line: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Split a command string into program and arguments.
    ///
    /// # Errors
    /// Returns `Error::Shell` when the string cannot be tokenized or is empty.
    pub fn parse(script: &str) -> Result<Self, Error> {
        let mut parts = shlex::split(script)
            .ok_or_else(|| Error::Shell(script.to_string()))?
            .into_iter();
        let program = parts.next().ok_or_else(|| Error::Shell(script.to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// The captured output of a child process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Output {
    /// Standard output of the command.
    pub stdout: String,
    /// Standard error of the command.
    pub stderr: String,
    /// Exit code, absent when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl Output {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::Output> for Output {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into(),
            stderr: String::from_utf8_lossy(&output.stderr).into(),
            code: output.status.code(),
        }
    }
}

/// Errors that can occur when running external commands.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error while spawning or capturing the process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The process exited with a non-zero status code.
    #[error(
        "`{}` failed with code {}:\n--- stdout:\n{}\n--- stderr:\n{}",
        command,
        output.code.unwrap_or(1),
        output.stdout,
        output.stderr
    )]
    Failed {
        /// The command that was run.
        command: String,
        /// Captured output including exit code.
        output: Output,
    },

    /// The process did not finish within its deadline.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// The command that was run.
        command: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The surrounding run was cancelled while the process was in flight.
    #[error("`{command}` was cancelled")]
    Cancelled {
        /// The command that was run.
        command: String,
    },

    /// Failed to split the command string into shell tokens.
    #[error("failed to split command {0:?}")]
    Shell(String),
}

impl Error {
    /// The child process exit code, when this error carries one.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { output, .. } => output.code,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Captured output of the failed process, when present.
    #[must_use]
    pub fn output(&self) -> Option<&Output> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Execution context shared by every child process of a run.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Working directory the command runs in.
    pub working_dir: PathBuf,
    /// Per-command deadline; `None` when `--no-timeout` is in effect.
    pub timeout: Option<Duration>,
    /// Cancellation signal derived from the caller's lifetime.
    pub cancel: CancellationToken,
}

impl ExecContext {
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Context identical to this one except for the working directory.
    #[must_use]
    pub fn in_dir(&self, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout: self.timeout,
            cancel: self.cancel.clone(),
        }
    }
}

/// Seam for child-process execution.
///
/// The orchestrator is constructed with one implementation; tests substitute
/// a scripted fake.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute the command, capturing output and checking the exit status.
    ///
    /// # Errors
    /// `Error::Io` for spawn failures, `Error::Failed` for non-zero exits,
    /// `Error::Timeout` and `Error::Cancelled` for deadline and cancellation.
    async fn run(&self, command: &CommandLine, ctx: &ExecContext) -> Result<Output, Error>;
}

/// Runs commands as real child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandLine, ctx: &ExecContext) -> Result<Output, Error> {
        let mut child = tokio::process::Command::new(&command.program);
        child
            .args(&command.args)
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %command, dir = ?ctx.working_dir, "running");

        let output = run_with_deadline(child.output(), command, ctx).await?;
        check_exit_status(command, output)
    }
}

async fn run_with_deadline<F>(
    output: F,
    command: &CommandLine,
    ctx: &ExecContext,
) -> Result<std::process::Output, Error>
where
    F: std::future::Future<Output = std::io::Result<std::process::Output>>,
{
    let deadline = async {
        match ctx.timeout {
            Some(timeout) => tokio::time::timeout(timeout, output)
                .await
                .map_err(|_| Error::Timeout {
                    command: command.to_string(),
                    timeout,
                }),
            None => Ok(output.await),
        }
    };
    tokio::select! {
        () = ctx.cancel.cancelled() => Err(Error::Cancelled {
            command: command.to_string(),
        }),
        result = deadline => Ok(result??),
    }
}

/// Check that a process exited successfully, returning an error otherwise.
///
/// # Errors
/// Returns `Error::Failed` if the exit status indicates failure.
fn check_exit_status(command: &CommandLine, output: std::process::Output) -> Result<Output, Error> {
    let output = Output::from(output);
    if output.success() {
        Ok(output)
    } else {
        Err(Error::Failed {
            command: command.to_string(),
            output,
        })
    }
}

/// Scripted command runner shared by the crate's unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::{CommandLine, CommandRunner, Error, ExecContext, Output};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Pops canned results in call order; extra calls succeed with empty
    /// output.
    pub(crate) struct FakeRunner {
        pub(crate) calls: Mutex<Vec<String>>,
        results: Mutex<Vec<Result<Output, Error>>>,
    }

    impl FakeRunner {
        pub(crate) fn new(results: Vec<Result<Output, Error>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                results: Mutex::new(results),
            }
        }

        pub(crate) fn stdout(stdout: &str) -> Result<Output, Error> {
            Ok(Output {
                stdout: stdout.to_string(),
                stderr: String::new(),
                code: Some(0),
            })
        }

        pub(crate) fn failure(command: &str, code: i32) -> Result<Output, Error> {
            Err(Error::Failed {
                command: command.to_string(),
                output: Output {
                    stdout: String::new(),
                    stderr: "boom".to_string(),
                    code: Some(code),
                },
            })
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, command: &CommandLine, _ctx: &ExecContext) -> Result<Output, Error> {
            self.calls.lock().unwrap().push(command.to_string());
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                return Ok(Output {
                    code: Some(0),
                    ..Output::default()
                });
            }
            results.remove(0)
        }
    }
}
