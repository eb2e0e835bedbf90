//! External command execution.
//!
//! Every adapter talks to its batch system through a [`CommandRunner`].
//! [`SystemRunner`] starts real processes with `tokio::process`;
//! [`MockRunner`] replays scripted output so adapters can be tested without
//! a cluster.

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::process::Command;
use tracing::debug;

use crate::error::{SchedError, SchedResult};

/// A program and its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `flag value`.
    pub fn opt(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Split a command vector (program first) into an invocation.
    pub fn from_argv(argv: &[String]) -> SchedResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SchedError::InvalidArguments("no command given".to_string()))?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(line) => f.write_str(&line),
            Err(_) => write!(f, "{} {}", self.program, self.args.join(" ")),
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful run printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed run with exit `code` printing `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Replace stderr.
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, for tools whose messages land on either.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut text = self.stdout.clone();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&self.stderr);
                text
            }
        }
    }

    /// Turn a non-zero exit into [`SchedError::CommandFailed`].
    pub fn check(self, invocation: &Invocation) -> SchedResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(self.into_error(invocation))
        }
    }

    /// Describe this (failed) output as an error.
    pub fn into_error(self, invocation: &Invocation) -> SchedError {
        SchedError::CommandFailed {
            command: invocation.to_string(),
            code: self.code,
            output: self.combined(),
        }
    }
}

/// Files a detached process writes its standard streams to.
#[derive(Debug)]
pub struct Capture {
    pub stdout: File,
    pub stderr: File,
}

/// Runs external commands on behalf of an adapter.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with stdout and stderr captured.
    ///
    /// A non-zero exit is returned as data; only failure to start the
    /// program is an error.
    async fn output(&self, invocation: &Invocation) -> SchedResult<CommandOutput>;

    /// Run to completion with the caller's stdio attached; returns the exit code.
    async fn run_attached(&self, invocation: &Invocation) -> SchedResult<Option<i32>>;

    /// Start in its own process group without waiting; returns the pid.
    async fn spawn_detached(
        &self,
        invocation: &Invocation,
        capture: Option<Capture>,
    ) -> SchedResult<u32>;
}

/// Run `invocation` attached to the caller's stdio and fail on a non-zero exit.
pub async fn run_checked(runner: &dyn CommandRunner, invocation: &Invocation) -> SchedResult<()> {
    match runner.run_attached(invocation).await? {
        Some(0) => Ok(()),
        code => Err(SchedError::CommandFailed {
            command: invocation.to_string(),
            code,
            output: String::new(),
        }),
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        command
    }

    fn launch_error(invocation: &Invocation, source: std::io::Error) -> SchedError {
        SchedError::Launch {
            command: invocation.to_string(),
            source,
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, invocation: &Invocation) -> SchedResult<CommandOutput> {
        debug!(command = %invocation, "running");
        let output = Self::command(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Self::launch_error(invocation, e))?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(command = %invocation, code = ?output.code, "finished");
        Ok(output)
    }

    async fn run_attached(&self, invocation: &Invocation) -> SchedResult<Option<i32>> {
        debug!(command = %invocation, "running attached");
        let status = Self::command(invocation)
            .status()
            .await
            .map_err(|e| Self::launch_error(invocation, e))?;
        Ok(status.code())
    }

    async fn spawn_detached(
        &self,
        invocation: &Invocation,
        capture: Option<Capture>,
    ) -> SchedResult<u32> {
        let mut command = Self::command(invocation);
        command.stdin(Stdio::null());
        if let Some(capture) = capture {
            command
                .stdout(Stdio::from(capture.stdout))
                .stderr(Stdio::from(capture.stderr));
        }
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| Self::launch_error(invocation, e))?;
        let pid = child.id().ok_or_else(|| {
            Self::launch_error(
                invocation,
                std::io::Error::other("process exited before its pid was read"),
            )
        })?;
        debug!(command = %invocation, pid, "spawned detached");
        Ok(pid)
    }
}

/// Replays scripted output and records every invocation.
///
/// Responses are queued per program name and consumed in order. A program
/// with no queued response succeeds with empty output.
#[derive(Debug)]
pub struct MockRunner {
    responses: Mutex<FxHashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<Invocation>>,
    next_pid: AtomicU32,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(FxHashMap::default()),
            calls: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(4000),
        }
    }

    /// Queue a response for the next call of `program`.
    pub fn respond(self, program: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(program.to_string())
            .or_default()
            .push_back(output);
        self
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent invocation, if any.
    pub fn last_call(&self) -> Option<Invocation> {
        self.calls().pop()
    }

    fn record(&self, invocation: &Invocation) -> CommandOutput {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&invocation.program)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn output(&self, invocation: &Invocation) -> SchedResult<CommandOutput> {
        Ok(self.record(invocation))
    }

    async fn run_attached(&self, invocation: &Invocation) -> SchedResult<Option<i32>> {
        Ok(self.record(invocation).code)
    }

    async fn spawn_detached(
        &self,
        invocation: &Invocation,
        _capture: Option<Capture>,
    ) -> SchedResult<u32> {
        self.record(invocation);
        Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display_quotes() {
        let inv = Invocation::new("bsub").opt("-J", "my job").arg("run.sh");
        assert_eq!(inv.to_string(), "bsub -J 'my job' run.sh");
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput::ok("a").with_stderr("b\n");
        assert_eq!(out.combined(), "a\nb\n");
        assert_eq!(CommandOutput::failed(1, "oops").combined(), "oops");
    }

    #[test]
    fn test_check_failure() {
        let inv = Invocation::new("qstat").arg("-Q");
        let err = CommandOutput::failed(2, "no server").check(&inv).unwrap_err();
        match err {
            SchedError::CommandFailed { command, code, output } => {
                assert_eq!(command, "qstat -Q");
                assert_eq!(code, Some(2));
                assert_eq!(output, "no server");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mock_runner_queue() {
        let runner = MockRunner::new()
            .respond("qstat", CommandOutput::ok("first"))
            .respond("qstat", CommandOutput::failed(1, "second"));

        let inv = Invocation::new("qstat");
        assert_eq!(runner.output(&inv).await.unwrap().stdout, "first");
        assert_eq!(runner.output(&inv).await.unwrap().stderr, "second");
        assert!(runner.output(&inv).await.unwrap().success());
        assert_eq!(runner.calls().len(), 3);

        let a = runner.spawn_detached(&inv, None).await.unwrap();
        let b = runner.spawn_detached(&inv, None).await.unwrap();
        assert_eq!(b, a + 1);
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let inv = Invocation::new("/nonexistent/sitecluster-test-binary");
        let err = SystemRunner.output(&inv).await.unwrap_err();
        assert!(matches!(err, SchedError::Launch { .. }));
    }
}
