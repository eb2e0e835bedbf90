//! Scheduler-neutral job types: submission requests, canonical states and
//! kill outcomes.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::depend;
use crate::error::{SchedError, SchedResult};

/// Canonical job state shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Queued, held for a start time, or waiting on dependencies.
    Pending,
    /// Executing (including staging and completing phases).
    Running,
    /// Held or stopped after it was eligible to run.
    Suspended,
    /// Finished, successfully or not.
    Completed,
    /// The backend has no record of the identifier.
    #[serde(rename = "UNKNOWNID")]
    UnknownId,
}

impl JobState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Completed => "COMPLETED",
            JobState::UnknownId => "UNKNOWNID",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::UnknownId)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a status query.
///
/// The exit code is present if and only if the state is
/// [`JobState::Completed`] and the caller asked for it. Constructors
/// enforce this; there is no way to build a status that violates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    state: JobState,
    exit_code: Option<i32>,
}

impl JobStatus {
    /// Build a status report.
    ///
    /// `exit_code` is what the backend could recover, if anything. It is
    /// dropped unless the job completed and `with_exit` is set, and defaults
    /// to `0` when the job completed but nothing was recovered.
    pub fn report(state: JobState, exit_code: Option<i32>, with_exit: bool) -> Self {
        let exit_code = if with_exit && state == JobState::Completed {
            Some(exit_code.unwrap_or(0))
        } else {
            None
        };
        Self { state, exit_code }
    }

    /// Status without an exit code.
    pub fn state_only(state: JobState) -> Self {
        Self {
            state,
            exit_code: None,
        }
    }

    /// The identifier is unknown to the backend.
    pub fn unknown() -> Self {
        Self::state_only(JobState::UnknownId)
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} {}", self.state, code),
            None => write!(f, "{}", self.state),
        }
    }
}

/// Aggregate result of a kill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Every identifier was signalled, already gone, or unknown.
    Success,
    /// At least one identifier produced an unrecognized response.
    Failed,
}

impl KillOutcome {
    /// Numeric result code printed by the `kill` command.
    pub fn code(&self) -> i32 {
        match self {
            KillOutcome::Success => 0,
            KillOutcome::Failed => 1,
        }
    }

    /// Fold per-identifier verdicts into one outcome.
    pub fn from_verdicts(verdicts: impl IntoIterator<Item = bool>) -> Self {
        if verdicts.into_iter().all(|ok| ok) {
            KillOutcome::Success
        } else {
            KillOutcome::Failed
        }
    }
}

/// A scheduler-neutral job submission.
///
/// Built once per invocation with the `with_*` methods. Empty strings are
/// treated as absent by every backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitRequest {
    queue: Option<String>,
    nodes: Option<NonZeroU32>,
    threads: Option<NonZeroU32>,
    memory: Option<String>,
    job_name: Option<String>,
    email: Option<String>,
    at_time: Option<String>,
    end_time: Option<String>,
    after: Vec<String>,
    start_node: Option<usize>,
    user: Option<String>,
    project: Option<String>,
    group: Option<String>,
    custom_args: Vec<String>,
    command: Vec<String>,
}

impl SubmitRequest {
    /// Create a request that runs `command` (program followed by arguments).
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_nodes(mut self, nodes: NonZeroU32) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn with_threads(mut self, threads: NonZeroU32) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Memory limit in the backend's own unit syntax.
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }

    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    /// Notification addresses, `user[@host][,user[@host],...]`.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_at_time(mut self, at: impl Into<String>) -> Self {
        self.at_time = Some(at.into());
        self
    }

    pub fn with_end_time(mut self, end: impl Into<String>) -> Self {
        self.end_time = Some(end.into());
        self
    }

    /// Jobs that must finish before this one starts.
    pub fn with_after<I, S>(mut self, job_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = job_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a dependency list literal such as `['12', '13']`.
    pub fn with_after_literal(self, literal: &str) -> SchedResult<Self> {
        let ids = depend::parse_job_list(literal)?;
        Ok(self.with_after(ids))
    }

    /// Redirect the submission into a sub-node launch within the current job.
    pub fn with_start_node(mut self, index: usize) -> Self {
        self.start_node = Some(index);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Append one raw custom-arguments entry. Repeated calls accumulate.
    pub fn with_custom_args(mut self, entry: impl Into<String>) -> Self {
        self.custom_args.push(entry.into());
        self
    }

    pub fn queue(&self) -> Option<&str> {
        present(&self.queue)
    }

    pub fn nodes(&self) -> Option<NonZeroU32> {
        self.nodes
    }

    pub fn threads(&self) -> Option<NonZeroU32> {
        self.threads
    }

    pub fn memory(&self) -> Option<&str> {
        present(&self.memory)
    }

    pub fn job_name(&self) -> Option<&str> {
        present(&self.job_name)
    }

    pub fn email(&self) -> Option<&str> {
        present(&self.email)
    }

    pub fn at_time(&self) -> Option<&str> {
        present(&self.at_time)
    }

    pub fn end_time(&self) -> Option<&str> {
        present(&self.end_time)
    }

    pub fn after(&self) -> &[String] {
        &self.after
    }

    pub fn start_node(&self) -> Option<usize> {
        self.start_node
    }

    pub fn user(&self) -> Option<&str> {
        present(&self.user)
    }

    pub fn project(&self) -> Option<&str> {
        present(&self.project)
    }

    pub fn group(&self) -> Option<&str> {
        present(&self.group)
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Split every custom-arguments entry into tokens, in order.
    ///
    /// Quotes group words but no expansion (globs, variables) happens.
    pub fn custom_tokens(&self) -> SchedResult<Vec<String>> {
        let mut tokens = Vec::new();
        for entry in &self.custom_args {
            let split = shlex::split(entry)
                .ok_or_else(|| SchedError::InvalidArguments(format!("unbalanced quotes in `{entry}`")))?;
            tokens.extend(split);
        }
        Ok(tokens)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
