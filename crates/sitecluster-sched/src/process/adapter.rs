//! Local process adapter.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::config::BackendKind;
use crate::context::ExecContext;
use crate::error::SchedResult;
use crate::job::{JobStatus, KillOutcome, SubmitRequest};
use crate::nodes::check_index;
use crate::process::parser;
use crate::runner::{Capture, CommandRunner, Invocation};
use crate::scan;

/// The only queue of the local backend.
pub const LOCAL_QUEUE: &str = "run_local_process";

/// Runs jobs as detached processes on this host.
pub struct ProcessCluster {
    ctx: ExecContext,
    runner: Arc<dyn CommandRunner>,
}

impl ProcessCluster {
    pub fn new(ctx: ExecContext, runner: Arc<dyn CommandRunner>) -> Self {
        Self { ctx, runner }
    }

    /// Move an anonymous capture file to its per-pid name.
    ///
    /// The rename keeps the inode the child writes to and replaces a file
    /// left behind by an earlier process with the same pid.
    async fn publish(&self, file: NamedTempFile, stream: &str, pid: u32) -> SchedResult<()> {
        let target = self.ctx.work_dir().join(format!("{stream}.{pid}.txt"));
        file.persist(&target).map_err(|e| e.error)?;
        share_readable(&target).await?;
        debug!(path = %target.display(), "published capture file");
        Ok(())
    }
}

/// Parse a job identifier into a pid that `kill` may signal.
///
/// Zero and negative values address process groups, so only positive
/// decimal pids are accepted.
fn signalable_pid(job_id: &str) -> Option<u32> {
    let id = job_id.trim();
    if !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok().filter(|&pid| pid > 0 && i32::try_from(pid).is_ok())
}

/// Add group and other read permission.
#[cfg(unix)]
async fn share_readable(path: &Path) -> SchedResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_mode(permissions.mode() | 0o044);
    tokio::fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn share_readable(_path: &Path) -> SchedResult<()> {
    Ok(())
}

#[async_trait]
impl Cluster for ProcessCluster {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn queues(&self) -> SchedResult<Vec<String>> {
        Ok(vec![LOCAL_QUEUE.to_string()])
    }

    async fn submit_job(&self, request: &SubmitRequest) -> SchedResult<String> {
        let invocation = Invocation::from_argv(request.command())?;

        let stdout = NamedTempFile::new_in(self.ctx.work_dir())?;
        let stderr = NamedTempFile::new_in(self.ctx.work_dir())?;
        let capture = Capture {
            stdout: stdout.as_file().try_clone()?,
            stderr: stderr.as_file().try_clone()?,
        };

        let pid = self.runner.spawn_detached(&invocation, Some(capture)).await?;

        // The process is running; a capture file we cannot publish must not
        // turn into a failed submission.
        for (file, stream) in [(stdout, "stdout"), (stderr, "stderr")] {
            if let Err(e) = self.publish(file, stream, pid).await {
                warn!(pid, stream, error = %e, "could not publish capture file");
            }
        }
        Ok(pid.to_string())
    }

    async fn status(&self, job_id: &str, with_exit: bool) -> SchedResult<JobStatus> {
        let Some(pid) = signalable_pid(job_id) else {
            debug!(job_id, "not a process id");
            return Ok(JobStatus::unknown());
        };
        let pid = pid.to_string();

        let ps = Invocation::new("ps").args(["--no-headers", "-o", "pid,state", "--pid", &pid]);
        // ps exits non-zero when the pid is gone, which is a normal answer here.
        let output = self.runner.output(&ps).await?;

        let letter = parser::parse_process_state(&output.combined(), &pid);
        debug!(pid = %pid, state = ?letter, "ps state");
        Ok(JobStatus::report(parser::map_state(letter.as_deref()), Some(0), with_exit))
    }

    async fn kill(&self, job_ids: &[String]) -> SchedResult<KillOutcome> {
        let mut pids = Vec::new();
        let mut invalid = 0usize;
        for id in job_ids {
            match signalable_pid(id) {
                Some(pid) => pids.push(pid.to_string()),
                None => {
                    warn!(job_id = %id, "not a process id, cannot kill");
                    invalid += 1;
                }
            }
        }

        let signalled = if pids.is_empty() {
            KillOutcome::Success
        } else {
            let kill = Invocation::new("kill").arg("-KILL").args(pids.iter().cloned());
            let output = self.runner.output(&kill).await?;
            // kill is silent for processes it signals.
            scan::kill_result(output, &kill, &pids, false, parser::kill_accepted)?
        };

        Ok(KillOutcome::from_verdicts([
            signalled == KillOutcome::Success,
            invalid == 0,
        ]))
    }

    async fn node_count(&self) -> SchedResult<usize> {
        Ok(1)
    }

    async fn start_node(&self, index: usize, command: &[String]) -> SchedResult<String> {
        check_index(index, 1)?;
        let invocation = Invocation::from_argv(command)?;
        let pid = self.runner.spawn_detached(&invocation, None).await?;
        Ok(pid.to_string())
    }
}
