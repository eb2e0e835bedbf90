//! PBS adapter for job submission and tracking.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::config::BackendKind;
use crate::context::ExecContext;
use crate::error::SchedResult;
use crate::job::{JobStatus, KillOutcome, SubmitRequest};
use crate::nodes::check_index;
use crate::pbs::parser;
use crate::runner::{CommandRunner, Invocation, run_checked};
use crate::scan;

/// Adapter for PBS/Torque (`qsub`, `qstat`, `qdel`, `pbsdsh`).
pub struct PbsCluster {
    ctx: ExecContext,
    runner: Arc<dyn CommandRunner>,
    /// Whether `-u <user>` may be forwarded.
    allow_user: bool,
}

impl PbsCluster {
    /// Create a new PBS adapter.
    pub fn new(ctx: ExecContext, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            ctx,
            runner,
            allow_user: false,
        }
    }

    /// Allow or forbid submitting on behalf of another user.
    pub fn allow_user(mut self, allow: bool) -> Self {
        self.allow_user = allow;
        self
    }

    /// Build the `qsub` invocation for a request.
    pub fn submit_command(&self, request: &SubmitRequest) -> SchedResult<Invocation> {
        let mut qsub = Invocation::new("qsub").args(["-V", "-W", "umask=022"]);

        if let Some(queue) = request.queue() {
            qsub = qsub.opt("-q", queue);
        }
        if let Some(name) = request.job_name() {
            qsub = qsub.opt("-N", name);
        }

        let mut resources = Vec::new();
        if let Some(nodes) = request.nodes() {
            resources.push(format!("nodes={nodes}"));
        }
        if let Some(threads) = request.threads() {
            resources.push(format!("ppn={threads}"));
        }
        if let Some(memory) = request.memory() {
            resources.push(format!("pmem={memory}"));
        }
        if !resources.is_empty() {
            qsub = qsub.opt("-l", resources.join(":"));
        }

        if let Some(email) = request.email() {
            // Mail on abort, begin and end.
            qsub = qsub.opt("-M", email).opt("-m", "abe");
        }
        if let Some(at) = request.at_time() {
            qsub = qsub.opt("-a", at);
        }
        if let Some(end) = request.end_time() {
            qsub = qsub.opt("-dl", end);
        }
        if !request.after().is_empty() {
            qsub = qsub.opt("-W", format!("depend=after:{}", request.after().join(":")));
        }
        if let Some(user) = request.user() {
            if self.allow_user {
                qsub = qsub.opt("-u", user);
            } else {
                debug!(user, "user impersonation disabled, ignoring --user");
            }
        }
        // PBS has no project option; the account string takes its place.
        if let Some(project) = request.project() {
            qsub = qsub.opt("-A", project);
        }
        if let Some(group) = request.group() {
            qsub = qsub.opt("-W", format!("group_list={group}"));
        }

        Ok(qsub
            .args(request.custom_tokens()?)
            .args(request.command().iter().cloned()))
    }
}

#[async_trait]
impl Cluster for PbsCluster {
    fn kind(&self) -> BackendKind {
        BackendKind::Pbs
    }

    async fn queues(&self) -> SchedResult<Vec<String>> {
        let qstat = Invocation::new("qstat").arg("-Q");
        let output = self.runner.output(&qstat).await?.check(&qstat)?;
        Ok(parser::parse_queue_list(&output.stdout))
    }

    async fn submit_job(&self, request: &SubmitRequest) -> SchedResult<String> {
        let qsub = self.submit_command(request)?;
        let output = self.runner.output(&qsub).await?.check(&qsub)?;

        Ok(parser::parse_qsub_output(&output.stdout).unwrap_or_else(|| {
            warn!(output = %output.stdout.trim(), "no job id in qsub output");
            String::new()
        }))
    }

    async fn status(&self, job_id: &str, with_exit: bool) -> SchedResult<JobStatus> {
        let qstat = Invocation::new("qstat").arg("-f").arg(job_id);
        let output = self.runner.output(&qstat).await?;
        let text = output.combined();

        if !output.success() {
            if parser::is_unknown_job(output.code, &text) {
                debug!(job_id, output = %text.trim(), "job unknown to PBS server");
                return Ok(JobStatus::unknown());
            }
            return Err(output.into_error(&qstat));
        }

        let code = parser::parse_job_state(&text);
        debug!(job_id, state = ?code, "qstat job_state");
        let state = parser::map_state(code.as_deref());
        Ok(JobStatus::report(state, parser::parse_exit_status(&text), with_exit))
    }

    async fn kill(&self, job_ids: &[String]) -> SchedResult<KillOutcome> {
        if job_ids.is_empty() {
            return Ok(KillOutcome::Success);
        }
        let qdel = Invocation::new("qdel").args(job_ids.iter().cloned());
        let output = self.runner.output(&qdel).await?;
        // qdel is silent for jobs it deletes.
        scan::kill_result(output, &qdel, job_ids, false, parser::kill_accepted)
    }

    async fn node_count(&self) -> SchedResult<usize> {
        self.ctx.require_parsed("PBS_NUM_NODES")
    }

    async fn start_node(&self, index: usize, command: &[String]) -> SchedResult<String> {
        let bound = match self.ctx.parsed::<usize>("PBS_NP")? {
            Some(slots) => Some(slots),
            None => self.ctx.parsed::<usize>("PBS_NUM_NODES")?,
        };
        if let Some(bound) = bound {
            check_index(index, bound)?;
        }

        let pbsdsh = Invocation::new("pbsdsh")
            .opt("-n", index.to_string())
            .args(command.iter().cloned());
        run_checked(self.runner.as_ref(), &pbsdsh).await?;

        Ok(self.ctx.require("PBS_JOBID")?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;
    use crate::job::JobState;
    use crate::runner::{CommandOutput, MockRunner};

    fn cluster(runner: MockRunner) -> (PbsCluster, Arc<MockRunner>) {
        let runner = Arc::new(runner);
        let ctx = ExecContext::new("/tmp")
            .with_var("PBS_JOBID", "777.mgr001")
            .with_var("PBS_NUM_NODES", "2");
        (PbsCluster::new(ctx, runner.clone()), runner)
    }

    #[test]
    fn test_submit_command_field_order() {
        let (pbs, _) = cluster(MockRunner::new());
        let request = SubmitRequest::new(["/bin/sim", "--steps", "10"])
            .with_queue("batch")
            .with_job_name("sim")
            .with_nodes(NonZeroU32::new(2).unwrap())
            .with_threads(NonZeroU32::new(8).unwrap())
            .with_memory("2gb")
            .with_email("ops@example.com")
            .with_at_time("202601011200")
            .with_end_time("202601021200")
            .with_after(["11.mgr001", "12.mgr001"])
            .with_user("alice")
            .with_project("proj")
            .with_group("hpc")
            .with_custom_args("-l walltime=01:00:00");

        let qsub = pbs.submit_command(&request).unwrap();
        assert_eq!(qsub.program, "qsub");
        assert_eq!(
            qsub.args,
            [
                "-V", "-W", "umask=022",
                "-q", "batch",
                "-N", "sim",
                "-l", "nodes=2:ppn=8:pmem=2gb",
                "-M", "ops@example.com", "-m", "abe",
                "-a", "202601011200",
                "-dl", "202601021200",
                "-W", "depend=after:11.mgr001:12.mgr001",
                "-A", "proj",
                "-W", "group_list=hpc",
                "-l", "walltime=01:00:00",
                "/bin/sim", "--steps", "10",
            ]
        );
    }

    #[test]
    fn test_submit_command_user_when_allowed() {
        let (pbs, _) = cluster(MockRunner::new());
        let pbs = pbs.allow_user(true);
        let request = SubmitRequest::new(["run.sh"]).with_user("alice");
        let qsub = pbs.submit_command(&request).unwrap();
        assert_eq!(qsub.args, ["-V", "-W", "umask=022", "-u", "alice", "run.sh"]);
    }

    #[test]
    fn test_submit_command_minimal() {
        let (pbs, _) = cluster(MockRunner::new());
        let qsub = pbs.submit_command(&SubmitRequest::new(["run.sh"])).unwrap();
        assert_eq!(qsub.args, ["-V", "-W", "umask=022", "run.sh"]);
    }

    #[tokio::test]
    async fn test_submit_extracts_id() {
        let (pbs, _) =
            cluster(MockRunner::new().respond("qsub", CommandOutput::ok("12345.mgr001 queued\n")));
        let id = pbs.submit(&SubmitRequest::new(["run.sh"])).await.unwrap();
        assert_eq!(id, "12345.mgr001");
    }

    #[tokio::test]
    async fn test_submit_unparseable_is_empty() {
        let (pbs, _) = cluster(MockRunner::new().respond("qsub", CommandOutput::ok("accepted\n")));
        let id = pbs.submit(&SubmitRequest::new(["run.sh"])).await.unwrap();
        assert_eq!(id, "");
    }

    #[tokio::test]
    async fn test_submit_with_start_node_redirects() {
        let (pbs, runner) = cluster(MockRunner::new());
        let request = SubmitRequest::new(["hostname"]).with_start_node(1);
        let id = pbs.submit(&request).await.unwrap();
        assert_eq!(id, "777.mgr001");

        let call = runner.last_call().unwrap();
        assert_eq!(call.program, "pbsdsh");
        assert_eq!(call.args, ["-n", "1", "hostname"]);
    }

    #[tokio::test]
    async fn test_start_node_out_of_range() {
        let (pbs, runner) = cluster(MockRunner::new());
        let err = pbs.start_node(2, &["hostname".to_string()]).await.unwrap_err();
        assert!(matches!(err, crate::error::SchedError::NodeOutOfRange { index: 2, available: 2 }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_completed_with_exit() {
        let qstat = "Job Id: 5.mgr001\n    job_state = E\n    Exit_status = 2\n";
        let (pbs, _) = cluster(MockRunner::new().respond("qstat", CommandOutput::ok(qstat)));
        let status = pbs.status("5.mgr001", true).await.unwrap();
        assert_eq!(status.to_string(), "COMPLETED 2");
    }

    #[tokio::test]
    async fn test_status_running_has_no_exit() {
        let qstat = "Job Id: 5.mgr001\n    job_state = R\n";
        let (pbs, _) = cluster(MockRunner::new().respond("qstat", CommandOutput::ok(qstat)));
        let status = pbs.status("5.mgr001", true).await.unwrap();
        assert_eq!(status.state(), JobState::Running);
        assert_eq!(status.to_string(), "RUNNING");
    }

    #[tokio::test]
    async fn test_status_server_failure_propagates() {
        let (pbs, _) = cluster(
            MockRunner::new().respond("qstat", CommandOutput::failed(1, "cannot connect to server")),
        );
        assert!(pbs.status("5", false).await.is_err());
    }

    #[tokio::test]
    async fn test_node_count() {
        let (pbs, _) = cluster(MockRunner::new());
        assert_eq!(pbs.node_count().await.unwrap(), 2);
    }
}
