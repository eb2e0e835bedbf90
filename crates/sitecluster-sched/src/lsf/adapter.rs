//! LSF adapter for job submission and tracking.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::config::BackendKind;
use crate::context::ExecContext;
use crate::error::{SchedError, SchedResult};
use crate::job::{JobState, JobStatus, KillOutcome, SubmitRequest};
use crate::lsf::parser;
use crate::nodes::NodeAllocation;
use crate::runner::{CommandRunner, Invocation, run_checked};
use crate::scan;

/// Adapter for LSF (`bsub`, `bjobs`, `bhist`, `bkill`, `blaunch`).
pub struct LsfCluster {
    ctx: ExecContext,
    runner: Arc<dyn CommandRunner>,
}

impl LsfCluster {
    pub fn new(ctx: ExecContext, runner: Arc<dyn CommandRunner>) -> Self {
        Self { ctx, runner }
    }

    /// Build the `bsub` invocation for a request.
    pub fn submit_command(&self, request: &SubmitRequest) -> SchedResult<Invocation> {
        let mut bsub = Invocation::new("bsub");

        if let Some(queue) = request.queue() {
            bsub = bsub.opt("-q", queue);
        }
        if let Some(name) = request.job_name() {
            bsub = bsub.opt("-J", name);
        }
        if let Some(nodes) = request.nodes() {
            bsub = bsub.opt("-n", nodes.to_string());
        }
        if let Some(threads) = request.threads() {
            debug!(threads = threads.get(), "LSF has no per-task thread option, ignoring --threads");
        }
        if let Some(memory) = request.memory() {
            bsub = bsub.opt("-M", memory);
        }
        if let Some(email) = request.email() {
            // Mail at dispatch (-B) and at completion (-N).
            bsub = bsub.opt("-u", email).args(["-B", "-N"]);
        }
        if let Some(at) = request.at_time() {
            bsub = bsub.opt("-b", at);
        }
        if let Some(end) = request.end_time() {
            bsub = bsub.opt("-t", end);
        }
        if !request.after().is_empty() {
            bsub = bsub.opt("-w", format!("ended({})", request.after().join("|")));
        }
        if let Some(user) = request.user() {
            debug!(user, "LSF cannot submit on behalf of another user, ignoring --user");
        }
        if let Some(project) = request.project() {
            bsub = bsub.opt("-P", project);
        }
        if let Some(group) = request.group() {
            bsub = bsub.opt("-G", group);
        }

        bsub = bsub.args(request.custom_tokens()?);

        // bsub re-splits a program path containing spaces; hand it to bash instead.
        if request.command().first().is_some_and(|program| program.contains(' ')) {
            bsub = bsub.arg("/bin/bash");
        }
        Ok(bsub.args(request.command().iter().cloned()))
    }

    /// Host allocation of the running job.
    fn allocation(&self) -> SchedResult<NodeAllocation> {
        if let Some(pairs) = self.ctx.var("LSB_MCPU_HOSTS") {
            return NodeAllocation::from_host_slot_pairs(pairs);
        }
        let hosts = self.ctx.require("LSB_HOSTS")?;
        Ok(NodeAllocation::from_slot_list(hosts))
    }

    /// Resolve `EXIT` and missing jobs through the job history.
    async fn finished_status(&self, job_id: &str, with_exit: bool) -> SchedResult<JobStatus> {
        let bhist = Invocation::new("bhist").arg("-la").arg(job_id);
        let output = self.runner.output(&bhist).await?;
        let text = output.combined();

        // bhist exits 255 for every error, so only the text tells them apart.
        if parser::history_unknown(&text) {
            debug!(job_id, "job unknown to LSF history");
            return Ok(JobStatus::unknown());
        }
        if !output.success() {
            return Err(output.into_error(&bhist));
        }

        let exit_code = parser::history_exit_code(&text);
        if exit_code.is_none() {
            warn!(job_id, "no exit record in bhist output");
        }
        Ok(JobStatus::report(JobState::Completed, exit_code, with_exit))
    }
}

#[async_trait]
impl Cluster for LsfCluster {
    fn kind(&self) -> BackendKind {
        BackendKind::Lsf
    }

    async fn queues(&self) -> SchedResult<Vec<String>> {
        let bqueues = Invocation::new("bqueues").arg("-w");
        let output = self.runner.output(&bqueues).await?.check(&bqueues)?;
        Ok(parser::parse_queue_list(&output.stdout))
    }

    async fn submit_job(&self, request: &SubmitRequest) -> SchedResult<String> {
        let bsub = self.submit_command(request)?;
        let output = self.runner.output(&bsub).await?.check(&bsub)?;

        Ok(parser::parse_bsub_output(&output.stdout).unwrap_or_else(|| {
            warn!(output = %output.stdout.trim(), "no job id in bsub output");
            String::new()
        }))
    }

    async fn status(&self, job_id: &str, with_exit: bool) -> SchedResult<JobStatus> {
        let bjobs = Invocation::new("bjobs").arg("-a").arg(job_id);
        let output = self.runner.output(&bjobs).await?;
        let text = output.combined();

        let stat = parser::parse_job_state(&text, job_id);
        let not_found = parser::is_not_found(&text, job_id);
        if stat.is_none() && !not_found && !output.success() {
            return Err(output.into_error(&bjobs));
        }
        debug!(job_id, stat = ?stat, not_found, "bjobs state");

        match stat.as_deref() {
            Some("EXIT") => self.finished_status(job_id, with_exit).await,
            None if not_found => self.finished_status(job_id, with_exit).await,
            Some("DONE") => Ok(JobStatus::report(JobState::Completed, Some(0), with_exit)),
            other => Ok(JobStatus::report(parser::map_state(other), None, with_exit)),
        }
    }

    async fn kill(&self, job_ids: &[String]) -> SchedResult<KillOutcome> {
        if job_ids.is_empty() {
            return Ok(KillOutcome::Success);
        }
        let bkill = Invocation::new("bkill").args(job_ids.iter().cloned());
        let output = self.runner.output(&bkill).await?;
        scan::kill_result(output, &bkill, job_ids, true, parser::kill_accepted)
    }

    async fn node_count(&self) -> SchedResult<usize> {
        Ok(self.allocation()?.slot_count())
    }

    async fn start_node(&self, index: usize, command: &[String]) -> SchedResult<String> {
        let allocation = self.allocation()?;
        let host = allocation.host_at(index)?;
        if command.is_empty() {
            return Err(SchedError::InvalidArguments("no command given".to_string()));
        }

        let blaunch = Invocation::new("blaunch")
            .arg(host)
            .args(command.iter().cloned());
        run_checked(self.runner.as_ref(), &blaunch).await?;

        Ok(self.ctx.require("LSB_JOBID")?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;
    use crate::runner::{CommandOutput, MockRunner};

    fn cluster(runner: MockRunner, ctx: ExecContext) -> (LsfCluster, Arc<MockRunner>) {
        let runner = Arc::new(runner);
        (LsfCluster::new(ctx, runner.clone()), runner)
    }

    fn ctx() -> ExecContext {
        ExecContext::new("/tmp")
            .with_var("LSB_JOBID", "4242")
            .with_var("LSB_MCPU_HOSTS", "hostA 2 hostB 1")
    }

    #[test]
    fn test_submit_command_field_order() {
        let (lsf, _) = cluster(MockRunner::new(), ctx());
        let request = SubmitRequest::new(["/bin/sim"])
            .with_queue("normal")
            .with_job_name("sim")
            .with_nodes(NonZeroU32::new(4).unwrap())
            .with_threads(NonZeroU32::new(2).unwrap())
            .with_memory("4000")
            .with_email("ops@example.com")
            .with_at_time("10:00")
            .with_end_time("12:00")
            .with_after(["11", "12"])
            .with_user("alice")
            .with_project("proj")
            .with_group("hpc")
            .with_custom_args("-W 30");

        let bsub = lsf.submit_command(&request).unwrap();
        assert_eq!(
            bsub.args,
            [
                "-q", "normal",
                "-J", "sim",
                "-n", "4",
                "-M", "4000",
                "-u", "ops@example.com", "-B", "-N",
                "-b", "10:00",
                "-t", "12:00",
                "-w", "ended(11|12)",
                "-P", "proj",
                "-G", "hpc",
                "-W", "30",
                "/bin/sim",
            ]
        );
    }

    #[test]
    fn test_submit_command_spaced_program_uses_bash() {
        let (lsf, _) = cluster(MockRunner::new(), ctx());
        let request = SubmitRequest::new(["/opt/my app/run", "x"]);
        let bsub = lsf.submit_command(&request).unwrap();
        assert_eq!(bsub.args, ["/bin/bash", "/opt/my app/run", "x"]);
    }

    #[tokio::test]
    async fn test_submit() {
        let (lsf, _) = cluster(
            MockRunner::new().respond(
                "bsub",
                CommandOutput::ok("Job <1234> is submitted to queue <normal>.\n"),
            ),
            ctx(),
        );
        let id = lsf.submit(&SubmitRequest::new(["run.sh"])).await.unwrap();
        assert_eq!(id, "1234");
    }

    #[tokio::test]
    async fn test_status_running() {
        let bjobs = "JOBID USER STAT QUEUE FROM_HOST EXEC_HOST JOB_NAME SUBMIT_TIME\n1234 alice RUN normal login01 node07 sim Oct 19 10:02\n";
        let (lsf, runner) = cluster(MockRunner::new().respond("bjobs", CommandOutput::ok(bjobs)), ctx());
        let status = lsf.status("1234", true).await.unwrap();
        assert_eq!(status.to_string(), "RUNNING");
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_status_done() {
        let bjobs = "1234 alice DONE normal login01 node07 sim Oct 19 10:02\n";
        let (lsf, _) = cluster(MockRunner::new().respond("bjobs", CommandOutput::ok(bjobs)), ctx());
        assert_eq!(lsf.status("1234", true).await.unwrap().to_string(), "COMPLETED 0");
    }

    #[tokio::test]
    async fn test_status_exit_reads_history() {
        let bjobs = "1234 alice EXIT normal login01 node07 sim Oct 19 10:02\n";
        let bhist = "Fri Oct 19 10:05:01: Exited with exit code 7. The CPU time used is 0.1 seconds;\n";
        let (lsf, runner) = cluster(
            MockRunner::new()
                .respond("bjobs", CommandOutput::ok(bjobs))
                .respond("bhist", CommandOutput::ok(bhist)),
            ctx(),
        );
        assert_eq!(lsf.status("1234", true).await.unwrap().to_string(), "COMPLETED 7");
        assert_eq!(runner.last_call().unwrap().args, ["-la", "1234"]);
    }

    #[tokio::test]
    async fn test_status_unknown() {
        let (lsf, _) = cluster(
            MockRunner::new()
                .respond("bjobs", CommandOutput::failed(255, "Job <99> is not found\n"))
                .respond("bhist", CommandOutput::failed(255, "No matching job found\n")),
            ctx(),
        );
        assert_eq!(lsf.status("99", true).await.unwrap(), JobStatus::unknown());
    }

    #[tokio::test]
    async fn test_kill_requires_ack() {
        let (lsf, _) = cluster(
            MockRunner::new().respond("bkill", CommandOutput::ok("Job <1> is being terminated\n")),
            ctx(),
        );
        let outcome = lsf.kill(&["1".to_string(), "2".to_string()]).await.unwrap();
        assert_eq!(outcome, KillOutcome::Failed);
    }

    #[tokio::test]
    async fn test_nodes_and_launch() {
        let (lsf, runner) = cluster(MockRunner::new(), ctx());
        assert_eq!(lsf.node_count().await.unwrap(), 3);

        let id = lsf.start_node(2, &["hostname".to_string()]).await.unwrap();
        assert_eq!(id, "4242");
        let call = runner.last_call().unwrap();
        assert_eq!(call.program, "blaunch");
        assert_eq!(call.args, ["hostB", "hostname"]);

        assert!(matches!(
            lsf.start_node(3, &["hostname".to_string()]).await,
            Err(SchedError::NodeOutOfRange { index: 3, available: 3 })
        ));
    }

    #[tokio::test]
    async fn test_slot_list_fallback() {
        let ctx = ExecContext::new("/tmp").with_var("LSB_HOSTS", "n1 n1 n2");
        let (lsf, _) = cluster(MockRunner::new(), ctx);
        assert_eq!(lsf.node_count().await.unwrap(), 3);
    }
}
