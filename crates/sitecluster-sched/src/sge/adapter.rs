//! Grid Engine adapter for job submission and tracking.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::config::BackendKind;
use crate::context::ExecContext;
use crate::error::{SchedError, SchedResult};
use crate::job::{JobState, JobStatus, KillOutcome, SubmitRequest};
use crate::nodes::NodeAllocation;
use crate::runner::{CommandRunner, Invocation, run_checked};
use crate::scan;
use crate::sge::parser;

/// Adapter for Grid Engine (`qsub`, `qstat`, `qacct`, `qdel`, `qrsh`).
pub struct SgeCluster {
    ctx: ExecContext,
    runner: Arc<dyn CommandRunner>,
}

impl SgeCluster {
    pub fn new(ctx: ExecContext, runner: Arc<dyn CommandRunner>) -> Self {
        Self { ctx, runner }
    }

    /// Build the `qsub` invocation for a request.
    pub fn submit_command(&self, request: &SubmitRequest) -> SchedResult<Invocation> {
        let mut qsub = Invocation::new("qsub").arg("-V");

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
        if let Some(memory) = request.memory() {
            resources.push(format!("s_vmem={memory}"));
        }
        if !resources.is_empty() {
            qsub = qsub.opt("-l", resources.join(":"));
        }
        if let Some(threads) = request.threads() {
            debug!(threads = threads.get(), "threads need a parallel environment, ignoring --threads");
        }

        if let Some(email) = request.email() {
            qsub = qsub.opt("-M", email).opt("-m", "abe");
        }
        if let Some(at) = request.at_time() {
            qsub = qsub.opt("-a", at);
        }
        if let Some(end) = request.end_time() {
            qsub = qsub.opt("-dl", end);
        }
        if !request.after().is_empty() {
            qsub = qsub.opt("-hold_jid", request.after().join(","));
        }
        if let Some(user) = request.user() {
            debug!(user, "Grid Engine cannot submit on behalf of another user, ignoring --user");
        }
        if let Some(project) = request.project() {
            qsub = qsub.opt("-P", project);
        }
        // Grid Engine has no group option; the account string stands in.
        if let Some(group) = request.group() {
            qsub = qsub.opt("-A", group);
        }

        Ok(qsub
            .args(request.custom_tokens()?)
            .args(request.command().iter().cloned()))
    }

    /// Host allocation of the running parallel job.
    ///
    /// `PE_HOSTFILE` normally names a file; a value that already holds
    /// `host slots` pairs is taken as is.
    async fn allocation(&self) -> SchedResult<NodeAllocation> {
        let value = self.ctx.require("PE_HOSTFILE")?.trim();
        if value.contains(char::is_whitespace) {
            return NodeAllocation::from_host_slot_pairs(value);
        }
        let path = self.ctx.work_dir().join(value);
        let body = tokio::fs::read_to_string(&path).await?;
        NodeAllocation::from_pe_hostfile(&body)
    }

    /// Look up a job that has left `qstat` in the accounting database.
    async fn accounting_status(&self, job_id: &str, with_exit: bool) -> SchedResult<JobStatus> {
        let qacct = Invocation::new("qacct").arg("-j").arg(job_id);
        let output = self.runner.output(&qacct).await?;
        let text = output.combined();

        if parser::accounting_unknown(&text, job_id) {
            debug!(job_id, "job unknown to Grid Engine accounting");
            return Ok(JobStatus::unknown());
        }
        if !output.success() {
            return Err(output.into_error(&qacct));
        }

        match parser::parse_accounting_exit(&text) {
            Some(code) => Ok(JobStatus::report(JobState::Completed, Some(code), with_exit)),
            None => {
                warn!(job_id, "no exit_status in qacct output");
                Ok(JobStatus::unknown())
            }
        }
    }
}

#[async_trait]
impl Cluster for SgeCluster {
    fn kind(&self) -> BackendKind {
        BackendKind::Sge
    }

    async fn queues(&self) -> SchedResult<Vec<String>> {
        let qconf = Invocation::new("qconf").arg("-sql");
        let output = self.runner.output(&qconf).await?.check(&qconf)?;
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
        let qstat = Invocation::new("qstat");
        let output = self.runner.output(&qstat).await?.check(&qstat)?;

        match parser::parse_job_state(&output.stdout, job_id) {
            Some(state) => {
                debug!(job_id, state = %state, "qstat state");
                Ok(JobStatus::state_only(parser::map_state(&state)))
            }
            None => self.accounting_status(job_id, with_exit).await,
        }
    }

    async fn kill(&self, job_ids: &[String]) -> SchedResult<KillOutcome> {
        if job_ids.is_empty() {
            return Ok(KillOutcome::Success);
        }
        let qdel = Invocation::new("qdel").args(job_ids.iter().cloned());
        let output = self.runner.output(&qdel).await?;
        scan::kill_result(output, &qdel, job_ids, true, parser::kill_accepted)
    }

    async fn node_count(&self) -> SchedResult<usize> {
        Ok(self.allocation().await?.slot_count())
    }

    async fn start_node(&self, index: usize, command: &[String]) -> SchedResult<String> {
        let allocation = self.allocation().await?;
        let host = allocation.host_at(index)?;
        if command.is_empty() {
            return Err(SchedError::InvalidArguments("no command given".to_string()));
        }

        let qrsh = Invocation::new("qrsh")
            .args(["-inherit", host])
            .args(command.iter().cloned());
        run_checked(self.runner.as_ref(), &qrsh).await?;

        Ok(self.ctx.require("JOB_ID")?.trim().to_string())
    }
}
