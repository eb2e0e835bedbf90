//! SLURM adapter for job submission and tracking.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::config::BackendKind;
use crate::context::ExecContext;
use crate::error::{SchedError, SchedResult};
use crate::job::{JobState, JobStatus, KillOutcome, SubmitRequest};
use crate::nodes::check_index;
use crate::runner::{CommandRunner, Invocation, run_checked};
use crate::scan;
use crate::slurm::parser;

/// Variables SLURM sets with the node count of the current allocation.
const NODE_COUNT_VARS: [&str; 2] = ["SLURM_JOB_NUM_NODES", "SLURM_NNODES"];

/// Adapter for SLURM (`sbatch`, `squeue`, `sacct`, `scancel`, `srun`).
pub struct SlurmCluster {
    ctx: ExecContext,
    runner: Arc<dyn CommandRunner>,
    /// Whether `--uid <user>` may be forwarded.
    allow_user: bool,
}

impl SlurmCluster {
    /// Create a new SLURM adapter.
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

    /// Build the `sbatch` invocation for a request.
    pub fn submit_command(&self, request: &SubmitRequest) -> SchedResult<Invocation> {
        let mut sbatch = Invocation::new("sbatch").arg("-v");

        if let Some(partition) = request.queue() {
            sbatch = sbatch.opt("--partition", partition);
        }
        if let Some(name) = request.job_name() {
            sbatch = sbatch.opt("--job-name", name);
        }
        if let Some(nodes) = request.nodes() {
            sbatch = sbatch.arg(format!("--nodes={nodes}"));
        }
        if let Some(threads) = request.threads() {
            sbatch = sbatch.arg(format!("--cpus-per-task={threads}"));
        }
        if let Some(memory) = request.memory() {
            sbatch = sbatch.arg(format!("--mem={memory}"));
        }
        if let Some(email) = request.email() {
            sbatch = sbatch.opt("--mail-user", email).opt("--mail-type", "ALL");
        }
        if let Some(at) = request.at_time() {
            sbatch = sbatch.opt("--begin", at);
        }
        if let Some(end) = request.end_time() {
            sbatch = sbatch.opt("--deadline", end);
        }
        if !request.after().is_empty() {
            sbatch = sbatch.arg(format!("--dependency=after:{}", request.after().join(":")));
        }
        if let Some(user) = request.user() {
            if self.allow_user {
                sbatch = sbatch.opt("--uid", user);
            } else {
                debug!(user, "user impersonation disabled, ignoring --user");
            }
        }
        if let Some(project) = request.project() {
            sbatch = sbatch.opt("--account", project);
        }
        if let Some(group) = request.group() {
            debug!(group, "sbatch has no group option, ignoring --group");
        }

        Ok(sbatch
            .args(request.custom_tokens()?)
            .args(request.command().iter().cloned()))
    }

    /// Look the job up in the accounting database.
    ///
    /// `None` when sacct has no record, including sites without accounting.
    async fn accounting(&self, job_id: &str) -> SchedResult<Option<(JobState, Option<i32>)>> {
        let sacct = Invocation::new("sacct")
            .args(["-j", job_id, "-n", "-P", "-o", "JobID,State,ExitCode"]);
        let output = self.runner.output(&sacct).await?;
        if !output.success() {
            debug!(job_id, output = %output.combined().trim(), "sacct failed");
            return Ok(None);
        }

        let record = parser::parse_sacct_output(&output.stdout, job_id);
        debug!(job_id, record = ?record, "sacct record");
        Ok(record.map(|(state, exit_code)| parser::map_accounting_state(&state, exit_code)))
    }

    /// Node count exported into a running allocation, if any.
    fn allocated_nodes(&self) -> SchedResult<Option<usize>> {
        for var in NODE_COUNT_VARS {
            if let Some(count) = self.ctx.parsed(var)? {
                return Ok(Some(count));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Cluster for SlurmCluster {
    fn kind(&self) -> BackendKind {
        BackendKind::Slurm
    }

    async fn queues(&self) -> SchedResult<Vec<String>> {
        let sinfo = Invocation::new("sinfo").args(["-s", "--noheader"]);
        let output = self.runner.output(&sinfo).await?.check(&sinfo)?;
        Ok(parser::parse_partition_list(&output.stdout))
    }

    async fn submit_job(&self, request: &SubmitRequest) -> SchedResult<String> {
        let sbatch = self.submit_command(request)?;
        let output = self.runner.output(&sbatch).await?.check(&sbatch)?;

        // sbatch -v writes its option dump to stderr and the job line to stdout.
        Ok(parser::parse_sbatch_output(&output.combined()).unwrap_or_else(|| {
            warn!(output = %output.stdout.trim(), "no job id in sbatch output");
            String::new()
        }))
    }

    async fn status(&self, job_id: &str, with_exit: bool) -> SchedResult<JobStatus> {
        let squeue = Invocation::new("squeue")
            .args(["--noheader", "-j", job_id, "--Format=statecompact"]);
        let output = self.runner.output(&squeue).await?;
        let text = output.combined();

        if !output.success() {
            if !parser::is_unknown_job(output.code, &text) {
                return Err(output.into_error(&squeue));
            }
            // squeue forgets jobs once MinJobAge has passed; accounting keeps them.
            debug!(job_id, output = %text.trim(), "job unknown to squeue");
            return Ok(match self.accounting(job_id).await? {
                Some((state, exit_code)) => JobStatus::report(state, exit_code, with_exit),
                None => JobStatus::unknown(),
            });
        }

        let code = parser::parse_state_compact(&text);
        debug!(job_id, state = ?code, "squeue state");
        if code.is_none() && with_exit {
            if let Some((state, exit_code)) = self.accounting(job_id).await? {
                return Ok(JobStatus::report(state, exit_code, with_exit));
            }
        }
        let (state, exit_code) = parser::map_state(code.as_deref());
        Ok(JobStatus::report(state, exit_code, with_exit))
    }

    async fn kill(&self, job_ids: &[String]) -> SchedResult<KillOutcome> {
        if job_ids.is_empty() {
            return Ok(KillOutcome::Success);
        }
        let scancel = Invocation::new("scancel").args(job_ids.iter().cloned());
        let output = self.runner.output(&scancel).await?;
        // scancel prints nothing for jobs it signals.
        scan::kill_result(output, &scancel, job_ids, false, parser::kill_accepted)
    }

    async fn node_count(&self) -> SchedResult<usize> {
        if let Some(count) = self.allocated_nodes()? {
            return Ok(count);
        }

        let sinfo = Invocation::new("sinfo").args(["-N", "-o", "%N", "--noheader"]);
        let output = self.runner.output(&sinfo).await?.check(&sinfo)?;
        Ok(parser::parse_node_names(&output.stdout).len())
    }

    async fn start_node(&self, index: usize, command: &[String]) -> SchedResult<String> {
        check_index(index, self.node_count().await?)?;
        if command.is_empty() {
            return Err(SchedError::InvalidArguments("no command given".to_string()));
        }

        let srun = Invocation::new("srun")
            .args(["-N1", "-n1"])
            .arg(format!("--relative={index}"))
            .args(command.iter().cloned());
        run_checked(self.runner.as_ref(), &srun).await?;

        Ok(self.ctx.require("SLURM_JOB_ID")?.trim().to_string())
    }
}
