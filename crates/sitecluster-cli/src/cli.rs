//! Command-line grammar.

use std::num::NonZeroU32;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Sitecluster - one job-control interface for PBS, LSF, SGE, SLURM and local processes
///
/// The backend is chosen by the first SITE_CLUSTER_USE_{PBS|LSF|SGE|SLURM|SUBPROCESS}
/// environment variable that is set.
#[derive(Parser, Debug)]
#[command(name = "sitecluster")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the supported API versions
    Api,

    /// List queue names, one per line
    Queues,

    /// Submit a job and print its identifier
    Submit(SubmitArgs),

    /// Print the status of a job
    Status {
        /// Append the exit code when the job has completed
        #[arg(short = 'e', long = "add-exit-status")]
        add_exit_status: bool,

        /// Job identifier
        job_id: String,
    },

    /// Kill jobs and print 0 on success, 1 otherwise
    Kill {
        /// Job identifiers
        #[arg(required = true)]
        job_ids: Vec<String>,
    },

    /// Print the number of nodes in the current allocation
    #[command(name = "nodecount")]
    NodeCount,

    /// Run a command on one node of the current allocation
    #[command(name = "startnode")]
    StartNode {
        /// Zero-based node index
        node: usize,

        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Print the configured submission behavior as JSON
    Behavior,
}

/// Options of the `submit` command.
#[derive(Args, Debug, Default)]
pub struct SubmitArgs {
    /// Destination queue (partition)
    #[arg(long)]
    pub queue: Option<String>,

    /// Number of nodes
    #[arg(long)]
    pub nodes: Option<NonZeroU32>,

    /// Threads per node
    #[arg(long)]
    pub threads: Option<NonZeroU32>,

    /// Memory limit in the batch system's syntax
    #[arg(long)]
    pub memory: Option<String>,

    /// Job name
    #[arg(long = "jobname")]
    pub job_name: Option<String>,

    /// Notification addresses
    #[arg(long)]
    pub email: Option<String>,

    /// Time after which the job is eligible to run
    #[arg(long = "attime")]
    pub at_time: Option<String>,

    /// Deadline for the job
    #[arg(long = "endtime")]
    pub end_time: Option<String>,

    /// Jobs that must finish first, e.g. "['12', '13']"
    #[arg(long)]
    pub after: Option<String>,

    /// Launch on this node of the current allocation instead of submitting
    #[arg(long = "startnode")]
    pub start_node: Option<usize>,

    /// Submit on behalf of this user (when the site allows it)
    #[arg(long)]
    pub user: Option<String>,

    /// Project to account the job to
    #[arg(long)]
    pub project: Option<String>,

    /// Group to run the job under
    #[arg(long)]
    pub group: Option<String>,

    /// Extra scheduler arguments, split like a shell would (repeatable)
    #[arg(long = "customargs", action = ArgAction::Append, allow_hyphen_values = true)]
    pub custom_args: Vec<String>,

    /// Command and arguments to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}
