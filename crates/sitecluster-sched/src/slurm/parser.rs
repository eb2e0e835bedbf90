//! Parsers for SLURM command output.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::job::JobState;
use crate::scan;

/// Exit status some sites' squeue wrappers use for an unknown job.
pub const UNKNOWN_JOB_EXIT: i32 = 153;

/// Compact states of jobs that ended abnormally.
const FAILED_STATES: &[&str] = &[
    "BF", "CA", "DL", "F", "NF", "OOM", "PR", "TO", "RQ", "RV", "SE", "ST",
];

static PARTITION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_.\-]+)\*?").expect("valid regex"));
static SBATCH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Submitted batch job\s+([0-9]+)").expect("valid regex"));
static STATE_COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:statecompact\s*:\s*)?([A-Z]+)\s*$").expect("valid regex")
});

/// Parse `sinfo -s --noheader` output into partition names.
///
/// ```text
/// debug*       up   infinite 0/4/0/4 node[01-04]
/// long         up 7-00:00:00 2/6/0/8 node[05-12]
/// ```
///
/// The default partition's trailing `*` is dropped.
pub fn parse_partition_list(output: &str) -> Vec<String> {
    scan::all_captures(output, &PARTITION_LINE)
}

/// Extract the job ID from `sbatch` output.
///
/// With `-v` sbatch prints its settings first; the line we need is
/// `Submitted batch job 12345`.
pub fn parse_sbatch_output(output: &str) -> Option<String> {
    scan::first_capture(output, &SBATCH_ID)
}

/// Extract the compact state from `squeue --Format=statecompact` output.
///
/// Older squeue versions prefix the value with the field name.
pub fn parse_state_compact(output: &str) -> Option<String> {
    scan::first_capture(output, &STATE_COMPACT)
}

/// Map a compact state to the canonical state and, for finished jobs, an
/// exit code.
///
/// A job that no longer shows up in squeue has completed successfully as
/// far as we can tell. `RQ` appears in both the running and the failed
/// sets; the running interpretation wins.
pub fn map_state(code: Option<&str>) -> (JobState, Option<i32>) {
    match code {
        None => (JobState::Completed, Some(0)),
        Some("PD") => (JobState::Pending, None),
        Some("R" | "SO" | "RS" | "CF" | "CG" | "SI" | "RQ") => (JobState::Running, None),
        Some("RH" | "RF" | "S" | "RD") => (JobState::Suspended, None),
        Some(code) if FAILED_STATES.contains(&code) => (JobState::Completed, Some(1)),
        Some(_) => (JobState::Completed, Some(0)),
    }
}

/// Compact code for a long state name as printed by `sacct`.
fn compact_state(state: &str) -> Option<&'static str> {
    Some(match state {
        "PENDING" => "PD",
        "RUNNING" => "R",
        "COMPLETING" => "CG",
        "CONFIGURING" => "CF",
        "REQUEUED" => "RQ",
        "RESIZING" => "RS",
        "SIGNALING" => "SI",
        "STAGE_OUT" => "SO",
        "SUSPENDED" => "S",
        "REQUEUE_HOLD" => "RH",
        "REQUEUE_FED" => "RF",
        "RESV_DEL_HOLD" => "RD",
        "COMPLETED" => "CD",
        "BOOT_FAIL" => "BF",
        "CANCELLED" => "CA",
        "DEADLINE" => "DL",
        "FAILED" => "F",
        "NODE_FAIL" => "NF",
        "OUT_OF_MEMORY" => "OOM",
        "PREEMPTED" => "PR",
        "TIMEOUT" => "TO",
        "REVOKED" => "RV",
        "SPECIAL_EXIT" => "SE",
        "STOPPED" => "ST",
        _ => return None,
    })
}

/// Parse the `JobID|State|ExitCode` allocation line from
/// `sacct -j <id> -n -P -o JobID,State,ExitCode`.
///
/// ```text
/// 12345|FAILED|2:0
/// 12345.batch|FAILED|2:0
/// 12345.extern|COMPLETED|0:0
/// ```
///
/// Step lines (`12345.batch`) are skipped. Returns the long state name and
/// the exit status half of `ExitCode`.
pub fn parse_sacct_output(output: &str, job_id: &str) -> Option<(String, Option<i32>)> {
    output.lines().find_map(|line| {
        let mut fields = line.trim().split('|');
        let id = fields.next()?.trim();
        if id != job_id {
            return None;
        }
        // "CANCELLED by 1000" carries the cancelling uid.
        let state = fields.next()?.split_whitespace().next()?.to_string();
        let exit_code = fields
            .next()
            .and_then(|code| code.trim().split(':').next())
            .and_then(|code| code.parse().ok());
        Some((state, exit_code))
    })
}

/// Map an accounting record to the canonical state.
///
/// Abnormal ends report their recorded exit status, or `1` when the record
/// says `0` (a cancelled job exits through a signal).
pub fn map_accounting_state(state: &str, exit_code: Option<i32>) -> (JobState, Option<i32>) {
    let Some(code) = compact_state(state) else {
        return (JobState::Completed, Some(exit_code.unwrap_or(0)));
    };
    match map_state(Some(code)) {
        (JobState::Completed, Some(1)) if FAILED_STATES.contains(&code) => {
            (JobState::Completed, Some(exit_code.filter(|&c| c != 0).unwrap_or(1)))
        }
        (JobState::Completed, _) => (JobState::Completed, Some(exit_code.unwrap_or(0))),
        other => other,
    }
}

/// Whether a failing squeue means the job is unknown.
pub fn is_unknown_job(code: Option<i32>, output: &str) -> bool {
    code == Some(UNKNOWN_JOB_EXIT)
        || output.contains("Unknown Job Id")
        || output.contains("Invalid job id")
}

/// Distinct node names from `sinfo -N -o %N --noheader`.
///
/// Nodes in several partitions are listed once per partition.
pub fn parse_node_names(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether an `scancel` response line means the job is gone or going.
pub fn kill_accepted(line: &str, _job_id: &str) -> bool {
    line.contains("already completing or completed") || line.contains("Invalid job id")
}
