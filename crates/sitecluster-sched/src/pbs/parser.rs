//! Parsers for PBS/Torque command output.

use std::sync::LazyLock;

use regex::Regex;

use crate::job::JobState;
use crate::scan;

/// PBSE_UNKJOBID (15001) truncated to an 8-bit exit status.
pub const UNKNOWN_JOB_EXIT: i32 = 153;

static QUEUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_.\-]+) *([0-9]+)").expect("valid regex"));
static QSUB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.[\w.\-]+)").expect("valid regex"));
static JOB_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*job_state\s*=\s*([A-Z])").expect("valid regex"));
static EXIT_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*exit_status\s*=\s*(-?[0-9]+)").expect("valid regex"));
static KILL_ACCEPTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Request invalid for state of job.*COMPLETE|nonexistent job id|Unknown Job Id|has finished",
    )
    .expect("valid regex")
});

/// Parse `qstat -Q` output into queue names.
///
/// ```text
/// Queue              Max    Tot   Ena   Str   Que   Run   Hld   Wat   Trn   Ext T   Cpt
/// ----------------   ---   ----    --    --   ---   ---   ---   ---   ---   --- -   ---
/// batch                0      3   yes   yes     1     2     0     0     0     0 E     0
/// ```
pub fn parse_queue_list(output: &str) -> Vec<String> {
    scan::all_captures(output, &QUEUE_LINE)
}

/// Extract the job identifier from `qsub` output.
///
/// qsub output format varies by PBS implementation:
/// - PBS Pro: "12345.pbs-server"
/// - Torque: "12345.server.domain.com"
pub fn parse_qsub_output(output: &str) -> Option<String> {
    scan::first_capture(output, &QSUB_ID)
}

/// Extract the raw `job_state` code from `qstat -f` output.
///
/// ```text
/// Job Id: 12345.pbs-server
///     Job_Name = my_job
///     job_state = R
///     queue = batch
///     Exit_status = 0
/// ```
pub fn parse_job_state(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| JOB_STATE.captures(line))
        .map(|caps| caps[1].to_string())
}

/// Extract `Exit_status` from `qstat -f` output.
pub fn parse_exit_status(output: &str) -> Option<i32> {
    output
        .lines()
        .find_map(|line| EXIT_STATUS.captures(line))
        .and_then(|caps| caps[1].parse().ok())
}

/// Map a PBS state code to the canonical state.
///
/// PBS uses single-letter state codes:
/// - Q: Queued, W: Waiting for its start time
/// - B: Array job with running subjobs, R: Running
/// - H: Held, S: Suspended, T: Being moved, U: Suspended (workstation busy)
/// - E: Exiting, X: Subjob finished
///
/// A job missing from the listing has completed.
pub fn map_state(code: Option<&str>) -> JobState {
    match code {
        Some("Q" | "W") => JobState::Pending,
        Some("B" | "R") => JobState::Running,
        Some("H" | "S" | "T" | "U") => JobState::Suspended,
        _ => JobState::Completed,
    }
}

/// Whether a failing `qstat` means the job is unknown to the server.
pub fn is_unknown_job(code: Option<i32>, output: &str) -> bool {
    code == Some(UNKNOWN_JOB_EXIT) || output.contains("Unknown Job Id")
}

/// Whether a `qdel` response line means the job is gone or going.
pub fn kill_accepted(line: &str, _job_id: &str) -> bool {
    KILL_ACCEPTED.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_list() {
        let output = r#"Queue              Max    Tot   Ena   Str   Que   Run   Hld   Wat   Trn   Ext T   Cpt
----------------   ---   ----    --    --   ---   ---   ---   ---   ---   --- -   ---
batch                0      3   yes   yes     1     2     0     0     0     0 E     0
long.q               4      0   yes   yes     0     0     0     0     0     0 E     0
"#;
        assert_eq!(parse_queue_list(output), vec!["batch", "long.q"]);
    }

    #[test]
    fn test_parse_qsub_output() {
        assert_eq!(
            parse_qsub_output("12345.mgr001 submitted\n"),
            Some("12345.mgr001".to_string())
        );
        assert_eq!(
            parse_qsub_output("999999.cluster.local"),
            Some("999999.cluster.local".to_string())
        );
        assert_eq!(parse_qsub_output("qsub: Unknown queue"), None);
    }

    #[test]
    fn test_parse_qstat_full_output() {
        let output = r#"Job Id: 12345.pbs-server
    Job_Name = my_job
    job_state = R
    queue = batch
    resources_used.walltime = 00:05:23
"#;
        assert_eq!(parse_job_state(output).as_deref(), Some("R"));
        assert_eq!(parse_exit_status(output), None);
    }

    #[test]
    fn test_parse_qstat_full_output_completed() {
        let output = r#"Job Id: 12345.pbs-server
    Job_Name = completed_job
    job_state = E
    queue = batch
    Exit_status = 3
"#;
        assert_eq!(parse_job_state(output).as_deref(), Some("E"));
        assert_eq!(parse_exit_status(output), Some(3));
    }

    #[test]
    fn test_map_state() {
        assert_eq!(map_state(Some("Q")), JobState::Pending);
        assert_eq!(map_state(Some("W")), JobState::Pending);
        assert_eq!(map_state(Some("B")), JobState::Running);
        assert_eq!(map_state(Some("R")), JobState::Running);
        assert_eq!(map_state(Some("H")), JobState::Suspended);
        assert_eq!(map_state(Some("T")), JobState::Suspended);
        assert_eq!(map_state(Some("U")), JobState::Suspended);
        assert_eq!(map_state(Some("E")), JobState::Completed);
        assert_eq!(map_state(Some("X")), JobState::Completed);
        assert_eq!(map_state(None), JobState::Completed);
    }

    #[test]
    fn test_unknown_job() {
        assert!(is_unknown_job(Some(153), ""));
        assert!(is_unknown_job(Some(1), "qstat: Unknown Job Id 12.srv"));
        assert!(!is_unknown_job(Some(1), "qstat: cannot connect to server"));
    }

    #[test]
    fn test_kill_accepted() {
        assert!(kill_accepted(
            "qdel: Request invalid for state of job MSG=invalid state for job - COMPLETE 12.srv",
            "12.srv"
        ));
        assert!(kill_accepted("qdel: nonexistent job id 12", "12"));
        assert!(kill_accepted("qdel: Unknown Job Id 12.srv", "12"));
        assert!(!kill_accepted("qdel: Unauthorized Request 12.srv", "12"));
    }
}
