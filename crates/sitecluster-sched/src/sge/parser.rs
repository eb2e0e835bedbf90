//! Parsers for Grid Engine command output.

use std::sync::LazyLock;

use regex::Regex;

use crate::job::JobState;
use crate::scan;

static QUEUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_.\-]+)$").expect("valid regex"));
static QSUB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Yy]our job\s+([0-9]+)").expect("valid regex"));
static QSTAT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<id>\d+)\s+[\d.]+\s+\S+\s+\S+\s+(?P<token>\S+)\s+").expect("valid regex")
});

/// Parse `qconf -sql` output (one queue per line).
pub fn parse_queue_list(output: &str) -> Vec<String> {
    scan::all_captures(output, &QUEUE_LINE)
}

/// Extract the job number from `qsub` output, e.g.
/// `Your job 318 ("sim") has been submitted`.
pub fn parse_qsub_output(output: &str) -> Option<String> {
    scan::first_capture(output, &QSUB_ID)
}

/// Extract the state column for `job_id` from plain `qstat` output.
///
/// ```text
/// job-ID  prior   name       user         state submit/start at     queue            slots
/// -----------------------------------------------------------------------------------------
///     318 0.55500 sim        alice        r     10/19/2026 10:02:11 all.q@node01         1
/// ```
pub fn parse_job_state(output: &str, job_id: &str) -> Option<String> {
    scan::token_for_job(output, &QSTAT_LINE, job_id)
}

/// Map a Grid Engine state string to the canonical state.
///
/// States are letter combinations (`qw`, `hqw`, `r`, `Rr`, `t`, `s`, `dr`,
/// `Eqw`, ...). Suspension letters win over running ones; anything else
/// still listed is waiting.
pub fn map_state(state: &str) -> JobState {
    if state.contains(['s', 'S', 'T']) {
        JobState::Suspended
    } else if state.contains(['r', 't']) {
        JobState::Running
    } else {
        JobState::Pending
    }
}

/// Whether `qacct` has no accounting record for the job.
pub fn accounting_unknown(output: &str, job_id: &str) -> bool {
    output.contains(&format!("job id {job_id} not found"))
}

/// The `exit_status` field of `qacct -j` output.
///
/// ```text
/// ==============================================================
/// qname        all.q
/// jobnumber    318
/// failed       0
/// exit_status  0
/// ```
pub fn parse_accounting_exit(output: &str) -> Option<i32> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some("exit_status"), Some(value)) => value.parse().ok(),
            _ => None,
        }
    })
}

/// Whether a `qdel` response line means the job is gone or going.
pub fn kill_accepted(line: &str, job_id: &str) -> bool {
    line.contains(&format!("has registered the job {job_id} for deletion"))
        || line.contains(&format!("has deleted job {job_id}"))
        || line.trim_start().starts_with("denied:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_list() {
        assert_eq!(parse_queue_list("all.q\nlong-run.q\n\n"), vec!["all.q", "long-run.q"]);
    }

    #[test]
    fn test_parse_qsub_output() {
        assert_eq!(
            parse_qsub_output("Your job 318 (\"sim\") has been submitted\n"),
            Some("318".to_string())
        );
        assert_eq!(parse_qsub_output("Unable to run job: denied.\n"), None);
    }

    #[test]
    fn test_parse_job_state() {
        let output = r#"job-ID  prior   name       user         state submit/start at     queue            slots
-----------------------------------------------------------------------------------------
    318 0.55500 sim        alice        r     10/19/2026 10:02:11 all.q@node01         1
    319 0.00000 post       alice        hqw   10/19/2026 10:02:15                      1
"#;
        assert_eq!(parse_job_state(output, "318").as_deref(), Some("r"));
        assert_eq!(parse_job_state(output, "319").as_deref(), Some("hqw"));
        assert_eq!(parse_job_state(output, "31"), None);
    }

    #[test]
    fn test_map_state() {
        assert_eq!(map_state("qw"), JobState::Pending);
        assert_eq!(map_state("hqw"), JobState::Pending);
        assert_eq!(map_state("Eqw"), JobState::Pending);
        assert_eq!(map_state("r"), JobState::Running);
        assert_eq!(map_state("Rr"), JobState::Running);
        assert_eq!(map_state("t"), JobState::Running);
        assert_eq!(map_state("s"), JobState::Suspended);
        assert_eq!(map_state("St"), JobState::Suspended);
        assert_eq!(map_state("T"), JobState::Suspended);
    }

    #[test]
    fn test_accounting() {
        let output = "==============================================================\nqname        all.q\nfailed       0\nexit_status  137                  (Killed)\n";
        assert_eq!(parse_accounting_exit(output), Some(137));
        assert_eq!(parse_accounting_exit("qname all.q\n"), None);
        assert!(accounting_unknown("error: job id 12 not found\n", "12"));
        assert!(!accounting_unknown("error: job id 123 not found\n", "12"));
    }

    #[test]
    fn test_kill_accepted() {
        assert!(kill_accepted("alice has registered the job 318 for deletion", "318"));
        assert!(kill_accepted("alice has deleted job 318", "318"));
        assert!(kill_accepted("denied: job \"318\" does not exist", "318"));
        assert!(!kill_accepted("alice - you do not have the necessary privileges to delete job 318", "318"));
    }
}
