//! Parsers for LSF command output.

use std::sync::LazyLock;

use regex::Regex;

use crate::job::JobState;
use crate::scan;

static QUEUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_\-]+) *([0-9]+)").expect("valid regex"));
static BSUB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Job\s+<([0-9]+)>").expect("valid regex"));
static BJOBS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<id>\S+)\s+\S+\s+(?P<token>\w+)\s+").expect("valid regex")
});
static NOT_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Job\s*<([^>]*)>\s*is not found").expect("valid regex"));
static EXITED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Exited with exit code\s*(\d+)").expect("valid regex"));

const DONE_SUCCESSFULLY: &str = "Done successfully";
const NO_MATCHING_JOB: &str = "No matching job found";

/// Parse `bqueues -w` output into queue names.
///
/// ```text
/// QUEUE_NAME      PRIO STATUS          MAX JL/U JL/P JL/H NJOBS  PEND   RUN  SUSP
/// priority         43  Open:Active       -    -    -    -     0     0     0     0
/// normal           30  Open:Active       -    -    -    -     2     0     2     0
/// ```
pub fn parse_queue_list(output: &str) -> Vec<String> {
    scan::all_captures(output, &QUEUE_LINE)
}

/// Extract the job number from `bsub` output, e.g.
/// `Job <1234> is submitted to queue <normal>.`
pub fn parse_bsub_output(output: &str) -> Option<String> {
    scan::first_capture(output, &BSUB_ID)
}

/// Extract the `STAT` column for `job_id` from `bjobs -a` output.
///
/// ```text
/// JOBID   USER    STAT  QUEUE      FROM_HOST   EXEC_HOST   JOB_NAME   SUBMIT_TIME
/// 1234    alice   RUN   normal     login01     node07      sim        Oct 19 10:02
/// ```
pub fn parse_job_state(output: &str, job_id: &str) -> Option<String> {
    scan::token_for_job(output, &BJOBS_LINE, job_id)
}

/// Whether `bjobs` reported `Job <id> is not found`.
pub fn is_not_found(output: &str, job_id: &str) -> bool {
    output
        .lines()
        .filter_map(|line| NOT_FOUND.captures(line))
        .any(|caps| &caps[1] == job_id)
}

/// Map an LSF `STAT` value to the canonical state.
///
/// `EXIT` is not handled here: it needs the job history to recover the
/// exit code.
pub fn map_state(stat: Option<&str>) -> JobState {
    match stat {
        Some("PEND" | "WAIT") => JobState::Pending,
        Some("RUN") => JobState::Running,
        Some("SUSP" | "PSUSP" | "USUSP" | "SSUSP") => JobState::Suspended,
        _ => JobState::Completed,
    }
}

/// Whether `bhist` has no record of the job.
pub fn history_unknown(output: &str) -> bool {
    output.contains(NO_MATCHING_JOB)
}

/// Exit code recorded in `bhist -la` output.
pub fn history_exit_code(output: &str) -> Option<i32> {
    output.lines().find_map(|line| {
        if line.contains(DONE_SUCCESSFULLY) {
            return Some(0);
        }
        EXITED.captures(line).and_then(|caps| caps[1].parse().ok())
    })
}

/// Whether a `bkill` response line means the job is gone or going.
pub fn kill_accepted(line: &str, job_id: &str) -> bool {
    line.contains(&format!("Job <{job_id}> is being terminated"))
        || line.contains("Job has already finished")
        || line.contains(NO_MATCHING_JOB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_list() {
        let output = r#"QUEUE_NAME      PRIO STATUS          MAX JL/U JL/P JL/H NJOBS  PEND   RUN  SUSP
priority         43  Open:Active       -    -    -    -     0     0     0     0
night            40  Open:Inact        -    -    -    -     0     0     0     0
normal           30  Open:Active       -    -    -    -     2     0     2     0
"#;
        assert_eq!(parse_queue_list(output), vec!["priority", "night", "normal"]);
    }

    #[test]
    fn test_parse_bsub_output() {
        assert_eq!(
            parse_bsub_output("Job <1234> is submitted to queue <normal>.\n"),
            Some("1234".to_string())
        );
        assert_eq!(parse_bsub_output("Request aborted by esub.\n"), None);
    }

    #[test]
    fn test_parse_job_state() {
        let output = r#"JOBID   USER    STAT  QUEUE      FROM_HOST   EXEC_HOST   JOB_NAME   SUBMIT_TIME
1234    alice   RUN   normal     login01     node07      sim        Oct 19 10:02
"#;
        assert_eq!(parse_job_state(output, "1234").as_deref(), Some("RUN"));
        assert_eq!(parse_job_state(output, "123"), None);
    }

    #[test]
    fn test_not_found() {
        assert!(is_not_found("Job <1234> is not found\n", "1234"));
        assert!(!is_not_found("Job <12345> is not found\n", "1234"));
    }

    #[test]
    fn test_map_state() {
        assert_eq!(map_state(Some("PEND")), JobState::Pending);
        assert_eq!(map_state(Some("WAIT")), JobState::Pending);
        assert_eq!(map_state(Some("RUN")), JobState::Running);
        assert_eq!(map_state(Some("PSUSP")), JobState::Suspended);
        assert_eq!(map_state(Some("USUSP")), JobState::Suspended);
        assert_eq!(map_state(Some("SSUSP")), JobState::Suspended);
        assert_eq!(map_state(Some("DONE")), JobState::Completed);
        assert_eq!(map_state(Some("ZOMBI")), JobState::Completed);
        assert_eq!(map_state(None), JobState::Completed);
    }

    #[test]
    fn test_history() {
        let exited = "Fri Oct 19 10:05:01: Exited with exit code 3. The CPU time used is 0.1 seconds;\n";
        assert_eq!(history_exit_code(exited), Some(3));

        let done = "Fri Oct 19 10:05:01: Done successfully. The CPU time used is 0.1 seconds;\n";
        assert_eq!(history_exit_code(done), Some(0));

        assert_eq!(history_exit_code("Summary of time in seconds spent in various states\n"), None);
        assert!(history_unknown("No matching job found\n"));
    }

    #[test]
    fn test_kill_accepted() {
        assert!(kill_accepted("Job <12> is being terminated", "12"));
        assert!(kill_accepted("Job <12>: Job has already finished", "12"));
        assert!(kill_accepted("Job <12>: No matching job found", "12"));
        assert!(!kill_accepted("Job <12>: User permission denied", "12"));
    }
}
