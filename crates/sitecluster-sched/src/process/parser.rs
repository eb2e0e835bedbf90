//! Parsers for `ps` and `kill` output.

use std::sync::LazyLock;

use regex::Regex;

use crate::job::JobState;
use crate::scan;

static PS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<id>\d+)\s+(?P<token>[DRSTtWXZ])").expect("valid regex")
});

/// State letter for `pid` from `ps --no-headers -o pid,state --pid <pid>`.
pub fn parse_process_state(output: &str, pid: &str) -> Option<String> {
    scan::token_for_job(output, &PS_LINE, pid)
}

/// Map a `ps` state letter to the canonical state.
///
/// - D: uninterruptible sleep, R: running, S: sleeping
/// - T: stopped by job control, t: stopped by debugger, Z: zombie
/// - W: paging (not valid since Linux 2.6), X: dead
///
/// A vanished process has completed; its exit code cannot be recovered.
pub fn map_state(letter: Option<&str>) -> JobState {
    match letter {
        Some("D" | "R" | "S") => JobState::Running,
        Some("T" | "t" | "Z") => JobState::Suspended,
        _ => JobState::Completed,
    }
}

/// Whether a `kill` diagnostic means the process is already gone.
pub fn kill_accepted(line: &str, _pid: &str) -> bool {
    line.contains("No such process")
}
