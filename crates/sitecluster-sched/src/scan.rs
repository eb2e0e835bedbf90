//! Line scanning shared by the output parsers.

use regex::Regex;

use crate::error::SchedResult;
use crate::job::KillOutcome;
use crate::runner::{CommandOutput, Invocation};

/// First capture group of the first line matching `pattern`.
///
/// Lines are trimmed before matching.
pub(crate) fn first_capture(output: &str, pattern: &Regex) -> Option<String> {
    output
        .lines()
        .find_map(|line| pattern.captures(line.trim()))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// First capture group matched by `pattern` on a line whose leading
/// identifier (capture `id`) equals `job_id`. Lines are not trimmed, so
/// patterns may anchor on leading whitespace.
pub(crate) fn token_for_job(output: &str, pattern: &Regex, job_id: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let caps = pattern.captures(line)?;
        (caps.name("id")?.as_str() == job_id)
            .then(|| caps.name("token").map(|m| m.as_str().to_string()))
            .flatten()
    })
}

/// Capture group 1 from every line matching `pattern`, in order.
pub(crate) fn all_captures(output: &str, pattern: &Regex) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| pattern.captures(line.trim()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Whether `line` mentions `job_id` as a whole identifier.
///
/// `12` does not reference `123` or `12abc`, but `12` does reference
/// `12.server`, since PBS echoes fully qualified identifiers back.
pub(crate) fn references(line: &str, job_id: &str) -> bool {
    if job_id.is_empty() {
        return false;
    }
    line.match_indices(job_id).any(|(start, _)| {
        let before = line[..start].chars().next_back();
        let after = line[start + job_id.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

/// Re-scan kill output per identifier.
///
/// An identifier succeeds when one of the lines referencing it is
/// `accepted`. An identifier with no referencing line succeeds unless the
/// tool acknowledges every identifier (`expect_ack`).
pub(crate) fn kill_outcome<F>(
    output: &str,
    job_ids: &[String],
    expect_ack: bool,
    accepted: F,
) -> KillOutcome
where
    F: Fn(&str, &str) -> bool,
{
    KillOutcome::from_verdicts(job_ids.iter().map(|id| {
        let mut lines = output.lines().filter(|line| references(line, id)).peekable();
        if lines.peek().is_none() {
            if expect_ack {
                tracing::warn!(job_id = %id, "no acknowledgement in kill output");
            }
            return !expect_ack;
        }
        let ok = lines.any(|line| accepted(line, id));
        if !ok {
            tracing::warn!(job_id = %id, "unrecognized kill response");
        }
        ok
    }))
}

/// Interpret the output of a batch kill command.
///
/// A failing command whose output never mentions any of the identifiers is
/// an invocation failure (no server, bad permissions) and is returned as an
/// error; otherwise the output is re-scanned per identifier.
pub(crate) fn kill_result<F>(
    output: CommandOutput,
    invocation: &Invocation,
    job_ids: &[String],
    expect_ack: bool,
    accepted: F,
) -> SchedResult<KillOutcome>
where
    F: Fn(&str, &str) -> bool,
{
    let text = output.combined();
    let mentioned = job_ids
        .iter()
        .any(|id| text.lines().any(|line| references(line, id)));
    if !output.success() && !mentioned {
        return Err(output.into_error(invocation));
    }
    Ok(kill_outcome(&text, job_ids, expect_ack, accepted))
}
