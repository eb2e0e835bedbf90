//! Parser for dependency job lists.
//!
//! Accepted forms, all equivalent:
//!
//! ```text
//! ['12.srv', '13.srv']
//! ["12.srv","13.srv",]
//! (12.srv, 13.srv)
//! 12.srv,13.srv
//! ```
//!
//! Items are bare or wrapped in matching single/double quotes and may only
//! contain ASCII alphanumerics and `.`, `_`, `-`, `@`. Nothing is ever
//! evaluated.

use crate::error::{SchedError, SchedResult};

/// Parse a dependency list literal into job identifiers.
///
/// An empty list (`[]`, `()` or an all-blank string) yields no identifiers.
pub fn parse_job_list(literal: &str) -> SchedResult<Vec<String>> {
    let body = strip_brackets(literal.trim())?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut items: Vec<&str> = body.split(',').collect();
    // One trailing comma is allowed, as in `['a',]`.
    if items.len() > 1 && items.last().is_some_and(|last| last.trim().is_empty()) {
        items.pop();
    }

    items.into_iter().map(parse_item).collect()
}

fn strip_brackets(literal: &str) -> SchedResult<&str> {
    let pairs = [('[', ']'), ('(', ')')];
    for (open, close) in pairs {
        if let Some(rest) = literal.strip_prefix(open) {
            return rest
                .strip_suffix(close)
                .ok_or_else(|| invalid(literal, format!("missing closing `{close}`")));
        }
    }
    Ok(literal)
}

fn parse_item(raw: &str) -> SchedResult<String> {
    let item = raw.trim();
    let unquoted = match item.chars().next() {
        Some(quote @ ('\'' | '"')) => item
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
            .ok_or_else(|| invalid(item, "unterminated quote".to_string()))?,
        _ => item,
    };

    if unquoted.is_empty() {
        return Err(invalid(raw, "empty job identifier".to_string()));
    }
    if let Some(bad) = unquoted.chars().find(|c| !is_id_char(*c)) {
        return Err(invalid(unquoted, format!("unexpected character `{bad}`")));
    }
    Ok(unquoted.to_string())
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@')
}

fn invalid(input: &str, reason: String) -> SchedError {
    SchedError::InvalidDependency(format!("{reason} in `{input}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_style_list() {
        let ids = parse_job_list("['12345.mgr001', '12346.mgr001']").unwrap();
        assert_eq!(ids, vec!["12345.mgr001", "12346.mgr001"]);
    }

    #[test]
    fn test_bare_and_mixed_quotes() {
        let ids = parse_job_list(r#"[12, "13", '14',]"#).unwrap();
        assert_eq!(ids, vec!["12", "13", "14"]);

        let ids = parse_job_list("7,8").unwrap();
        assert_eq!(ids, vec!["7", "8"]);

        let ids = parse_job_list("(7)").unwrap();
        assert_eq!(ids, vec!["7"]);
    }

    #[test]
    fn test_empty_lists() {
        assert!(parse_job_list("[]").unwrap().is_empty());
        assert!(parse_job_list("()").unwrap().is_empty());
        assert!(parse_job_list("  ").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_expressions() {
        for hostile in [
            "__import__('os').system('rm -rf /')",
            "['1'] + ['2']",
            "['1'; rm -rf ~]",
            "[$(id)]",
            "['a b']",
            "['1',,'2']",
            "['1'",
            "['1\"]",
        ] {
            assert!(
                matches!(parse_job_list(hostile), Err(SchedError::InvalidDependency(_))),
                "accepted hostile input {hostile:?}"
            );
        }
    }
}
