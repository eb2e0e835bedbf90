//! Execution context: the environment an invocation runs in.
//!
//! Adapters never read process-global state directly. Allocation metadata
//! (node lists, current job identifier) and the working directory come from
//! an [`ExecContext`] handed to the adapter constructor, so tests can inject
//! a fake one.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{SchedError, SchedResult};

/// Snapshot of environment variables and working directory.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    vars: FxHashMap<String, String>,
    work_dir: PathBuf,
}

impl ExecContext {
    /// Create an empty context rooted at `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: FxHashMap::default(),
            work_dir: work_dir.into(),
        }
    }

    /// Capture the current process environment and working directory.
    ///
    /// Variables whose name or value is not UTF-8 are skipped; none of the
    /// scheduler variables we read can be.
    pub fn from_process() -> SchedResult<Self> {
        Ok(Self {
            vars: utf8_vars(std::env::vars_os()),
            work_dir: std::env::current_dir()?,
        })
    }

    /// Set a variable.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Look up a variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Check whether a variable is set at all (even to an empty value).
    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Look up a variable that must be present.
    pub fn require(&self, name: &str) -> SchedResult<&str> {
        self.var(name)
            .ok_or_else(|| SchedError::MissingEnv(name.to_string()))
    }

    /// Look up and parse a variable that must be present.
    pub fn require_parsed<T: FromStr>(&self, name: &str) -> SchedResult<T> {
        let raw = self.require(name)?;
        raw.trim().parse().map_err(|_| SchedError::InvalidEnv {
            var: name.to_string(),
            value: raw.to_string(),
        })
    }

    /// Look up and parse an optional variable.
    pub fn parsed<T: FromStr>(&self, name: &str) -> SchedResult<Option<T>> {
        if self.has_var(name) {
            self.require_parsed(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Directory new files (process capture files) are created in.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> FxHashMap<String, String> {
    vars.into_iter()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (name, _) => {
                debug!(var = ?name, "skipping non-UTF-8 environment variable");
                None
            }
        })
        .collect()
}
