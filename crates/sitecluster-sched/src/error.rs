//! Error handling for cluster operations.

use thiserror::Error;

/// Result type for cluster operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur while talking to a batch system.
///
/// Unknown job identifiers are never reported through this type; they are
/// normalized to [`JobState::UnknownId`](crate::JobState::UnknownId).
#[derive(Error, Debug)]
pub enum SchedError {
    /// An external tool exited with a status that does not mean "unknown job".
    #[error("Command `{command}` failed with exit code {status}: {detail}", status = fmt_code(.code), detail = .output.trim())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// An external tool could not be started at all.
    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The dependency list is not a plain list of job identifiers.
    #[error("Invalid dependency list: {0}")]
    InvalidDependency(String),

    /// Custom submit arguments could not be tokenized.
    #[error("Invalid custom arguments: {0}")]
    InvalidArguments(String),

    /// A required allocation variable is missing from the environment.
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    /// An allocation variable holds a value that cannot be interpreted.
    #[error("Environment variable {var} has an invalid value: {value}")]
    InvalidEnv { var: String, value: String },

    /// Sub-node launch targeted an index outside the allocation.
    #[error("Node index {index} is out of range (allocation has {available} nodes)")]
    NodeOutOfRange { index: usize, available: usize },

    /// No backend marker is present in the environment.
    #[error(
        "No sitecluster configuration enabled through a SITE_CLUSTER_USE_{{PBS|LSF|SGE|SLURM|SUBPROCESS}} environment variable"
    )]
    NoBackend,

    /// Behavior document could not be loaded.
    #[error("Behavior configuration error: {0}")]
    Behavior(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

fn fmt_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedError::CommandFailed {
            command: "qstat -f 12".to_string(),
            code: Some(2),
            output: "qstat: cannot connect to server\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command `qstat -f 12` failed with exit code 2: qstat: cannot connect to server"
        );

        let err = SchedError::NodeOutOfRange {
            index: 4,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "Node index 4 is out of range (allocation has 2 nodes)"
        );

        let err = SchedError::MissingEnv("PBS_JOBID".to_string());
        assert_eq!(err.to_string(), "Environment variable PBS_JOBID is not set");
    }

    #[test]
    fn test_signal_exit_display() {
        let err = SchedError::CommandFailed {
            command: "bjobs".to_string(),
            code: None,
            output: String::new(),
        };
        assert!(err.to_string().contains("killed by signal"));
    }
}
