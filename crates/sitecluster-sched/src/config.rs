//! Configuration derived from the execution context.
//!
//! Everything is read from environment variables:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `SITE_CLUSTER_USE_PBS` | select the PBS/Torque backend |
//! | `SITE_CLUSTER_USE_LSF` | select the LSF backend |
//! | `SITE_CLUSTER_USE_SGE` | select the Sun Grid Engine backend |
//! | `SITE_CLUSTER_USE_SLURM` | select the SLURM backend |
//! | `SITE_CLUSTER_USE_SUBPROCESS` | run jobs as local processes |
//! | `SITE_CLUSTER_ALLOW_USER` | honor `--user` (`1`, `true` or `yes`) |
//! | `SITE_CLUSTER_BEHAVIOR_FILE` | JSON/YAML document printed by `behavior` |
//!
//! Markers are checked in the order above; the first present one wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::ExecContext;
use crate::error::{SchedError, SchedResult};

/// API versions implemented by this tool, newest last.
pub const API_VERSIONS: &[&str] = &["core_1"];

const ALLOW_USER_VAR: &str = "SITE_CLUSTER_ALLOW_USER";
const BEHAVIOR_FILE_VAR: &str = "SITE_CLUSTER_BEHAVIOR_FILE";

/// The five supported batch systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Pbs,
    Lsf,
    Sge,
    Slurm,
    Process,
}

impl BackendKind {
    /// All kinds in marker precedence order.
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Pbs,
        BackendKind::Lsf,
        BackendKind::Sge,
        BackendKind::Slurm,
        BackendKind::Process,
    ];

    /// Environment variable whose presence selects this backend.
    pub fn marker(&self) -> &'static str {
        match self {
            BackendKind::Pbs => "SITE_CLUSTER_USE_PBS",
            BackendKind::Lsf => "SITE_CLUSTER_USE_LSF",
            BackendKind::Sge => "SITE_CLUSTER_USE_SGE",
            BackendKind::Slurm => "SITE_CLUSTER_USE_SLURM",
            BackendKind::Process => "SITE_CLUSTER_USE_SUBPROCESS",
        }
    }

    /// Pick the first backend whose marker is set.
    pub fn detect(ctx: &ExecContext) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| ctx.has_var(kind.marker()))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Pbs => "pbs",
            BackendKind::Lsf => "lsf",
            BackendKind::Sge => "sge",
            BackendKind::Slurm => "slurm",
            BackendKind::Process => "process",
        };
        f.write_str(name)
    }
}

/// Settings for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// Selected backend, if any marker was present.
    pub backend: Option<BackendKind>,

    /// Whether `--user` may be forwarded to the batch system.
    pub allow_user: bool,

    /// Optional behavior document.
    pub behavior_file: Option<PathBuf>,
}

impl ClusterConfig {
    /// Derive the configuration from an execution context.
    pub fn from_context(ctx: &ExecContext) -> Self {
        let allow_user = ctx.var(ALLOW_USER_VAR).is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        });
        let behavior_file = ctx
            .var(BEHAVIOR_FILE_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            backend: BackendKind::detect(ctx),
            allow_user,
            behavior_file,
        }
    }

    /// The selected backend, or [`SchedError::NoBackend`].
    pub fn require_backend(&self) -> SchedResult<BackendKind> {
        self.backend.ok_or(SchedError::NoBackend)
    }

    /// Load the behavior document, or an empty one when none is configured.
    pub fn behavior(&self) -> SchedResult<Behavior> {
        match &self.behavior_file {
            Some(path) => Behavior::load(path),
            None => Ok(Behavior::default()),
        }
    }
}

/// Default submission behavior per profile, as reported by `behavior`.
///
/// ```json
/// {
///   "beta": {
///     "mapping": [ { "memory": [0, 5], "command_argument_string": "-q small" } ],
///     "allow_user_command_argument_string_suffix": true
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Behavior(pub BTreeMap<String, BehaviorProfile>);

/// One named behavior profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    /// Arguments used for every submission with this profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_argument_string: Option<String>,

    /// Arguments selected by requested memory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mapping: Vec<MemoryMapping>,

    /// Whether callers may append their own arguments.
    #[serde(default)]
    pub allow_user_command_argument_string_suffix: bool,
}

/// Arguments applying to a half-open memory range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMapping {
    pub memory: [f64; 2],
    pub command_argument_string: String,
}

impl Behavior {
    /// Read a behavior document; `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub fn load(path: &Path) -> SchedResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SchedError::Behavior(format!("{}: {e}", path.display())))?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "yaml" | "yml"));

        let behavior = if is_yaml {
            serde_yaml_ng::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };
        Ok(behavior)
    }

    /// Compact JSON form printed on stdout.
    pub fn to_json(&self) -> SchedResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_precedence() {
        let ctx = ExecContext::new("/tmp")
            .with_var("SITE_CLUSTER_USE_SLURM", "")
            .with_var("SITE_CLUSTER_USE_LSF", "1");
        assert_eq!(BackendKind::detect(&ctx), Some(BackendKind::Lsf));

        let ctx = ExecContext::new("/tmp");
        assert_eq!(BackendKind::detect(&ctx), None);
        assert!(matches!(
            ClusterConfig::from_context(&ctx).require_backend(),
            Err(SchedError::NoBackend)
        ));
    }

    #[test]
    fn test_allow_user() {
        let ctx = ExecContext::new("/tmp").with_var(ALLOW_USER_VAR, "Yes");
        assert!(ClusterConfig::from_context(&ctx).allow_user);

        let ctx = ExecContext::new("/tmp").with_var(ALLOW_USER_VAR, "0");
        assert!(!ClusterConfig::from_context(&ctx).allow_user);
    }

    #[test]
    fn test_empty_behavior() {
        let config = ClusterConfig::default();
        assert_eq!(config.behavior().unwrap().to_json().unwrap(), "{}");
    }

    #[test]
    fn test_behavior_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("behavior.yaml");
        std::fs::write(
            &path,
            "alpha:\n  command_argument_string: \"-q short\"\n  allow_user_command_argument_string_suffix: true\n",
        )
        .unwrap();

        let config = ClusterConfig {
            behavior_file: Some(path),
            ..ClusterConfig::default()
        };
        let behavior = config.behavior().unwrap();
        let alpha = &behavior.0["alpha"];
        assert_eq!(alpha.command_argument_string.as_deref(), Some("-q short"));
        assert!(alpha.allow_user_command_argument_string_suffix);

        let json: serde_json::Value = serde_json::from_str(&behavior.to_json().unwrap()).unwrap();
        assert_eq!(json["alpha"]["command_argument_string"], "-q short");
    }
}
