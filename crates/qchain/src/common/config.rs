use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Map;
use crate::common::utils::fs::{absolute_path, normalize_path};
use crate::pipeline::StageUsage;
use crate::script::parallel_env::{ParallelEnvironments, default_parallel_environments};
use crate::task::kind::CommandKind;

pub const DEFAULT_CONFIG_NAME: &str = "qchain.toml";

/// Immutable configuration shared by every component of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestrationConfig {
    /// Overrides machine detection from the host name.
    pub machine: Option<String>,
    /// Base directory of all relative paths. Defaults to the directory of the config file.
    pub work_dir: PathBuf,
    pub paths: PathsConfig,
    /// Machine name -> host name fragment used for machine detection.
    pub machines: Map<String, String>,
    pub parallel_environments: ParallelEnvironments,
    /// Per command kind settings, keyed by the kind tag.
    pub kinds: Map<String, KindConfig>,
    pub admission: AdmissionConfig,
    pub stages: Vec<StageConfig>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            machine: None,
            work_dir: PathBuf::from("."),
            paths: PathsConfig::default(),
            machines: [("csf3", "csf3."), ("csf4", "csf4."), ("ffluxlab", "ffluxlab")]
                .into_iter()
                .map(|(name, fragment)| (name.to_string(), fragment.to_string()))
                .collect(),
            parallel_environments: default_parallel_environments(),
            kinds: Map::new(),
            admission: AdmissionConfig::default(),
            stages: vec![],
        }
    }
}

impl OrchestrationConfig {
    /// Loads the configuration from a TOML file.
    /// A missing file results in the default configuration rooted at the file's directory.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let path = absolute_path(path)?;
        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut config = if path.is_file() {
            log::debug!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            Self::parse(&content)?
        } else {
            log::debug!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            Self::default()
        };
        config.work_dir = normalize_path(&config.work_dir, &base_dir);
        Ok(config)
    }

    pub fn parse(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        normalize_path(path, &self.work_dir)
    }

    pub fn kind(&self, kind: CommandKind) -> KindConfig {
        self.kinds.get(kind.tag()).cloned().unwrap_or_default()
    }

    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.resolve(&self.paths.scripts)
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.resolve(&self.paths.outputs)
    }

    pub fn errors_dir(&self) -> PathBuf {
        self.resolve(&self.paths.errors)
    }

    pub fn datafiles_dir(&self) -> PathBuf {
        self.resolve(&self.paths.datafiles)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.paths.ledger)
    }

    pub fn counter_path(&self) -> PathBuf {
        self.resolve(&self.paths.counter)
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.resolve(&self.paths.quarantine)
    }

    pub fn admission_dir(&self) -> PathBuf {
        self.resolve(&self.admission.directory)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub scripts: PathBuf,
    pub outputs: PathBuf,
    pub errors: PathBuf,
    pub datafiles: PathBuf,
    pub ledger: PathBuf,
    pub counter: PathBuf,
    pub quarantine: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scripts: PathBuf::from(".qchain/scripts"),
            outputs: PathBuf::from(".qchain/outputs"),
            errors: PathBuf::from(".qchain/errors"),
            datafiles: PathBuf::from(".qchain/datafiles"),
            ledger: PathBuf::from(".qchain/jobs.json"),
            counter: PathBuf::from(".qchain/counter"),
            quarantine: PathBuf::from("quarantine"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindConfig {
    /// Program to execute; defaults to the kind's default program.
    pub program: Option<String>,
    /// Argument template; defaults to the kind's default arguments.
    pub arguments: Option<Vec<String>>,
    pub cores: u32,
    pub modules: Vec<String>,
    /// Maximum number of attempts of a single task. `1` disables retries.
    pub max_tries: u32,
    /// Quarantine the unit of work when the error metric exceeds this value.
    pub error_threshold: Option<f64>,
    /// Text that must be present in the first output for the task to be complete.
    pub completion_marker: Option<String>,
    /// Key of the error metric in the first output (`<key> <value>` or `<key> = <value>`).
    pub error_key: Option<String>,
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            program: None,
            arguments: None,
            cores: 1,
            modules: vec![],
            max_tries: 1,
            error_threshold: None,
            completion_marker: None,
            error_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Submit through the shared hand-off directory instead of the batch system.
    pub enabled: bool,
    pub directory: PathBuf,
    /// Maximum number of staged scripts in the directory.
    pub ceiling: usize,
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
    pub max_retries: u32,
    /// Size of the numeric id space of the drop channel.
    pub id_space: u64,
    /// Number of trailing ids of the id space that are reserved.
    pub reserved_ids: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("drop"),
            ceiling: 50,
            backoff: Duration::from_secs(60),
            max_retries: 10,
            id_space: 100_000,
            reserved_ids: 0,
        }
    }
}

/// Pipeline stage that runs one task per input file of a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub name: String,
    pub kind: CommandKind,
    #[serde(default)]
    pub usage: StageUsage,
    pub input_dir: PathBuf,
    pub input_extension: String,
    /// Defaults to `input_dir`.
    pub output_dir: Option<PathBuf>,
    pub output_extension: String,
    /// Number of tasks to reserve when the inputs are only produced by a preceding stage.
    pub expected_count: Option<usize>,
    /// Overrides the argument template of the kind.
    pub arguments: Option<Vec<String>>,
}

/// Configuration path and run id; every re-invocation of the orchestrator carries both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    pub config_path: PathBuf,
    pub run_id: String,
}

impl RunIdentity {
    pub fn new(config_path: PathBuf, run_id: Option<String>) -> Self {
        Self {
            config_path,
            run_id: run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn reinvocation_args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.config_path.display().to_string(),
            "-u".to_string(),
            self.run_id.clone(),
        ]
    }
}

mod humantime_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value: String = Deserialize::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{OrchestrationConfig, RunIdentity};
    use crate::pipeline::StageUsage;
    use crate::task::kind::CommandKind;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = OrchestrationConfig::parse(
            r#"
machine = "csf3"

[paths]
ledger = "jobs.json"

[kinds.gaussian]
cores = 4
modules = ["apps/binapps/gaussian/g16c01_em64t_detectcpu"]
max_tries = 3
completion_marker = "Normal termination"

[kinds.aimall]
cores = 2
error_threshold = 0.001
error_key = "IntegrationError"

[admission]
enabled = true
ceiling = 5
backoff = "30s"

[[stages]]
name = "wavefunctions"
kind = "gaussian"
usage = "all-but-last"
input_dir = "points"
input_extension = "gjf"
output_extension = "wfn"
"#,
        )
        .unwrap();
        assert_eq!(config.machine.as_deref(), Some("csf3"));
        assert_eq!(config.kind(CommandKind::Gaussian).cores, 4);
        assert_eq!(config.kind(CommandKind::Gaussian).max_tries, 3);
        assert_eq!(
            config.kind(CommandKind::Aimall).error_threshold,
            Some(0.001)
        );
        assert_eq!(config.kind(CommandKind::Ferebus).cores, 1);
        assert!(config.admission.enabled);
        assert_eq!(config.admission.backoff, Duration::from_secs(30));
        assert_eq!(config.stages[0].usage, StageUsage::AllButLast);
        assert_eq!(config.stages[0].kind, CommandKind::Gaussian);
        assert_eq!(config.paths.ledger, PathBuf::from("jobs.json"));
        assert_eq!(config.paths.counter, PathBuf::from(".qchain/counter"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(OrchestrationConfig::parse("foo = 1").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let config = OrchestrationConfig::load(&dir.path().join("qchain.toml")).unwrap();
        assert_eq!(config.work_dir, dir.path());
        assert_eq!(config.ledger_path(), dir.path().join(".qchain/jobs.json"));
    }

    #[test]
    fn test_work_dir_relative_to_config() {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let path = dir.path().join("qchain.toml");
        std::fs::write(&path, "work_dir = \"run\"\n").unwrap();
        let config = OrchestrationConfig::load(&path).unwrap();
        assert_eq!(config.work_dir, dir.path().join("run"));
        assert_eq!(config.quarantine_dir(), dir.path().join("run/quarantine"));
    }

    #[test]
    fn test_reinvocation_args() {
        let identity = RunIdentity::new(PathBuf::from("/data/qchain.toml"), Some("abc".into()));
        assert_eq!(
            identity.reinvocation_args(),
            vec!["-c", "/data/qchain.toml", "-u", "abc"]
        );
        let generated = RunIdentity::new(PathBuf::from("/data/qchain.toml"), None);
        assert_eq!(generated.run_id.len(), 36);
    }
}
