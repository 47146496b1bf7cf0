use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::common::config::{OrchestrationConfig, RunIdentity, StageConfig};
use crate::common::machine::Machine;
use crate::orchestrator::Orchestrator;
use crate::pipeline::StageUsage;
use crate::task::CommandKind;
use crate::tests::utils::batch::TestBatchSystem;

pub const TEST_EXECUTABLE: &str = "/opt/qchain/bin/qchain";
pub const TEST_RUN_ID: &str = "run1";

/// Working directory with a configuration rooted in it and a recording batch system.
pub struct TestEnv {
    dir: TempDir,
    config: OrchestrationConfig,
    pub system: TestBatchSystem,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config<F: FnOnce(&mut OrchestrationConfig)>(configure: F) -> Self {
        let dir = TempDir::with_prefix("qchain").unwrap();
        let mut config = OrchestrationConfig {
            machine: Some("csf3".to_string()),
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        configure(&mut config);
        Self {
            dir,
            config,
            system: TestBatchSystem::default(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.dir.path().join(path)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P, content: &str) -> PathBuf {
        let path = self.path(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Creates an orchestrator sharing the batch system state of this environment.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.config.clone(),
            RunIdentity::new(self.path("qchain.toml"), Some(TEST_RUN_ID.to_string())),
            Machine::Known("csf3".to_string()),
            self.system.boxed(),
        )
        .with_executable(PathBuf::from(TEST_EXECUTABLE))
        .with_inside_job(false)
    }
}

pub fn stage_config(
    name: &str,
    input_dir: &str,
    input_extension: &str,
    output_dir: &str,
    output_extension: &str,
) -> StageConfig {
    StageConfig {
        name: name.to_string(),
        kind: CommandKind::Shell,
        usage: StageUsage::All,
        input_dir: PathBuf::from(input_dir),
        input_extension: input_extension.to_string(),
        output_dir: Some(PathBuf::from(output_dir)),
        output_extension: output_extension.to_string(),
        expected_count: None,
        arguments: None,
    }
}
