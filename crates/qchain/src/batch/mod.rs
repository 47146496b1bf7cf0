mod common;
pub mod local;
pub mod sge;
pub mod slurm;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::batch::local::LocalBatchSystem;
use crate::batch::sge::SgeBatchSystem;
use crate::batch::slurm::SlurmBatchSystem;

pub type BatchResult<T> = anyhow::Result<T>;
pub type BatchFuture<T> = Pin<Box<dyn Future<Output = BatchResult<T>>>>;

/// Identifier assigned to a submitted job by the batch system.
pub type JobId = String;

/// Record of one successful submission, as stored in the job ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub script: PathBuf,
    pub id: JobId,
    /// Run id of the orchestrator instance that submitted the job.
    pub instance: String,
}

impl JobRecord {
    pub fn new(script: PathBuf, id: JobId, instance: String) -> Self {
        Self {
            script,
            id,
            instance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskState {
    Running,
    Queueing,
    Holding,
    Error,
    Other,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Running,
        TaskState::Queueing,
        TaskState::Holding,
        TaskState::Error,
        TaskState::Other,
    ];
}

impl Display for TaskState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TaskState::Running => "RUNNING",
            TaskState::Queueing => "QUEUEING",
            TaskState::Holding => "HOLDING",
            TaskState::Error => "ERROR",
            TaskState::Other => "OTHER",
        })
    }
}

/// Entry of the live listing of a batch system.
/// Array jobs report one entry per group of tasks sharing a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub job_id: JobId,
    pub state: TaskState,
    pub task_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchSystemKind {
    Sge,
    Slurm,
    Local,
}

/// Queueing system that runs the generated scripts.
pub trait BatchSystem {
    fn kind(&self) -> BatchSystemKind;

    /// Comment prefix of script directives (e.g. `#$`).
    fn directive_prefix(&self) -> &'static str;

    /// Variable holding the 1-based index of the running array task.
    fn task_index_var(&self) -> &'static str;

    /// Variable holding the number of tasks of the running array job.
    fn task_count_var(&self) -> &'static str;

    fn working_dir_flag(&self, directory: &Path) -> String;
    fn stdout_flag(&self, directory: &Path) -> String;
    fn stderr_flag(&self, directory: &Path) -> String;

    fn parallel_environment_flag(&self, environment: &str, cores: u32) -> String;

    /// Directive creating an array job with `task_count` tasks.
    fn array_flag(&self, task_count: usize) -> String;

    /// Submission arguments that make the job wait for `job_id`.
    fn hold_args(&self, job_id: &str) -> Vec<String>;

    /// Submits `script` and returns the id parsed from the output of the submit command.
    fn submit(&self, script: &Path, hold: Option<&str>) -> BatchFuture<JobId>;

    /// Asks the batch system to stop the job, if it still exists.
    fn delete(&self, job_id: &str) -> BatchFuture<()>;

    /// Lists the jobs of the current user that are still known to the batch system.
    fn status(&self) -> BatchFuture<Vec<TaskStatus>>;
}

pub fn create_batch_system(kind: BatchSystemKind) -> Box<dyn BatchSystem> {
    match kind {
        BatchSystemKind::Sge => Box::new(SgeBatchSystem),
        BatchSystemKind::Slurm => Box::new(SlurmBatchSystem),
        BatchSystemKind::Local => Box::new(LocalBatchSystem),
    }
}

/// Probes the environment for a known batch system, falling back to the local one.
pub fn detect_batch_system() -> BatchSystemKind {
    let kind = detect_from(
        |name| std::env::var_os(name).is_some(),
        |program| which::which(program).is_ok(),
    );
    log::debug!("Detected batch system: {kind:?}");
    kind
}

fn detect_from<E, P>(has_env: E, has_program: P) -> BatchSystemKind
where
    E: Fn(&str) -> bool,
    P: Fn(&str) -> bool,
{
    if has_env("SGE_ROOT") || has_program("qsub") {
        BatchSystemKind::Sge
    } else if has_env("SLURM_CONF") || has_program("sbatch") {
        BatchSystemKind::Slurm
    } else {
        BatchSystemKind::Local
    }
}
