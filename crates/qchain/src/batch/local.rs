use std::path::Path;

use crate::batch::{BatchFuture, BatchSystem, BatchSystemKind, JobId, TaskStatus};
use crate::common::env::{QCHAIN_TASK_ID, QCHAIN_TASK_LAST};

/// Job id returned for every submission to the local batch system.
pub const LOCAL_JOB_ID: &str = "test1234";

/// Batch system used when no queueing system is available.
///
/// Nothing is spawned: submissions only produce a fixed job id, so that whole pipelines can be
/// compiled and recorded deterministically. Generated scripts can still be run by hand, the task
/// index then defaults to 1.
pub struct LocalBatchSystem;

impl BatchSystem for LocalBatchSystem {
    fn kind(&self) -> BatchSystemKind {
        BatchSystemKind::Local
    }

    fn directive_prefix(&self) -> &'static str {
        "#LOCAL"
    }

    fn task_index_var(&self) -> &'static str {
        QCHAIN_TASK_ID
    }

    fn task_count_var(&self) -> &'static str {
        QCHAIN_TASK_LAST
    }

    fn working_dir_flag(&self, directory: &Path) -> String {
        format!("-wd {}", directory.display())
    }

    fn stdout_flag(&self, directory: &Path) -> String {
        format!("-o {}", directory.display())
    }

    fn stderr_flag(&self, directory: &Path) -> String {
        format!("-e {}", directory.display())
    }

    fn parallel_environment_flag(&self, environment: &str, cores: u32) -> String {
        format!("-pe {environment} {cores}")
    }

    fn array_flag(&self, task_count: usize) -> String {
        format!("-t 1-{task_count}")
    }

    fn hold_args(&self, job_id: &str) -> Vec<String> {
        vec!["-hold_jid".to_string(), job_id.to_string()]
    }

    fn submit(&self, script: &Path, hold: Option<&str>) -> BatchFuture<JobId> {
        log::debug!(
            "Local submission of {} (hold: {})",
            script.display(),
            hold.unwrap_or("none")
        );
        Box::pin(async move { Ok(LOCAL_JOB_ID.to_string()) })
    }

    fn delete(&self, _job_id: &str) -> BatchFuture<()> {
        Box::pin(async move { Ok(()) })
    }

    fn status(&self) -> BatchFuture<Vec<TaskStatus>> {
        Box::pin(async move { Ok(vec![]) })
    }
}
