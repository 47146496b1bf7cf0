use std::path::Path;

use crate::batch::common::{run_command, submit_script};
use crate::batch::{
    BatchFuture, BatchResult, BatchSystem, BatchSystemKind, JobId, TaskState, TaskStatus,
};
use crate::common::arraydef::parse_array;

pub struct SlurmBatchSystem;

impl BatchSystem for SlurmBatchSystem {
    fn kind(&self) -> BatchSystemKind {
        BatchSystemKind::Slurm
    }

    fn directive_prefix(&self) -> &'static str {
        "#SBATCH"
    }

    fn task_index_var(&self) -> &'static str {
        "SLURM_ARRAY_TASK_ID"
    }

    fn task_count_var(&self) -> &'static str {
        "SLURM_ARRAY_TASK_COUNT"
    }

    fn working_dir_flag(&self, directory: &Path) -> String {
        format!("-D {}", directory.display())
    }

    fn stdout_flag(&self, directory: &Path) -> String {
        format!("--output={}/%x.o%A.%a", directory.display())
    }

    fn stderr_flag(&self, directory: &Path) -> String {
        format!("--error={}/%x.e%A.%a", directory.display())
    }

    fn parallel_environment_flag(&self, _environment: &str, cores: u32) -> String {
        format!("--cpus-per-task={cores}")
    }

    fn array_flag(&self, task_count: usize) -> String {
        format!("--array=1-{task_count}")
    }

    fn hold_args(&self, job_id: &str) -> Vec<String> {
        vec![format!("--dependency=afterany:{job_id}")]
    }

    fn submit(&self, script: &Path, hold: Option<&str>) -> BatchFuture<JobId> {
        let script = script.to_path_buf();
        let extra_args = hold.map(|id| self.hold_args(id)).unwrap_or_default();
        Box::pin(async move {
            submit_script("sbatch", extra_args, &script, |output| {
                log::debug!("Sbatch output: {output}");
                output
                    .lines()
                    .map(|l| l.trim())
                    .find(|l| l.to_lowercase().starts_with("submitted batch job"))
                    .and_then(|l| l.split(' ').nth(3))
                    .map(|l| l.to_string())
                    .ok_or_else(|| anyhow::anyhow!("Missing job id in sbatch output\n{output}"))
            })
            .await
        })
    }

    fn delete(&self, job_id: &str) -> BatchFuture<()> {
        let arguments = vec!["scancel".to_string(), job_id.to_string()];
        Box::pin(async move {
            run_command(arguments, Path::new(".")).await?;
            Ok(())
        })
    }

    fn status(&self) -> BatchFuture<Vec<TaskStatus>> {
        let arguments = ["squeue", "--noheader", "--array", "--me", "--format=%F|%K|%T|%r"]
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        Box::pin(async move {
            let output = run_command(arguments, Path::new(".")).await?;
            parse_squeue_output(&output)
        })
    }
}

fn parse_slurm_state(state: &str, reason: &str) -> TaskState {
    match state {
        "PENDING" if reason.starts_with("Dependency") => TaskState::Holding,
        "PENDING" | "CONFIGURING" | "REQUEUED" => TaskState::Queueing,
        "RUNNING" | "COMPLETING" | "STAGE_OUT" => TaskState::Running,
        "FAILED" | "NODE_FAIL" | "BOOT_FAIL" | "OUT_OF_MEMORY" => TaskState::Error,
        _ => TaskState::Other,
    }
}

/// Counts the tasks of a `%K` field (`3`, `1-10`, `4-20%2`, `N/A`).
fn parse_task_count(tasks: &str) -> BatchResult<u32> {
    let tasks = tasks.split('%').next().unwrap_or(tasks).trim();
    if tasks.is_empty() || tasks == "N/A" {
        return Ok(1);
    }
    let tasks = tasks.trim_start_matches('[').trim_end_matches(']');
    Ok(parse_array(tasks)
        .map_err(|e| anyhow::anyhow!("Invalid array task field `{tasks}`: {e}"))?
        .id_count())
}

fn parse_squeue_output(output: &str) -> BatchResult<Vec<TaskStatus>> {
    let mut result = vec![];
    for line in output.lines().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('|').collect();
        let [job_id, tasks, state, reason] = fields[..] else {
            anyhow::bail!("Unexpected squeue line `{line}`");
        };
        result.push(TaskStatus {
            job_id: job_id.to_string(),
            state: parse_slurm_state(state, reason),
            task_count: parse_task_count(tasks)?,
        });
    }
    Ok(result)
}
