use std::path::Path;

use crate::batch::common::{run_command, submit_script};
use crate::batch::{
    BatchFuture, BatchResult, BatchSystem, BatchSystemKind, JobId, TaskState, TaskStatus,
};
use crate::common::arraydef::parse_array;

/// Sun/Son of Grid Engine.
pub struct SgeBatchSystem;

impl BatchSystem for SgeBatchSystem {
    fn kind(&self) -> BatchSystemKind {
        BatchSystemKind::Sge
    }

    fn directive_prefix(&self) -> &'static str {
        "#$"
    }

    fn task_index_var(&self) -> &'static str {
        "SGE_TASK_ID"
    }

    fn task_count_var(&self) -> &'static str {
        "SGE_TASK_LAST"
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
        let script = script.to_path_buf();
        let extra_args = hold.map(|id| self.hold_args(id)).unwrap_or_default();
        Box::pin(async move {
            submit_script("qsub", extra_args, &script, |output| {
                log::debug!("Qsub output: {output}");
                parse_qsub_output(output)
            })
            .await
        })
    }

    fn delete(&self, job_id: &str) -> BatchFuture<()> {
        let arguments = vec!["qdel".to_string(), job_id.to_string()];
        Box::pin(async move {
            run_command(arguments, Path::new(".")).await?;
            Ok(())
        })
    }

    fn status(&self) -> BatchFuture<Vec<TaskStatus>> {
        Box::pin(async move {
            let output = run_command(vec!["qstat".to_string()], Path::new(".")).await?;
            parse_qstat_output(&output)
        })
    }
}

/// Parses `Your job 123 ("run.sh") has been submitted`
/// and `Your job-array 124.1-10:1 ("run.sh") has been submitted`.
fn parse_qsub_output(output: &str) -> BatchResult<JobId> {
    output
        .lines()
        .map(|line| line.trim())
        .find_map(|line| {
            let rest = line
                .strip_prefix("Your job-array ")
                .or_else(|| line.strip_prefix("Your job "))?;
            let token = rest.split_whitespace().next()?;
            let id = token.split('.').next()?;
            (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
        })
        .ok_or_else(|| anyhow::anyhow!("Missing job id in qsub output\n{output}"))
}

fn parse_sge_state(state: &str) -> TaskState {
    if state.contains('E') {
        TaskState::Error
    } else if state.contains('h') {
        TaskState::Holding
    } else if state.contains('r') || state.contains('t') {
        TaskState::Running
    } else if state.contains('q') {
        TaskState::Queueing
    } else {
        TaskState::Other
    }
}

/// Parses the default `qstat` table.
///
/// ```text
/// job-ID  prior   name    user  state submit/start at     queue          slots ja-task-ID
/// ---------------------------------------------------------------------------------------
///     123 0.55500 run.sh  user  r     01/01/2024 10:00:00 all.q@node1        1 3
///     124 0.00000 run.sh  user  qw    01/01/2024 10:00:00                    1 1-10:1
/// ```
fn parse_qstat_output(output: &str) -> BatchResult<Vec<TaskStatus>> {
    let mut result = vec![];
    for line in output.lines().skip(2) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            continue;
        }
        let job_id = fields[0].to_string();
        let state = parse_sge_state(fields[4]);

        // id, prior, name, user, state, date, time, [queue], slots, [ja-task-ID]
        let mut rest = &fields[7..];
        if rest.first().is_some_and(|field| field.contains('@')) {
            rest = &rest[1..];
        }
        let task_count = match rest.get(1) {
            Some(tasks) => parse_array(tasks)
                .map_err(|e| anyhow::anyhow!("Invalid ja-task-ID `{tasks}` of job {job_id}: {e}"))?
                .id_count(),
            None => 1,
        };
        result.push(TaskStatus {
            job_id,
            state,
            task_count,
        });
    }
    Ok(result)
}
