use std::path::Path;

use serde_json::{Value, json};

use crate::batch::{JobRecord, TaskState};
use crate::client::output::outputs::Output;
use crate::ledger::LedgerStatus;
use crate::pipeline::counter::CounterState;

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    fn print(&self, data: Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
        );
    }
}

fn format_status(status: &LedgerStatus) -> Value {
    let tasks: serde_json::Map<String, Value> = TaskState::ALL
        .into_iter()
        .map(|state| (state.to_string().to_lowercase(), json!(status.count(state))))
        .collect();
    json!({
        "jobs": status.jobs,
        "live_jobs": status.live_jobs,
        "tasks": tasks,
        "total_tasks": status.total_tasks(),
    })
}

impl Output for JsonOutput {
    fn print_job_submitted(&self, record: &JobRecord) {
        self.print(json!(record));
    }

    fn print_jobs_dropped(&self, records: &[JobRecord]) {
        self.print(json!(records));
    }

    fn print_auto_run(&self, iterations: u32, last: Option<&JobRecord>) {
        self.print(json!({
            "iterations": iterations,
            "last_job": last,
        }));
    }

    fn print_ledger_status(&self, status: &LedgerStatus) {
        self.print(format_status(status));
    }

    fn print_jobs_cancelled(&self, job_ids: &[String]) {
        self.print(json!({ "cancelled": job_ids }));
    }

    fn print_jobs_pruned(&self, count: usize, remaining: usize) {
        self.print(json!({ "pruned": count, "remaining": remaining }));
    }

    fn print_counter(&self, path: &Path, state: &CounterState) {
        self.print(json!({
            "path": path,
            "counter": state,
        }));
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(json!({ "error": format!("{error:?}") }));
    }
}
