use std::path::Path;

use crate::batch::JobRecord;
use crate::ledger::LedgerStatus;
use crate::pipeline::counter::CounterState;

#[derive(clap::ValueEnum, Clone)]
pub enum Outputs {
    CLI,
    JSON,
}

pub trait Output {
    // Submission
    fn print_job_submitted(&self, record: &JobRecord);
    fn print_jobs_dropped(&self, records: &[JobRecord]);
    fn print_auto_run(&self, iterations: u32, last: Option<&JobRecord>);

    // Ledger
    fn print_ledger_status(&self, status: &LedgerStatus);
    fn print_jobs_cancelled(&self, job_ids: &[String]);
    fn print_jobs_pruned(&self, count: usize, remaining: usize);

    // Counter
    fn print_counter(&self, path: &Path, state: &CounterState);

    // Errors
    fn print_error(&self, error: anyhow::Error);
}
