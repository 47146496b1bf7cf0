use std::path::Path;

use cli_table::format::{Justify, Separator};
use cli_table::{Cell, CellStruct, Color, ColorChoice, Style, Table, TableStruct, print_stdout};
use colored::Colorize;

use crate::batch::{JobRecord, TaskState};
use crate::client::output::outputs::Output;
use crate::common::utils::str::pluralize;
use crate::ledger::LedgerStatus;
use crate::pipeline::counter::CounterState;

pub struct CliOutput {
    color_policy: ColorChoice,
}

impl CliOutput {
    pub fn new(color_policy: ColorChoice) -> CliOutput {
        CliOutput { color_policy }
    }

    fn print_vertical_table(&self, rows: Vec<Vec<CellStruct>>) {
        let table = rows.table().separator(
            Separator::builder()
                .column(Some(Default::default()))
                .build(),
        );
        self.print_table(table);
    }

    fn print_horizontal_table(&self, rows: Vec<Vec<CellStruct>>, header: Vec<CellStruct>) {
        let table = rows
            .table()
            .separator(
                Separator::builder()
                    .title(Some(Default::default()))
                    .column(Some(Default::default()))
                    .build(),
            )
            .title(header);
        self.print_table(table);
    }

    fn print_table(&self, table: TableStruct) {
        let table = table.color_choice(self.color_policy);
        if let Err(e) = print_stdout(table) {
            log::error!("Cannot print table to stdout: {e:?}");
        }
    }
}

fn state_color(state: TaskState) -> Color {
    match state {
        TaskState::Running => Color::Yellow,
        TaskState::Queueing => Color::Cyan,
        TaskState::Holding => Color::Blue,
        TaskState::Error => Color::Red,
        TaskState::Other => Color::White,
    }
}

/// Rows of the status table: every state with its task count.
fn status_rows(status: &LedgerStatus) -> Vec<(TaskState, u32)> {
    TaskState::ALL
        .into_iter()
        .map(|state| (state, status.count(state)))
        .collect()
}

impl Output for CliOutput {
    fn print_job_submitted(&self, record: &JobRecord) {
        println!(
            "Job submitted {}, job ID: {}",
            "successfully".color(colored::Color::Green),
            record.id
        );
    }

    fn print_jobs_dropped(&self, records: &[JobRecord]) {
        let rows = records
            .iter()
            .map(|record| {
                vec![
                    record.id.as_str().cell(),
                    record.script.display().cell(),
                ]
            })
            .collect();
        let header = vec!["ID".cell().bold(true), "Script".cell().bold(true)];
        self.print_horizontal_table(rows, header);
    }

    fn print_auto_run(&self, iterations: u32, last: Option<&JobRecord>) {
        match last {
            Some(record) => println!(
                "Submitted {iterations} {}, last job ID: {}",
                pluralize("iteration", iterations as usize),
                record.id
            ),
            None => println!("No stage was submitted"),
        }
    }

    fn print_ledger_status(&self, status: &LedgerStatus) {
        let mut rows: Vec<Vec<CellStruct>> = status_rows(status)
            .into_iter()
            .map(|(state, count)| {
                vec![
                    state.to_string().cell().foreground_color(Some(state_color(state))),
                    count.cell().justify(Justify::Right),
                ]
            })
            .collect();
        rows.push(vec![
            "TOTAL".cell().bold(true),
            status.total_tasks().cell().justify(Justify::Right).bold(true),
        ]);
        let header = vec!["State".cell().bold(true), "Tasks".cell().bold(true)];
        self.print_horizontal_table(rows, header);
        println!(
            "{} recorded {}, {} still known to the batch system",
            status.jobs,
            pluralize("job", status.jobs),
            status.live_jobs
        );
    }

    fn print_jobs_cancelled(&self, job_ids: &[String]) {
        if job_ids.is_empty() {
            println!("No job was cancelled");
        } else {
            println!(
                "Cancelled {} {}: {}",
                job_ids.len(),
                pluralize("job", job_ids.len()),
                job_ids.join(", ")
            );
        }
    }

    fn print_jobs_pruned(&self, count: usize, remaining: usize) {
        println!(
            "Removed {count} finished {} from the ledger, {remaining} remaining",
            pluralize("job", count)
        );
    }

    fn print_counter(&self, path: &Path, state: &CounterState) {
        let (state, progress) = match state {
            CounterState::NotStarted => ("NOT STARTED".cell(), "".cell()),
            CounterState::Running { current, max } => (
                "RUNNING".cell().foreground_color(Some(Color::Yellow)),
                format!("{current}/{max}").cell(),
            ),
            CounterState::Finished { max } => (
                "FINISHED".cell().foreground_color(Some(Color::Green)),
                format!("{max}/{max}").cell(),
            ),
        };
        let rows = vec![
            vec!["Counter".cell().bold(true), path.display().cell()],
            vec!["State".cell().bold(true), state],
            vec!["Iterations".cell().bold(true), progress],
        ];
        self.print_vertical_table(rows);
    }

    fn print_error(&self, error: anyhow::Error) {
        log::error!("{error:?}");
    }
}
