use std::path::{Path, PathBuf};

use crate::Map;
use crate::batch::{BatchSystem, JobRecord, TaskState, TaskStatus};
use crate::common::utils::fs::write_atomic;

/// Task counts per state of the jobs recorded in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStatus {
    /// Number of recorded jobs.
    pub jobs: usize,
    /// Number of recorded jobs still known to the batch system.
    pub live_jobs: usize,
    pub tasks: Map<TaskState, u32>,
}

impl LedgerStatus {
    pub fn count(&self, state: TaskState) -> u32 {
        self.tasks.get(&state).copied().unwrap_or(0)
    }

    pub fn total_tasks(&self) -> u32 {
        self.tasks.values().sum()
    }
}

/// Persistent list of submitted jobs, stored as a JSON array.
///
/// A single orchestrator writes the ledger of a working directory at a time.
pub struct JobLedger {
    path: PathBuf,
}

impl JobLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the recorded jobs; a missing ledger is empty.
    pub fn read(&self) -> crate::Result<Vec<JobRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(vec![]);
        }
        serde_json::from_str(&content).map_err(|error| {
            crate::Error::DeserializationError(format!(
                "Invalid job ledger {}: {error}",
                self.path.display()
            ))
        })
    }

    fn store(&self, records: &[JobRecord]) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(records)?;
        write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }

    pub fn append(&self, record: JobRecord) -> crate::Result<()> {
        let mut records = self.read()?;
        log::debug!(
            "Recording job {} ({}) in {}",
            record.id,
            record.script.display(),
            self.path.display()
        );
        records.push(record);
        self.store(&records)
    }

    /// Aggregates the live listing of `system` over the recorded jobs, counting tasks.
    pub async fn status(&self, system: &dyn BatchSystem) -> crate::Result<LedgerStatus> {
        let records = self.read()?;
        let listing = system.status().await?;
        Ok(aggregate_status(&records, &listing))
    }

    /// Deletes every recorded job that is still known to the batch system and empties the ledger.
    /// Jobs whose deletion failed stay recorded, so that the cancellation can be repeated.
    /// Returns the ids of the deleted jobs.
    pub async fn delete_all(&self, system: &dyn BatchSystem) -> crate::Result<Vec<String>> {
        let records = self.read()?;
        let listing = system.status().await?;

        let mut deleted: Vec<String> = vec![];
        let mut failed: Vec<String> = vec![];
        for record in &records {
            if deleted.contains(&record.id)
                || failed.contains(&record.id)
                || !is_live(&listing, &record.id)
            {
                continue;
            }
            log::info!("Deleting job {}", record.id);
            match system.delete(&record.id).await {
                Ok(()) => deleted.push(record.id.clone()),
                Err(error) => {
                    log::warn!("Could not delete job {}: {error:?}", record.id);
                    failed.push(record.id.clone());
                }
            }
        }
        let remaining: Vec<JobRecord> = records
            .into_iter()
            .filter(|record| failed.contains(&record.id))
            .collect();
        if !remaining.is_empty() {
            log::warn!(
                "{} job(s) could not be deleted and remain in {}",
                remaining.len(),
                self.path.display()
            );
        }
        self.store(&remaining)?;
        Ok(deleted)
    }

    /// Drops the records of jobs that are no longer known to the batch system.
    /// Returns the number of dropped records.
    pub async fn prune(&self, system: &dyn BatchSystem) -> crate::Result<usize> {
        let records = self.read()?;
        let listing = system.status().await?;
        let count = records.len();
        let live: Vec<JobRecord> = records
            .into_iter()
            .filter(|record| is_live(&listing, &record.id))
            .collect();
        let pruned = count - live.len();
        self.store(&live)?;
        Ok(pruned)
    }
}

fn is_live(listing: &[TaskStatus], job_id: &str) -> bool {
    listing.iter().any(|status| status.job_id == job_id)
}

fn aggregate_status(records: &[JobRecord], listing: &[TaskStatus]) -> LedgerStatus {
    let mut status = LedgerStatus {
        jobs: records.len(),
        ..Default::default()
    };
    let mut seen: Vec<&str> = vec![];
    for record in records {
        if seen.contains(&record.id.as_str()) {
            continue;
        }
        seen.push(&record.id);
        let mut live = false;
        for task in listing.iter().filter(|task| task.job_id == record.id) {
            live = true;
            *status.tasks.entry(task.state).or_default() += task.task_count;
        }
        if live {
            status.live_jobs += 1;
        }
    }
    status
}
