pub mod check;
pub mod quarantine;

use std::path::{Path, PathBuf};

use futures::future::LocalBoxFuture;

use crate::common::config::KindConfig;
use crate::task::descriptor::{QuarantinePolicy, RetryPolicy};
use crate::wrapper::check::{CompletionCheck, ErrorMetric, KeyValueMetric, OutputCheck};
use crate::wrapper::quarantine::{AuditEntry, QuarantineArea, QuarantineReason, WorkUnit};

/// Executes one attempt of a task and reports whether the command exited successfully.
pub trait TaskRunner {
    fn run<'a>(&'a mut self, command: &'a [String]) -> LocalBoxFuture<'a, anyhow::Result<bool>>;
}

/// Runs the command as a child process with inherited standard streams.
pub struct ProcessRunner;

impl TaskRunner for ProcessRunner {
    fn run<'a>(&'a mut self, command: &'a [String]) -> LocalBoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            let (program, args) = command
                .split_first()
                .ok_or_else(|| anyhow::anyhow!("Empty task command"))?;
            log::debug!("Running command `{}`", command.join(" "));
            let status = tokio::process::Command::new(program)
                .args(args)
                .status()
                .await
                .map_err(|error| anyhow::anyhow!("Cannot start `{program}`: {error}"))?;
            Ok(status.success())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed {
        attempts: u32,
    },
    Quarantined {
        attempts: u32,
        destination: PathBuf,
        reason: QuarantineReason,
    },
    /// Attempts were exhausted and the unit was not relocated.
    PermanentFailure {
        attempts: u32,
    },
}

/// Runs a task with bounded retries and relocates persistently failing units into quarantine.
///
/// The attempt counter lives only in this process; a resubmitted job starts from zero.
pub struct RetryQuarantineWrapper {
    retry: RetryPolicy,
    quarantine: Option<QuarantinePolicy>,
    check: Box<dyn CompletionCheck>,
    metric: Option<Box<dyn ErrorMetric>>,
    area: QuarantineArea,
    /// Files of this task only; siblings of the same array job keep theirs.
    unit: Option<WorkUnit>,
}

impl RetryQuarantineWrapper {
    pub fn new(
        retry: RetryPolicy,
        quarantine: Option<QuarantinePolicy>,
        check: Box<dyn CompletionCheck>,
        metric: Option<Box<dyn ErrorMetric>>,
        area: QuarantineArea,
        unit: Option<WorkUnit>,
    ) -> Self {
        Self {
            retry,
            quarantine,
            check,
            metric,
            area,
            unit,
        }
    }

    /// Creates the wrapper of a task of a configured kind.
    /// The unit of work is derived from `input` and `output` (see [`WorkUnit::for_task`]).
    pub fn from_config(
        config: &KindConfig,
        input: &Path,
        output: &Path,
        quarantine_dir: PathBuf,
    ) -> Self {
        let output = (!output.as_os_str().is_empty()).then(|| output.to_path_buf());
        let metric = match (&config.error_key, &output) {
            (Some(key), Some(output)) => Some(
                Box::new(KeyValueMetric::new(output.clone(), key.clone())) as Box<dyn ErrorMetric>
            ),
            _ => None,
        };
        let unit = WorkUnit::for_task(input, output.as_deref());
        Self::new(
            RetryPolicy {
                enabled: config.max_tries > 1,
                max_tries: config.max_tries,
            },
            config
                .error_threshold
                .map(|error_threshold| QuarantinePolicy { error_threshold }),
            Box::new(OutputCheck::new(output, config.completion_marker.clone())),
            metric,
            QuarantineArea::new(quarantine_dir),
            unit,
        )
    }

    pub async fn run<R: TaskRunner>(
        &self,
        runner: &mut R,
        command: &[String],
    ) -> crate::Result<TaskOutcome> {
        let max_attempts = self.retry.attempts();
        let mut attempts = 0;
        while attempts < max_attempts {
            attempts += 1;
            let success = match runner.run(command).await {
                Ok(success) => success,
                Err(error) => {
                    log::warn!("Attempt {attempts}/{max_attempts} failed: {error:?}");
                    false
                }
            };
            if self.check.is_complete(success) {
                return self.finish_complete(attempts);
            }
            log::info!("Task is not complete after attempt {attempts}/{max_attempts}");
        }
        self.fail(attempts, QuarantineReason::NonTermination)
    }

    fn finish_complete(&self, attempts: u32) -> crate::Result<TaskOutcome> {
        if let (Some(policy), Some(metric)) = (&self.quarantine, &self.metric) {
            if let Some(value) = metric.value()? {
                if value > policy.error_threshold {
                    return self.fail(
                        attempts,
                        QuarantineReason::ErrorThreshold {
                            value,
                            threshold: policy.error_threshold,
                        },
                    );
                }
            }
        }
        Ok(TaskOutcome::Completed { attempts })
    }

    fn fail(&self, attempts: u32, reason: QuarantineReason) -> crate::Result<TaskOutcome> {
        let destination = match (&self.quarantine, &self.unit) {
            (Some(_), Some(unit)) if unit.exists()? => Some(self.area.relocate(unit, &reason)?),
            _ => {
                log::warn!(
                    "Task failed permanently after {attempts} attempt(s), reason: {reason}"
                );
                None
            }
        };
        self.area.record(&AuditEntry {
            unit: self.unit.as_ref().map(WorkUnit::path),
            destination: destination.clone(),
            reason: reason.clone(),
            attempts,
            timestamp: chrono::Utc::now(),
        })?;
        Ok(match destination {
            Some(destination) => TaskOutcome::Quarantined {
                attempts,
                destination,
                reason,
            },
            None => TaskOutcome::PermanentFailure { attempts },
        })
    }
}
