use std::path::{Path, PathBuf};

use crate::admission::{AdmissionController, fold_job_id};
use crate::batch::{BatchSystem, JobRecord};
use crate::common::config::{OrchestrationConfig, RunIdentity};
use crate::common::continuation::Continuation;
use crate::common::env::running_inside_job;
use crate::common::error::QchainError;
use crate::common::machine::Machine;
use crate::datalock::DataLock;
use crate::ledger::JobLedger;
use crate::pipeline::counter::IterationCounter;
use crate::pipeline::stages::TaskStage;
use crate::script::compiler::ScriptCompiler;
use crate::script::datafile::write_datafile;
use crate::script::{ScriptOptions, SubmissionScript};
use crate::task::{CommandKind, TaskDescriptor, TaskGroup};
use crate::wrapper::{ProcessRunner, RetryQuarantineWrapper, TaskOutcome};

/// Everything a single invocation of the orchestrator works with.
///
/// Configuration, identity and machine are resolved once at startup and never change.
pub struct Orchestrator {
    config: OrchestrationConfig,
    identity: RunIdentity,
    machine: Machine,
    system: Box<dyn BatchSystem>,
    ledger: JobLedger,
    datalock: DataLock,
    executable: PathBuf,
    inside_job: bool,
}

impl Orchestrator {
    pub fn new(
        config: OrchestrationConfig,
        identity: RunIdentity,
        machine: Machine,
        system: Box<dyn BatchSystem>,
    ) -> Self {
        let executable = std::env::current_exe().unwrap_or_else(|error| {
            log::debug!("Cannot resolve the current executable: {error}");
            PathBuf::from("qchain")
        });
        let ledger = JobLedger::new(config.ledger_path());
        Self {
            config,
            identity,
            machine,
            system,
            ledger,
            datalock: DataLock::default(),
            executable,
            inside_job: running_inside_job(),
        }
    }

    pub fn with_executable(mut self, executable: PathBuf) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_inside_job(mut self, inside_job: bool) -> Self {
        self.inside_job = inside_job;
        self
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn system(&self) -> &dyn BatchSystem {
        self.system.as_ref()
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn datalock(&self) -> &DataLock {
        &self.datalock
    }

    /// `<exe> -c <config> -u <run-id>`
    pub fn reinvocation(&self) -> Vec<String> {
        let mut args = vec![self.executable.display().to_string()];
        args.extend(self.identity.reinvocation_args());
        args
    }

    pub fn compiler(&self) -> ScriptCompiler<'_> {
        ScriptCompiler::new(
            self.system.as_ref(),
            &self.machine,
            &self.config.parallel_environments,
            self.config.datafiles_dir(),
            &self.datalock,
            self.reinvocation(),
        )
    }

    pub fn script_options(&self) -> ScriptOptions {
        ScriptOptions {
            working_dir: self.config.work_dir.clone(),
            stdout_dir: self.config.outputs_dir(),
            stderr_dir: self.config.errors_dir(),
        }
    }

    pub fn script_path(&self, name: &str) -> PathBuf {
        self.config.scripts_dir().join(name)
    }

    /// Task re-invoking the orchestrator with `continuation`.
    pub fn continuation_task(&self, continuation: &Continuation) -> crate::Result<TaskDescriptor> {
        let kind = CommandKind::Orchestrator;
        let mut arguments = self.identity.reinvocation_args();
        arguments.extend(continuation.to_args());
        TaskDescriptor::builder_for_kind(kind, &self.config.kind(kind))
            .command(self.executable.display().to_string())
            .arguments(arguments)
            .groupable(false)
            .build()
    }

    /// Submits an already written script, optionally held on `hold`, and records it in the ledger.
    pub async fn submit_script(&self, script: &Path, hold: Option<&str>) -> crate::Result<JobRecord> {
        if self.inside_job {
            log::warn!(
                "Not submitting {}: the orchestrator runs inside a submitted job",
                script.display()
            );
            return Err(QchainError::SubmissionError(format!(
                "Refusing to submit {} from inside a job",
                script.display()
            )));
        }

        if self.config.admission.enabled {
            if let Some(hold) = hold {
                log::debug!("The admission channel ignores the hold on job {hold}");
            }
            let mut records = self.drop_scripts(&[script.to_path_buf()]).await?;
            return records
                .pop()
                .ok_or_else(|| QchainError::SubmissionError("No script was staged".to_string()));
        }

        let id = self
            .system
            .submit(script, hold)
            .await
            .map_err(|error| QchainError::SubmissionError(format!("{error:?}")))?;
        log::info!(
            "Submitted {} as job {id}{}",
            script.display(),
            hold.map(|hold| format!(" (holding on {hold})"))
                .unwrap_or_default()
        );
        let record = JobRecord::new(script.to_path_buf(), id, self.identity.run_id.clone());
        self.ledger.append(record.clone())?;
        Ok(record)
    }

    /// Hands `scripts` over through the admission directory and records them in the ledger.
    pub async fn drop_scripts(&self, scripts: &[PathBuf]) -> crate::Result<Vec<JobRecord>> {
        let admission = &self.config.admission;
        let controller = AdmissionController::from_config(admission, self.config.admission_dir());
        let staged = controller.enqueue(scripts).await?;

        let mut sequence = self.ledger.read()?.len() as u64;
        let mut records = Vec::with_capacity(staged.len());
        for path in staged {
            sequence += 1;
            let id = fold_job_id(
                sequence,
                admission.id_space,
                admission.reserved_ids,
                self.config.stages.len() as u64,
            );
            let record = JobRecord::new(path, format!("drop-{id}"), self.identity.run_id.clone());
            log::info!("Staged {} as {}", record.script.display(), record.id);
            self.ledger.append(record.clone())?;
            records.push(record);
        }
        Ok(records)
    }

    /// Compiles `script`, writes it to its path and submits it.
    pub async fn compile_and_submit(
        &self,
        script: &SubmissionScript,
        hold: Option<&str>,
    ) -> crate::Result<JobRecord> {
        self.compiler().write(script)?;
        self.submit_script(&script.path, hold).await
    }

    /// Performs the work requested by a generated script.
    ///
    /// The data lock is held for the whole call: a continuation runs on behalf of a queued job,
    /// so datafiles that already exist belong to queued jobs and are kept as they are.
    pub async fn run_continuation(&self, continuation: Continuation) -> crate::Result<()> {
        log::debug!("Running function {}", continuation.name());
        let _guard = self.datalock.enter();
        match continuation {
            Continuation::RunTask {
                kind,
                input,
                output,
                command,
            } => {
                let wrapper = RetryQuarantineWrapper::from_config(
                    &self.config.kind(kind),
                    &input,
                    &output,
                    self.config.quarantine_dir(),
                );
                match wrapper.run(&mut ProcessRunner, &command).await? {
                    TaskOutcome::Completed { attempts } => {
                        log::info!("Task {kind} completed after {attempts} attempt(s)");
                    }
                    TaskOutcome::Quarantined {
                        destination,
                        reason,
                        ..
                    } => {
                        log::info!(
                            "Task {kind} quarantined into {} ({reason})",
                            destination.display()
                        );
                    }
                    TaskOutcome::PermanentFailure { attempts } => {
                        log::info!("Task {kind} failed after {attempts} attempt(s)");
                    }
                }
                Ok(())
            }
            Continuation::WriteDatafile { stage, datafile } => {
                self.write_stage_datafile(&stage, &datafile)
            }
            Continuation::IncrementCounter => {
                IterationCounter::new(self.config.counter_path()).increment()?;
                Ok(())
            }
        }
    }

    fn write_stage_datafile(&self, stage: &str, datafile: &Path) -> crate::Result<()> {
        if self.datalock.is_locked() && datafile.exists() {
            log::info!(
                "Datafile {} was already written, keeping its content",
                datafile.display()
            );
            return Ok(());
        }

        let config = self.config.stage(stage).ok_or_else(|| {
            QchainError::ContinuationError(format!("Unknown stage `{stage}`"))
        })?;
        let tasks = TaskStage::new(config.clone()).build_tasks(self)?;
        if let Some(expected) = config.expected_count {
            if tasks.len() > expected {
                log::warn!(
                    "Stage {stage} has {} input(s) but only {expected} task(s) were reserved",
                    tasks.len()
                );
            }
        }
        let rows = TaskGroup::new(tasks)
            .map(|group| group.data_rows())
            .unwrap_or_default();
        write_datafile(datafile, &rows)?;
        log::info!(
            "Written datafile {} with {} row(s)",
            datafile.display(),
            rows.len()
        );
        Ok(())
    }
}
