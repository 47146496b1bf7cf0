use std::path::PathBuf;

use futures::future::LocalBoxFuture;

use crate::batch::JobRecord;
use crate::common::config::{OrchestrationConfig, StageConfig};
use crate::common::continuation::Continuation;
use crate::common::error::QchainError;
use crate::common::utils::fs::list_files_with_extension;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{Stage, StageUsage};
use crate::script::SubmissionScript;
use crate::task::{DataPair, TaskDescriptor, TaskGroup};

const COUNTER_STAGE_NAME: &str = "counter";

fn script_name(stage: &str, iteration: u32) -> String {
    format!("{stage}-{iteration:03}.sh")
}

/// Stage running one task per input file of a directory.
pub struct TaskStage {
    config: StageConfig,
}

impl TaskStage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    /// Builds one task for every input currently present in the input directory.
    pub fn build_tasks(&self, orchestrator: &Orchestrator) -> crate::Result<Vec<TaskDescriptor>> {
        let config = orchestrator.config();
        let input_dir = config.resolve(&self.config.input_dir);
        let output_dir = self.output_dir(config);

        list_files_with_extension(&input_dir, &self.config.input_extension)?
            .into_iter()
            .map(|input| {
                let output = output_dir.join(input.file_name().unwrap_or_default()).with_extension(
                    self.config.output_extension.trim_start_matches('.'),
                );
                self.task_builder(config)
                    .data(vec![DataPair::new(input, output)])
                    .build()
            })
            .collect()
    }

    fn output_dir(&self, config: &OrchestrationConfig) -> PathBuf {
        config.resolve(
            self.config
                .output_dir
                .as_ref()
                .unwrap_or(&self.config.input_dir),
        )
    }

    fn task_builder(&self, config: &OrchestrationConfig) -> crate::task::TaskDescriptorBuilder {
        let kind = self.config.kind;
        let mut builder = TaskDescriptor::builder_for_kind(kind, &config.kind(kind));
        if let Some(arguments) = &self.config.arguments {
            builder = builder.arguments(arguments.clone());
        }
        builder
    }

    /// Inputs are produced by jobs that have not run yet: submit a job that lists them once
    /// it runs, followed by an array job of `expected` tasks reading that list.
    async fn submit_deferred(
        &self,
        orchestrator: &Orchestrator,
        hold: Option<&str>,
        iteration: u32,
        expected: usize,
    ) -> crate::Result<JobRecord> {
        let name = &self.config.name;
        log::info!(
            "Stage {name} of iteration {iteration} lists its inputs when it runs, \
             reserving {expected} task(s)"
        );
        let template = self.task_builder(orchestrator.config()).build()?;
        let script = SubmissionScript::new(
            orchestrator.script_path(&script_name(name, iteration)),
            vec![TaskGroup::pending(template, expected)],
            orchestrator.script_options(),
        );
        let datafile = orchestrator.compiler().datafile_path(&script, 1);

        let prepare_task = orchestrator.continuation_task(&Continuation::WriteDatafile {
            stage: name.clone(),
            datafile,
        })?;
        let prepare = SubmissionScript::from_tasks(
            orchestrator.script_path(&script_name(&format!("{name}-prepare"), iteration)),
            vec![prepare_task],
            orchestrator.script_options(),
        );
        let prepare = orchestrator.compile_and_submit(&prepare, hold).await?;
        orchestrator
            .compile_and_submit(&script, Some(&prepare.id))
            .await
    }
}

impl Stage for TaskStage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn usage(&self) -> StageUsage {
        self.config.usage
    }

    fn submit<'a>(
        &'a self,
        orchestrator: &'a Orchestrator,
        hold: Option<&'a str>,
        iteration: u32,
    ) -> LocalBoxFuture<'a, crate::Result<JobRecord>> {
        Box::pin(async move {
            let tasks = self.build_tasks(orchestrator)?;
            // Later iterations read inputs written by the jobs of the previous ones.
            if iteration > 0 || tasks.is_empty() {
                let reserved = self.config.expected_count.unwrap_or(0).max(tasks.len());
                if reserved == 0 {
                    return Err(QchainError::SubmissionError(format!(
                        "Stage {} has no inputs in {}",
                        self.config.name,
                        orchestrator
                            .config()
                            .resolve(&self.config.input_dir)
                            .display()
                    )));
                }
                return self
                    .submit_deferred(orchestrator, hold, iteration, reserved)
                    .await;
            }
            let script = SubmissionScript::from_tasks(
                orchestrator.script_path(&script_name(&self.config.name, iteration)),
                tasks,
                orchestrator.script_options(),
            );
            orchestrator.compile_and_submit(&script, hold).await
        })
    }
}

/// Stage advancing the iteration counter once the preceding stages have finished.
pub struct CounterStage;

impl Stage for CounterStage {
    fn name(&self) -> &str {
        COUNTER_STAGE_NAME
    }

    fn usage(&self) -> StageUsage {
        StageUsage::AllButLast
    }

    fn submit<'a>(
        &'a self,
        orchestrator: &'a Orchestrator,
        hold: Option<&'a str>,
        iteration: u32,
    ) -> LocalBoxFuture<'a, crate::Result<JobRecord>> {
        Box::pin(async move {
            let task = orchestrator.continuation_task(&Continuation::IncrementCounter)?;
            let script = SubmissionScript::from_tasks(
                orchestrator.script_path(&script_name(COUNTER_STAGE_NAME, iteration)),
                vec![task],
                orchestrator.script_options(),
            );
            orchestrator.compile_and_submit(&script, hold).await
        })
    }
}

/// Stages of the configured pipeline followed by the counter stage.
pub fn build_stages(config: &OrchestrationConfig) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = config
        .stages
        .iter()
        .map(|stage| Box::new(TaskStage::new(stage.clone())) as Box<dyn Stage>)
        .collect();
    stages.push(Box::new(CounterStage));
    stages
}
