pub mod counter;
pub mod driver;
pub mod stages;

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::batch::JobRecord;
use crate::orchestrator::Orchestrator;

/// Position of an iteration within an automatic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    First,
    Standard,
    Last,
}

/// Iterations in which a stage is submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageUsage {
    /// Only in the first iteration.
    First,
    #[default]
    All,
    /// Every iteration except the last one.
    AllButLast,
}

impl StageUsage {
    pub fn applies(&self, state: IterationState) -> bool {
        match self {
            StageUsage::First => state == IterationState::First,
            StageUsage::All => true,
            StageUsage::AllButLast => state != IterationState::Last,
        }
    }
}

/// One step of the pipeline, submitted as one or more jobs.
pub trait Stage {
    fn name(&self) -> &str;

    fn usage(&self) -> StageUsage;

    /// Submits the stage, held on `hold`, and returns the job the next stage has to wait for.
    fn submit<'a>(
        &'a self,
        orchestrator: &'a Orchestrator,
        hold: Option<&'a str>,
        iteration: u32,
    ) -> LocalBoxFuture<'a, crate::Result<JobRecord>>;
}

/// Submits the stages applicable in `state` in order, each one held on its predecessor.
///
/// Returns the last submitted job, or `initial_hold` when no stage applies.
/// A failed submission aborts the rest of the chain.
pub async fn run_chain(
    orchestrator: &Orchestrator,
    stages: &[Box<dyn Stage>],
    initial_hold: Option<JobRecord>,
    state: IterationState,
    iteration: u32,
) -> crate::Result<Option<JobRecord>> {
    let mut hold = initial_hold;
    for stage in stages.iter().filter(|stage| stage.usage().applies(state)) {
        log::debug!(
            "Submitting stage {} of iteration {iteration} ({state:?})",
            stage.name()
        );
        let record = stage
            .submit(
                orchestrator,
                hold.as_ref().map(|record| record.id.as_str()),
                iteration,
            )
            .await?;
        hold = Some(record);
    }
    Ok(hold)
}
