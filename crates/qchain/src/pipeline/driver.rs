use crate::batch::JobRecord;
use crate::common::error::QchainError;
use crate::orchestrator::Orchestrator;
use crate::pipeline::counter::{CounterState, IterationCounter};
use crate::pipeline::{IterationState, Stage, run_chain};

/// States of a run of `iterations` iterations: `[First, Standard × (N - 1), Last]`.
/// A run without iterations consists of a single `Last` state.
pub fn iteration_states(iterations: u32) -> Vec<IterationState> {
    if iterations == 0 {
        return vec![IterationState::Last];
    }
    let mut states = Vec::with_capacity(iterations as usize + 1);
    states.push(IterationState::First);
    states.extend(std::iter::repeat_n(
        IterationState::Standard,
        iterations as usize - 1,
    ));
    states.push(IterationState::Last);
    states
}

/// Submits the chains of all iterations of an automatic run, each held on the previous one.
///
/// The counter is started at `0/iterations`; the counter stage of every iteration but the
/// last advances it from inside the queue. When a submission fails before any job was
/// submitted, the counter is put back into its previous state so that the run can be retried.
pub async fn auto_run(
    orchestrator: &Orchestrator,
    stages: &[Box<dyn Stage>],
    iterations: u32,
) -> crate::Result<Option<JobRecord>> {
    let counter = IterationCounter::new(orchestrator.config().counter_path());
    let previous = counter.read()?;
    if let CounterState::Running { current, max } = previous {
        return Err(QchainError::AutoRunAlreadyRunning {
            current,
            max,
            counter: counter.path().to_path_buf(),
        });
    }
    let recorded = orchestrator.ledger().read()?.len();
    counter.start(iterations)?;
    log::info!(
        "Starting automatic run {} with {iterations} iteration(s)",
        orchestrator.identity().run_id
    );

    match submit_iterations(orchestrator, stages, iterations).await {
        Ok(hold) => Ok(hold),
        Err(error) => {
            if orchestrator.ledger().read()?.len() == recorded {
                log::info!("No job of the run was submitted, resetting the iteration counter");
                counter.restore(previous)?;
            } else {
                log::warn!(
                    "The run was interrupted after some jobs were submitted; cancel them and remove \
                     {} to start again",
                    counter.path().display()
                );
            }
            Err(error)
        }
    }
}

async fn submit_iterations(
    orchestrator: &Orchestrator,
    stages: &[Box<dyn Stage>],
    iterations: u32,
) -> crate::Result<Option<JobRecord>> {
    let mut hold = None;
    for (iteration, state) in iteration_states(iterations).into_iter().enumerate() {
        hold = run_chain(orchestrator, stages, hold, state, iteration as u32).await?;
    }
    Ok(hold)
}
