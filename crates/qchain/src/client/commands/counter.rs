use crate::client::globalsettings::GlobalSettings;
use crate::orchestrator::Orchestrator;
use crate::pipeline::counter::IterationCounter;

pub fn command_counter(gsettings: &GlobalSettings, orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let counter = IterationCounter::new(orchestrator.config().counter_path());
    let state = counter.read()?;
    gsettings.printer().print_counter(counter.path(), &state);
    Ok(())
}
