use crate::client::globalsettings::GlobalSettings;
use crate::common::cli::AutoRunOpts;
use crate::orchestrator::Orchestrator;
use crate::pipeline::driver::auto_run;
use crate::pipeline::stages::build_stages;

pub async fn command_auto_run(
    gsettings: &GlobalSettings,
    orchestrator: &Orchestrator,
    opts: AutoRunOpts,
) -> anyhow::Result<()> {
    if orchestrator.config().stages.is_empty() {
        log::warn!("No pipeline stages are configured, only the counter will be submitted");
    }
    let stages = build_stages(orchestrator.config());
    let last = auto_run(orchestrator, &stages, opts.iterations).await?;
    gsettings
        .printer()
        .print_auto_run(opts.iterations, last.as_ref());
    Ok(())
}
