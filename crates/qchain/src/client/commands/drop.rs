use crate::client::globalsettings::GlobalSettings;
use crate::common::cli::DropOpts;
use crate::common::utils::fs::absolute_path;
use crate::orchestrator::Orchestrator;

pub async fn command_drop(
    gsettings: &GlobalSettings,
    orchestrator: &Orchestrator,
    opts: DropOpts,
) -> anyhow::Result<()> {
    let scripts = opts
        .scripts
        .iter()
        .map(|script| absolute_path(script))
        .collect::<std::io::Result<Vec<_>>>()?;
    if let Some(missing) = scripts.iter().find(|script| !script.is_file()) {
        anyhow::bail!("Script {} does not exist", missing.display());
    }
    let records = orchestrator.drop_scripts(&scripts).await?;
    gsettings.printer().print_jobs_dropped(&records);
    Ok(())
}
