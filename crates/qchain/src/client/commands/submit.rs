use crate::client::globalsettings::GlobalSettings;
use crate::common::cli::SubmitOpts;
use crate::common::utils::fs::absolute_path;
use crate::orchestrator::Orchestrator;

pub async fn command_submit(
    gsettings: &GlobalSettings,
    orchestrator: &Orchestrator,
    opts: SubmitOpts,
) -> anyhow::Result<()> {
    let script = absolute_path(&opts.script)?;
    if !script.is_file() {
        anyhow::bail!("Script {} does not exist", script.display());
    }
    let record = orchestrator
        .submit_script(&script, opts.hold.as_deref())
        .await?;
    gsettings.printer().print_job_submitted(&record);
    Ok(())
}
