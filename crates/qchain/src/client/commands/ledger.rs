use crate::client::globalsettings::GlobalSettings;
use crate::orchestrator::Orchestrator;

pub async fn command_status(
    gsettings: &GlobalSettings,
    orchestrator: &Orchestrator,
) -> anyhow::Result<()> {
    let status = orchestrator
        .ledger()
        .status(orchestrator.system())
        .await?;
    gsettings.printer().print_ledger_status(&status);
    Ok(())
}

pub async fn command_cancel(
    gsettings: &GlobalSettings,
    orchestrator: &Orchestrator,
) -> anyhow::Result<()> {
    let deleted = orchestrator
        .ledger()
        .delete_all(orchestrator.system())
        .await?;
    gsettings.printer().print_jobs_cancelled(&deleted);
    Ok(())
}

pub async fn command_prune(
    gsettings: &GlobalSettings,
    orchestrator: &Orchestrator,
) -> anyhow::Result<()> {
    let ledger = orchestrator.ledger();
    let pruned = ledger.prune(orchestrator.system()).await?;
    let remaining = ledger.read()?.len();
    gsettings.printer().print_jobs_pruned(pruned, remaining);
    Ok(())
}
