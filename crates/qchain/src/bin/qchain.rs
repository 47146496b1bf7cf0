use std::io;
use std::io::IsTerminal;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli_table::ColorChoice;

use qchain::batch::{create_batch_system, detect_batch_system};
use qchain::client::commands::autorun::command_auto_run;
use qchain::client::commands::counter::command_counter;
use qchain::client::commands::drop::command_drop;
use qchain::client::commands::ledger::{command_cancel, command_prune, command_status};
use qchain::client::commands::submit::command_submit;
use qchain::client::globalsettings::GlobalSettings;
use qchain::client::output::cli::CliOutput;
use qchain::client::output::json::JsonOutput;
use qchain::client::output::outputs::{Output, Outputs};
use qchain::common::cli::{
    ColorPolicy, CommonOpts, GenerateCompletionOpts, RootOptions, SubCommand,
};
use qchain::common::config::{OrchestrationConfig, RunIdentity};
use qchain::common::continuation::{Continuation, split_continuation_args};
use qchain::common::machine::Machine;
use qchain::common::setup::setup_logging;
use qchain::common::utils::fs::absolute_path;
use qchain::orchestrator::Orchestrator;

fn make_global_settings(opts: &CommonOpts) -> GlobalSettings {
    let color_policy = match opts.colors {
        ColorPolicy::Always => ColorChoice::AlwaysAnsi,
        ColorPolicy::Auto => {
            if io::stdout().is_terminal() {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
        ColorPolicy::Never => ColorChoice::Never,
    };

    // Create Printer
    let printer: Box<dyn Output> = match opts.output_mode {
        Outputs::CLI => {
            // Set colored public for CLI
            match color_policy {
                ColorChoice::Always | ColorChoice::AlwaysAnsi => {
                    colored::control::set_override(true)
                }
                ColorChoice::Never => colored::control::set_override(false),
                _ => {}
            }

            Box::new(CliOutput::new(color_policy))
        }
        Outputs::JSON => Box::<JsonOutput>::default(),
    };

    GlobalSettings::new(printer)
}

fn generate_completion(opts: GenerateCompletionOpts) -> anyhow::Result<()> {
    let generator = opts.shell;

    let mut app = RootOptions::command();
    eprintln!("Generating completion file for {generator}...");
    generate(generator, &mut app, "qchain".to_string(), &mut io::stdout());
    Ok(())
}

fn create_orchestrator(opts: &CommonOpts) -> anyhow::Result<Orchestrator> {
    let config_path = absolute_path(&opts.config)?;
    let config = OrchestrationConfig::load(&config_path)?;
    let identity = RunIdentity::new(config_path, opts.run_id.clone());
    let machine = Machine::resolve(config.machine.as_deref(), &config.machines);
    log::debug!("Machine: {machine}, run id: {}", identity.run_id);
    let system = create_batch_system(detect_batch_system());
    Ok(Orchestrator::new(config, identity, machine, system))
}

async fn run(
    gsettings: &GlobalSettings,
    opts: RootOptions,
    continuation: Option<Vec<String>>,
) -> anyhow::Result<()> {
    if let Some(SubCommand::GenerateCompletion(completion)) = opts.subcmd {
        return generate_completion(completion);
    }
    if opts.subcmd.is_none() && continuation.is_none() {
        RootOptions::command().print_help()?;
        return Ok(());
    }

    let orchestrator = create_orchestrator(&opts.common)?;
    if let Some(args) = continuation {
        let continuation = Continuation::parse(&args)?;
        orchestrator.run_continuation(continuation).await?;
        return Ok(());
    }

    match opts.subcmd {
        Some(SubCommand::Submit(opts)) => command_submit(gsettings, &orchestrator, opts).await,
        Some(SubCommand::AutoRun(opts)) => command_auto_run(gsettings, &orchestrator, opts).await,
        Some(SubCommand::Status) => command_status(gsettings, &orchestrator).await,
        Some(SubCommand::Cancel) => command_cancel(gsettings, &orchestrator).await,
        Some(SubCommand::Prune) => command_prune(gsettings, &orchestrator).await,
        Some(SubCommand::Counter) => command_counter(gsettings, &orchestrator),
        Some(SubCommand::Drop(opts)) => command_drop(gsettings, &orchestrator, opts).await,
        Some(SubCommand::GenerateCompletion(_)) | None => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> qchain::Result<()> {
    let (args, continuation) = split_continuation_args(std::env::args().collect());
    let top_opts = match RootOptions::try_parse_from(args) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let gsettings = make_global_settings(&top_opts.common);

    if let Err(e) = run(&gsettings, top_opts, continuation).await {
        gsettings.printer().print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
