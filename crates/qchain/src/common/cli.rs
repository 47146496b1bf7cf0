use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

use crate::client::output::outputs::Outputs;
use crate::common::config::DEFAULT_CONFIG_NAME;

#[derive(clap::ValueEnum, Clone)]
pub enum ColorPolicy {
    /// Use colors if the stdout is detected to be a terminal.
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Path to the orchestration configuration
    #[arg(
        short('c'),
        long,
        value_hint = clap::ValueHint::FilePath,
        global = true,
        env = "QCHAIN_CONFIG",
        default_value = DEFAULT_CONFIG_NAME,
        help_heading("GLOBAL OPTIONS")
    )]
    pub config: PathBuf,

    /// Identifier of the run; a new one is generated when missing
    #[arg(
        short('u'),
        long,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub run_id: Option<String>,

    /// Sets console color policy
    #[arg(
        long,
        default_value_t = ColorPolicy::Auto,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub colors: ColorPolicy,

    /// Sets output formatting
    #[arg(
        long,
        env = "QCHAIN_OUTPUT_MODE",
        default_value_t = Outputs::CLI,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub output_mode: Outputs,

    /// Enables more detailed log output
    #[arg(
        long,
        env = "QCHAIN_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::QCHAIN_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: Option<SubCommand>,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Submit a script to the batch system
    Submit(SubmitOpts),
    /// Run the configured pipeline stages for a number of iterations
    #[command(name = "autorun")]
    AutoRun(AutoRunOpts),
    /// Display the state of the recorded jobs
    Status,
    /// Delete all recorded jobs that are still queued or running
    Cancel,
    /// Forget recorded jobs that are no longer known to the batch system
    Prune,
    /// Display the iteration counter of an automatic run
    Counter,
    /// Hand scripts over through the shared admission directory
    Drop(DropOpts),
    /// Generate shell completion script
    GenerateCompletion(GenerateCompletionOpts),
}

#[derive(Parser)]
pub struct SubmitOpts {
    /// Script to submit
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub script: PathBuf,

    /// Job id that has to finish before the script starts
    #[arg(long)]
    pub hold: Option<String>,
}

#[derive(Parser)]
pub struct AutoRunOpts {
    /// Number of iterations
    #[arg(long, short('n'))]
    pub iterations: u32,
}

#[derive(Parser)]
pub struct DropOpts {
    /// Scripts to hand over
    #[arg(required = true, value_hint = clap::ValueHint::FilePath)]
    pub scripts: Vec<PathBuf>,
}

#[derive(Parser)]
pub struct GenerateCompletionOpts {
    /// Shell flavour for which the completion script should be generated
    #[arg(value_enum)]
    pub shell: Shell,
}
