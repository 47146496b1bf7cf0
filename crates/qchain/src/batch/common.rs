use std::path::Path;
use std::process::Output;

use anyhow::Context;
use bstr::ByteSlice;
use tokio::process::Command;

use crate::batch::BatchResult;

pub fn create_command(arguments: Vec<&str>, workdir: &Path) -> Command {
    let mut command = Command::new(arguments[0]);
    command.args(&arguments[1..]);
    command.current_dir(workdir);
    command
}

pub fn check_command_output(output: Output) -> BatchResult<Output> {
    let status = output.status;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}

/// Runs a batch system command and returns its trimmed stdout.
pub async fn run_command(arguments: Vec<String>, workdir: &Path) -> BatchResult<String> {
    let program = arguments[0].clone();
    log::debug!("Running command `{}`", arguments.join(" "));

    let mut command = create_command(arguments.iter().map(|s| s.as_str()).collect(), workdir);
    let output = command
        .output()
        .await
        .with_context(|| format!("{program} start failed"))?;
    let output =
        check_command_output(output).with_context(|| format!("{program} execution failed"))?;

    log::trace!(
        "{program} output\nStdout\n{}Stderr\n{}",
        output.stdout.to_str_lossy(),
        output.stderr.to_str_lossy()
    );

    let stdout = output
        .stdout
        .to_str()
        .map_err(|e| anyhow::anyhow!("Invalid UTF-8 {} output: {:?}", program, e))?;
    Ok(stdout.trim().to_string())
}

/// Submits `script` with `program`, extracting the job id from its output with `get_job_id`.
pub async fn submit_script<F>(
    program: &str,
    extra_args: Vec<String>,
    script: &Path,
    get_job_id: F,
) -> BatchResult<String>
where
    F: FnOnce(&str) -> BatchResult<String>,
{
    let workdir = script
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut arguments = vec![program.to_string()];
    arguments.extend(extra_args);
    arguments.push(script.display().to_string());

    let output = run_command(arguments, workdir).await?;
    get_job_id(&output)
}
