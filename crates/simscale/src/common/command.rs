use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::Context;
use bstr::ByteSlice;
use tokio::process::Command;

use crate::common::error::SimScaleError;

pub fn create_command<S: AsRef<str>>(arguments: &[S]) -> Command {
    let mut command = Command::new(arguments[0].as_ref());
    command.args(arguments[1..].iter().map(|arg| arg.as_ref()));
    command.stdin(Stdio::null());
    command.kill_on_drop(true);
    command
}

/// Runs a command to completion and returns its output regardless of the exit code.
///
/// A command that cannot be started is reported as `SubprocessError`, a command
/// that does not finish within `timeout` is killed and reported as `Timeout`.
pub async fn execute_command<S: AsRef<str>>(
    arguments: &[S],
    timeout: Duration,
) -> crate::Result<Output> {
    execute_command_with_env(arguments, &[], timeout).await
}

/// Same as [`execute_command`], with additional environment variables for the child.
pub async fn execute_command_with_env<S: AsRef<str>>(
    arguments: &[S],
    env: &[(&str, &str)],
    timeout: Duration,
) -> crate::Result<Output> {
    if arguments.is_empty() {
        return Err(SimScaleError::SubprocessError(
            "Cannot execute an empty command".to_string(),
        ));
    }
    let program = arguments[0].as_ref();
    log::debug!("Running command `{}`", join_arguments(arguments));

    let mut command = create_command(arguments);
    command.envs(env.iter().copied());
    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(error)) => Err(SimScaleError::SubprocessError(format!(
            "{program} start failed: {error}"
        ))),
        Err(_) => Err(SimScaleError::Timeout(format!(
            "{program} did not finish in {}",
            humantime::format_duration(timeout)
        ))),
    }
}

pub fn check_command_output(output: Output) -> anyhow::Result<Output> {
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

pub fn stdout_as_str(output: &Output, program: &str) -> anyhow::Result<String> {
    let stdout = output
        .stdout
        .to_str()
        .map_err(|e| anyhow::anyhow!("Invalid UTF-8 {} output: {:?}", program, e))?;
    Ok(stdout.trim().to_string())
}

pub fn stderr_lossy(output: &Output) -> String {
    output.stderr.to_str_lossy().trim().to_string()
}

pub fn join_arguments<S: AsRef<str>>(arguments: &[S]) -> String {
    arguments
        .iter()
        .map(|arg| arg.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs a command and turns a non-zero exit code into a `SubprocessError`.
pub async fn run_checked<S: AsRef<str>>(
    arguments: &[S],
    timeout: Duration,
) -> crate::Result<String> {
    let output = execute_command(arguments, timeout).await?;
    let program = arguments[0].as_ref();
    let output = check_command_output(output)
        .with_context(|| format!("{program} execution failed"))
        .map_err(|e| SimScaleError::SubprocessError(format!("{e:?}")))?;
    Ok(stdout_as_str(&output, program)?)
}
