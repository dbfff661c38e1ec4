use std::process::Output;
use std::time::Duration;

use serde::Deserialize;

use crate::common::command::{
    check_command_output, execute_command, run_checked, stderr_lossy, stdout_as_str,
};
use crate::common::config::ReconnectConfig;
use crate::common::error::SimScaleError;
use crate::reconnect::{BindTarget, ConnectTarget, RegistryFuture, SessionRegistry, SimulatorSession};

/// Session registry backed by the `bonsai` command line.
pub struct BonsaiCli {
    cli_path: String,
    timeout: Duration,
}

impl BonsaiCli {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            timeout: config.command_timeout,
        }
    }

    fn list_arguments(&self, simulator_name: &str) -> Vec<String> {
        [
            self.cli_path.as_str(),
            "simulator",
            "unmanaged",
            "list",
            "--simulator-name",
            simulator_name,
            "-o",
            "json",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }

    fn connect_arguments(&self, target: &ConnectTarget, bind: &BindTarget) -> Vec<String> {
        let mut arguments: Vec<String> = [self.cli_path.as_str(), "simulator", "unmanaged", "connect"]
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        match target {
            ConnectTarget::Session(session_id) => {
                arguments.extend(["--session-id".to_string(), session_id.clone()])
            }
            ConnectTarget::Simulator(name) => {
                arguments.extend(["--simulator-name".to_string(), name.clone()])
            }
        }
        arguments.extend([
            "--brain-name".to_string(),
            bind.brain_name.clone(),
            "--brain-version".to_string(),
            bind.brain_version.clone(),
            "--concept-name".to_string(),
            bind.concept_name.clone(),
            "--action".to_string(),
            bind.action.clone(),
        ]);
        arguments
    }

    fn logging_arguments(&self, session_id: &str, bind: &BindTarget) -> Vec<String> {
        [
            self.cli_path.as_str(),
            "brain",
            "version",
            "start-logging",
            "--name",
            bind.brain_name.as_str(),
            "--version",
            bind.brain_version.as_str(),
            "--session-id",
            session_id,
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionList {
    Wrapped { value: Vec<SimulatorSession> },
    Plain(Vec<SimulatorSession>),
}

pub fn parse_sessions(output: &str) -> crate::Result<Vec<SimulatorSession>> {
    let list: SessionList = serde_json::from_str(output).map_err(|e| {
        SimScaleError::DeserializationError(format!("Cannot parse simulator list: {e}"))
    })?;
    Ok(match list {
        SessionList::Wrapped { value } => value,
        SessionList::Plain(sessions) => sessions,
    })
}

const INVALID_MARKERS: [&str; 5] = ["not found", "notfound", "invalid", "does not exist", "404"];

/// Checks whether the registry rejected the session itself. Errors about the
/// brain or the concept leave the session usable.
fn is_invalid_session(stderr: &str, session_id: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    if !INVALID_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        return false;
    }
    let session_id = session_id.to_ascii_lowercase();
    let names_session = stderr
        .split(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        .any(|word| word == session_id);
    names_session
        || (stderr.contains("session") && !stderr.contains("brain") && !stderr.contains("concept"))
}

fn classify_connect_failure(target: &ConnectTarget, output: Output) -> SimScaleError {
    let stderr = stderr_lossy(&output);
    if let ConnectTarget::Session(session_id) = target {
        if is_invalid_session(&stderr, session_id) {
            return SimScaleError::InvalidSession(session_id.clone());
        }
    }
    match check_command_output(output) {
        Err(error) => SimScaleError::SubprocessError(format!("Connecting {target} failed\n{error:?}")),
        Ok(_) => SimScaleError::SubprocessError(format!("Connecting {target} failed")),
    }
}

impl SessionRegistry for BonsaiCli {
    fn list_sessions<'a>(
        &'a self,
        simulator_name: &'a str,
    ) -> RegistryFuture<'a, Vec<SimulatorSession>> {
        Box::pin(async move {
            let stdout = run_checked(&self.list_arguments(simulator_name), self.timeout).await?;
            parse_sessions(&stdout)
        })
    }

    fn connect_session<'a>(
        &'a self,
        target: &'a ConnectTarget,
        bind: &'a BindTarget,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            let output = execute_command(&self.connect_arguments(target, bind), self.timeout).await?;
            if !output.status.success() {
                return Err(classify_connect_failure(target, output));
            }
            log::debug!("{}", stdout_as_str(&output, &self.cli_path)?);
            Ok(())
        })
    }

    fn start_logging<'a>(
        &'a self,
        session_id: &'a str,
        bind: &'a BindTarget,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            run_checked(&self.logging_arguments(session_id, bind), self.timeout).await?;
            Ok(())
        })
    }
}
