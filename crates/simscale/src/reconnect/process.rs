use std::time::Duration;

use crate::common::config::ReconnectConfig;
use crate::common::error::SimScaleError;
use crate::common::utils::str::pluralize;
use crate::reconnect::state::{RetryState, RetryStatus};
use crate::reconnect::{BindTarget, ConnectTarget, SessionRegistry};

#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    pub simulator_name: String,
    pub bind: BindTarget,
    pub retry_wait: Duration,
    pub max_retries: u32,
    pub interval: Duration,
    pub reverse_after_failed_cycles: u32,
}

impl ReconnectSettings {
    pub fn from_config(config: &ReconnectConfig, simulator_name: String, bind: BindTarget) -> Self {
        Self {
            simulator_name,
            bind,
            retry_wait: config.retry_wait,
            max_retries: config.max_retries,
            interval: config.interval,
            reverse_after_failed_cycles: config.reverse_after_failed_cycles,
        }
    }
}

/// Result of a single listing and binding pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// Every eligible session was bound.
    Success,
    /// Timeout, failed command or unreadable listing.
    RecoverableFailure(String),
    /// The registry rejected the session with this id.
    PermanentFailure(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { connected: usize },
    Exhausted,
}

/// Keeps binding unmanaged simulator sessions to a training session.
pub struct ReconnectLoop {
    registry: Box<dyn SessionRegistry>,
    settings: ReconnectSettings,
    state: RetryState,
}

impl ReconnectLoop {
    pub fn new(registry: Box<dyn SessionRegistry>, settings: ReconnectSettings) -> Self {
        let state = RetryState::new(settings.max_retries, settings.reverse_after_failed_cycles);
        Self {
            registry,
            settings,
            state,
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Lists the sessions and binds the eligible ones. Every bound session is
    /// added to `connected`, also when the attempt fails later on.
    pub async fn run_attempt(&self, connected: &mut usize) -> AttemptResult {
        let sessions = match self
            .registry
            .list_sessions(&self.settings.simulator_name)
            .await
        {
            Ok(sessions) => sessions,
            Err(error) => return AttemptResult::RecoverableFailure(error.to_string()),
        };
        let eligible = self.state.filter_eligible(&sessions);
        log::debug!(
            "{} of {} listed {} not bound yet",
            eligible.len(),
            sessions.len(),
            pluralize("session", sessions.len())
        );

        for session_id in eligible {
            let target = ConnectTarget::Session(session_id);
            match self
                .registry
                .connect_session(&target, &self.settings.bind)
                .await
            {
                Ok(()) => {
                    log::info!(
                        "Connected {target} to {}:{}",
                        self.settings.bind.brain_name,
                        self.settings.bind.brain_version
                    );
                    *connected += 1;
                }
                Err(SimScaleError::InvalidSession(session_id)) => {
                    return AttemptResult::PermanentFailure(session_id);
                }
                Err(error) => return AttemptResult::RecoverableFailure(error.to_string()),
            }
        }
        AttemptResult::Success
    }

    /// Runs attempts until one succeeds or the retry budget of the cycle is used up.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state.on_cycle_start();
        let mut connected = 0;
        while self.state.status() == RetryStatus::Ok {
            match self.run_attempt(&mut connected).await {
                AttemptResult::Success => {
                    self.state.on_success();
                    return CycleOutcome::Completed { connected };
                }
                AttemptResult::RecoverableFailure(reason) => {
                    self.state.on_attempt_fail();
                    log::warn!(
                        "{reason}, will retry in {}, retry attempt {} out of {}",
                        humantime::format_duration(self.settings.retry_wait),
                        self.state.retry_count(),
                        self.state.max_retries()
                    );
                    tokio::time::sleep(self.settings.retry_wait).await;
                }
                AttemptResult::PermanentFailure(session_id) => {
                    self.state.on_session_invalid(&session_id);
                    log::warn!(
                        "Session {session_id} is no longer valid, it will not be connected again"
                    );
                }
            }
        }
        self.state.on_cycle_exhausted();
        log::warn!(
            "Simulators of {} were not connected after {} {}",
            self.settings.simulator_name,
            self.state.max_retries(),
            pluralize("attempt", self.state.max_retries() as usize)
        );
        CycleOutcome::Exhausted
    }

    /// Repeats cycles separated by the configured interval.
    ///
    /// Without a cycle limit this never returns.
    pub async fn run(&mut self, max_cycles: Option<u64>) {
        let mut cycles = 0;
        loop {
            if let CycleOutcome::Completed { connected } = self.run_cycle().await {
                log::info!(
                    "Reconnection finished, {connected} {} connected",
                    pluralize("session", connected)
                );
            }
            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                return;
            }
            log::info!(
                "Reconnection will run again in {}",
                humantime::format_duration(self.settings.interval)
            );
            tokio::time::sleep(self.settings.interval).await;
        }
    }
}

/// Binds every unmanaged session of a simulator in one registry call.
///
/// With `start_logging`, episode logging is then started for every listed session
/// and their ids are returned.
pub async fn connect_all(
    registry: &dyn SessionRegistry,
    simulator_name: &str,
    bind: &BindTarget,
    start_logging: bool,
) -> crate::Result<Vec<String>> {
    let target = ConnectTarget::Simulator(simulator_name.to_string());
    registry.connect_session(&target, bind).await?;
    log::info!(
        "Connected {target} to {}:{}",
        bind.brain_name,
        bind.brain_version
    );
    if !start_logging {
        return Ok(vec![]);
    }

    let sessions = registry.list_sessions(simulator_name).await?;
    let mut logged = Vec::with_capacity(sessions.len());
    for session in sessions {
        registry.start_logging(&session.session_id, bind).await?;
        log::debug!("Logging started for session {}", session.session_id);
        logged.push(session.session_id);
    }
    Ok(logged)
}
