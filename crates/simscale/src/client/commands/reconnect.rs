use std::time::Duration;

use clap::Parser;

use crate::client::globalsettings::GlobalSettings;
use crate::common::config::ReconnectConfig;
use crate::reconnect::process::connect_all;
use crate::reconnect::{BindTarget, BonsaiCli, DEFAULT_ACTION, ReconnectLoop, ReconnectSettings};

/// Training session the simulators are connected to
#[derive(Parser)]
pub struct BindOpts {
    /// Name of the simulator whose unmanaged sessions are connected
    #[arg(long)]
    simulator_name: String,

    /// Brain to connect the simulators to
    #[arg(long, short = 'b')]
    brain_name: String,

    /// Version of the brain
    #[arg(long)]
    brain_version: String,

    /// Concept trained by the simulators
    #[arg(long, short = 'c')]
    concept_name: String,

    /// Action of the connected simulators, `Train` or `Assess`
    #[arg(long, short = 'a', default_value = DEFAULT_ACTION)]
    action: String,
}

impl BindOpts {
    fn bind_target(&self) -> BindTarget {
        BindTarget {
            brain_name: self.brain_name.clone(),
            brain_version: self.brain_version.clone(),
            concept_name: self.concept_name.clone(),
            action: self.action.clone(),
        }
    }
}

#[derive(Parser)]
pub struct ReconnectOpts {
    #[clap(flatten)]
    bind: BindOpts,

    /// Pause between two reconnection cycles [default: `[reconnect] interval`]
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Pause after a failed attempt [default: `[reconnect] retry_wait`]
    #[arg(long, value_parser = humantime::parse_duration)]
    retry_wait: Option<Duration>,

    /// Attempts per cycle [default: `[reconnect] max_retries`]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: Option<u32>,

    /// Stop after this many cycles instead of running until interrupted
    #[arg(long, hide_short_help(true))]
    cycles: Option<u64>,
}

#[derive(Parser)]
pub struct ConnectAllOpts {
    #[clap(flatten)]
    bind: BindOpts,

    /// Start episode logging for every session of the simulator after connecting
    #[arg(long)]
    start_logging: bool,
}

fn reconnect_config(base: &ReconnectConfig, opts: &ReconnectOpts) -> ReconnectConfig {
    let mut config = base.clone();
    if let Some(interval) = opts.interval {
        config.interval = interval;
    }
    if let Some(retry_wait) = opts.retry_wait {
        config.retry_wait = retry_wait;
    }
    if let Some(max_retries) = opts.max_retries {
        config.max_retries = max_retries;
    }
    config
}

pub async fn command_reconnect(
    gsettings: &GlobalSettings,
    opts: ReconnectOpts,
) -> anyhow::Result<()> {
    let config = reconnect_config(&gsettings.reconnect_config()?, &opts);
    let settings = ReconnectSettings::from_config(
        &config,
        opts.bind.simulator_name.clone(),
        opts.bind.bind_target(),
    );
    log::info!(
        "Reconnecting simulators of {} to {}:{} every {}",
        settings.simulator_name,
        settings.bind.brain_name,
        settings.bind.brain_version,
        humantime::format_duration(settings.interval)
    );

    let mut process = ReconnectLoop::new(Box::new(BonsaiCli::new(&config)), settings);
    tokio::select! {
        _ = process.run(opts.cycles) => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received SIGINT, stopping reconnection");
        }
    }
    Ok(())
}

pub async fn command_connect_all(
    gsettings: &GlobalSettings,
    opts: ConnectAllOpts,
) -> anyhow::Result<()> {
    let registry = BonsaiCli::new(&gsettings.reconnect_config()?);
    let logged = connect_all(
        &registry,
        &opts.bind.simulator_name,
        &opts.bind.bind_target(),
        opts.start_logging,
    )
    .await?;
    gsettings
        .printer()
        .print_simulators_connected(&opts.bind.simulator_name, &logged);
    Ok(())
}
