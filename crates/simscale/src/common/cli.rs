use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

use crate::client::commands::job::JobOpts;
use crate::client::commands::plan::{PlanOpts, PriceOpts};
use crate::client::commands::pool::PoolOpts;
use crate::client::commands::reconnect::{ConnectAllOpts, ReconnectOpts};
use crate::client::commands::run::RunOpts;
use crate::client::output::outputs::Outputs;

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
    /// Path to the TOML configuration file
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        global = true,
        env = "SIMSCALE_CONFIG",
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub config: Option<PathBuf>,

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
        env = "SIMSCALE_OUTPUT_MODE",
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
        env = "SIMSCALE_DEBUG",
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
    version(crate::SIMSCALE_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[allow(clippy::large_enum_variant)]
#[derive(Parser)]
pub enum SubCommand {
    /// Size a pool, submit one task per simulator and optionally wait for them
    Run(RunOpts),
    /// Show the pool that would be used for a number of simulators
    Plan(PlanOpts),
    /// Look up the hourly price of a VM size
    Price(PriceOpts),
    /// Commands for jobs
    Job(JobOpts),
    /// Commands for pools
    Pool(PoolOpts),
    /// Keep reconnecting unassigned simulator sessions to a brain
    Reconnect(ReconnectOpts),
    /// Connect all sessions of a simulator to a brain once
    ConnectAll(ConnectAllOpts),
    /// Generate shell completion script
    GenerateCompletion(GenerateCompletionOpts),
}

#[derive(Parser)]
pub struct GenerateCompletionOpts {
    /// Shell flavour for which the completion script should be generated
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::common::cli::{RootOptions, SubCommand};

    #[test]
    fn verify_root_cli() {
        use clap::CommandFactory;
        RootOptions::command().debug_assert()
    }

    #[test]
    fn parse_global_options_after_subcommand() {
        let opts = RootOptions::try_parse_from([
            "simscale",
            "plan",
            "--tasks",
            "10",
            "--config",
            "custom.toml",
            "--debug",
        ])
        .unwrap();
        assert!(opts.common.debug);
        assert_eq!(
            opts.common.config.as_deref(),
            Some(std::path::Path::new("custom.toml"))
        );
        assert!(matches!(opts.subcmd, SubCommand::Plan(_)));
    }
}
