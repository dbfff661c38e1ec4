use std::io::{self, IsTerminal};

use clap::{CommandFactory, FromArgMatches};
use clap_complete::generate;
use cli_table::ColorChoice;

use simscale::client::commands::job::command_job;
use simscale::client::commands::plan::{command_plan, command_price};
use simscale::client::commands::pool::command_pool;
use simscale::client::commands::reconnect::{command_connect_all, command_reconnect};
use simscale::client::commands::run::command_run;
use simscale::client::globalsettings::GlobalSettings;
use simscale::client::output::cli::CliOutput;
use simscale::client::output::json::JsonOutput;
use simscale::client::output::outputs::{Output, Outputs};
use simscale::client::output::quiet::Quiet;
use simscale::common::cli::{
    ColorPolicy, CommonOpts, GenerateCompletionOpts, RootOptions, SubCommand,
};
use simscale::common::config::resolve_config_path;
use simscale::common::setup::setup_logging;

fn make_global_settings(opts: CommonOpts) -> GlobalSettings {
    let config_path = resolve_config_path(opts.config.as_deref());

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
        Outputs::Quiet => Box::<Quiet>::default(),
    };

    GlobalSettings::new(config_path, printer)
}

fn generate_completion(opts: GenerateCompletionOpts) -> anyhow::Result<()> {
    let generator = opts.shell;

    let mut app = RootOptions::command();
    eprintln!("Generating completion file for {generator}...");
    generate(generator, &mut app, "simscale".to_string(), &mut io::stdout());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> simscale::Result<()> {
    // Credentials may be provided through a `.env` file in the working directory
    dotenvy::dotenv().ok();

    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let gsettings = make_global_settings(top_opts.common);

    let result = match top_opts.subcmd {
        SubCommand::Run(opts) => command_run(&gsettings, opts).await,
        SubCommand::Plan(opts) => command_plan(&gsettings, opts).await,
        SubCommand::Price(opts) => command_price(&gsettings, opts).await,
        SubCommand::Job(opts) => command_job(&gsettings, opts).await,
        SubCommand::Pool(opts) => command_pool(&gsettings, opts).await,
        SubCommand::Reconnect(opts) => command_reconnect(&gsettings, opts).await,
        SubCommand::ConnectAll(opts) => command_connect_all(&gsettings, opts).await,
        SubCommand::GenerateCompletion(opts) => generate_completion(opts),
    };

    if let Err(e) = result {
        gsettings.printer().print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
