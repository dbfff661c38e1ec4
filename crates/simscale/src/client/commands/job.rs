use std::time::Duration;

use clap::Parser;

use crate::client::commands::create_orchestrator;
use crate::client::globalsettings::GlobalSettings;

#[derive(Parser)]
pub struct JobOpts {
    #[clap(subcommand)]
    subcmd: JobCommand,
}

#[derive(Parser)]
enum JobCommand {
    /// Delete a job, stopping all of its tasks
    Stop(JobStopOpts),
    /// Delete every job of the batch account
    KillAll,
    /// Wait until all tasks of a job are completed
    Wait(JobWaitOpts),
    /// Display tasks of a job and their states
    Tasks(JobTasksOpts),
}

#[derive(Parser)]
struct JobStopOpts {
    /// Job id [default: job of the last run]
    job_id: Option<String>,
}

#[derive(Parser)]
struct JobWaitOpts {
    /// Job id [default: job of the last run]
    job_id: Option<String>,

    /// Maximum time to wait [default: `[pool] wait_timeout`]
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
}

#[derive(Parser)]
struct JobTasksOpts {
    /// Job id [default: job of the last run]
    job_id: Option<String>,
}

fn resolve_job_id(gsettings: &GlobalSettings, job_id: Option<String>) -> crate::Result<String> {
    match job_id {
        Some(job_id) => Ok(job_id),
        None => Ok(gsettings.last_run()?.job_id),
    }
}

pub async fn command_job(gsettings: &GlobalSettings, opts: JobOpts) -> anyhow::Result<()> {
    let config = gsettings.load_config()?;
    let mut orchestrator = create_orchestrator(&config);
    match opts.subcmd {
        JobCommand::Stop(opts) => {
            let job_id = resolve_job_id(gsettings, opts.job_id)?;
            orchestrator.delete_job(&job_id).await?;
            gsettings.printer().print_jobs_deleted(1);
        }
        JobCommand::KillAll => {
            let count = orchestrator.delete_all_jobs().await?;
            gsettings.printer().print_jobs_deleted(count);
        }
        JobCommand::Wait(opts) => {
            let job_id = resolve_job_id(gsettings, opts.job_id)?;
            let timeout = opts.timeout.unwrap_or(config.pool.wait_timeout);
            let tasks = orchestrator.wait_for_completion(&job_id, timeout).await?;
            gsettings.printer().print_job_completed(&job_id, &tasks);
        }
        JobCommand::Tasks(opts) => {
            let job_id = resolve_job_id(gsettings, opts.job_id)?;
            let tasks = orchestrator.list_tasks(&job_id).await?;
            gsettings.printer().print_task_list(&job_id, &tasks);
        }
    }
    Ok(())
}
