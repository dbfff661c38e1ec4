use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use serde::Serialize;

use crate::batch::orchestrator::{PoolOrchestrator, PoolProvisioning};
use crate::client::commands::create_orchestrator;
use crate::client::commands::plan::{SizingOpts, estimate_cost, plan_pool};
use crate::client::globalsettings::GlobalSettings;
use crate::client::lastrun::{LastRun, store_last_run};
use crate::common::config::{HostOs, SimScaleConfig};
use crate::planner::{CostEstimate, PoolPlan, default_job_name, default_pool_id};
use crate::pricing::{HttpPriceSource, PriceLookup};

#[derive(Parser)]
pub struct RunOpts {
    /// Command executed inside every simulator container
    #[arg(long, short = 'c', default_value = "python main.py")]
    command: String,

    #[clap(flatten)]
    sizing: SizingOpts,

    /// Pool id [default: `<image name>pool<total nodes>`]
    #[arg(long)]
    pool_id: Option<String>,

    /// Job name [default: `<image name>job<number of tasks>`]
    #[arg(long)]
    job_name: Option<String>,

    /// Working directory of the command inside the container
    #[arg(long)]
    workdir: Option<String>,

    /// Container image name [default: `[container] image_name`]
    #[arg(long)]
    image_name: Option<String>,

    /// Container image version [default: `[container] image_version`]
    #[arg(long)]
    image_version: Option<String>,

    /// Operating system of the container image [default: `[container] platform`]
    #[arg(long, value_enum)]
    platform: Option<HostOs>,

    /// Mount the configured file share and store simulator logs on it
    #[arg(long)]
    fileshare: bool,

    /// Fail instead of reusing a pool with the same id
    #[arg(long)]
    no_reuse: bool,

    /// Do not look up the hourly price of the pool
    #[arg(long)]
    no_price: bool,

    /// Wait until all tasks are completed
    #[arg(long)]
    wait: bool,

    /// Maximum time to wait for the tasks [default: `[pool] wait_timeout`]
    #[arg(long, value_parser = humantime::parse_duration, requires = "wait")]
    wait_timeout: Option<Duration>,
}

/// Outcome of a submitted run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pool_id: String,
    pub provisioning: PoolProvisioning,
    pub job_id: String,
    pub job_name: String,
    pub task_ids: Vec<String>,
    pub plan: PoolPlan,
    pub estimate: Option<CostEstimate>,
}

fn apply_overrides(config: &mut SimScaleConfig, opts: &RunOpts) {
    if let Some(image_name) = &opts.image_name {
        config.container.image_name = image_name.clone();
    }
    if let Some(image_version) = &opts.image_version {
        config.container.image_version = image_version.clone();
    }
    if let Some(platform) = opts.platform {
        log::info!("Using {platform} containers");
        config.container.platform = platform;
    }
}

/// Shows the hourly cost of the plan, then provisions the pool and the job and
/// submits one task per simulator.
///
/// Nothing is created before the estimate and the cancel window are over.
pub async fn submit_run(
    config: &SimScaleConfig,
    opts: &RunOpts,
    plan: PoolPlan,
    orchestrator: &mut PoolOrchestrator,
    prices: Option<&dyn PriceLookup>,
) -> crate::Result<RunReport> {
    let pool_id = opts
        .pool_id
        .clone()
        .or_else(|| config.pool.pool_id.clone())
        .unwrap_or_else(|| default_pool_id(&config.container.image_name, plan.total_nodes()));
    let job_name = opts
        .job_name
        .clone()
        .or_else(|| config.pool.job_name.clone())
        .unwrap_or_else(|| default_job_name(&config.container.image_name, plan.requested_tasks));

    let estimate = match prices {
        Some(prices) => estimate_cost(config, &plan, prices).await?,
        None => None,
    };
    if let Some(estimate) = &estimate {
        let pause = config.pool.price_pause;
        log::warn!(
            "Hourly cost of the pool: ${:.2}. Pausing for {} before creating the pool, press Ctrl-C to cancel",
            estimate.hourly_cost,
            humantime::format_duration(pause)
        );
        tokio::time::sleep(pause).await;
    }

    let provisioning = orchestrator
        .ensure_pool(&pool_id, &plan, !opts.no_reuse, opts.fileshare)
        .await?;
    let job_id = orchestrator.ensure_job(&job_name, None).await?;
    log::info!(
        "Using batch account {} to run job {job_name} with {} tasks",
        config.batch.account_name,
        plan.requested_tasks
    );

    let commands = vec![opts.command.clone(); plan.requested_tasks as usize];
    let task_ids = orchestrator
        .submit_tasks(&commands, opts.workdir.as_deref())
        .await?;

    Ok(RunReport {
        pool_id,
        provisioning,
        job_id,
        job_name,
        task_ids,
        plan,
        estimate,
    })
}

pub async fn command_run(gsettings: &GlobalSettings, opts: RunOpts) -> anyhow::Result<()> {
    let mut config = gsettings.load_config()?;
    apply_overrides(&mut config, &opts);
    config.workspace_credentials()?;

    let plan = plan_pool(&config, &opts.sizing)?;
    let prices = if opts.no_price {
        None
    } else {
        Some(HttpPriceSource::new(&config.pricing)?)
    };
    let mut orchestrator = create_orchestrator(&config);
    let report = submit_run(
        &config,
        &opts,
        plan,
        &mut orchestrator,
        prices.as_ref().map(|prices| prices as &dyn PriceLookup),
    )
    .await?;

    let record = LastRun {
        pool_id: report.pool_id.clone(),
        job_id: report.job_id.clone(),
        job_name: report.job_name.clone(),
        vm_sku: report.plan.vm_sku.clone(),
        tasks_per_node: report.plan.tasks_per_node,
        low_priority_nodes: report.plan.low_priority_nodes,
        dedicated_nodes: report.plan.dedicated_nodes,
        requested_tasks: report.plan.requested_tasks,
        started_at: Utc::now(),
    };
    let last_run_path = gsettings.last_run_path();
    if let Err(error) = store_last_run(&record, &last_run_path) {
        log::warn!(
            "Cannot store the run record at {}: {error}",
            last_run_path.display()
        );
    }
    gsettings.printer().print_run_submitted(&report);

    if opts.wait {
        let timeout = opts.wait_timeout.unwrap_or(config.pool.wait_timeout);
        let tasks = orchestrator
            .wait_for_completion(&report.job_id, timeout)
            .await?;
        gsettings.printer().print_job_completed(&report.job_id, &tasks);
    } else {
        log::info!("Submitted all tasks, use `simscale job wait` to wait for their completion");
    }
    Ok(())
}
