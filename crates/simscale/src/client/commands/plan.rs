use clap::Parser;

use crate::client::globalsettings::GlobalSettings;
use crate::common::config::{HostOs, SimScaleConfig};
use crate::common::error::SimScaleError;
use crate::planner::confirm::create_confirmation;
use crate::planner::{CostEstimate, PlanRequest, PoolPlan, PoolPlanner, estimate_hourly_cost};
use crate::pricing::{HttpPriceSource, PriceLookup, PriceQuery, PriorityClass};

/// Pool sizing arguments shared by `plan` and `run`
#[derive(Parser)]
pub struct SizingOpts {
    /// Number of simulators to run, one task each
    #[arg(long, short = 'n')]
    pub tasks: u32,

    /// Number of low-priority nodes [default: `[pool] low_priority_nodes`]
    #[arg(long)]
    pub low_priority_nodes: Option<u32>,

    /// Number of dedicated nodes [default: `[pool] dedicated_nodes`]
    #[arg(long)]
    pub dedicated_nodes: Option<u32>,

    /// VM size of the pool nodes
    ///
    /// When omitted, empty or `none`, the size is selected from the number of tasks per node.
    #[arg(long)]
    pub vm_sku: Option<String>,

    /// Accept an auto-selected VM size without asking
    #[arg(long, short = 'y', env = "SIMSCALE_AUTO_APPROVE")]
    pub auto_approve: bool,
}

impl SizingOpts {
    pub fn request(&self, config: &SimScaleConfig) -> PlanRequest {
        PlanRequest {
            requested_tasks: self.tasks,
            low_priority_nodes: self
                .low_priority_nodes
                .unwrap_or(config.pool.low_priority_nodes),
            dedicated_nodes: self.dedicated_nodes.unwrap_or(config.pool.dedicated_nodes),
            vm_sku: self.vm_sku.clone(),
        }
    }
}

#[derive(Parser)]
pub struct PlanOpts {
    #[clap(flatten)]
    sizing: SizingOpts,

    /// Do not look up the hourly price of the pool
    #[arg(long)]
    no_price: bool,
}

#[derive(Parser)]
pub struct PriceOpts {
    /// VM size, e.g. Standard_E2s_v3
    vm_sku: String,

    /// Azure region [default: location of the batch account]
    #[arg(long)]
    region: Option<String>,

    /// Billing tier
    #[arg(long, value_enum, default_value_t = PriorityClass::LowPriority)]
    priority: PriorityClass,

    /// Operating system of the nodes [default: `[container] platform`]
    #[arg(long, value_enum)]
    os: Option<HostOs>,
}

pub fn plan_pool(config: &SimScaleConfig, sizing: &SizingOpts) -> crate::Result<PoolPlan> {
    let planner = PoolPlanner::new(config.ladder()?);
    let mut confirmation = create_confirmation(sizing.auto_approve);
    planner.plan(&sizing.request(config), confirmation.as_mut())
}

/// Hourly cost of the plan, `None` when no price could be found.
pub async fn estimate_cost(
    config: &SimScaleConfig,
    plan: &PoolPlan,
    prices: &dyn PriceLookup,
) -> crate::Result<Option<CostEstimate>> {
    match estimate_hourly_cost(
        plan,
        &config.batch.location,
        config.container.platform,
        prices,
    )
    .await
    {
        Ok(estimate) => Ok(Some(estimate)),
        Err(SimScaleError::PricingUnavailable(message)) => {
            log::warn!("{message}");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

pub async fn command_plan(gsettings: &GlobalSettings, opts: PlanOpts) -> anyhow::Result<()> {
    let config = gsettings.load_config()?;
    let plan = plan_pool(&config, &opts.sizing)?;
    let estimate = if opts.no_price {
        None
    } else {
        let prices = HttpPriceSource::new(&config.pricing)?;
        estimate_cost(&config, &plan, &prices).await?
    };
    gsettings.printer().print_plan(&plan, estimate.as_ref());
    Ok(())
}

pub async fn command_price(gsettings: &GlobalSettings, opts: PriceOpts) -> anyhow::Result<()> {
    let config = gsettings.load_config()?;
    let prices = HttpPriceSource::new(&config.pricing)?;
    let region = opts.region.unwrap_or_else(|| config.batch.location.clone());
    let host_os = opts.os.unwrap_or(config.container.platform);
    let query = PriceQuery::new(&region, &opts.vm_sku, opts.priority, host_os);
    let price = prices.lookup(query).await?;
    gsettings.printer().print_price(&price);
    Ok(())
}
