use serde::Serialize;

use crate::common::config::HostOs;
use crate::common::error::SimScaleError;
use crate::common::utils::str::round2;
use crate::planner::confirm::{SkuConfirmation, SkuDecision};
use crate::planner::ladder::SkuLadder;
use crate::pricing::{PriceLookup, PricePoint, PriceQuery, PriorityClass};

pub mod confirm;
pub mod ladder;

/// VM size value that asks for automatic selection.
const AUTO_SKU: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub requested_tasks: u32,
    pub low_priority_nodes: u32,
    pub dedicated_nodes: u32,
    /// `None`, an empty string or `none` select the VM size from the ladder.
    pub vm_sku: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkuSource {
    UserSupplied,
    AutoSelected,
    /// Auto-selected size was replaced during confirmation.
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolPlan {
    pub requested_tasks: u32,
    pub low_priority_nodes: u32,
    pub dedicated_nodes: u32,
    pub tasks_per_node: u32,
    pub vm_sku: String,
    pub sku_source: SkuSource,
}

impl PoolPlan {
    pub fn total_nodes(&self) -> u32 {
        self.low_priority_nodes.saturating_add(self.dedicated_nodes)
    }
}

/// Hourly cost of a plan together with the unit prices it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub low_priority: Option<PricePoint>,
    pub dedicated: Option<PricePoint>,
    pub hourly_cost: f64,
}

/// Number of tasks each node runs so that all requested tasks fit into the pool.
pub fn tasks_per_node(requested_tasks: u32, total_nodes: u32) -> u32 {
    requested_tasks.div_ceil(total_nodes.max(1)).max(1)
}

pub fn hourly_cost(
    low_priority_price: f64,
    low_priority_nodes: u32,
    dedicated_price: f64,
    dedicated_nodes: u32,
) -> f64 {
    round2(
        low_priority_price * low_priority_nodes as f64 + dedicated_price * dedicated_nodes as f64,
    )
}

pub fn default_pool_id(image_name: &str, total_nodes: u32) -> String {
    format!("{image_name}pool{total_nodes}")
}

pub fn default_job_name(image_name: &str, requested_tasks: u32) -> String {
    format!("{image_name}job{requested_tasks}")
}

fn is_auto_sku(vm_sku: Option<&str>) -> bool {
    match vm_sku.map(str::trim) {
        None => true,
        Some(sku) => sku.is_empty() || sku.eq_ignore_ascii_case(AUTO_SKU),
    }
}

pub struct PoolPlanner {
    ladder: SkuLadder,
}

impl PoolPlanner {
    pub fn new(ladder: SkuLadder) -> Self {
        Self { ladder }
    }

    pub fn plan(
        &self,
        request: &PlanRequest,
        confirmation: &mut dyn SkuConfirmation,
    ) -> crate::Result<PoolPlan> {
        let Some(total_nodes) = request
            .low_priority_nodes
            .checked_add(request.dedicated_nodes)
        else {
            return Err(SimScaleError::InvalidConfiguration(format!(
                "Too many nodes requested: {} low-priority and {} dedicated",
                request.low_priority_nodes, request.dedicated_nodes
            )));
        };
        if total_nodes < 1 {
            return Err(SimScaleError::InvalidConfiguration(
                "The pool needs at least one low-priority or dedicated node".to_string(),
            ));
        }
        if request.requested_tasks < 1 {
            return Err(SimScaleError::InvalidConfiguration(
                "At least one task has to be requested".to_string(),
            ));
        }

        let tasks_per_node = tasks_per_node(request.requested_tasks, total_nodes);
        log::info!(
            "Requested pool size low-priority nodes: {}, dedicated nodes: {}, tasks per node: {tasks_per_node}",
            request.low_priority_nodes,
            request.dedicated_nodes
        );

        let (vm_sku, sku_source) = if is_auto_sku(request.vm_sku.as_deref()) {
            self.select_sku(tasks_per_node, confirmation)?
        } else {
            let vm_sku = request.vm_sku.as_deref().unwrap_or_default().trim();
            (vm_sku.to_string(), SkuSource::UserSupplied)
        };

        Ok(PoolPlan {
            requested_tasks: request.requested_tasks,
            low_priority_nodes: request.low_priority_nodes,
            dedicated_nodes: request.dedicated_nodes,
            tasks_per_node,
            vm_sku,
            sku_source,
        })
    }

    fn select_sku(
        &self,
        tasks_per_node: u32,
        confirmation: &mut dyn SkuConfirmation,
    ) -> crate::Result<(String, SkuSource)> {
        let vm_sku = self.ladder.select(tasks_per_node).vm_sku.clone();
        if self
            .ladder
            .compatibility_threshold()
            .is_some_and(|limit| tasks_per_node > limit)
        {
            log::info!(
                "Running {tasks_per_node} tasks per node, please check if VM size {vm_sku} is compatible"
            );
        }
        log::warn!("Auto-selecting {vm_sku} for your pool based on calculated tasks per node");

        let needs_confirmation = self
            .ladder
            .confirmation_threshold()
            .is_some_and(|limit| tasks_per_node > limit);
        if !needs_confirmation {
            return Ok((vm_sku, SkuSource::AutoSelected));
        }

        log::warn!(
            "You have asked to run {tasks_per_node} tasks per node without providing a VM SKU, the selected {vm_sku} may be costly"
        );
        match confirmation.confirm(&vm_sku, tasks_per_node)? {
            SkuDecision::Proceed => Ok((vm_sku, SkuSource::AutoSelected)),
            SkuDecision::Replace(replacement) => {
                log::info!("Using {replacement} instead of {vm_sku}");
                Ok((replacement, SkuSource::Replaced))
            }
        }
    }
}

/// Looks up both tiers of the plan and combines them into an hourly cost.
///
/// Tiers without nodes are not looked up. Any failed lookup makes the estimate
/// unavailable.
pub async fn estimate_hourly_cost(
    plan: &PoolPlan,
    region: &str,
    host_os: HostOs,
    prices: &dyn PriceLookup,
) -> crate::Result<CostEstimate> {
    let lookup_tier = |priority: PriorityClass, nodes: u32| {
        let query = PriceQuery::new(region, &plan.vm_sku, priority, host_os);
        async move {
            if nodes == 0 {
                return Ok(None);
            }
            prices.lookup(query).await.map(Some).map_err(|error| {
                SimScaleError::PricingUnavailable(format!(
                    "Cannot determine {priority} price of {}: {error}",
                    plan.vm_sku
                ))
            })
        }
    };

    let low_priority = lookup_tier(PriorityClass::LowPriority, plan.low_priority_nodes).await?;
    let dedicated = lookup_tier(PriorityClass::Dedicated, plan.dedicated_nodes).await?;
    let hourly_cost = hourly_cost(
        low_priority.as_ref().map(|p| p.hourly_price).unwrap_or(0.0),
        plan.low_priority_nodes,
        dedicated.as_ref().map(|p| p.hourly_price).unwrap_or(0.0),
        plan.dedicated_nodes,
    );
    Ok(CostEstimate {
        low_priority,
        dedicated,
        hourly_cost,
    })
}
