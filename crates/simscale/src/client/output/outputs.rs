use crate::batch::backend::{PoolInfo, PoolNodeCounts, TaskInfo};
use crate::client::commands::run::RunReport;
use crate::planner::{CostEstimate, PoolPlan};
use crate::pricing::PricePoint;

#[derive(clap::ValueEnum, Clone)]
pub enum Outputs {
    CLI,
    JSON,
    Quiet,
}

pub trait Output {
    // Planning
    fn print_plan(&self, plan: &PoolPlan, estimate: Option<&CostEstimate>);
    fn print_price(&self, price: &PricePoint);

    // Runs and jobs
    fn print_run_submitted(&self, report: &RunReport);
    fn print_job_completed(&self, job_id: &str, tasks: &[TaskInfo]);
    fn print_task_list(&self, job_id: &str, tasks: &[TaskInfo]);
    fn print_jobs_deleted(&self, count: usize);

    // Pools
    fn print_pool_list(&self, pools: &[PoolInfo]);
    fn print_pools_deleted(&self, pool_ids: &[String]);
    fn print_pool_resized(&self, pool_id: &str, dedicated_nodes: u32, low_priority_nodes: u32);
    fn print_node_counts(&self, counts: &PoolNodeCounts);

    // Simulators
    fn print_simulators_connected(&self, simulator_name: &str, logged_sessions: &[String]);

    fn print_error(&self, error: anyhow::Error);
}
