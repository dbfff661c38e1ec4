use serde_json::json;

use crate::batch::backend::{PoolInfo, PoolNodeCounts, TaskInfo};
use crate::client::commands::run::RunReport;
use crate::client::output::outputs::Output;
use crate::planner::{CostEstimate, PoolPlan};
use crate::pricing::PricePoint;

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    fn print(&self, data: serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
        );
    }
}

impl Output for JsonOutput {
    fn print_plan(&self, plan: &PoolPlan, estimate: Option<&CostEstimate>) {
        self.print(json!({
            "plan": plan,
            "estimate": estimate,
        }));
    }

    fn print_price(&self, price: &PricePoint) {
        self.print(json!(price));
    }

    fn print_run_submitted(&self, report: &RunReport) {
        self.print(json!(report));
    }

    fn print_job_completed(&self, job_id: &str, tasks: &[TaskInfo]) {
        self.print(json!({
            "job_id": job_id,
            "tasks": tasks,
        }));
    }

    fn print_task_list(&self, job_id: &str, tasks: &[TaskInfo]) {
        self.print(json!({
            "job_id": job_id,
            "tasks": tasks,
        }));
    }

    fn print_jobs_deleted(&self, count: usize) {
        self.print(json!({ "deleted_jobs": count }));
    }

    fn print_pool_list(&self, pools: &[PoolInfo]) {
        self.print(json!(pools));
    }

    fn print_pools_deleted(&self, pool_ids: &[String]) {
        self.print(json!({ "deleted_pools": pool_ids }));
    }

    fn print_pool_resized(&self, pool_id: &str, dedicated_nodes: u32, low_priority_nodes: u32) {
        self.print(json!({
            "pool_id": pool_id,
            "target_dedicated_nodes": dedicated_nodes,
            "target_low_priority_nodes": low_priority_nodes,
        }));
    }

    fn print_node_counts(&self, counts: &PoolNodeCounts) {
        self.print(json!(counts));
    }

    fn print_simulators_connected(&self, simulator_name: &str, logged_sessions: &[String]) {
        self.print(json!({
            "simulator_name": simulator_name,
            "logged_sessions": logged_sessions,
        }));
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(json!({ "error": format!("{error:?}") }));
    }
}
