use crate::batch::backend::{PoolInfo, PoolNodeCounts, TaskInfo};
use crate::client::commands::run::RunReport;
use crate::client::output::outputs::Output;
use crate::planner::{CostEstimate, PoolPlan};
use crate::pricing::PricePoint;

/// Prints only identifiers and numbers, one per line.
#[derive(Default)]
pub struct Quiet;

impl Output for Quiet {
    fn print_plan(&self, plan: &PoolPlan, estimate: Option<&CostEstimate>) {
        match estimate {
            Some(estimate) => println!("{} {}", plan.vm_sku, estimate.hourly_cost),
            None => println!("{}", plan.vm_sku),
        }
    }

    fn print_price(&self, price: &PricePoint) {
        println!("{}", price.hourly_price)
    }

    fn print_run_submitted(&self, report: &RunReport) {
        println!("{} {}", report.pool_id, report.job_id)
    }

    fn print_job_completed(&self, _job_id: &str, _tasks: &[TaskInfo]) {}

    fn print_task_list(&self, _job_id: &str, tasks: &[TaskInfo]) {
        for task in tasks {
            println!("{} {:?}", task.id, task.state)
        }
    }

    fn print_jobs_deleted(&self, count: usize) {
        println!("{count}")
    }

    fn print_pool_list(&self, pools: &[PoolInfo]) {
        for pool in pools {
            println!("{}", pool.id)
        }
    }

    fn print_pools_deleted(&self, pool_ids: &[String]) {
        for pool_id in pool_ids {
            println!("{pool_id}")
        }
    }

    fn print_pool_resized(&self, _pool_id: &str, _dedicated_nodes: u32, _low_priority_nodes: u32) {
    }

    fn print_node_counts(&self, counts: &PoolNodeCounts) {
        println!("{} {}", counts.dedicated.total, counts.low_priority.total)
    }

    fn print_simulators_connected(&self, _simulator_name: &str, logged_sessions: &[String]) {
        for session_id in logged_sessions {
            println!("{session_id}")
        }
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}
