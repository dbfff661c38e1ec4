use cli_table::format::{Justify, Separator};
use cli_table::{Cell, CellStruct, Color, ColorChoice, Style, Table, TableStruct, print_stdout};
use colored::Colorize;

use crate::batch::backend::{NodeStateCounts, PoolInfo, PoolNodeCounts, TaskInfo, TaskState};
use crate::batch::orchestrator::PoolProvisioning;
use crate::client::commands::run::RunReport;
use crate::client::output::outputs::Output;
use crate::common::utils::str::pluralize;
use crate::planner::{CostEstimate, PoolPlan, SkuSource};
use crate::pricing::PricePoint;

pub struct CliOutput {
    color_policy: ColorChoice,
}

impl CliOutput {
    pub fn new(color_policy: ColorChoice) -> CliOutput {
        CliOutput { color_policy }
    }

    fn print_vertical_table(&self, rows: Vec<Vec<CellStruct>>) {
        let table = rows.table().separator(
            Separator::builder()
                .column(Some(Default::default()))
                .build(),
        );
        self.print_table(table);
    }

    fn print_horizontal_table(&self, rows: Vec<Vec<CellStruct>>, header: Vec<CellStruct>) {
        let table = rows
            .table()
            .separator(
                Separator::builder()
                    .title(Some(Default::default()))
                    .column(Some(Default::default()))
                    .build(),
            )
            .title(header);
        self.print_table(table);
    }

    fn print_table(&self, table: TableStruct) {
        let table = table.color_choice(self.color_policy);
        if let Err(e) = print_stdout(table) {
            log::error!("Cannot print table to stdout: {e:?}");
        }
    }

    fn plan_rows(&self, plan: &PoolPlan, estimate: Option<&CostEstimate>) -> Vec<Vec<CellStruct>> {
        let mut rows = vec![
            vec!["VM size".cell().bold(true), sku_cell(plan)],
            vec!["Requested tasks".cell().bold(true), plan.requested_tasks.cell()],
            vec!["Tasks per node".cell().bold(true), plan.tasks_per_node.cell()],
            vec![
                "Low-priority nodes".cell().bold(true),
                plan.low_priority_nodes.cell(),
            ],
            vec!["Dedicated nodes".cell().bold(true), plan.dedicated_nodes.cell()],
        ];
        if let Some(estimate) = estimate {
            for price in [&estimate.low_priority, &estimate.dedicated]
                .into_iter()
                .flatten()
            {
                rows.push(vec![
                    format!("{} price", price.priority).cell().bold(true),
                    format!("${}/h per node", price.hourly_price).cell(),
                ]);
            }
            rows.push(vec![
                "Hourly cost".cell().bold(true),
                format!("${:.2}", estimate.hourly_cost)
                    .cell()
                    .foreground_color(Some(Color::Yellow))
                    .bold(true),
            ]);
        }
        rows
    }
}

fn sku_cell(plan: &PoolPlan) -> CellStruct {
    match plan.sku_source {
        SkuSource::UserSupplied => plan.vm_sku.as_str().cell(),
        SkuSource::AutoSelected => format!("{} (auto-selected)", plan.vm_sku).cell(),
        SkuSource::Replaced => format!("{} (replaced)", plan.vm_sku).cell(),
    }
}

fn task_state_cell(state: TaskState) -> CellStruct {
    let (name, color) = match state {
        TaskState::Active => ("ACTIVE", Color::Cyan),
        TaskState::Preparing => ("PREPARING", Color::Cyan),
        TaskState::Running => ("RUNNING", Color::Yellow),
        TaskState::Completed => ("COMPLETED", Color::Green),
    };
    name.cell().foreground_color(Some(color))
}

fn node_count_row(tier: &str, counts: &NodeStateCounts) -> Vec<CellStruct> {
    vec![
        tier.cell().bold(true),
        counts.total.cell().justify(Justify::Right),
        counts.idle.cell().justify(Justify::Right),
        counts.running.cell().justify(Justify::Right),
        (counts.creating + counts.starting + counts.waiting_for_start_task)
            .cell()
            .justify(Justify::Right),
        counts.preempted.cell().justify(Justify::Right),
        (counts.start_task_failed + counts.unusable + counts.offline + counts.unknown)
            .cell()
            .justify(Justify::Right),
    ]
}

impl Output for CliOutput {
    fn print_plan(&self, plan: &PoolPlan, estimate: Option<&CostEstimate>) {
        self.print_vertical_table(self.plan_rows(plan, estimate));
    }

    fn print_price(&self, price: &PricePoint) {
        let rows = vec![
            vec!["VM size".cell().bold(true), price.vm_sku.as_str().cell()],
            vec!["Region".cell().bold(true), price.region.as_str().cell()],
            vec!["Priority".cell().bold(true), price.priority.cell()],
            vec!["OS".cell().bold(true), price.host_os.cell()],
            vec![
                "Hourly price".cell().bold(true),
                format!("${}", price.hourly_price).cell(),
            ],
        ];
        self.print_vertical_table(rows);
    }

    fn print_run_submitted(&self, report: &RunReport) {
        let provisioning = match report.provisioning {
            PoolProvisioning::Created => "created",
            PoolProvisioning::Reused => "reused",
        };
        let mut rows = vec![
            vec![
                "Pool".cell().bold(true),
                format!("{} ({provisioning})", report.pool_id).cell(),
            ],
            vec!["Job".cell().bold(true), report.job_id.as_str().cell()],
            vec!["Tasks".cell().bold(true), report.task_ids.len().cell()],
        ];
        rows.extend(self.plan_rows(&report.plan, report.estimate.as_ref()));
        self.print_vertical_table(rows);
    }

    fn print_job_completed(&self, job_id: &str, tasks: &[TaskInfo]) {
        println!(
            "Job {} finished {}, {} {}",
            job_id.bold(),
            "successfully".color(colored::Color::Green),
            tasks.len(),
            pluralize("task", tasks.len())
        );
        self.print_task_list(job_id, tasks);
    }

    fn print_task_list(&self, _job_id: &str, tasks: &[TaskInfo]) {
        let rows: Vec<_> = tasks
            .iter()
            .map(|task| vec![task.id.as_str().cell(), task_state_cell(task.state)])
            .collect();
        let header = vec!["Task".cell().bold(true), "State".cell().bold(true)];
        self.print_horizontal_table(rows, header);
    }

    fn print_jobs_deleted(&self, count: usize) {
        println!("{count} {} deleted", pluralize("job", count));
    }

    fn print_pool_list(&self, pools: &[PoolInfo]) {
        let rows: Vec<_> = pools
            .iter()
            .map(|pool| {
                vec![
                    pool.id.as_str().cell(),
                    pool.vm_size.as_deref().unwrap_or("").cell(),
                    pool.state.as_deref().unwrap_or("").cell(),
                    pool.allocation_state.as_deref().unwrap_or("").cell(),
                    pool.current_dedicated_nodes.cell().justify(Justify::Right),
                    pool.current_low_priority_nodes
                        .cell()
                        .justify(Justify::Right),
                ]
            })
            .collect();
        let header = vec![
            "ID".cell().bold(true),
            "VM size".cell().bold(true),
            "State".cell().bold(true),
            "Allocation".cell().bold(true),
            "Dedicated".cell().bold(true),
            "Low-priority".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }

    fn print_pools_deleted(&self, pool_ids: &[String]) {
        if pool_ids.is_empty() {
            println!("No pool was deleted");
            return;
        }
        for pool_id in pool_ids {
            println!("Pool {} deleted", pool_id.bold());
        }
    }

    fn print_pool_resized(&self, pool_id: &str, dedicated_nodes: u32, low_priority_nodes: u32) {
        println!(
            "Pool {} is resizing to {dedicated_nodes} dedicated and {low_priority_nodes} low-priority {}",
            pool_id.bold(),
            pluralize("node", dedicated_nodes.saturating_add(low_priority_nodes) as usize)
        );
    }

    fn print_node_counts(&self, counts: &PoolNodeCounts) {
        let rows = vec![
            node_count_row("Dedicated", &counts.dedicated),
            node_count_row("Low-priority", &counts.low_priority),
        ];
        let header = vec![
            counts.pool_id.as_str().cell().bold(true),
            "Total".cell().bold(true),
            "Idle".cell().bold(true),
            "Running".cell().bold(true),
            "Starting".cell().bold(true),
            "Preempted".cell().bold(true),
            "Unusable".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }

    fn print_simulators_connected(&self, simulator_name: &str, logged_sessions: &[String]) {
        println!("Simulators of {} connected", simulator_name.bold());
        if !logged_sessions.is_empty() {
            println!(
                "Logging started for {} {}",
                logged_sessions.len(),
                pluralize("session", logged_sessions.len())
            );
        }
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}
