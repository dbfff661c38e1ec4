use clap::Parser;

use crate::batch::PoolSelector;
use crate::client::commands::create_orchestrator;
use crate::client::globalsettings::GlobalSettings;

#[derive(Parser)]
pub struct PoolOpts {
    #[clap(subcommand)]
    subcmd: PoolCommand,
}

#[derive(Parser)]
enum PoolCommand {
    /// Delete a pool, or all pools of the batch account
    Delete(PoolDeleteOpts),
    /// Request new target node counts of a pool
    ///
    /// The command does not wait until the pool reaches the new size.
    Resize(PoolResizeOpts),
    /// Display node counts of a pool grouped by node state
    Nodes(PoolNodesOpts),
    /// Display all pools of the batch account
    List,
}

#[derive(Parser)]
struct PoolDeleteOpts {
    /// Pool id [default: pool of the last run]
    pool_id: Option<String>,

    /// Delete every pool of the batch account
    #[arg(long, conflicts_with = "pool_id")]
    all: bool,
}

#[derive(Parser)]
struct PoolResizeOpts {
    /// Pool id [default: pool of the last run]
    pool_id: Option<String>,

    /// Target number of dedicated nodes
    #[arg(long)]
    dedicated_nodes: u32,

    /// Target number of low-priority nodes
    #[arg(long)]
    low_priority_nodes: u32,
}

#[derive(Parser)]
struct PoolNodesOpts {
    /// Pool id [default: pool of the last run]
    pool_id: Option<String>,
}

fn resolve_pool_id(gsettings: &GlobalSettings, pool_id: Option<String>) -> crate::Result<String> {
    match pool_id {
        Some(pool_id) => Ok(pool_id),
        None => Ok(gsettings.last_run()?.pool_id),
    }
}

pub async fn command_pool(gsettings: &GlobalSettings, opts: PoolOpts) -> anyhow::Result<()> {
    let config = gsettings.load_config()?;
    let mut orchestrator = create_orchestrator(&config);
    match opts.subcmd {
        PoolCommand::Delete(opts) => {
            let selector = if opts.all {
                PoolSelector::All
            } else {
                PoolSelector::Named(resolve_pool_id(gsettings, opts.pool_id)?)
            };
            let deleted = orchestrator.delete_pool(&selector).await?;
            gsettings.printer().print_pools_deleted(&deleted);
        }
        PoolCommand::Resize(opts) => {
            let pool_id = resolve_pool_id(gsettings, opts.pool_id)?;
            orchestrator
                .resize_pool(&pool_id, opts.dedicated_nodes, opts.low_priority_nodes)
                .await?;
            gsettings.printer().print_pool_resized(
                &pool_id,
                opts.dedicated_nodes,
                opts.low_priority_nodes,
            );
        }
        PoolCommand::Nodes(opts) => {
            let pool_id = resolve_pool_id(gsettings, opts.pool_id)?;
            let counts = orchestrator.pool_node_counts(&pool_id).await?;
            gsettings.printer().print_node_counts(&counts);
        }
        PoolCommand::List => {
            let pools = orchestrator.list_pools().await?;
            gsettings.printer().print_pool_list(&pools);
        }
    }
    Ok(())
}
