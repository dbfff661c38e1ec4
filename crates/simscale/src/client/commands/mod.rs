pub mod job;
pub mod plan;
pub mod pool;
pub mod reconnect;
pub mod run;

use crate::batch::{AzBatchCli, OrchestratorSettings, PoolOrchestrator};
use crate::common::config::SimScaleConfig;

/// Orchestrator talking to the batch account from the configuration.
pub fn create_orchestrator(config: &SimScaleConfig) -> PoolOrchestrator {
    PoolOrchestrator::new(
        Box::new(AzBatchCli::new(&config.batch)),
        OrchestratorSettings::from_config(config),
    )
}
