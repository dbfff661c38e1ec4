pub mod azcli;
pub mod backend;
pub mod orchestrator;

pub use azcli::AzBatchCli;
pub use backend::{PoolBackend, PoolSpec, TaskInfo, TaskSpec, TaskState};
pub use orchestrator::{OrchestratorSettings, PoolOrchestrator, PoolSelector};
