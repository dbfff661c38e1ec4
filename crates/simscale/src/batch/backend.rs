use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = crate::Result<T>> + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRegistry {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Network file share mounted on every node of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountSpec {
    pub account_name: String,
    pub account_key: String,
    pub url: String,
    pub relative_mount_path: String,
    pub mount_options: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSpec {
    pub id: String,
    pub vm_size: String,
    pub tasks_per_node: u32,
    pub target_low_priority_nodes: u32,
    pub target_dedicated_nodes: u32,
    pub image: ImageReference,
    pub node_agent_sku: String,
    /// Container images prefetched on the nodes.
    pub container_images: Vec<String>,
    pub registry: ContainerRegistry,
    pub mount: Option<MountSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub id: String,
    pub command_line: String,
    pub image: String,
    pub container_run_options: String,
    pub environment: Vec<(String, String)>,
    /// Run as an elevated auto-user scoped to the task.
    pub run_elevated: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Active,
    Preparing,
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolInfo {
    pub id: String,
    pub vm_size: Option<String>,
    pub state: Option<String>,
    pub allocation_state: Option<String>,
    pub current_dedicated_nodes: u32,
    pub current_low_priority_nodes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStateCounts {
    pub creating: u32,
    pub idle: u32,
    pub offline: u32,
    pub preempted: u32,
    pub rebooting: u32,
    pub reimaging: u32,
    pub running: u32,
    pub starting: u32,
    pub start_task_failed: u32,
    pub unusable: u32,
    pub waiting_for_start_task: u32,
    pub leaving_pool: u32,
    pub unknown: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolNodeCounts {
    pub pool_id: String,
    #[serde(default)]
    pub dedicated: NodeStateCounts,
    #[serde(default)]
    pub low_priority: NodeStateCounts,
}

/// Control plane of the batch service.
///
/// Every operation is awaited before the next one starts. Operations on unknown
/// pools or jobs resolve to `NotFound`, other rejections to `BackendError`.
pub trait PoolBackend {
    fn pool_exists<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, bool>;

    fn create_pool<'a>(&'a self, spec: &'a PoolSpec) -> BackendFuture<'a, ()>;

    /// Requests new target node counts, does not wait for the resize to finish.
    fn resize_pool<'a>(
        &'a self,
        pool_id: &'a str,
        dedicated_nodes: u32,
        low_priority_nodes: u32,
    ) -> BackendFuture<'a, ()>;

    fn delete_pool<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, ()>;

    fn list_pools(&self) -> BackendFuture<'_, Vec<PoolInfo>>;

    fn create_job<'a>(&'a self, job_id: &'a str, pool_id: &'a str) -> BackendFuture<'a, ()>;

    fn delete_job<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, ()>;

    fn list_jobs(&self) -> BackendFuture<'_, Vec<String>>;

    fn add_task<'a>(&'a self, job_id: &'a str, task: &'a TaskSpec) -> BackendFuture<'a, ()>;

    fn list_tasks<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, Vec<TaskInfo>>;

    fn node_counts<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, PoolNodeCounts>;
}
