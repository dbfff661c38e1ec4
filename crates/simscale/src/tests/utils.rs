use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use derive_builder::Builder;
use log::LevelFilter;

use crate::WrappedRcRefCell;
use crate::batch::backend::{
    BackendFuture, ContainerRegistry, ImageReference, NodeStateCounts, PoolBackend, PoolInfo,
    PoolNodeCounts, PoolSpec, TaskInfo, TaskSpec, TaskState,
};
use crate::batch::orchestrator::OrchestratorSettings;
use crate::common::config::{
    ACCESS_KEY_ENV, FileShareConfig, HostOs, NodeImageConfig, WORKSPACE_ENV,
};
use crate::common::error::SimScaleError;
use crate::planner::{PoolPlan, SkuSource};
use crate::pricing::{PriceFuture, PriceLookup, PricePoint, PriceQuery, PriorityClass};
use crate::reconnect::{
    BindTarget, ConnectTarget, RegistryFuture, SessionRegistry, SimulatorSession,
};

pub const MINIMAL_CONFIG: &str = r#"
[batch]
account_name = "simbatch"
account_url = "https://simbatch.westus2.batch.azure.com"
location = "westus2"

[container]
server = "simregistry.azurecr.io"
image_name = "cartpole"
"#;

pub async fn run_test<F: Future<Output = ()>>(f: F) {
    let _ = env_logger::Builder::default()
        .filter(None, LevelFilter::Debug)
        .is_test(true)
        .try_init();
    f.await;
}

pub fn session(session_id: &str, action: &str) -> SimulatorSession {
    SimulatorSession {
        session_id: session_id.to_string(),
        action: action.to_string(),
    }
}

pub fn fake_pool(id: &str) -> PoolInfo {
    PoolInfo {
        id: id.to_string(),
        vm_size: Some("standard_e2s_v3".to_string()),
        state: Some("active".to_string()),
        allocation_state: Some("steady".to_string()),
        current_dedicated_nodes: 0,
        current_low_priority_nodes: 0,
    }
}

pub fn fake_pool_spec(id: &str) -> PoolSpec {
    let image = NodeImageConfig::default();
    PoolSpec {
        id: id.to_string(),
        vm_size: "Standard_E2s_v3".to_string(),
        tasks_per_node: 4,
        target_low_priority_nodes: 2,
        target_dedicated_nodes: 1,
        image: ImageReference {
            publisher: image.publisher,
            offer: image.offer,
            sku: image.sku,
            version: image.version,
        },
        node_agent_sku: "batch.node.ubuntu 20.04".to_string(),
        container_images: vec!["simregistry.azurecr.io/cartpole:latest".to_string()],
        registry: ContainerRegistry {
            server: "simregistry.azurecr.io".to_string(),
            username: None,
            password: None,
        },
        mount: None,
    }
}

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(name = "finish"))]
pub struct Plan {
    #[builder(default = "12")]
    requested_tasks: u32,
    #[builder(default = "2")]
    low_priority_nodes: u32,
    #[builder(default = "1")]
    dedicated_nodes: u32,
    #[builder(default = "4")]
    tasks_per_node: u32,
    #[builder(default = "\"Standard_E2s_v3\".to_string()")]
    vm_sku: String,
}

impl PlanBuilder {
    pub fn build(self) -> PoolPlan {
        let Plan {
            requested_tasks,
            low_priority_nodes,
            dedicated_nodes,
            tasks_per_node,
            vm_sku,
        } = self.finish().unwrap();
        PoolPlan {
            requested_tasks,
            low_priority_nodes,
            dedicated_nodes,
            tasks_per_node,
            vm_sku,
            sku_source: SkuSource::AutoSelected,
        }
    }
}

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(name = "finish"))]
pub struct Settings {
    #[builder(default)]
    host_os: HostOs,
    #[builder(default)]
    with_fileshare: bool,
    #[builder(default = "Duration::ZERO")]
    task_stagger: Duration,
}

impl SettingsBuilder {
    pub fn build(self) -> OrchestratorSettings {
        let Settings {
            host_os,
            with_fileshare,
            task_stagger,
        } = self.finish().unwrap();
        let fileshare = with_fileshare.then(|| FileShareConfig {
            account_name: "simfiles".to_string(),
            account_key: "secret".to_string(),
            url: "https://simfiles.file.core.windows.net/logs".to_string(),
        });
        let image = fake_pool_spec("pool");
        OrchestratorSettings {
            host_os,
            container_image: "simregistry.azurecr.io/cartpole:latest".to_string(),
            registry: image.registry,
            node_image: image.image,
            node_agent_sku: image.node_agent_sku,
            fileshare,
            environment: vec![
                (WORKSPACE_ENV.to_string(), "ws-1".to_string()),
                (ACCESS_KEY_ENV.to_string(), "key-1".to_string()),
            ],
            task_stagger,
        }
    }
}

#[derive(Default)]
pub struct BackendState {
    pub pools: Vec<PoolInfo>,
    pub created_pools: Vec<PoolSpec>,
    pub deleted_pools: Vec<String>,
    /// Job id to pool id.
    pub jobs: BTreeMap<String, String>,
    /// Jobs removed by someone else right before they are deleted.
    pub vanished_jobs: BTreeSet<String>,
    pub tasks: Vec<(String, TaskSpec)>,
    pub task_polls: usize,
    /// Tasks report completion starting with this task listing.
    pub completed_after_polls: Option<usize>,
    pub fail_add_task: bool,
    pub fail_delete_pool: Option<String>,
}

/// In-memory pool backend.
#[derive(Default, Clone)]
pub struct FakeBackend(WrappedRcRefCell<BackendState>);

impl FakeBackend {
    pub fn boxed(&self) -> Box<dyn PoolBackend> {
        Box::new(self.clone())
    }

    pub fn state(&self) -> std::cell::Ref<'_, BackendState> {
        self.0.get()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, BackendState> {
        self.0.get_mut()
    }

    pub fn add_pool(&self, pool: PoolInfo) {
        self.state_mut().pools.push(pool);
    }
}

fn missing_pool(pool_id: &str) -> SimScaleError {
    SimScaleError::NotFound(format!("Pool {pool_id} does not exist"))
}

impl PoolBackend for FakeBackend {
    fn pool_exists<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move { Ok(self.state().pools.iter().any(|p| p.id == pool_id)) })
    }

    fn create_pool<'a>(&'a self, spec: &'a PoolSpec) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state_mut();
            if state.pools.iter().any(|p| p.id == spec.id) {
                return Err(SimScaleError::BackendError(format!(
                    "Pool {} already exists",
                    spec.id
                )));
            }
            let mut pool = fake_pool(&spec.id);
            pool.vm_size = Some(spec.vm_size.to_lowercase());
            state.pools.push(pool);
            state.created_pools.push(spec.clone());
            Ok(())
        })
    }

    fn resize_pool<'a>(
        &'a self,
        pool_id: &'a str,
        dedicated_nodes: u32,
        low_priority_nodes: u32,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state_mut();
            let pool = state
                .pools
                .iter_mut()
                .find(|p| p.id == pool_id)
                .ok_or_else(|| missing_pool(pool_id))?;
            pool.current_dedicated_nodes = dedicated_nodes;
            pool.current_low_priority_nodes = low_priority_nodes;
            Ok(())
        })
    }

    fn delete_pool<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state_mut();
            if state.fail_delete_pool.as_deref() == Some(pool_id) {
                return Err(SimScaleError::BackendError(format!(
                    "Pool {pool_id} is being resized"
                )));
            }
            let count = state.pools.len();
            state.pools.retain(|p| p.id != pool_id);
            if state.pools.len() == count {
                return Err(missing_pool(pool_id));
            }
            state.deleted_pools.push(pool_id.to_string());
            Ok(())
        })
    }

    fn list_pools(&self) -> BackendFuture<'_, Vec<PoolInfo>> {
        Box::pin(async move { Ok(self.state().pools.clone()) })
    }

    fn create_job<'a>(&'a self, job_id: &'a str, pool_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state_mut();
            if state.jobs.contains_key(job_id) {
                return Err(SimScaleError::BackendError(format!(
                    "Job {job_id} already exists"
                )));
            }
            state.jobs.insert(job_id.to_string(), pool_id.to_string());
            Ok(())
        })
    }

    fn delete_job<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state_mut();
            let existed = state.jobs.remove(job_id).is_some();
            if !existed || state.vanished_jobs.contains(job_id) {
                return Err(SimScaleError::NotFound(format!(
                    "Job {job_id} does not exist"
                )));
            }
            Ok(())
        })
    }

    fn list_jobs(&self) -> BackendFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.state().jobs.keys().cloned().collect()) })
    }

    fn add_task<'a>(&'a self, job_id: &'a str, task: &'a TaskSpec) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state_mut();
            if state.fail_add_task {
                return Err(SimScaleError::BackendError(
                    "Task submission rejected".to_string(),
                ));
            }
            state.tasks.push((job_id.to_string(), task.clone()));
            Ok(())
        })
    }

    fn list_tasks<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, Vec<TaskInfo>> {
        Box::pin(async move {
            let mut state = self.state_mut();
            state.task_polls += 1;
            let polls = state.task_polls;
            let task_state = match state.completed_after_polls {
                Some(limit) if polls >= limit => TaskState::Completed,
                _ => TaskState::Active,
            };
            Ok(state
                .tasks
                .iter()
                .filter(|(job, _)| job == job_id)
                .map(|(_, task)| TaskInfo {
                    id: task.id.clone(),
                    state: task_state,
                })
                .collect())
        })
    }

    fn node_counts<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, PoolNodeCounts> {
        Box::pin(async move {
            let state = self.state();
            let pool = state
                .pools
                .iter()
                .find(|p| p.id == pool_id)
                .ok_or_else(|| missing_pool(pool_id))?;
            Ok(PoolNodeCounts {
                pool_id: pool_id.to_string(),
                dedicated: NodeStateCounts {
                    total: pool.current_dedicated_nodes,
                    ..Default::default()
                },
                low_priority: NodeStateCounts {
                    total: pool.current_low_priority_nodes,
                    ..Default::default()
                },
            })
        })
    }
}

/// Price source answering from a fixed price list.
#[derive(Default)]
pub struct FakePrices {
    prices: HashMap<(String, PriorityClass), f64>,
    lookups: WrappedRcRefCell<Vec<PriceQuery>>,
}

impl FakePrices {
    pub fn with_price(mut self, vm_sku: &str, priority: PriorityClass, price: f64) -> Self {
        self.prices.insert((vm_sku.to_string(), priority), price);
        self
    }

    pub fn lookups(&self) -> Vec<PriceQuery> {
        self.lookups.get().clone()
    }
}

impl PriceLookup for FakePrices {
    fn lookup(&self, query: PriceQuery) -> PriceFuture<'_> {
        Box::pin(async move {
            self.lookups.get_mut().push(query.clone());
            match self.prices.get(&(query.vm_sku.clone(), query.priority)) {
                Some(price) => Ok(PricePoint::new(query, *price)),
                None => Err(SimScaleError::NotFound(format!(
                    "No price for {} ({})",
                    query.vm_sku, query.priority
                ))),
            }
        })
    }
}

#[derive(Default)]
pub struct RegistryState {
    pub sessions: Vec<SimulatorSession>,
    pub listings: usize,
    /// Number of upcoming listings that time out.
    pub listing_timeouts: usize,
    /// Number of upcoming listings that return unreadable output.
    pub malformed_listings: usize,
    /// Number of upcoming connect calls that time out.
    pub connect_timeouts: usize,
    /// Sessions the registry reports as invalid when connecting.
    pub invalid_sessions: BTreeSet<String>,
    /// Every session connect call, including failed ones.
    pub connect_attempts: Vec<String>,
    pub connected: Vec<String>,
    pub simulator_connects: Vec<String>,
    pub logging_started: Vec<String>,
}

/// In-memory session registry. Connected sessions switch to the bound action.
#[derive(Default, Clone)]
pub struct FakeRegistry(WrappedRcRefCell<RegistryState>);

impl FakeRegistry {
    pub fn boxed(&self) -> Box<dyn SessionRegistry> {
        Box::new(self.clone())
    }

    pub fn state(&self) -> std::cell::Ref<'_, RegistryState> {
        self.0.get()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, RegistryState> {
        self.0.get_mut()
    }
}

fn take_failure(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter = counter.saturating_sub(1);
        true
    } else {
        false
    }
}

impl SessionRegistry for FakeRegistry {
    fn list_sessions<'a>(
        &'a self,
        _simulator_name: &'a str,
    ) -> RegistryFuture<'a, Vec<SimulatorSession>> {
        Box::pin(async move {
            let mut state = self.state_mut();
            state.listings += 1;
            if take_failure(&mut state.listing_timeouts) {
                return Err(SimScaleError::Timeout(
                    "bonsai did not finish in 15m".to_string(),
                ));
            }
            if take_failure(&mut state.malformed_listings) {
                return Err(SimScaleError::DeserializationError(
                    "Cannot parse simulator list".to_string(),
                ));
            }
            Ok(state.sessions.clone())
        })
    }

    fn connect_session<'a>(
        &'a self,
        target: &'a ConnectTarget,
        bind: &'a BindTarget,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state_mut();
            if let ConnectTarget::Session(session_id) = target {
                state.connect_attempts.push(session_id.clone());
            }
            if take_failure(&mut state.connect_timeouts) {
                return Err(SimScaleError::Timeout(
                    "bonsai did not finish in 15m".to_string(),
                ));
            }
            match target {
                ConnectTarget::Session(session_id) => {
                    if state.invalid_sessions.contains(session_id) {
                        return Err(SimScaleError::InvalidSession(session_id.clone()));
                    }
                    for session in state.sessions.iter_mut() {
                        if &session.session_id == session_id {
                            session.action = bind.action.clone();
                        }
                    }
                    state.connected.push(session_id.clone());
                }
                ConnectTarget::Simulator(name) => state.simulator_connects.push(name.clone()),
            }
            Ok(())
        })
    }

    fn start_logging<'a>(
        &'a self,
        session_id: &'a str,
        _bind: &'a BindTarget,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            self.state_mut().logging_started.push(session_id.to_string());
            Ok(())
        })
    }
}
