use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::time::Instant;

use crate::batch::backend::{
    ContainerRegistry, ImageReference, MountSpec, PoolBackend, PoolInfo, PoolNodeCounts,
    PoolSpec, TaskInfo, TaskSpec, TaskState,
};
use crate::common::config::{
    ACCESS_KEY_ENV, FileShareConfig, HostOs, SimScaleConfig, WORKSPACE_ENV,
};
use crate::common::error::SimScaleError;
use crate::common::utils::str::pluralize;
use crate::planner::PoolPlan;

/// Delay between two task state checks while waiting for a job.
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Working directory of the simulator inside the container when none is given.
pub const DEFAULT_START_DIR: &str = "src";

const LINUX_MOUNT_PATH: &str = "azfiles";
const LINUX_MOUNT_OPTIONS: &str = "-o vers=3.0,dir_mode=0777,file_mode=0777,sec=ntlmssp";
const WINDOWS_MOUNT_PATH: &str = "S";
const WINDOWS_MOUNT_OPTIONS: &str = "-Persist";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    NoPool,
    PoolRequested,
    PoolReady,
    JobReady,
    TasksSubmitted,
    Completed,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolProvisioning {
    Created,
    Reused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolSelector {
    Named(String),
    All,
}

impl Display for PoolSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolSelector::Named(name) => f.write_str(name),
            PoolSelector::All => f.write_str("all pools"),
        }
    }
}

/// Everything the orchestrator needs to know about images, credentials and mounts.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub host_os: HostOs,
    pub container_image: String,
    pub registry: ContainerRegistry,
    pub node_image: ImageReference,
    pub node_agent_sku: String,
    pub fileshare: Option<FileShareConfig>,
    /// Environment variables passed to every task.
    pub environment: Vec<(String, String)>,
    pub task_stagger: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &SimScaleConfig) -> Self {
        let mut environment = vec![];
        if let Some(workspace) = &config.workspace.workspace_id {
            environment.push((WORKSPACE_ENV.to_string(), workspace.clone()));
        }
        if let Some(key) = &config.workspace.access_key {
            environment.push((ACCESS_KEY_ENV.to_string(), key.clone()));
        }
        let image = &config.pool.node_image;
        Self {
            host_os: config.container.platform,
            container_image: config.container.image_reference(),
            registry: ContainerRegistry {
                server: config.container.server.clone(),
                username: config.container.username.clone(),
                password: config.container.password.clone(),
            },
            node_image: ImageReference {
                publisher: image.publisher.clone(),
                offer: image.offer.clone(),
                sku: image.sku.clone(),
                version: image.version.clone(),
            },
            node_agent_sku: config.pool.node_agent_sku.clone(),
            fileshare: config.fileshare.clone(),
            environment,
            task_stagger: config.pool.task_stagger,
        }
    }
}

/// Default job id, `Job-<job name>-<local timestamp>`.
pub fn default_job_id(job_name: &str, now: DateTime<Local>) -> String {
    format!("Job-{job_name}-{}", now.format("%Y-%m-%d-%H-%M-%S"))
}

pub fn task_id(index: usize, job_name: &str) -> String {
    format!("job_number{index}_{job_name}")
}

pub fn container_run_options(host_os: HostOs, start_dir: &str, use_fileshare: bool) -> String {
    match host_os {
        HostOs::Linux => {
            let mut options = format!("--workdir /{start_dir}/");
            if use_fileshare {
                options.push_str(&format!(" --volume /azfileshare/:/{start_dir}/logs"));
            }
            options
        }
        HostOs::Windows => {
            let mut options = format!("-w C:\\{start_dir}\\");
            if use_fileshare {
                options.push_str(&format!(" --volume S:\\:C:\\{start_dir}\\logs"));
            }
            options
        }
    }
}

fn mount_spec(host_os: HostOs, fileshare: &FileShareConfig) -> MountSpec {
    let (relative_mount_path, mount_options) = match host_os {
        HostOs::Linux => (LINUX_MOUNT_PATH, LINUX_MOUNT_OPTIONS),
        HostOs::Windows => (WINDOWS_MOUNT_PATH, WINDOWS_MOUNT_OPTIONS),
    };
    MountSpec {
        account_name: fileshare.account_name.clone(),
        account_key: fileshare.account_key.clone(),
        url: fileshare.url.clone(),
        relative_mount_path: relative_mount_path.to_string(),
        mount_options: mount_options.to_string(),
    }
}

/// Drives one pool through creation, job setup, task submission and completion.
pub struct PoolOrchestrator {
    backend: Box<dyn PoolBackend>,
    settings: OrchestratorSettings,
    state: OrchestratorState,
    pool_id: Option<String>,
    job: Option<(String, String)>,
    use_fileshare: bool,
    submitted_tasks: HashSet<String>,
}

impl PoolOrchestrator {
    pub fn new(backend: Box<dyn PoolBackend>, settings: OrchestratorSettings) -> Self {
        Self {
            backend,
            settings,
            state: OrchestratorState::NoPool,
            pool_id: None,
            job: None,
            use_fileshare: false,
            submitted_tasks: Default::default(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn pool_id(&self) -> Option<&str> {
        self.pool_id.as_deref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|(id, _)| id.as_str())
    }

    fn track<T>(&mut self, result: crate::Result<T>) -> crate::Result<T> {
        if result.is_err() {
            self.state = OrchestratorState::Failed;
        }
        result
    }

    pub fn pool_spec(&self, pool_id: &str, plan: &PoolPlan, use_fileshare: bool) -> PoolSpec {
        let mount = if use_fileshare {
            self.settings
                .fileshare
                .as_ref()
                .map(|share| mount_spec(self.settings.host_os, share))
        } else {
            None
        };
        PoolSpec {
            id: pool_id.to_string(),
            vm_size: plan.vm_sku.clone(),
            tasks_per_node: plan.tasks_per_node,
            target_low_priority_nodes: plan.low_priority_nodes,
            target_dedicated_nodes: plan.dedicated_nodes,
            image: self.settings.node_image.clone(),
            node_agent_sku: self.settings.node_agent_sku.clone(),
            container_images: vec![self.settings.container_image.clone()],
            registry: self.settings.registry.clone(),
            mount,
        }
    }

    /// Creates the pool described by `plan`. With `skip_if_exists`, an existing pool with
    /// the same id is reused instead.
    pub async fn ensure_pool(
        &mut self,
        pool_id: &str,
        plan: &PoolPlan,
        skip_if_exists: bool,
        use_fileshare: bool,
    ) -> crate::Result<PoolProvisioning> {
        if pool_id.trim().is_empty() {
            return Err(SimScaleError::InvalidConfiguration(
                "Pool id must not be empty".to_string(),
            ));
        }
        if use_fileshare && self.settings.fileshare.is_none() {
            return Err(SimScaleError::InvalidConfiguration(
                "A file share was requested, but [fileshare] is not configured".to_string(),
            ));
        }

        let spec = self.pool_spec(pool_id, plan, use_fileshare);
        if let Some(mount) = &spec.mount {
            log::info!(
                "Using file share {} mounted at {}",
                mount.url,
                mount.relative_mount_path
            );
        }
        self.state = OrchestratorState::PoolRequested;

        let exists = if skip_if_exists {
            let exists = self.backend.pool_exists(pool_id).await;
            self.track(exists)?
        } else {
            false
        };
        let provisioning = if exists {
            log::warn!("Pool exists, re-using pool named {pool_id}");
            PoolProvisioning::Reused
        } else {
            log::warn!("Creating new pool named {pool_id}");
            let created = self.backend.create_pool(&spec).await;
            self.track(created)?;
            PoolProvisioning::Created
        };

        self.pool_id = Some(pool_id.to_string());
        self.use_fileshare = use_fileshare;
        self.state = OrchestratorState::PoolReady;
        Ok(provisioning)
    }

    /// Adds a job to the current pool. Without an explicit id, the id is derived from
    /// `job_name` and the current time.
    pub async fn ensure_job(
        &mut self,
        job_name: &str,
        job_id: Option<&str>,
    ) -> crate::Result<String> {
        let Some(pool_id) = self.pool_id.clone() else {
            return Err(SimScaleError::InvalidConfiguration(
                "Cannot add a job before a pool is ready".to_string(),
            ));
        };
        let job_id = match job_id {
            Some(id) => id.to_string(),
            None => default_job_id(job_name, Local::now()),
        };

        log::info!("Adding job {job_id} to pool {pool_id}");
        let created = self.backend.create_job(&job_id, &pool_id).await;
        self.track(created)?;

        self.job = Some((job_id.clone(), job_name.to_string()));
        self.submitted_tasks.clear();
        self.state = OrchestratorState::JobReady;
        Ok(job_id)
    }

    /// Submits one task per command, sleeping the configured stagger between submissions.
    pub async fn submit_tasks(
        &mut self,
        commands: &[String],
        start_dir: Option<&str>,
    ) -> crate::Result<Vec<String>> {
        let Some((job_id, job_name)) = self.job.clone() else {
            return Err(SimScaleError::InvalidConfiguration(
                "Cannot submit tasks before a job is ready".to_string(),
            ));
        };
        let start_dir = start_dir.unwrap_or(DEFAULT_START_DIR);
        let run_options =
            container_run_options(self.settings.host_os, start_dir, self.use_fileshare);
        log::debug!("Container run options: {run_options}");

        let task_ids: Vec<String> = (0..commands.len())
            .map(|index| task_id(index, &job_name))
            .collect();
        let mut seen = HashSet::new();
        for id in &task_ids {
            if self.submitted_tasks.contains(id) || !seen.insert(id) {
                return Err(SimScaleError::InvalidConfiguration(format!(
                    "Task {id} already exists in job {job_id}"
                )));
            }
        }

        let stagger = self.settings.task_stagger;
        for (index, (id, command)) in task_ids.iter().zip(commands).enumerate() {
            if index > 0 && !stagger.is_zero() {
                log::debug!(
                    "Staggering {} between tasks",
                    humantime::format_duration(stagger)
                );
                tokio::time::sleep(stagger).await;
            }
            let task = TaskSpec {
                id: id.clone(),
                command_line: command.clone(),
                image: self.settings.container_image.clone(),
                container_run_options: run_options.clone(),
                environment: self.settings.environment.clone(),
                run_elevated: true,
            };
            log::debug!("Submitting task {id} to job {job_id} with command {command}");
            let added = self.backend.add_task(&job_id, &task).await;
            self.track(added)?;
            self.submitted_tasks.insert(id.clone());
        }

        log::info!(
            "Submitted {} {} to job {job_id}",
            task_ids.len(),
            pluralize("task", task_ids.len())
        );
        self.state = OrchestratorState::TasksSubmitted;
        Ok(task_ids)
    }

    /// Polls the tasks of `job_id` every second until all of them are completed.
    pub async fn wait_for_completion(
        &mut self,
        job_id: &str,
        timeout: Duration,
    ) -> crate::Result<Vec<TaskInfo>> {
        log::info!(
            "Monitoring all tasks for completion, timeout in {}",
            humantime::format_duration(timeout)
        );
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let tasks = self.backend.list_tasks(job_id).await;
            let tasks = self.track(tasks)?;
            let incomplete = tasks
                .iter()
                .filter(|task| task.state != TaskState::Completed)
                .count();
            if incomplete == 0 {
                log::info!("All tasks of job {job_id} reached the completed state");
                self.state = OrchestratorState::Completed;
                return Ok(tasks);
            }
            log::debug!(
                "{incomplete} {} of job {job_id} not completed yet",
                pluralize("task", incomplete)
            );
            tokio::time::sleep(COMPLETION_POLL_INTERVAL).await;
        }
        self.state = OrchestratorState::Failed;
        Err(SimScaleError::Timeout(format!(
            "Tasks of job {job_id} did not complete within {}",
            humantime::format_duration(timeout)
        )))
    }

    /// Deletes the selected pools and returns the ids that were deleted.
    ///
    /// Deleting all pools is best effort: failures are logged and the remaining pools
    /// are still deleted.
    pub async fn delete_pool(&mut self, selector: &PoolSelector) -> crate::Result<Vec<String>> {
        match selector {
            PoolSelector::Named(pool_id) => {
                log::info!("Deleting pool: {pool_id}");
                match self.backend.delete_pool(pool_id).await {
                    Ok(()) => {
                        self.forget_pool(pool_id);
                        Ok(vec![pool_id.clone()])
                    }
                    Err(SimScaleError::NotFound(_)) => {
                        log::warn!("Pool {pool_id} does not exist");
                        Ok(vec![])
                    }
                    Err(error) => Err(error),
                }
            }
            PoolSelector::All => {
                log::warn!("Deleting all pools!");
                let pools = self.backend.list_pools().await?;
                let mut deleted = Vec::with_capacity(pools.len());
                for pool in pools {
                    log::info!("Deleting pool: {}", pool.id);
                    match self.backend.delete_pool(&pool.id).await {
                        Ok(()) => deleted.push(pool.id),
                        Err(error) => log::warn!("Cannot delete pool {}: {error}", pool.id),
                    }
                }
                for pool_id in &deleted {
                    self.forget_pool(pool_id);
                }
                Ok(deleted)
            }
        }
    }

    fn forget_pool(&mut self, pool_id: &str) {
        if self.pool_id.as_deref() == Some(pool_id) {
            self.pool_id = None;
            self.job = None;
            self.state = OrchestratorState::NoPool;
        }
    }

    /// A job that no longer exists counts as deleted.
    pub async fn delete_job(&mut self, job_id: &str) -> crate::Result<()> {
        log::info!("Deleting job: {job_id}");
        match self.backend.delete_job(job_id).await {
            Ok(()) => {}
            Err(SimScaleError::NotFound(_)) => {
                log::warn!("Job {job_id} does not exist, it was already deleted");
            }
            Err(error) => return Err(error),
        }
        if self.job_id() == Some(job_id) {
            self.job = None;
        }
        Ok(())
    }

    /// Deletes every job of the account, stopping all of their tasks. Jobs that
    /// disappear in the meantime count as deleted.
    pub async fn delete_all_jobs(&mut self) -> crate::Result<usize> {
        let jobs = self.backend.list_jobs().await?;
        let mut failures = vec![];
        for job_id in &jobs {
            match self.backend.delete_job(job_id).await {
                Ok(()) => log::info!("Deleted job {job_id}"),
                Err(SimScaleError::NotFound(_)) => log::debug!("Job {job_id} is already gone"),
                Err(error) => {
                    log::warn!("Cannot delete job {job_id}: {error}");
                    failures.push(job_id.clone());
                }
            }
        }
        self.job = None;
        if failures.is_empty() {
            Ok(jobs.len())
        } else {
            Err(SimScaleError::BackendError(format!(
                "Cannot delete {} {}: {}",
                failures.len(),
                pluralize("job", failures.len()),
                failures.join(", ")
            )))
        }
    }

    pub async fn resize_pool(
        &mut self,
        pool_id: &str,
        dedicated_nodes: u32,
        low_priority_nodes: u32,
    ) -> crate::Result<()> {
        log::info!(
            "Resizing pool {pool_id} to {low_priority_nodes} low priority nodes and {dedicated_nodes} dedicated nodes"
        );
        self.backend
            .resize_pool(pool_id, dedicated_nodes, low_priority_nodes)
            .await
    }

    pub async fn pool_node_counts(&self, pool_id: &str) -> crate::Result<PoolNodeCounts> {
        self.backend.node_counts(pool_id).await
    }

    pub async fn list_pools(&self) -> crate::Result<Vec<PoolInfo>> {
        self.backend.list_pools().await
    }

    pub async fn list_tasks(&self, job_id: &str) -> crate::Result<Vec<TaskInfo>> {
        self.backend.list_tasks(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{Local, TimeZone};

    use crate::batch::backend::TaskState;
    use crate::batch::orchestrator::{
        OrchestratorState, PoolOrchestrator, PoolProvisioning, PoolSelector,
        container_run_options, default_job_id, task_id,
    };
    use crate::common::config::HostOs;
    use crate::common::error::SimScaleError;
    use crate::tests::utils::{
        FakeBackend, PlanBuilder, SettingsBuilder, fake_pool, run_test,
    };

    fn create_orchestrator(backend: &FakeBackend) -> PoolOrchestrator {
        PoolOrchestrator::new(backend.boxed(), SettingsBuilder::default().build())
    }

    fn commands(count: usize) -> Vec<String> {
        vec!["python main.py".to_string(); count]
    }

    async fn ready_job(backend: &FakeBackend) -> PoolOrchestrator {
        let mut orchestrator = create_orchestrator(backend);
        orchestrator
            .ensure_pool("cartpolepool3", &PlanBuilder::default().build(), true, false)
            .await
            .unwrap();
        orchestrator
            .ensure_job("cartpolejob10", Some("job-1"))
            .await
            .unwrap();
        orchestrator
    }

    #[test]
    fn run_options_linux() {
        assert_eq!(
            container_run_options(HostOs::Linux, "src", false),
            "--workdir /src/"
        );
        assert_eq!(
            container_run_options(HostOs::Linux, "app", true),
            "--workdir /app/ --volume /azfileshare/:/app/logs"
        );
    }

    #[test]
    fn run_options_windows() {
        assert_eq!(
            container_run_options(HostOs::Windows, "src", false),
            "-w C:\\src\\"
        );
        assert_eq!(
            container_run_options(HostOs::Windows, "src", true),
            "-w C:\\src\\ --volume S:\\:C:\\src\\logs"
        );
    }

    #[test]
    fn job_and_task_ids() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(
            default_job_id("cartpolejob10", now),
            "Job-cartpolejob10-2024-03-05-07-08-09"
        );
        assert_eq!(task_id(3, "cartpolejob10"), "job_number3_cartpolejob10");
    }

    #[tokio::test]
    async fn create_pool_when_missing() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = create_orchestrator(&backend);
            let plan = PlanBuilder::default().build();
            let result = orchestrator
                .ensure_pool("cartpolepool3", &plan, true, false)
                .await
                .unwrap();
            assert_eq!(result, PoolProvisioning::Created);
            assert_eq!(orchestrator.state(), OrchestratorState::PoolReady);

            let state = backend.state();
            assert_eq!(state.created_pools.len(), 1);
            let spec = &state.created_pools[0];
            assert_eq!(spec.id, "cartpolepool3");
            assert_eq!(spec.vm_size, plan.vm_sku);
            assert_eq!(spec.tasks_per_node, plan.tasks_per_node);
            assert_eq!(spec.target_low_priority_nodes, plan.low_priority_nodes);
            assert_eq!(spec.target_dedicated_nodes, plan.dedicated_nodes);
            assert!(spec.mount.is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn skip_existing_pool() {
        run_test(async {
            let backend = FakeBackend::default();
            let plan = PlanBuilder::default().build();
            let mut orchestrator = create_orchestrator(&backend);
            orchestrator
                .ensure_pool("cartpolepool3", &plan, true, false)
                .await
                .unwrap();
            let mut orchestrator = create_orchestrator(&backend);
            let result = orchestrator
                .ensure_pool("cartpolepool3", &plan, true, false)
                .await
                .unwrap();
            assert_eq!(result, PoolProvisioning::Reused);
            assert_eq!(backend.state().created_pools.len(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn create_existing_pool_without_skip_fails() {
        run_test(async {
            let backend = FakeBackend::default();
            backend.add_pool(fake_pool("cartpolepool3"));
            let mut orchestrator = create_orchestrator(&backend);
            let result = orchestrator
                .ensure_pool(
                    "cartpolepool3",
                    &PlanBuilder::default().build(),
                    false,
                    false,
                )
                .await;
            assert!(matches!(result, Err(SimScaleError::BackendError(_))));
            assert_eq!(orchestrator.state(), OrchestratorState::Failed);
        })
        .await;
    }

    #[tokio::test]
    async fn pool_with_fileshare_mount() {
        run_test(async {
            let backend = FakeBackend::default();
            let settings = SettingsBuilder::default()
                .with_fileshare(true)
                .build();
            let mut orchestrator = PoolOrchestrator::new(backend.boxed(), settings);
            orchestrator
                .ensure_pool(
                    "cartpolepool3",
                    &PlanBuilder::default().build(),
                    true,
                    true,
                )
                .await
                .unwrap();
            let state = backend.state();
            let mount = state.created_pools[0].mount.as_ref().unwrap();
            assert_eq!(mount.relative_mount_path, "azfiles");
            assert_eq!(
                mount.mount_options,
                "-o vers=3.0,dir_mode=0777,file_mode=0777,sec=ntlmssp"
            );
        })
        .await;
    }

    #[tokio::test]
    async fn windows_pool_with_fileshare_mount() {
        run_test(async {
            let backend = FakeBackend::default();
            let settings = SettingsBuilder::default()
                .host_os(HostOs::Windows)
                .with_fileshare(true)
                .build();
            let mut orchestrator = PoolOrchestrator::new(backend.boxed(), settings);
            orchestrator
                .ensure_pool("winpool", &PlanBuilder::default().build(), true, true)
                .await
                .unwrap();
            let state = backend.state();
            let mount = state.created_pools[0].mount.as_ref().unwrap();
            assert_eq!(mount.relative_mount_path, "S");
            assert_eq!(mount.mount_options, "-Persist");
        })
        .await;
    }

    #[tokio::test]
    async fn fileshare_without_config() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = create_orchestrator(&backend);
            let result = orchestrator
                .ensure_pool(
                    "cartpolepool3",
                    &PlanBuilder::default().build(),
                    true,
                    true,
                )
                .await;
            assert!(matches!(
                result,
                Err(SimScaleError::InvalidConfiguration(_))
            ));
            assert!(backend.state().created_pools.is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn job_requires_pool() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = create_orchestrator(&backend);
            let result = orchestrator.ensure_job("job", None).await;
            assert!(matches!(
                result,
                Err(SimScaleError::InvalidConfiguration(_))
            ));
        })
        .await;
    }

    #[tokio::test]
    async fn default_job_id_is_generated() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = create_orchestrator(&backend);
            orchestrator
                .ensure_pool("pool", &PlanBuilder::default().build(), true, false)
                .await
                .unwrap();
            let job_id = orchestrator.ensure_job("cartpolejob10", None).await.unwrap();
            assert!(job_id.starts_with("Job-cartpolejob10-"));
            assert_eq!(orchestrator.job_id(), Some(job_id.as_str()));
            assert_eq!(
                backend.state().jobs.get(&job_id).map(|s| s.as_str()),
                Some("pool")
            );
        })
        .await;
    }

    #[tokio::test]
    async fn submit_tasks_with_settings() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = ready_job(&backend).await;
            let ids = orchestrator.submit_tasks(&commands(3), None).await.unwrap();
            assert_eq!(
                ids,
                vec![
                    "job_number0_cartpolejob10",
                    "job_number1_cartpolejob10",
                    "job_number2_cartpolejob10"
                ]
            );
            assert_eq!(orchestrator.state(), OrchestratorState::TasksSubmitted);

            let state = backend.state();
            assert_eq!(state.tasks.len(), 3);
            let (job_id, task) = &state.tasks[0];
            assert_eq!(job_id, "job-1");
            assert_eq!(task.command_line, "python main.py");
            assert_eq!(task.container_run_options, "--workdir /src/");
            assert_eq!(task.image, "simregistry.azurecr.io/cartpole:latest");
            assert!(task.run_elevated);
            assert_eq!(
                task.environment,
                vec![
                    ("SIM_WORKSPACE".to_string(), "ws-1".to_string()),
                    ("SIM_ACCESS_KEY".to_string(), "key-1".to_string())
                ]
            );
        })
        .await;
    }

    #[tokio::test]
    async fn submit_tasks_custom_start_dir() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = ready_job(&backend).await;
            orchestrator
                .submit_tasks(&commands(1), Some("bonsai"))
                .await
                .unwrap();
            assert_eq!(
                backend.state().tasks[0].1.container_run_options,
                "--workdir /bonsai/"
            );
        })
        .await;
    }

    #[tokio::test]
    async fn submit_duplicate_tasks_rejected_locally() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = ready_job(&backend).await;
            orchestrator.submit_tasks(&commands(2), None).await.unwrap();
            let result = orchestrator.submit_tasks(&commands(1), None).await;
            assert!(matches!(
                result,
                Err(SimScaleError::InvalidConfiguration(_))
            ));
            assert_eq!(backend.state().tasks.len(), 2);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn submit_tasks_staggered() {
        run_test(async {
            let backend = FakeBackend::default();
            let settings = SettingsBuilder::default()
                .task_stagger(Duration::from_secs(5))
                .build();
            let mut orchestrator = PoolOrchestrator::new(backend.boxed(), settings);
            orchestrator
                .ensure_pool("pool", &PlanBuilder::default().build(), true, false)
                .await
                .unwrap();
            orchestrator.ensure_job("job", Some("job-1")).await.unwrap();

            let start = tokio::time::Instant::now();
            orchestrator.submit_tasks(&commands(3), None).await.unwrap();
            assert_eq!(start.elapsed(), Duration::from_secs(10));
        })
        .await;
    }

    #[tokio::test]
    async fn submit_failure_moves_to_failed() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = ready_job(&backend).await;
            backend.state_mut().fail_add_task = true;
            let result = orchestrator.submit_tasks(&commands(1), None).await;
            assert!(matches!(result, Err(SimScaleError::BackendError(_))));
            assert_eq!(orchestrator.state(), OrchestratorState::Failed);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_completed_tasks() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = ready_job(&backend).await;
            orchestrator.submit_tasks(&commands(2), None).await.unwrap();
            backend.state_mut().completed_after_polls = Some(3);

            let start = tokio::time::Instant::now();
            let tasks = orchestrator
                .wait_for_completion("job-1", Duration::from_secs(60))
                .await
                .unwrap();
            assert_eq!(tasks.len(), 2);
            assert!(tasks.iter().all(|t| t.state == TaskState::Completed));
            assert_eq!(backend.state().task_polls, 3);
            assert_eq!(start.elapsed(), Duration::from_secs(2));
            assert_eq!(orchestrator.state(), OrchestratorState::Completed);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_completion_timeout() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = ready_job(&backend).await;
            orchestrator.submit_tasks(&commands(1), None).await.unwrap();

            let result = orchestrator
                .wait_for_completion("job-1", Duration::from_secs(2))
                .await;
            assert!(matches!(result, Err(SimScaleError::Timeout(_))));
            assert_eq!(backend.state().task_polls, 2);
            assert_eq!(orchestrator.state(), OrchestratorState::Failed);
        })
        .await;
    }

    #[tokio::test]
    async fn delete_all_pools() {
        run_test(async {
            let backend = FakeBackend::default();
            for name in ["a", "b", "c"] {
                backend.add_pool(fake_pool(name));
            }
            let mut orchestrator = create_orchestrator(&backend);
            let deleted = orchestrator.delete_pool(&PoolSelector::All).await.unwrap();
            assert_eq!(deleted, vec!["a", "b", "c"]);
            assert_eq!(backend.state().deleted_pools, vec!["a", "b", "c"]);
            assert!(backend.state().pools.is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn delete_all_pools_without_pools() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = create_orchestrator(&backend);
            let deleted = orchestrator.delete_pool(&PoolSelector::All).await.unwrap();
            assert!(deleted.is_empty());
            assert!(backend.state().deleted_pools.is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn delete_all_pools_continues_after_failure() {
        run_test(async {
            let backend = FakeBackend::default();
            for name in ["a", "b"] {
                backend.add_pool(fake_pool(name));
            }
            backend.state_mut().fail_delete_pool = Some("a".to_string());
            let mut orchestrator = create_orchestrator(&backend);
            let deleted = orchestrator.delete_pool(&PoolSelector::All).await.unwrap();
            assert_eq!(deleted, vec!["b"]);
        })
        .await;
    }

    #[tokio::test]
    async fn delete_named_pool() {
        run_test(async {
            let backend = FakeBackend::default();
            backend.add_pool(fake_pool("a"));
            backend.add_pool(fake_pool("b"));
            let mut orchestrator = create_orchestrator(&backend);
            let deleted = orchestrator
                .delete_pool(&PoolSelector::Named("b".to_string()))
                .await
                .unwrap();
            assert_eq!(deleted, vec!["b"]);
            assert_eq!(backend.state().pools.len(), 1);

            let deleted = orchestrator
                .delete_pool(&PoolSelector::Named("missing".to_string()))
                .await
                .unwrap();
            assert!(deleted.is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn delete_all_jobs_ignores_missing_jobs() {
        run_test(async {
            let backend = FakeBackend::default();
            {
                let mut state = backend.state_mut();
                for job in ["j1", "j2", "j3"] {
                    state.jobs.insert(job.to_string(), "pool".to_string());
                }
                state.vanished_jobs.insert("j2".to_string());
            }
            let mut orchestrator = create_orchestrator(&backend);
            assert_eq!(orchestrator.delete_all_jobs().await.unwrap(), 3);
            assert!(backend.state().jobs.is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn delete_single_job() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = ready_job(&backend).await;
            orchestrator.delete_job("job-1").await.unwrap();
            assert_eq!(orchestrator.job_id(), None);
            orchestrator.delete_job("job-1").await.unwrap();
        })
        .await;
    }

    #[tokio::test]
    async fn delete_missing_job_succeeds() {
        run_test(async {
            let backend = FakeBackend::default();
            let mut orchestrator = create_orchestrator(&backend);
            orchestrator.delete_job("already-gone").await.unwrap();
            assert_eq!(orchestrator.state(), OrchestratorState::NoPool);
        })
        .await;
    }

    #[tokio::test]
    async fn resize_and_count_nodes() {
        run_test(async {
            let backend = FakeBackend::default();
            backend.add_pool(fake_pool("a"));
            let mut orchestrator = create_orchestrator(&backend);
            orchestrator.resize_pool("a", 2, 5).await.unwrap();
            let counts = orchestrator.pool_node_counts("a").await.unwrap();
            assert_eq!(counts.pool_id, "a");
            assert_eq!(counts.dedicated.total, 2);
            assert_eq!(counts.low_priority.total, 5);
        })
        .await;
    }

    #[tokio::test]
    async fn node_counts_of_unknown_pool() {
        run_test(async {
            let backend = FakeBackend::default();
            let orchestrator = create_orchestrator(&backend);
            assert!(matches!(
                orchestrator.pool_node_counts("missing").await,
                Err(SimScaleError::NotFound(_))
            ));
        })
        .await;
    }
}
