use std::io::Write;
use std::process::Output;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tempfile::NamedTempFile;

use crate::batch::backend::{
    BackendFuture, PoolBackend, PoolInfo, PoolNodeCounts, PoolSpec, TaskInfo, TaskSpec, TaskState,
};
use crate::common::command::{
    check_command_output, execute_command_with_env, stderr_lossy, stdout_as_str,
};
use crate::common::config::BatchAccountConfig;
use crate::common::error::SimScaleError;

/// Environment variable read by the Azure CLI for the shared key of the batch account.
const ACCESS_KEY_ENV: &str = "AZURE_BATCH_ACCESS_KEY";

/// Pool backend that drives the batch service through the `az batch` command line.
///
/// Request bodies are written as JSON parameter files into temporary files, responses
/// are read as JSON from stdout.
pub struct AzBatchCli {
    cli_path: String,
    account_name: String,
    account_url: String,
    account_key: Option<String>,
    timeout: Duration,
}

impl AzBatchCli {
    pub fn new(config: &BatchAccountConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            account_name: config.account_name.clone(),
            account_url: config.account_url.clone(),
            account_key: config.account_key.clone(),
            timeout: config.command_timeout,
        }
    }

    fn arguments(&self, command: &[&str]) -> Vec<String> {
        let mut arguments = vec![self.cli_path.clone(), "batch".to_string()];
        arguments.extend(command.iter().map(|arg| arg.to_string()));
        arguments.extend([
            "--account-name".to_string(),
            self.account_name.clone(),
            "--account-endpoint".to_string(),
            self.account_url.clone(),
        ]);
        arguments
    }

    async fn run(&self, command: &[&str]) -> crate::Result<String> {
        let arguments = self.arguments(command);
        let env: Vec<(&str, &str)> = self
            .account_key
            .as_deref()
            .map(|key| (ACCESS_KEY_ENV, key))
            .into_iter()
            .collect();
        let output = execute_command_with_env(&arguments, &env, self.timeout).await?;
        let action = command
            .iter()
            .take_while(|arg| !arg.starts_with("--"))
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if output.status.success() {
            Ok(stdout_as_str(&output, &self.cli_path)?)
        } else {
            Err(classify_failure(&action, output))
        }
    }

    async fn run_json<T: DeserializeOwned>(&self, command: &[&str]) -> crate::Result<T> {
        let mut command = command.to_vec();
        command.extend(["--output", "json"]);
        let stdout = self.run(&command).await?;
        serde_json::from_str(&stdout).map_err(|e| {
            SimScaleError::BackendError(format!("Cannot parse output of az batch: {e}"))
        })
    }

    async fn run_with_json_file(&self, command: &[&str], body: &Value) -> crate::Result<()> {
        let mut file = NamedTempFile::new()?;
        serde_json::to_writer(&mut file, body)?;
        file.flush()?;
        let path = file.path().to_string_lossy().to_string();

        let mut command = command.to_vec();
        command.extend(["--json-file", path.as_str()]);
        self.run(&command).await?;
        Ok(())
    }
}

fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("notfound")
        || stderr.contains("not found")
        || stderr.contains("does not exist")
}

fn classify_failure(action: &str, output: Output) -> SimScaleError {
    let stderr = stderr_lossy(&output);
    if is_not_found(&stderr) {
        return SimScaleError::NotFound(format!("az batch {action}: {stderr}"));
    }
    match check_command_output(output) {
        Err(error) => SimScaleError::BackendError(format!("az batch {action} failed\n{error:?}")),
        Ok(_) => SimScaleError::BackendError(format!("az batch {action} failed")),
    }
}

pub fn pool_body(spec: &PoolSpec) -> Value {
    let registry = &spec.registry;
    let mut container_registry = json!({ "registryServer": registry.server });
    if let Some(username) = &registry.username {
        container_registry["username"] = json!(username);
    }
    if let Some(password) = &registry.password {
        container_registry["password"] = json!(password);
    }

    let mut body = json!({
        "id": spec.id,
        "vmSize": spec.vm_size,
        "taskSlotsPerNode": spec.tasks_per_node,
        "targetDedicatedNodes": spec.target_dedicated_nodes,
        "targetLowPriorityNodes": spec.target_low_priority_nodes,
        "virtualMachineConfiguration": {
            "imageReference": {
                "publisher": spec.image.publisher,
                "offer": spec.image.offer,
                "sku": spec.image.sku,
                "version": spec.image.version,
            },
            "nodeAgentSKUId": spec.node_agent_sku,
            "containerConfiguration": {
                "type": "dockerCompatible",
                "containerImageNames": spec.container_images,
                "containerRegistries": [container_registry],
            },
        },
    });
    if let Some(mount) = &spec.mount {
        body["mountConfiguration"] = json!([{
            "azureFileShareConfiguration": {
                "accountName": mount.account_name,
                "azureFileUrl": mount.url,
                "accountKey": mount.account_key,
                "relativeMountPath": mount.relative_mount_path,
                "mountOptions": mount.mount_options,
            }
        }]);
    }
    body
}

pub fn task_body(task: &TaskSpec) -> Value {
    let environment: Vec<Value> = task
        .environment
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    let mut body = json!({
        "id": task.id,
        "commandLine": task.command_line,
        "containerSettings": {
            "imageName": task.image,
            "containerRunOptions": task.container_run_options,
        },
        "environmentSettings": environment,
    });
    if task.run_elevated {
        body["userIdentity"] = json!({
            "autoUser": { "scope": "task", "elevationLevel": "admin" }
        });
    }
    body
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzPool {
    id: String,
    #[serde(default)]
    vm_size: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    allocation_state: Option<String>,
    #[serde(default)]
    current_dedicated_nodes: Option<u32>,
    #[serde(default)]
    current_low_priority_nodes: Option<u32>,
}

impl From<AzPool> for PoolInfo {
    fn from(pool: AzPool) -> Self {
        PoolInfo {
            id: pool.id,
            vm_size: pool.vm_size,
            state: pool.state,
            allocation_state: pool.allocation_state,
            current_dedicated_nodes: pool.current_dedicated_nodes.unwrap_or(0),
            current_low_priority_nodes: pool.current_low_priority_nodes.unwrap_or(0),
        }
    }
}

#[derive(Deserialize)]
struct AzJob {
    id: String,
}

#[derive(Deserialize)]
struct AzTask {
    id: String,
    state: TaskState,
}

pub fn parse_pools(output: &str) -> crate::Result<Vec<PoolInfo>> {
    let pools: Vec<AzPool> = serde_json::from_str(output)?;
    Ok(pools.into_iter().map(PoolInfo::from).collect())
}

pub fn parse_tasks(output: &str) -> crate::Result<Vec<TaskInfo>> {
    let tasks: Vec<AzTask> = serde_json::from_str(output)?;
    Ok(tasks
        .into_iter()
        .map(|task| TaskInfo {
            id: task.id,
            state: task.state,
        })
        .collect())
}

pub fn find_node_counts(pool_id: &str, counts: Vec<PoolNodeCounts>) -> crate::Result<PoolNodeCounts> {
    counts
        .into_iter()
        .find(|counts| counts.pool_id == pool_id)
        .ok_or_else(|| SimScaleError::NotFound(format!("Pool {pool_id} does not exist")))
}

impl PoolBackend for AzBatchCli {
    fn pool_exists<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            match self
                .run(&["pool", "show", "--pool-id", pool_id, "--query", "id"])
                .await
            {
                Ok(_) => Ok(true),
                Err(SimScaleError::NotFound(_)) => Ok(false),
                Err(error) => Err(error),
            }
        })
    }

    fn create_pool<'a>(&'a self, spec: &'a PoolSpec) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.run_with_json_file(&["pool", "create"], &pool_body(spec))
                .await
        })
    }

    fn resize_pool<'a>(
        &'a self,
        pool_id: &'a str,
        dedicated_nodes: u32,
        low_priority_nodes: u32,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let dedicated = dedicated_nodes.to_string();
            let low_priority = low_priority_nodes.to_string();
            self.run(&[
                "pool",
                "resize",
                "--pool-id",
                pool_id,
                "--target-dedicated-nodes",
                &dedicated,
                "--target-low-priority-nodes",
                &low_priority,
            ])
            .await?;
            Ok(())
        })
    }

    fn delete_pool<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.run(&["pool", "delete", "--pool-id", pool_id, "--yes"])
                .await?;
            Ok(())
        })
    }

    fn list_pools(&self) -> BackendFuture<'_, Vec<PoolInfo>> {
        Box::pin(async move {
            let output = self.run(&["pool", "list", "--output", "json"]).await?;
            parse_pools(&output)
        })
    }

    fn create_job<'a>(&'a self, job_id: &'a str, pool_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.run(&["job", "create", "--id", job_id, "--pool-id", pool_id])
                .await?;
            Ok(())
        })
    }

    fn delete_job<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.run(&["job", "delete", "--job-id", job_id, "--yes"])
                .await?;
            Ok(())
        })
    }

    fn list_jobs(&self) -> BackendFuture<'_, Vec<String>> {
        Box::pin(async move {
            let jobs: Vec<AzJob> = self.run_json(&["job", "list"]).await?;
            Ok(jobs.into_iter().map(|job| job.id).collect())
        })
    }

    fn add_task<'a>(&'a self, job_id: &'a str, task: &'a TaskSpec) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.run_with_json_file(&["task", "create", "--job-id", job_id], &task_body(task))
                .await
        })
    }

    fn list_tasks<'a>(&'a self, job_id: &'a str) -> BackendFuture<'a, Vec<TaskInfo>> {
        Box::pin(async move {
            let output = self
                .run(&["task", "list", "--job-id", job_id, "--output", "json"])
                .await?;
            parse_tasks(&output)
        })
    }

    fn node_counts<'a>(&'a self, pool_id: &'a str) -> BackendFuture<'a, PoolNodeCounts> {
        Box::pin(async move {
            let filter = format!("poolId eq '{pool_id}'");
            let counts: Vec<PoolNodeCounts> = self
                .run_json(&["pool", "node-counts", "list", "--filter", &filter])
                .await?;
            find_node_counts(pool_id, counts)
        })
    }
}
