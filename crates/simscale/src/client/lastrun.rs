use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::error;

const LAST_RUN_FILE: &str = "last-run.json";

/// Pool and job of the most recent `run`, used as defaults by later commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    pub pool_id: String,
    pub job_id: String,
    pub job_name: String,
    pub vm_sku: String,
    pub tasks_per_node: u32,
    pub low_priority_nodes: u32,
    pub dedicated_nodes: u32,
    pub requested_tasks: u32,
    pub started_at: DateTime<Utc>,
}

/// The record lives next to the config file.
pub fn last_run_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LAST_RUN_FILE)
}

pub fn store_last_run<P: AsRef<Path>>(record: &LastRun, path: P) -> crate::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, record)?;
    Ok(())
}

pub fn load_last_run<P: AsRef<Path>>(path: P) -> crate::Result<LastRun> {
    let path = path.as_ref();
    if !path.is_file() {
        return error(format!(
            "No previous run was recorded at {}, pass the id explicitly",
            path.display()
        ));
    }
    let file = File::open(path)?;
    serde_json::from_reader(file).map_err(|e| {
        crate::Error::DeserializationError(format!("Invalid record in {}: {e}", path.display()))
    })
}
