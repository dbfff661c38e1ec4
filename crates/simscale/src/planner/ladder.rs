use serde::{Deserialize, Serialize};

use crate::common::error::SimScaleError;

/// One rung of the VM ladder: `vm_sku` is chosen when the tasks per node do not exceed
/// `max_tasks_per_node`. The last rung has no limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LadderStep {
    #[serde(default)]
    pub max_tasks_per_node: Option<u32>,
    pub vm_sku: String,
}

impl LadderStep {
    fn new(max_tasks_per_node: Option<u32>, vm_sku: &str) -> Self {
        Self {
            max_tasks_per_node,
            vm_sku: vm_sku.to_string(),
        }
    }
}

/// Ordered mapping from the packing density of a pool to a VM size.
#[derive(Debug, Clone, PartialEq)]
pub struct SkuLadder {
    steps: Vec<LadderStep>,
}

impl Default for SkuLadder {
    fn default() -> Self {
        Self {
            steps: vec![
                LadderStep::new(Some(8), "Standard_E2s_v3"),
                LadderStep::new(Some(16), "Standard_E8s_v3"),
                LadderStep::new(Some(32), "Standard_E16s_v3"),
                LadderStep::new(Some(75), "Standard_E32s_v3"),
                LadderStep::new(None, "Standard_E64s_v3"),
            ],
        }
    }
}

impl SkuLadder {
    /// Steps must have strictly increasing limits and end with a single unbounded step.
    pub fn new(steps: Vec<LadderStep>) -> crate::Result<Self> {
        let Some((last, bounded)) = steps.split_last() else {
            return Err(SimScaleError::InvalidConfiguration(
                "SKU ladder must contain at least one step".to_string(),
            ));
        };
        if last.max_tasks_per_node.is_some() {
            return Err(SimScaleError::InvalidConfiguration(format!(
                "The last SKU ladder step ({}) must not have `max_tasks_per_node`",
                last.vm_sku
            )));
        }
        let mut previous = 0;
        for step in bounded {
            match step.max_tasks_per_node {
                Some(limit) if limit > previous => previous = limit,
                Some(limit) => {
                    return Err(SimScaleError::InvalidConfiguration(format!(
                        "SKU ladder limits must be increasing, found {limit} after {previous}"
                    )));
                }
                None => {
                    return Err(SimScaleError::InvalidConfiguration(format!(
                        "SKU ladder step {} is missing `max_tasks_per_node`",
                        step.vm_sku
                    )));
                }
            }
        }
        if steps.iter().any(|step| step.vm_sku.trim().is_empty()) {
            return Err(SimScaleError::InvalidConfiguration(
                "SKU ladder contains an empty VM SKU".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[LadderStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<LadderStep> {
        self.steps
    }

    /// Returns the first step that can host `tasks_per_node` tasks.
    pub fn select(&self, tasks_per_node: u32) -> &LadderStep {
        self.steps
            .iter()
            .find(|step| {
                step.max_tasks_per_node
                    .is_none_or(|limit| tasks_per_node <= limit)
            })
            .unwrap_or_else(|| &self.steps[self.steps.len() - 1])
    }

    /// Packing density above which an auto-selected size needs confirmation.
    pub fn confirmation_threshold(&self) -> Option<u32> {
        self.steps.first().and_then(|step| step.max_tasks_per_node)
    }

    /// Packing density above which the selected size may not be available in every region.
    pub fn compatibility_threshold(&self) -> Option<u32> {
        self.steps.iter().rev().find_map(|step| step.max_tasks_per_node)
    }
}
