//! Results of the upstream do-all and reduction detectors.

use crate::graph::{NodeId, Variable};
use crate::utils::errors::GpuOptError;
use serde::{Deserialize, Serialize};

/// A loop whose iterations are independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoAllInfo {
    /// The loop
    pub node_id: NodeId,
    /// Variables whose final-iteration value must survive the loop
    #[serde(default)]
    pub last_private: Vec<Variable>,
}

/// A loop that accumulates through a reduction operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionInfo {
    /// The loop
    pub node_id: NodeId,
    /// Variables whose final-iteration value must survive the loop
    #[serde(default)]
    pub last_private: Vec<Variable>,
    /// Reduction accumulators
    #[serde(default)]
    pub reduction: Vec<Variable>,
}

/// Everything the upstream detectors found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Do-all loops
    #[serde(default)]
    pub do_all: Vec<DoAllInfo>,
    /// Reduction loops
    #[serde(default)]
    pub reduction: Vec<ReductionInfo>,
}

impl DoAllInfo {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id, last_private: Vec::new() }
    }

    pub fn with_last_private(mut self, vars: Vec<Variable>) -> Self {
        self.last_private = vars;
        self
    }
}

impl ReductionInfo {
    pub fn new(node_id: NodeId, reduction: Vec<Variable>) -> Self {
        Self { node_id, last_private: Vec::new(), reduction }
    }

    pub fn with_last_private(mut self, vars: Vec<Variable>) -> Self {
        self.last_private = vars;
        self
    }
}

impl DetectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse detector output from JSON.
    pub fn from_json(json: &str) -> Result<Self, GpuOptError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether neither detector reported anything.
    pub fn is_empty(&self) -> bool {
        self.do_all.is_empty() && self.reduction.is_empty()
    }

    /// Do-all record for a loop, if any.
    pub fn do_all_for(&self, node: NodeId) -> Option<&DoAllInfo> {
        self.do_all.iter().find(|d| d.node_id == node)
    }

    /// First reduction record for a loop, if any.
    pub fn reduction_for(&self, node: NodeId) -> Option<&ReductionInfo> {
        self.reduction.iter().find(|r| r.node_id == node)
    }

    /// Every loop id mentioned by either detector, sorted and deduplicated.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .do_all
            .iter()
            .map(|d| d.node_id)
            .chain(self.reduction.iter().map(|r| r.node_id))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
