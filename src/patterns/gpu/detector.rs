//! GPU-offload detection pipeline.
//!
//! Runs the stages in order: candidate selection, per-loop descriptors,
//! region identification, data mapping, and region records.

use crate::analysis::DetectionResult;
use crate::graph::{InstructionWorkload, NodeId, PetGraph, WorkloadEstimator};
use crate::patterns::gpu::candidates::{select_candidates, Candidate};
use crate::patterns::gpu::gpu_loop::GpuLoopPattern;
use crate::patterns::gpu::legality::{DefaultLegality, Legality};
use crate::patterns::gpu::region_info::GpuRegionInfo;
use crate::patterns::gpu::regions::GpuRegions;
use crate::utils::errors::GraphResult;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Detector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Merge adjacent sibling regions
    pub merge_adjacent_regions: bool,
    /// Compute collapse clauses for perfect nests
    pub enable_collapse: bool,
    /// Maximum number of fused levels
    pub max_collapse_depth: usize,
    /// Fill in directive suggestions
    pub emit_directives: bool,
    /// Compute each region's workload before returning
    pub compute_workload: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            merge_adjacent_regions: true,
            enable_collapse: true,
            max_collapse_depth: 3,
            emit_directives: true,
            compute_workload: true,
        }
    }
}

impl DetectorConfig {
    /// One region per outermost candidate, no loop fusion.
    pub fn conservative() -> Self {
        Self {
            merge_adjacent_regions: false,
            enable_collapse: false,
            ..Default::default()
        }
    }

    pub fn with_merge_adjacent_regions(mut self, merge: bool) -> Self {
        self.merge_adjacent_regions = merge;
        self
    }

    pub fn with_collapse(mut self, enable: bool) -> Self {
        self.enable_collapse = enable;
        self
    }

    pub fn with_max_collapse_depth(mut self, depth: usize) -> Self {
        self.max_collapse_depth = depth.max(1);
        self
    }

    pub fn with_directives(mut self, emit: bool) -> Self {
        self.emit_directives = emit;
        self
    }

    pub fn with_workload(mut self, compute: bool) -> Self {
        self.compute_workload = compute;
        self
    }

    /// Read a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid detector configuration")
    }
}

/// The GPU pattern detector.
pub struct GpuPatternDetector<'a> {
    config: DetectorConfig,
    legality: Box<dyn Legality + 'a>,
    estimator: Box<dyn WorkloadEstimator + 'a>,
}

impl Default for GpuPatternDetector<'_> {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl<'a> GpuPatternDetector<'a> {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            legality: Box::new(DefaultLegality),
            estimator: Box::new(InstructionWorkload),
        }
    }

    /// Replace the collapse/merge policy.
    pub fn with_legality(mut self, legality: impl Legality + 'a) -> Self {
        self.legality = Box::new(legality);
        self
    }

    /// Replace the workload estimator.
    pub fn with_estimator(mut self, estimator: impl WorkloadEstimator + 'a) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect offload regions in `graph`.
    pub fn run(
        &self,
        graph: &PetGraph,
        res: &DetectionResult,
        project_path: &str,
    ) -> Result<Vec<GpuRegionInfo>> {
        info!(
            "GPU detection: {} nodes, {} do-all, {} reduction (policy: {})",
            graph.len(),
            res.do_all.len(),
            res.reduction.len(),
            self.legality.name()
        );

        let candidates =
            select_candidates(graph, res).context("detection result does not match the graph")?;
        if candidates.is_empty() {
            info!("GPU detection: no offload candidates");
            return Ok(Vec::new());
        }
        let ids: BTreeSet<NodeId> = candidates.iter().map(|c| c.node_id).collect();
        debug!("offload candidates: {:?}", ids);

        let mut patterns = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let pattern = self
                .build_loop_pattern(graph, candidate, &ids, project_path)
                .with_context(|| format!("failed to describe loop {}", candidate.node_id))?;
            patterns.push(pattern);
        }

        let mut regions = GpuRegions::new(graph, patterns, project_path);
        regions
            .identify_gpu_regions(self.legality.as_ref(), self.config.merge_adjacent_regions)
            .context("region identification failed")?;
        regions
            .determine_data_mapping()
            .context("data mapping failed")?;

        let infos = regions.get_gpu_region_info(self.config.emit_directives)?;
        if self.config.compute_workload {
            for record in &infos {
                record
                    .get_workload(graph, self.estimator.as_ref())
                    .with_context(|| format!("workload of region at {}", record.node_id()))?;
            }
        }

        info!(
            "GPU detection: {} candidates in {} regions",
            candidates.len(),
            infos.len()
        );
        Ok(infos)
    }

    fn build_loop_pattern(
        &self,
        graph: &PetGraph,
        candidate: &Candidate,
        candidates: &BTreeSet<NodeId>,
        project_path: &str,
    ) -> GraphResult<GpuLoopPattern> {
        let mut pattern = GpuLoopPattern::new(graph, candidate, project_path)?;
        pattern.find_nested_loops(graph)?;
        pattern.set_parent_loop(graph)?;
        pattern.classify_loop_vars(graph)?;
        let depth = if self.config.enable_collapse {
            self.config.max_collapse_depth
        } else {
            1
        };
        pattern.set_collapse_clause(graph, candidates, self.legality.as_ref(), depth)?;
        Ok(pattern)
    }
}
