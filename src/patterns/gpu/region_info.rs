//! Output records for offload regions.

use crate::graph::{NodeId, PetGraph, WorkloadEstimator};
use crate::patterns::gpu::gpu_loop::{GpuLoopPattern, VarRole};
use crate::patterns::gpu::regions::{GpuRegion, GpuRegions, MapDirection};
use crate::patterns::pattern_info::{self, PatternInfo};
use crate::utils::errors::{GpuOptError, GraphError, GraphResult};
use crate::utils::location::LineId;
use crate::utils::serde_ext::or_placeholder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const TEAMS_PREFIX: &str = "#pragma omp target teams distribute parallel for";
const NESTED_PREFIX: &str = "#pragma omp parallel for";
const DATA_PREFIX: &str = "#pragma omp target data";

/// Suggested directive for one member loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopDirective {
    pub node_id: NodeId,
    pub start_line: LineId,
    pub end_line: LineId,
    /// Fused levels, 1 when nothing is collapsed
    pub collapse: usize,
    pub private: Vec<String>,
    /// Per-iteration copies whose final value is copied out
    pub lastprivate: Vec<String>,
    /// `op:name` entries
    pub reduction: Vec<String>,
    /// Full directive line
    pub pragma: String,
}

impl LoopDirective {
    fn new(pattern: &GpuLoopPattern, is_root: bool) -> Self {
        let collapse = pattern.collapse_depth();
        let private: Vec<String> = pattern
            .vars_with_role(VarRole::Private)
            .into_iter()
            .map(str::to_string)
            .collect();
        let lastprivate: Vec<String> = pattern
            .vars_with_role(VarRole::LastPrivate)
            .into_iter()
            .map(str::to_string)
            .collect();

        // grouped by operator so each clause carries a single operator
        let mut by_op: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for v in &pattern.reduction_vars {
            by_op
                .entry(v.operation.as_deref().unwrap_or("+"))
                .or_default()
                .push(v.name.as_str());
        }
        let reduction = by_op
            .iter()
            .flat_map(|(op, names)| names.iter().map(move |n| format!("{}:{}", op, n)))
            .collect();

        let mut pragma = String::from(if is_root { TEAMS_PREFIX } else { NESTED_PREFIX });
        if collapse > 1 {
            pragma.push_str(&format!(" collapse({})", collapse));
        }
        if !private.is_empty() {
            pragma.push_str(&format!(" private({})", private.join(",")));
        }
        if !lastprivate.is_empty() {
            pragma.push_str(&format!(" lastprivate({})", lastprivate.join(",")));
        }
        for (op, names) in &by_op {
            pragma.push_str(&format!(" reduction({}:{})", op, names.join(",")));
        }

        Self {
            node_id: pattern.node_id(),
            start_line: pattern.info.start_line,
            end_line: pattern.info.end_line,
            collapse,
            private,
            lastprivate,
            reduction,
            pragma,
        }
    }
}

/// Build the `target data` directive, or `None` when nothing is mapped.
pub fn data_directive(mapping: &BTreeMap<String, MapDirection>) -> Option<String> {
    if mapping.is_empty() {
        return None;
    }
    let mut pragma = String::from(DATA_PREFIX);
    for direction in [
        MapDirection::To,
        MapDirection::From,
        MapDirection::ToFrom,
        MapDirection::Alloc,
    ] {
        let names: Vec<&str> = mapping
            .iter()
            .filter(|(_, d)| **d == direction)
            .map(|(name, _)| name.as_str())
            .collect();
        if !names.is_empty() {
            pragma.push_str(&format!(" map({}: {})", direction, names.join(",")));
        }
    }
    Some(pragma)
}

/// One offload region, in the common pattern record shape.
#[derive(Debug, Clone, Serialize)]
pub struct GpuRegionInfo {
    #[serde(flatten)]
    info: PatternInfo,
    pub project_path: String,
    pub contained_loops: Vec<NodeId>,
    #[serde(serialize_with = "or_placeholder")]
    pub data_mapping: BTreeMap<String, MapDirection>,
    pub loops: Vec<LoopDirective>,
    pub data_directive: Option<String>,
    #[serde(skip)]
    roots: Vec<NodeId>,
}

impl GpuRegionInfo {
    /// Record for `region`. Directives are left empty unless `emit_directives`.
    pub fn new(
        regions: &GpuRegions<'_>,
        region: &GpuRegion,
        emit_directives: bool,
    ) -> GraphResult<Self> {
        let graph = regions.graph();
        let mut info = PatternInfo::new(graph.node(region.representative())?);
        info.start_line = region.span.start;
        info.end_line = region.span.end;

        let mut loops = Vec::new();
        let mut data = None;
        if emit_directives {
            let fused = fused_loops(regions, region)?;
            for &id in &region.loops {
                if fused.contains(&id) {
                    continue;
                }
                let pattern = regions.pattern(id).ok_or(GraphError::UnknownNode(id))?;
                loops.push(LoopDirective::new(pattern, region.roots.contains(&id)));
            }
            data = data_directive(&region.data_mapping);
        }

        Ok(Self {
            info,
            project_path: regions.project_path().to_string(),
            contained_loops: region.loops.clone(),
            data_mapping: region.data_mapping.clone(),
            loops,
            data_directive: data,
            roots: region.roots.clone(),
        })
    }

    /// The base record.
    pub fn pattern(&self) -> &PatternInfo {
        &self.info
    }

    pub fn node_id(&self) -> NodeId {
        self.info.node_id
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Workload of the region: the sum over its root loops, computed once.
    pub fn get_workload<E>(&self, graph: &PetGraph, estimator: &E) -> GraphResult<i64>
    where
        E: WorkloadEstimator + ?Sized,
    {
        let roots = &self.roots;
        let summed = |g: &PetGraph, _: NodeId| -> GraphResult<i64> {
            roots.iter().map(|&r| estimator.calculate_workload(g, r)).sum()
        };
        self.info.get_workload(graph, &summed)
    }

    pub fn workload(&self) -> Option<i64> {
        self.info.workload()
    }

    pub fn to_json(&self) -> Result<String, GpuOptError> {
        pattern_info::to_json(self)
    }
}

/// Loops absorbed into an ancestor's collapse clause; they get no directive
/// of their own.
fn fused_loops(regions: &GpuRegions<'_>, region: &GpuRegion) -> GraphResult<BTreeSet<NodeId>> {
    let graph = regions.graph();
    let mut fused = BTreeSet::new();
    for &id in &region.loops {
        let Some(pattern) = regions.pattern(id) else {
            continue;
        };
        let mut outer = id;
        for _ in 1..pattern.collapse_depth() {
            let children = graph.children(outer)?;
            let Some(inner) = children.into_iter().find(|c| c.is_loop()) else {
                break;
            };
            fused.insert(inner.id);
            outer = inner.id;
        }
    }
    Ok(fused)
}

impl GpuRegions<'_> {
    /// One record per region, in region order.
    pub fn get_gpu_region_info(&self, emit_directives: bool) -> GraphResult<Vec<GpuRegionInfo>> {
        self.regions()
            .iter()
            .map(|r| GpuRegionInfo::new(self, r, emit_directives))
            .collect()
    }
}
