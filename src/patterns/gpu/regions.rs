//! Offload region identification and data mapping.
//!
//! Regions are built in two steps:
//! 1. every candidate joins the region of its parent loop when the parent is
//!    itself a candidate, so a region is rooted at a candidate whose parent
//!    is absent or not offloadable;
//! 2. root regions that are adjacent siblings, separated only by trivial
//!    statements, are merged.
//!
//! Outer absorption happens first, so a loop never ends up in a sibling
//! region when its enclosing loop is offloaded. All intermediate state is
//! kept in ordered maps keyed by node id; the result does not depend on the
//! order the descriptors were supplied in.

use crate::graph::{Access, Node, NodeId, PetGraph, Variable};
use crate::patterns::gpu::gpu_loop::{GpuLoopPattern, VarRole};
use crate::patterns::gpu::legality::Legality;
use crate::patterns::gpu::liveness::{live_out, read_first};
use crate::utils::errors::{GraphError, GraphResult};
use crate::utils::location::{LineId, LineSpan};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Host/device transfer for one variable of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MapDirection {
    /// Copied to the device on entry
    #[serde(rename = "to")]
    To,
    /// Copied back to the host on exit
    #[serde(rename = "from")]
    From,
    /// Copied both ways
    #[serde(rename = "tofrom")]
    ToFrom,
    /// Device storage only, never copied
    #[serde(rename = "alloc")]
    Alloc,
}

impl MapDirection {
    /// Direction for a shared variable given its region-level liveness.
    pub fn resolve(written: bool, live_in: bool, live_out: bool) -> Self {
        match (written, live_in, live_out) {
            (false, _, _) => MapDirection::To,
            (true, true, true) => MapDirection::ToFrom,
            (true, false, true) => MapDirection::From,
            (true, true, false) => MapDirection::To,
            (true, false, false) => MapDirection::Alloc,
        }
    }

    /// Clause keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            MapDirection::To => "to",
            MapDirection::From => "from",
            MapDirection::ToFrom => "tofrom",
            MapDirection::Alloc => "alloc",
        }
    }
}

impl fmt::Display for MapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of loops offloaded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuRegion {
    /// All member loops, in source order
    pub loops: Vec<NodeId>,
    /// Members whose parent loop is not a member, in source order
    pub roots: Vec<NodeId>,
    /// Source range covered by the roots
    pub span: LineSpan,
    /// Resolved transfer per variable
    pub data_mapping: BTreeMap<String, MapDirection>,
}

impl GpuRegion {
    /// The outermost, earliest member.
    pub fn representative(&self) -> NodeId {
        self.roots[0]
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.loops.contains(&id)
    }
}

/// Region construction over a complete set of loop descriptors.
pub struct GpuRegions<'g> {
    graph: &'g PetGraph,
    patterns: BTreeMap<NodeId, GpuLoopPattern>,
    project_path: String,
    regions: Vec<GpuRegion>,
}

impl<'g> GpuRegions<'g> {
    pub fn new(graph: &'g PetGraph, patterns: Vec<GpuLoopPattern>, project_path: &str) -> Self {
        Self {
            graph,
            patterns: patterns.into_iter().map(|p| (p.node_id(), p)).collect(),
            project_path: project_path.to_string(),
            regions: Vec::new(),
        }
    }

    pub fn graph(&self) -> &'g PetGraph {
        self.graph
    }

    pub fn project_path(&self) -> &str {
        &self.project_path
    }

    pub fn regions(&self) -> &[GpuRegion] {
        &self.regions
    }

    pub fn pattern(&self, id: NodeId) -> Option<&GpuLoopPattern> {
        self.patterns.get(&id)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &GpuLoopPattern> {
        self.patterns.values()
    }

    fn pattern_or_err(&self, id: NodeId) -> GraphResult<&GpuLoopPattern> {
        self.patterns.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    /// Outermost candidate reachable through candidate parents only.
    fn region_root(&self, id: NodeId) -> GraphResult<NodeId> {
        let mut current = id;
        let mut seen = BTreeSet::new();
        while let Some(parent) = self.pattern_or_err(current)?.parent_loop {
            if !self.patterns.contains_key(&parent) || !seen.insert(parent) {
                break;
            }
            current = parent;
        }
        Ok(current)
    }

    fn source_key(&self, id: NodeId) -> GraphResult<(LineId, NodeId)> {
        Ok((self.graph.node(id)?.start_line, id))
    }

    /// Children of `parent` (or top-level nodes), in source order.
    fn siblings(&self, parent: Option<NodeId>) -> GraphResult<Vec<&'g Node>> {
        match parent {
            Some(p) => self.graph.children(p),
            None => {
                let mut top = Vec::new();
                for n in self.graph.nodes() {
                    if self.graph.parent(n.id)?.is_none() {
                        top.push(n);
                    }
                }
                top.sort_by_key(|n| (n.start_line, n.id));
                Ok(top)
            }
        }
    }

    /// Partition the descriptors into regions.
    pub fn identify_gpu_regions(
        &mut self,
        legality: &dyn Legality,
        merge_adjacent: bool,
    ) -> GraphResult<()> {
        let mut groups: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for &id in self.patterns.keys() {
            groups.entry(self.region_root(id)?).or_default().push(id);
        }

        // runs of roots that end up in the same region
        let mut runs: Vec<Vec<NodeId>> = Vec::new();
        if merge_adjacent {
            let mut by_parent: BTreeMap<Option<NodeId>, BTreeSet<NodeId>> = BTreeMap::new();
            for &root in groups.keys() {
                let parent = self.graph.parent(root)?.map(|n| n.id);
                by_parent.entry(parent).or_default().insert(root);
            }

            for (parent, roots) in &by_parent {
                let mut current: Vec<NodeId> = Vec::new();
                for sibling in self.siblings(*parent)? {
                    if roots.contains(&sibling.id) {
                        current.push(sibling.id);
                    } else if !legality.is_trivial_separator(self.graph, sibling)
                        && !current.is_empty()
                    {
                        runs.push(std::mem::take(&mut current));
                    }
                }
                if !current.is_empty() {
                    runs.push(current);
                }
            }
        } else {
            runs = groups.keys().map(|&root| vec![root]).collect();
        }

        let mut regions = Vec::with_capacity(runs.len());
        for mut roots in runs {
            let mut keyed = Vec::with_capacity(roots.len());
            for &r in &roots {
                keyed.push((self.source_key(r)?, r));
            }
            keyed.sort();
            roots = keyed.into_iter().map(|(_, r)| r).collect();

            let mut members: Vec<(_, NodeId)> = Vec::new();
            for root in &roots {
                for &m in groups.get(root).map(Vec::as_slice).unwrap_or_default() {
                    members.push((self.source_key(m)?, m));
                }
            }
            members.sort();

            let mut span = self.graph.node(roots[0])?.span();
            for &r in &roots[1..] {
                span = span.merge(&self.graph.node(r)?.span());
            }

            debug!(
                "offload region {}: roots {:?}, {} loops",
                span,
                roots,
                members.len()
            );

            regions.push(GpuRegion {
                loops: members.into_iter().map(|(_, m)| m).collect(),
                roots,
                span,
                data_mapping: BTreeMap::new(),
            });
        }

        regions.sort_by_key(|r| (r.span.start, r.roots[0]));
        self.regions = regions;
        Ok(())
    }

    /// Resolve the data mapping of every region.
    pub fn determine_data_mapping(&mut self) -> GraphResult<()> {
        let mut mappings = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            mappings.push(self.region_mapping(region)?);
        }
        for (region, mapping) in self.regions.iter_mut().zip(mappings) {
            region.data_mapping = mapping;
        }
        Ok(())
    }

    /// Whether a member loop enclosing `id` keeps its own copy of `name`.
    fn privatized_above(&self, region: &GpuRegion, id: NodeId, name: &str) -> GraphResult<bool> {
        for &other in &region.loops {
            if other == id {
                continue;
            }
            let local = self
                .pattern_or_err(other)?
                .role(name)
                .map_or(false, |role| role.is_loop_local());
            if local && self.graph.is_descendant(other, id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn region_mapping(&self, region: &GpuRegion) -> GraphResult<BTreeMap<String, MapDirection>> {
        // a role only reaches the mapping when no enclosing member privatizes it
        let mut reductions: BTreeSet<&str> = BTreeSet::new();
        let mut shared: BTreeMap<&str, Option<&Variable>> = BTreeMap::new();
        for &id in &region.loops {
            let pattern = self.pattern_or_err(id)?;
            for (name, role) in &pattern.roles {
                if *role == VarRole::Private || self.privatized_above(region, id, name)? {
                    continue;
                }
                if *role == VarRole::Reduction {
                    reductions.insert(name.as_str());
                } else {
                    shared
                        .entry(name.as_str())
                        .or_insert_with(|| pattern.variable(name));
                }
            }
        }

        let mut accesses: Vec<&Access> = Vec::new();
        for &root in &region.roots {
            accesses.extend(self.graph.subtree_accesses(root)?);
        }
        accesses.sort_by_key(|a| a.line);

        let live_in = read_first(accesses.iter().copied());
        let written: BTreeSet<&str> = accesses
            .iter()
            .filter(|a| a.is_write())
            .map(|a| a.variable.name.as_str())
            .collect();
        let live_after = live_out(self.graph, region.representative(), &region.span)?;

        let mut mapping = BTreeMap::new();
        for name in &reductions {
            mapping.insert(name.to_string(), MapDirection::ToFrom);
        }
        for (name, var) in shared {
            if reductions.contains(name) {
                continue;
            }
            let escapes = var.map_or(false, |v| v.escapes());
            let direction = MapDirection::resolve(
                written.contains(name),
                live_in.contains(name),
                escapes || live_after.contains(name),
            );
            debug!("region {}: map({}: {})", region.span, direction, name);
            mapping.insert(name.to_string(), direction);
        }
        Ok(mapping)
    }
}
