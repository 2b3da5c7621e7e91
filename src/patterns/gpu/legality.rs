//! Legality predicates for loop collapsing and region merging.
//!
//! Both predicates are heuristics over profiling data rather than proofs,
//! so they sit behind a trait and can be swapped per run.

use crate::graph::{Node, NodeId, PetGraph};
use std::collections::BTreeSet;

/// Decides which loops may be fused and which regions may be merged.
pub trait Legality {
    /// Whether `inner` can be collapsed into `outer`. `inner` is a direct
    /// child loop of `outer`; `candidates` is the set of offloadable loops.
    fn can_collapse(
        &self,
        graph: &PetGraph,
        outer: &Node,
        inner: &Node,
        candidates: &BTreeSet<NodeId>,
    ) -> bool;

    /// Whether `node`, sitting between two offload regions, can be ignored
    /// when deciding if the regions are adjacent.
    fn is_trivial_separator(&self, graph: &PetGraph, node: &Node) -> bool;

    /// Get policy name.
    fn name(&self) -> &str;
}

/// The stock policy.
///
/// Collapse requires perfect nesting and rectangular trip counts, both read
/// off the profiling statistics. A separator is trivial when it is a
/// statement node without memory accesses anywhere below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLegality;

impl Legality for DefaultLegality {
    fn can_collapse(
        &self,
        graph: &PetGraph,
        outer: &Node,
        inner: &Node,
        candidates: &BTreeSet<NodeId>,
    ) -> bool {
        if !candidates.contains(&inner.id) {
            return false;
        }

        // perfectly nested: the inner loop is the only thing in the body
        match graph.children(outer.id) {
            Ok(children) if children.len() == 1 && children[0].id == inner.id => {}
            _ => return false,
        }

        let (Some(o), Some(i)) = (outer.loop_data(), inner.loop_data()) else {
            return false;
        };

        // entered once per outer iteration, same trip count every time
        i.entry_count == o.total_iteration_count && i.has_constant_trip_count()
    }

    fn is_trivial_separator(&self, graph: &PetGraph, node: &Node) -> bool {
        if node.is_loop() || node.is_function() {
            return false;
        }
        graph
            .subtree_accesses(node.id)
            .map(|accesses| accesses.is_empty())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "default"
    }
}
