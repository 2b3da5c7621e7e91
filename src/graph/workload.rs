//! Workload estimation.
//!
//! The analysis treats workload as a black box `(graph, node) -> cost`.
//! [`InstructionWorkload`] is the estimator used when the caller does not
//! supply one.

use crate::graph::node::{NodeId, NodeKind};
use crate::graph::pet::PetGraph;
use crate::utils::errors::GraphResult;

/// Estimates the dynamic cost of executing a node.
pub trait WorkloadEstimator {
    /// Cost of one execution of `node`, including everything it contains.
    fn calculate_workload(&self, graph: &PetGraph, node: NodeId) -> GraphResult<i64>;
}

impl<F> WorkloadEstimator for F
where
    F: Fn(&PetGraph, NodeId) -> GraphResult<i64>,
{
    fn calculate_workload(&self, graph: &PetGraph, node: NodeId) -> GraphResult<i64> {
        self(graph, node)
    }
}

/// Counts instructions, scaling loop bodies by their average trip count.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstructionWorkload;

impl WorkloadEstimator for InstructionWorkload {
    fn calculate_workload(&self, graph: &PetGraph, node: NodeId) -> GraphResult<i64> {
        let n = graph.node(node)?;
        let mut body: i64 = 0;
        for child in graph.children(node)? {
            body = body.saturating_add(self.calculate_workload(graph, child.id)?);
        }

        Ok(match &n.kind {
            NodeKind::Cu { instructions } => {
                body.saturating_add(i64::try_from(*instructions).unwrap_or(i64::MAX))
            }
            NodeKind::Function => body,
            NodeKind::Loop { loop_data } => {
                // header accesses run once per iteration
                let per_iteration = body.saturating_add(n.accesses.len() as i64);
                match loop_data {
                    Some(data) if data.average_iteration_count > 0 => {
                        per_iteration.saturating_mul(data.average_iteration_count)
                    }
                    _ => per_iteration,
                }
            }
        })
    }
}
