//! Offload candidate selection.
//!
//! The suggested directive family (`target teams distribute`) has no
//! last-private form, so loops that need one are dropped here.
//!
//! TODO: suggest `target parallel for` for loops with last-private variables
//! instead of dropping them.

use crate::analysis::DetectionResult;
use crate::graph::{NodeId, PetGraph, Variable};
use crate::utils::errors::GraphResult;
use log::debug;

/// A loop selected for offloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The loop
    pub node_id: NodeId,
    /// Reduction accumulators reported for the loop (may be empty)
    pub reduction_vars: Vec<Variable>,
}

/// Select offloadable loops, in node-id order.
///
/// Every loop referenced by `res` must exist in `graph` and be a loop node.
pub fn select_candidates(graph: &PetGraph, res: &DetectionResult) -> GraphResult<Vec<Candidate>> {
    for id in res.referenced_nodes() {
        graph.loop_node(id)?;
    }

    let mut candidates = Vec::new();
    for node in graph.loops() {
        let id = node.id;
        let via_do_all = res
            .do_all
            .iter()
            .any(|d| d.node_id == id && d.last_private.is_empty());
        let via_reduction = res
            .reduction
            .iter()
            .any(|r| r.node_id == id && r.last_private.is_empty());

        if !(via_do_all || via_reduction) {
            if res.do_all_for(id).is_some() || res.reduction_for(id).is_some() {
                debug!("skipping loop {} ({}): last-private variables", id, node.start_line);
            }
            continue;
        }

        let reduction_vars = res
            .reduction_for(id)
            .map(|r| r.reduction.clone())
            .unwrap_or_default();

        candidates.push(Candidate { node_id: id, reduction_vars });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DoAllInfo, ReductionInfo};
    use crate::graph::Node;
    use crate::utils::errors::GraphError;
    use crate::utils::location::{LineId, LineSpan};

    fn make_loops(n: u64) -> PetGraph {
        let mut g = PetGraph::new();
        for i in 1..=n {
            let l = i as u32 * 10;
            let span = LineSpan::new(LineId::new(1, l), LineId::new(1, l + 5));
            g.add_node(Node::loop_node(NodeId::new(i), format!("L{}", i), span)).unwrap();
        }
        g
    }

    #[test]
    fn test_excludes_last_private() {
        let g = make_loops(4);
        let res = DetectionResult {
            do_all: vec![
                DoAllInfo::new(NodeId::new(1)),
                DoAllInfo::new(NodeId::new(2)).with_last_private(vec![Variable::new("x", "int")]),
            ],
            reduction: vec![
                ReductionInfo::new(NodeId::new(3), vec![Variable::new("s", "int")])
                    .with_last_private(vec![Variable::new("y", "int")]),
                ReductionInfo::new(NodeId::new(4), vec![Variable::new("t", "int")]),
            ],
        };
        let ids: Vec<_> = select_candidates(&g, &res).unwrap().iter().map(|c| c.node_id).collect();
        assert_eq!(ids, vec![NodeId::new(1), NodeId::new(4)]);
    }

    #[test]
    fn test_selected_once_with_reduction_vars() {
        let g = make_loops(1);
        let res = DetectionResult {
            do_all: vec![DoAllInfo::new(NodeId::new(1))],
            reduction: vec![ReductionInfo::new(
                NodeId::new(1),
                vec![Variable::new("sum", "double")],
            )],
        };
        let c = select_candidates(&g, &res).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].reduction_vars[0].name, "sum");
    }

    #[test]
    fn test_unknown_reference_is_error() {
        let g = make_loops(1);
        let res = DetectionResult {
            do_all: vec![DoAllInfo::new(NodeId::new(9))],
            reduction: vec![],
        };
        assert_eq!(
            select_candidates(&g, &res).unwrap_err(),
            GraphError::UnknownNode(NodeId::new(9))
        );
    }

    #[test]
    fn test_empty_result() {
        let g = make_loops(3);
        assert!(select_candidates(&g, &DetectionResult::new()).unwrap().is_empty());
    }
}
