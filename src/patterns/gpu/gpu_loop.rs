//! Per-loop offload descriptors.
//!
//! A [`GpuLoopPattern`] is built in four steps, each filling in part of the
//! descriptor: nested-loop discovery, parent linkage, variable
//! classification, and the collapse clause. After that the descriptor is
//! read-only.

use crate::graph::{AccessKind, NodeId, PetGraph, Variable};
use crate::patterns::gpu::candidates::Candidate;
use crate::patterns::gpu::legality::Legality;
use crate::patterns::gpu::liveness::live_out;
use crate::patterns::pattern_info::PatternInfo;
use crate::utils::errors::GraphResult;
use crate::utils::location::LineSpan;
use log::trace;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How a variable behaves inside one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarRole {
    /// Fresh copy per iteration, dead after the loop
    Private,
    /// Per-iteration copy whose last value is needed after the loop
    LastPrivate,
    /// Combined across iterations by a reduction operator
    Reduction,
    /// One copy visible to all iterations; needs a data mapping
    Shared,
}

impl VarRole {
    /// Roles handled by a clause on the loop itself rather than a mapping.
    pub fn is_loop_local(&self) -> bool {
        matches!(self, VarRole::Private | VarRole::LastPrivate)
    }
}

impl fmt::Display for VarRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarRole::Private => "private",
            VarRole::LastPrivate => "lastprivate",
            VarRole::Reduction => "reduction",
            VarRole::Shared => "shared",
        };
        write!(f, "{}", s)
    }
}

/// Offload descriptor of a single candidate loop.
#[derive(Debug, Clone, Serialize)]
pub struct GpuLoopPattern {
    /// Identity, lines and statistics of the loop
    #[serde(flatten)]
    pub info: PatternInfo,
    /// Project root, carried through for code generation
    pub project_path: String,
    /// Reduction accumulators reported upstream
    pub reduction_vars: Vec<Variable>,
    /// Loops nested inside, outer to inner in source order
    pub nested_loops: Vec<NodeId>,
    /// Nearest enclosing loop
    pub parent_loop: Option<NodeId>,
    /// Role of every variable touched inside the loop
    pub roles: BTreeMap<String, VarRole>,
    /// Number of loop levels to fuse (1 = no collapsing)
    pub collapse: Option<usize>,
    #[serde(skip)]
    variables: BTreeMap<String, Variable>,
}

impl GpuLoopPattern {
    /// Start a descriptor for `candidate`.
    pub fn new(graph: &PetGraph, candidate: &Candidate, project_path: &str) -> GraphResult<Self> {
        let node = graph.loop_node(candidate.node_id)?;
        Ok(Self {
            info: PatternInfo::new(node),
            project_path: project_path.to_string(),
            reduction_vars: candidate.reduction_vars.clone(),
            nested_loops: Vec::new(),
            parent_loop: None,
            roles: BTreeMap::new(),
            collapse: None,
            variables: BTreeMap::new(),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.info.node_id
    }

    pub fn span(&self) -> LineSpan {
        LineSpan::new(self.info.start_line, self.info.end_line)
    }

    /// Collect every loop nested inside this one.
    pub fn find_nested_loops(&mut self, graph: &PetGraph) -> GraphResult<()> {
        self.nested_loops = graph.nested_loops(self.node_id())?;
        Ok(())
    }

    /// Record the nearest enclosing loop, if any.
    pub fn set_parent_loop(&mut self, graph: &PetGraph) -> GraphResult<()> {
        self.parent_loop = graph.parent_loop(self.node_id())?;
        Ok(())
    }

    /// Assign exactly one role to every variable touched inside the loop.
    ///
    /// Precedence: reduction, declared inside the loop, shared storage
    /// (aggregates and escaping variables), read-first scalars, then
    /// write-first scalars split by whether they are live after the loop.
    pub fn classify_loop_vars(&mut self, graph: &PetGraph) -> GraphResult<()> {
        let id = self.node_id();
        let span = self.span();
        let accesses = graph.subtree_accesses(id)?;
        let live_after = live_out(graph, id, &span)?;

        let reductions: BTreeSet<&str> =
            self.reduction_vars.iter().map(|v| v.name.as_str()).collect();

        let mut first: BTreeMap<&str, (&Variable, AccessKind)> = BTreeMap::new();
        for a in &accesses {
            first
                .entry(a.variable.name.as_str())
                .or_insert((&a.variable, a.kind));
        }

        let mut roles = BTreeMap::new();
        let mut variables = BTreeMap::new();

        for var in &self.reduction_vars {
            roles.insert(var.name.clone(), VarRole::Reduction);
            variables.insert(var.name.clone(), var.clone());
        }

        for (name, (var, first_kind)) in first {
            if reductions.contains(name) {
                continue;
            }
            let declared_inside = var.def_line.map_or(false, |l| span.contains(&l));
            let role = if declared_inside {
                VarRole::Private
            } else if var.is_aggregate() || var.escapes() {
                VarRole::Shared
            } else if first_kind == AccessKind::Read {
                VarRole::Shared
            } else if live_after.contains(name) {
                VarRole::LastPrivate
            } else {
                VarRole::Private
            };
            trace!("loop {}: {} is {}", id, name, role);
            roles.insert(name.to_string(), role);
            variables.insert(name.to_string(), var.clone());
        }

        self.roles = roles;
        self.variables = variables;
        Ok(())
    }

    /// Compute how many perfectly nested levels can be fused, following the
    /// first nested loop of each level while `legality` allows it.
    pub fn set_collapse_clause(
        &mut self,
        graph: &PetGraph,
        candidates: &BTreeSet<NodeId>,
        legality: &dyn Legality,
        max_depth: usize,
    ) -> GraphResult<()> {
        let mut depth = 1;
        let mut outer = graph.loop_node(self.node_id())?;
        while depth < max_depth {
            let children = graph.children(outer.id)?;
            let Some(inner) = children.into_iter().find(|c| c.is_loop()) else {
                break;
            };
            if !legality.can_collapse(graph, outer, inner, candidates) {
                break;
            }
            depth += 1;
            outer = inner;
        }
        self.collapse = Some(depth);
        Ok(())
    }

    pub fn role(&self, name: &str) -> Option<VarRole> {
        self.roles.get(name).copied()
    }

    /// Declaration of a variable touched inside the loop.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Names holding `role`, sorted.
    pub fn vars_with_role(&self, role: VarRole) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Collapse depth, treating an unset clause as 1.
    pub fn collapse_depth(&self) -> usize {
        self.collapse.unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Access, LoopData, Node};
    use crate::patterns::gpu::legality::DefaultLegality;
    use crate::utils::location::LineId;

    fn span(a: u32, b: u32) -> LineSpan {
        LineSpan::new(LineId::new(1, a), LineId::new(1, b))
    }

    fn at(l: u32) -> LineId {
        LineId::new(1, l)
    }

    /// main {
    ///   for i (L1, 2-12) {
    ///     for j (L2, 3-8) {
    ///       t = B[i][j]; A[i][j] = t * s; sum += t
    ///     }
    ///   }
    ///   print(last)
    /// }
    fn make_graph() -> PetGraph {
        let i = Variable::new("i", "int");
        let j = Variable::new("j", "int");
        let n = Variable::new("n", "int");
        let a = Variable::new("A", "double*");
        let b = Variable::new("B", "double*");
        let t = Variable::new("t", "double").with_def_line(at(4));
        let s = Variable::new("s", "double");
        let sum = Variable::new("sum", "double");
        let last = Variable::new("last", "int");

        let mut g = PetGraph::new();
        let f = g.add_node(Node::function(NodeId::new(0), "main", span(1, 20))).unwrap();
        let l1 = g
            .add_node_under(
                f,
                Node::loop_node(NodeId::new(1), "L1", span(2, 12))
                    .with_loop_data(LoopData::new(10, 10, 1))
                    .with_accesses([
                        Access::write(i.clone(), at(2)),
                        Access::read(i.clone(), at(2)),
                        Access::read(n.clone(), at(2)),
                    ]),
            )
            .unwrap();
        let l2 = g
            .add_node_under(
                l1,
                Node::loop_node(NodeId::new(2), "L2", span(3, 8))
                    .with_loop_data(LoopData::new(20, 200, 10))
                    .with_accesses([
                        Access::write(j.clone(), at(3)),
                        Access::read(j.clone(), at(3)),
                        Access::read(n, at(3)),
                    ]),
            )
            .unwrap();
        g.add_node_under(
            l2,
            Node::cu(NodeId::new(3), span(4, 6), 6).with_accesses([
                Access::read(b, at(4)),
                Access::write(t.clone(), at(4)),
                Access::read(t.clone(), at(5)),
                Access::read(s, at(5)),
                Access::write(a, at(5)),
                Access::read(sum.clone(), at(6)),
                Access::write(sum, at(6)),
                Access::write(last.clone(), at(6)),
                Access::read(j, at(6)),
                Access::read(i, at(6)),
            ]),
        )
        .unwrap();
        g.add_node_under(
            f,
            Node::cu(NodeId::new(4), span(15, 15), 1).with_access(Access::read(last, at(15))),
        )
        .unwrap();
        g
    }

    fn build(g: &PetGraph, id: u64, reductions: Vec<Variable>) -> GpuLoopPattern {
        let candidate = Candidate { node_id: NodeId::new(id), reduction_vars: reductions };
        let mut p = GpuLoopPattern::new(g, &candidate, "/src/project").unwrap();
        p.find_nested_loops(g).unwrap();
        p.set_parent_loop(g).unwrap();
        p.classify_loop_vars(g).unwrap();
        p
    }

    #[test]
    fn test_nesting_and_parent() {
        let g = make_graph();
        let outer = build(&g, 1, vec![]);
        assert_eq!(outer.nested_loops, vec![NodeId::new(2)]);
        assert_eq!(outer.parent_loop, None);

        let inner = build(&g, 2, vec![]);
        assert!(inner.nested_loops.is_empty());
        assert_eq!(inner.parent_loop, Some(NodeId::new(1)));
        assert_eq!(inner.project_path, "/src/project");
    }

    #[test]
    fn test_variable_roles() {
        let g = make_graph();
        let p = build(&g, 2, vec![Variable::new("sum", "double").with_operation("+")]);

        assert_eq!(p.role("sum"), Some(VarRole::Reduction));
        assert_eq!(p.role("t"), Some(VarRole::Private));
        assert_eq!(p.role("j"), Some(VarRole::Private));
        assert_eq!(p.role("A"), Some(VarRole::Shared));
        assert_eq!(p.role("B"), Some(VarRole::Shared));
        assert_eq!(p.role("s"), Some(VarRole::Shared));
        assert_eq!(p.role("i"), Some(VarRole::Shared));
        assert_eq!(p.role("last"), Some(VarRole::LastPrivate));
        assert_eq!(p.roles.len(), 9);
    }

    #[test]
    fn test_every_touched_variable_has_one_role() {
        let g = make_graph();
        let p = build(&g, 1, vec![]);
        let touched: BTreeSet<String> = g
            .subtree_accesses(NodeId::new(1))
            .unwrap()
            .iter()
            .map(|a| a.variable.name.clone())
            .collect();
        let classified: BTreeSet<String> = p.roles.keys().cloned().collect();
        assert_eq!(touched, classified);
        assert_eq!(p.role("i"), Some(VarRole::Private));
    }

    #[test]
    fn test_collapse_clause() {
        let g = make_graph();
        let both: BTreeSet<NodeId> = [NodeId::new(1), NodeId::new(2)].into_iter().collect();

        let mut p = build(&g, 1, vec![]);
        p.set_collapse_clause(&g, &both, &DefaultLegality, 3).unwrap();
        assert_eq!(p.collapse, Some(2));

        p.set_collapse_clause(&g, &both, &DefaultLegality, 1).unwrap();
        assert_eq!(p.collapse, Some(1));

        let only_outer: BTreeSet<NodeId> = [NodeId::new(1)].into_iter().collect();
        p.set_collapse_clause(&g, &only_outer, &DefaultLegality, 3).unwrap();
        assert_eq!(p.collapse, Some(1));

        let mut inner = build(&g, 2, vec![]);
        inner.set_collapse_clause(&g, &both, &DefaultLegality, 3).unwrap();
        assert_eq!(inner.collapse_depth(), 1);
    }

    #[test]
    fn test_unknown_candidate_is_error() {
        let g = make_graph();
        let candidate = Candidate { node_id: NodeId::new(42), reduction_vars: vec![] };
        assert!(GpuLoopPattern::new(&g, &candidate, "").is_err());
        let candidate = Candidate { node_id: NodeId::new(3), reduction_vars: vec![] };
        assert!(GpuLoopPattern::new(&g, &candidate, "").is_err());
    }
}
