//! The program execution tree (PET) graph.
//!
//! Nodes are functions, loops and computational units (CUs); edges are
//! containment (`parent -> child`). The graph is a forest: every node has at
//! most one parent. All queries return nodes in a deterministic order, by
//! source position and then by id, so that everything built on top of the
//! graph is independent of insertion order.

use crate::graph::node::{Access, Node, NodeId};
use crate::utils::errors::{GpuOptError, GraphError, GraphResult};
use crate::utils::location::{LineId, LineSpan};
use once_cell::unsync::OnceCell;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Program graph with containment edges.
#[derive(Debug, Clone, Default)]
pub struct PetGraph {
    graph: DiGraph<Node, ()>,
    index: BTreeMap<NodeId, NodeIndex>,
    order: OnceCell<ProgramOrder>,
}

/// Preorder numbering of the forest and every access in program order.
/// Built on the first structural query, dropped on mutation.
#[derive(Debug, Clone, Default)]
struct ProgramOrder {
    /// Nodes in preorder, children in source order
    preorder: Vec<NodeIndex>,
    /// `[first, end)` range of preorder positions covered by each subtree
    extent: BTreeMap<NodeId, (usize, usize)>,
    /// `(preorder position of the owner, index into its accesses)`, sorted
    /// by line, stable in preorder
    accesses: Vec<(usize, usize)>,
}

/// Flat, serializable form of a [`PetGraph`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    /// All nodes
    pub nodes: Vec<Node>,
    /// Containment edges as `(parent, child)` pairs
    #[serde(default)]
    pub children: Vec<(NodeId, NodeId)>,
}

impl PetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Ids must be unique.
    pub fn add_node(&mut self, node: Node) -> GraphResult<NodeId> {
        let id = node.id;
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        self.order.take();
        Ok(id)
    }

    /// Record that `child` is lexically contained in `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> GraphResult<()> {
        let p = self.idx(parent)?;
        let c = self.idx(child)?;
        self.graph.update_edge(p, c, ());
        self.order.take();
        Ok(())
    }

    /// Insert a node as a child of an existing node.
    pub fn add_node_under(&mut self, parent: NodeId, node: Node) -> GraphResult<NodeId> {
        self.idx(parent)?;
        let id = self.add_node(node)?;
        self.add_child(parent, id)?;
        Ok(id)
    }

    fn idx(&self, id: NodeId) -> GraphResult<NodeIndex> {
        self.index.get(&id).copied().ok_or(GraphError::UnknownNode(id))
    }

    fn source_key(&self, idx: NodeIndex) -> (LineId, NodeId) {
        let n = &self.graph[idx];
        (n.start_line, n.id)
    }

    fn program_order(&self) -> &ProgramOrder {
        self.order.get_or_init(|| self.build_program_order())
    }

    fn build_program_order(&self) -> ProgramOrder {
        let mut roots: Vec<NodeIndex> = self
            .index
            .values()
            .copied()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect();
        roots.sort_by_key(|&idx| self.source_key(idx));
        // nodes only reachable through a containment cycle come last
        roots.extend(self.index.values().copied());

        let mut order = ProgramOrder::default();
        let mut visited = vec![false; self.graph.node_count()];
        for root in roots {
            let mut stack = vec![(root, false)];
            while let Some((idx, exiting)) = stack.pop() {
                if exiting {
                    let end = order.preorder.len();
                    if let Some(extent) = order.extent.get_mut(&self.graph[idx].id) {
                        extent.1 = end;
                    }
                    continue;
                }
                if visited[idx.index()] {
                    continue;
                }
                visited[idx.index()] = true;
                let first = order.preorder.len();
                order.extent.insert(self.graph[idx].id, (first, first));
                order.preorder.push(idx);
                stack.push((idx, true));

                let mut children: Vec<NodeIndex> = self
                    .graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .collect();
                children.sort_by_key(|&c| self.source_key(c));
                stack.extend(children.into_iter().rev().map(|c| (c, false)));
            }
        }

        let mut accesses: Vec<(usize, usize)> = order
            .preorder
            .iter()
            .enumerate()
            .flat_map(|(pos, &idx)| (0..self.graph[idx].accesses.len()).map(move |i| (pos, i)))
            .collect();
        accesses.sort_by_key(|&(pos, i)| self.graph[order.preorder[pos]].accesses[i].line);
        order.accesses = accesses;
        order
    }

    fn extent(&self, id: NodeId) -> GraphResult<(usize, usize)> {
        self.idx(id)?;
        self.program_order()
            .extent
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownNode(id))
    }

    fn access_at(&self, order: &ProgramOrder, (pos, i): (usize, usize)) -> &Access {
        &self.graph[order.preorder[pos]].accesses[i]
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get a node by ID.
    pub fn node(&self, id: NodeId) -> GraphResult<&Node> {
        Ok(&self.graph[self.idx(id)?])
    }

    /// Get a loop node by ID.
    pub fn loop_node(&self, id: NodeId) -> GraphResult<&Node> {
        let node = self.node(id)?;
        if node.is_loop() {
            Ok(node)
        } else {
            Err(GraphError::NotALoop(id))
        }
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.index.values().map(move |&idx| &self.graph[idx])
    }

    /// All loop nodes in id order.
    pub fn loops(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.is_loop())
    }

    /// Direct children in source order.
    pub fn children(&self, id: NodeId) -> GraphResult<Vec<&Node>> {
        let idx = self.idx(id)?;
        let mut children: Vec<&Node> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|c| &self.graph[c])
            .collect();
        children.sort_by_key(|n| (n.start_line, n.id));
        Ok(children)
    }

    /// The containing node, if any.
    pub fn parent(&self, id: NodeId) -> GraphResult<Option<&Node>> {
        let idx = self.idx(id)?;
        Ok(self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|p| &self.graph[p])
            .min_by_key(|n| n.id))
    }

    /// All containing nodes, nearest first.
    pub fn ancestors(&self, id: NodeId) -> GraphResult<Vec<&Node>> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.parent(id)?;
        while let Some(node) = current {
            if !seen.insert(node.id) {
                break;
            }
            chain.push(node);
            current = self.parent(node.id)?;
        }
        Ok(chain)
    }

    /// Nearest enclosing loop. Stops at function boundaries.
    pub fn parent_loop(&self, id: NodeId) -> GraphResult<Option<NodeId>> {
        Ok(self
            .ancestors(id)?
            .into_iter()
            .take_while(|n| !n.is_function())
            .find(|n| n.is_loop())
            .map(|n| n.id))
    }

    /// All enclosing loops up to the function boundary, nearest first.
    pub fn enclosing_loops(&self, id: NodeId) -> GraphResult<Vec<&Node>> {
        Ok(self
            .ancestors(id)?
            .into_iter()
            .take_while(|n| !n.is_function())
            .filter(|n| n.is_loop())
            .collect())
    }

    /// Nearest enclosing function.
    pub fn enclosing_function(&self, id: NodeId) -> GraphResult<Option<&Node>> {
        Ok(self.ancestors(id)?.into_iter().find(|n| n.is_function()))
    }

    /// Check whether `node` is (transitively) contained in `ancestor`.
    pub fn is_descendant(&self, ancestor: NodeId, node: NodeId) -> GraphResult<bool> {
        let (first, end) = self.extent(ancestor)?;
        let (pos, _) = self.extent(node)?;
        Ok(pos > first && pos < end)
    }

    /// The node and all its descendants, depth-first, children in source order.
    pub fn subtree(&self, id: NodeId) -> GraphResult<Vec<&Node>> {
        let (first, end) = self.extent(id)?;
        Ok(self.program_order().preorder[first..end]
            .iter()
            .map(|&idx| &self.graph[idx])
            .collect())
    }

    /// Loops strictly inside `id`, depth-first in source order.
    pub fn nested_loops(&self, id: NodeId) -> GraphResult<Vec<NodeId>> {
        Ok(self
            .subtree(id)?
            .into_iter()
            .skip(1)
            .filter(|n| n.is_loop())
            .map(|n| n.id)
            .collect())
    }

    /// Accesses performed anywhere in the subtree of `id`, in program order.
    pub fn subtree_accesses(&self, id: NodeId) -> GraphResult<Vec<&Access>> {
        let (first, end) = self.extent(id)?;
        let order = self.program_order();
        Ok(order
            .accesses
            .iter()
            .filter(|(pos, _)| (first..end).contains(pos))
            .map(|&at| self.access_at(order, at))
            .collect())
    }

    /// Accesses of the subtree of `scope` that fall outside `span`, in
    /// program order, split into those before and those after the span.
    pub fn accesses_around(
        &self,
        scope: NodeId,
        span: &LineSpan,
    ) -> GraphResult<(Vec<&Access>, Vec<&Access>)> {
        let all = self.subtree_accesses(scope)?;
        let before = all.iter().copied().filter(|a| a.line < span.start).collect();
        let after = all.iter().copied().filter(|a| a.line > span.end).collect();
        Ok((before, after))
    }

    /// Accesses of every node in the graph, in program order.
    pub fn all_accesses(&self) -> Vec<&Access> {
        let order = self.program_order();
        order
            .accesses
            .iter()
            .map(|&at| self.access_at(order, at))
            .collect()
    }

    /// Build a graph from its flat form.
    pub fn from_document(doc: GraphDocument) -> GraphResult<Self> {
        let mut graph = Self::new();
        for node in doc.nodes {
            graph.add_node(node)?;
        }
        for (parent, child) in doc.children {
            graph.add_child(parent, child)?;
        }
        Ok(graph)
    }

    /// Flatten the graph.
    pub fn to_document(&self) -> GraphDocument {
        let nodes = self.nodes().cloned().collect();
        let mut children: Vec<(NodeId, NodeId)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(p, c)| (self.graph[p].id, self.graph[c].id))
            .collect();
        children.sort();
        GraphDocument { nodes, children }
    }

    /// Parse a graph from JSON.
    pub fn from_json(json: &str) -> Result<Self, GpuOptError> {
        let doc: GraphDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(doc)?)
    }

    /// Render the graph as JSON.
    pub fn to_json(&self) -> Result<String, GpuOptError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }
}
