//! Nodes of the program graph.

use crate::graph::variable::Variable;
use crate::utils::location::{LineId, LineSpan};
use serde::{Deserialize, Serialize};

/// A unique identifier for graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Aggregate runtime statistics of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopData {
    /// Mean number of iterations per entry
    pub average_iteration_count: i64,
    /// Iterations summed over all entries
    pub total_iteration_count: i64,
    /// Number of times the loop was entered
    pub entry_count: i64,
}

impl LoopData {
    pub fn new(average_iteration_count: i64, total_iteration_count: i64, entry_count: i64) -> Self {
        Self { average_iteration_count, total_iteration_count, entry_count }
    }

    /// Every entry ran the same number of iterations.
    pub fn has_constant_trip_count(&self) -> bool {
        self.entry_count > 0
            && self.average_iteration_count.checked_mul(self.entry_count)
                == Some(self.total_iteration_count)
    }
}

/// What a node represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// A loop; statistics are absent when the profiler never recorded it
    Loop {
        #[serde(default)]
        loop_data: Option<LoopData>,
    },
    /// A function body
    Function,
    /// A computational unit: straight-line statements
    Cu {
        #[serde(default)]
        instructions: u64,
    },
}

/// Read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

/// A single memory access performed by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    /// Variable being accessed
    pub variable: Variable,
    /// Access type
    pub kind: AccessKind,
    /// Where the access happens
    pub line: LineId,
}

impl Access {
    pub fn read(variable: Variable, line: LineId) -> Self {
        Self { variable, kind: AccessKind::Read, line }
    }

    pub fn write(variable: Variable, line: LineId) -> Self {
        Self { variable, kind: AccessKind::Write, line }
    }

    pub fn is_read(&self) -> bool {
        self.kind == AccessKind::Read
    }

    pub fn is_write(&self) -> bool {
        self.kind == AccessKind::Write
    }
}

/// A vertex of the program graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// First source line
    pub start_line: LineId,
    /// Last source line
    pub end_line: LineId,
    /// Node variant
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Accesses performed by the node itself, in program order. For loops
    /// these are the header accesses (init, condition, increment).
    #[serde(default)]
    pub accesses: Vec<Access>,
}

impl Node {
    fn new(id: NodeId, name: impl Into<String>, span: LineSpan, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            start_line: span.start,
            end_line: span.end,
            kind,
            accesses: Vec::new(),
        }
    }

    /// Create a loop node without statistics.
    pub fn loop_node(id: NodeId, name: impl Into<String>, span: LineSpan) -> Self {
        Self::new(id, name, span, NodeKind::Loop { loop_data: None })
    }

    /// Create a function node.
    pub fn function(id: NodeId, name: impl Into<String>, span: LineSpan) -> Self {
        Self::new(id, name, span, NodeKind::Function)
    }

    /// Create a computational unit.
    pub fn cu(id: NodeId, span: LineSpan, instructions: u64) -> Self {
        Self::new(id, format!("cu{}", id.0), span, NodeKind::Cu { instructions })
    }

    /// Attach loop statistics. No effect on non-loop nodes.
    pub fn with_loop_data(mut self, data: LoopData) -> Self {
        if let NodeKind::Loop { loop_data } = &mut self.kind {
            *loop_data = Some(data);
        }
        self
    }

    /// Append an access.
    pub fn with_access(mut self, access: Access) -> Self {
        self.accesses.push(access);
        self
    }

    /// Append several accesses.
    pub fn with_accesses(mut self, accesses: impl IntoIterator<Item = Access>) -> Self {
        self.accesses.extend(accesses);
        self
    }

    pub fn span(&self) -> LineSpan {
        LineSpan::new(self.start_line, self.end_line)
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, NodeKind::Loop { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, NodeKind::Function)
    }

    /// Loop statistics; `None` for non-loops and loops without statistics.
    pub fn loop_data(&self) -> Option<&LoopData> {
        match &self.kind {
            NodeKind::Loop { loop_data } => loop_data.as_ref(),
            NodeKind::Function | NodeKind::Cu { .. } => None,
        }
    }
}
