//! Program graph consumed by the pattern detectors.
//!
//! The graph is produced upstream from instrumentation traces; this module
//! only models it:
//! - Nodes (functions, loops, computational units) with profiling statistics
//! - Variables and the memory accesses of each node
//! - Containment queries (parents, nested loops, program-order accesses)
//! - Workload estimation

pub mod node;
pub mod variable;
pub mod pet;
pub mod workload;

pub use node::{Access, AccessKind, LoopData, Node, NodeId, NodeKind};
pub use pet::{GraphDocument, PetGraph};
pub use variable::{VarScope, Variable};
pub use workload::{InstructionWorkload, WorkloadEstimator};
