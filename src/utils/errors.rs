//! Error types for the offload analysis.
//!
//! Graph lookups fail with [`GraphError`], which always signals a broken
//! contract between this crate and whoever built the program graph. The
//! top-level [`GpuOptError`] wraps it together with serialization failures.

use crate::graph::NodeId;
use thiserror::Error;

/// Top-level error type for the analysis.
#[derive(Error, Debug)]
pub enum GpuOptError {
    /// The program graph violated an invariant
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal analysis error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Invariant violations raised by program graph queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A node id is referenced but not present in the graph
    #[error("node {0} is not part of the program graph")]
    UnknownNode(NodeId),

    /// A node was expected to be a loop
    #[error("node {0} is not a loop node")]
    NotALoop(NodeId),

    /// A node id was inserted twice
    #[error("node {0} is already part of the program graph")]
    DuplicateNode(NodeId),

    /// A `file:line` position could not be parsed
    #[error("invalid line id `{0}` (expected `<file>:<line>`)")]
    InvalidLineId(String),
}

/// Result type using GraphError.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type using GpuOptError.
pub type GpuOptResult<T> = Result<T, GpuOptError>;
