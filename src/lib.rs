//! # GpuOpt - GPU-Offload Region Discovery
//!
//! Finds loop regions of a profiled program that can be offloaded to an
//! accelerator, including:
//! - Candidate selection from do-all and reduction detection results
//! - Loop nest reconstruction and variable role classification
//! - Merging of nested and adjacent loops into offload regions
//! - Data-mapping inference (to, from, tofrom, alloc)
//! - OpenMP target directive suggestions
//!
//! ## Architecture
//!
//! ```text
//! PetGraph + DetectionResult → Candidates → Loop descriptors → Regions → Region records
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use gpuopt::prelude::*;
//!
//! let graph = PetGraph::from_json(&std::fs::read_to_string("graph.json")?)?;
//! let detected = DetectionResult::from_json(&std::fs::read_to_string("patterns.json")?)?;
//!
//! for region in gpuopt::run_detection(&graph, &detected, "/path/to/project")? {
//!     println!("{}", region.to_json()?);
//! }
//! ```

#![warn(clippy::all)]

pub mod analysis;
pub mod graph;
pub mod patterns;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{DetectionResult, DoAllInfo, ReductionInfo};
    pub use crate::graph::{
        Access, AccessKind, InstructionWorkload, LoopData, Node, NodeId, NodeKind, PetGraph,
        Variable, WorkloadEstimator,
    };
    pub use crate::patterns::gpu::{
        DefaultLegality, DetectorConfig, GpuPatternDetector, GpuRegionInfo, Legality,
        MapDirection,
    };
    pub use crate::patterns::PatternInfo;
    pub use crate::utils::errors::*;
    pub use crate::utils::location::{LineId, LineSpan};
}

use anyhow::Result;

/// Run GPU-offload detection with the default configuration.
pub fn run_detection(
    graph: &graph::PetGraph,
    res: &analysis::DetectionResult,
    project_path: &str,
) -> Result<Vec<patterns::gpu::GpuRegionInfo>> {
    patterns::gpu::GpuPatternDetector::default().run(graph, res, project_path)
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
