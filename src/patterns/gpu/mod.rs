//! GPU-offload pattern detection.
//!
//! Turns do-all and reduction loops into offload regions:
//! - Candidate selection from upstream detection results
//! - Per-loop descriptors (nesting, variable roles, collapse depth)
//! - Region identification and merging
//! - Data-mapping inference from liveness across region boundaries
//! - Region records with suggested directives

pub mod candidates;
pub mod detector;
pub mod gpu_loop;
pub mod legality;
pub mod liveness;
pub mod region_info;
pub mod regions;

pub use candidates::{select_candidates, Candidate};
pub use detector::{DetectorConfig, GpuPatternDetector};
pub use gpu_loop::{GpuLoopPattern, VarRole};
pub use legality::{DefaultLegality, Legality};
pub use region_info::{GpuRegionInfo, LoopDirective};
pub use regions::{GpuRegion, GpuRegions, MapDirection};
