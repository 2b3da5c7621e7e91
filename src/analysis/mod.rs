//! Results of the upstream parallelism analyses.

pub mod detection;

pub use detection::{DetectionResult, DoAllInfo, ReductionInfo};
