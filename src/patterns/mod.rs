//! Pattern detectors and the records they produce.

pub mod gpu;
pub mod pattern_info;

pub use pattern_info::PatternInfo;
