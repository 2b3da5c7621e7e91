//! Utility modules for the offload analysis.
//!
//! This module contains common utilities used throughout the codebase:
//! - Error types
//! - Source positions
//! - Serialization helpers

pub mod errors;
pub mod location;
pub mod serde_ext;

// Re-exports
pub use errors::*;
pub use location::{LineId, LineSpan};
pub use serde_ext::NOT_SERIALIZABLE;
