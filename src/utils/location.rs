//! Source positions as recorded by the profiler.
//!
//! Positions are `file:line` pairs. Files are numbered by the profiler, so a
//! position only compares meaningfully against positions of the same file;
//! ordering is nonetheless total (file first, then line) which keeps every
//! sort in the analysis deterministic.

use crate::utils::errors::GraphError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A source position (`file:line`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LineId {
    /// File number assigned by the profiler
    pub file: u32,
    /// Line number (1-indexed)
    pub line: u32,
}

impl LineId {
    /// Create a new position.
    pub fn new(file: u32, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl FromStr for LineId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GraphError::InvalidLineId(s.to_string());
        let (file, line) = s.trim().split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            file: file.parse().map_err(|_| invalid())?,
            line: line.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for LineId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An inclusive range of source positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LineSpan {
    /// First line
    pub start: LineId,
    /// Last line
    pub end: LineId,
}

impl LineSpan {
    /// Create a new span.
    pub fn new(start: LineId, end: LineId) -> Self {
        Self { start, end }
    }

    /// Check if this span contains a position.
    pub fn contains(&self, line: &LineId) -> bool {
        self.start <= *line && *line <= self.end
    }

    /// Check if this span fully contains another span.
    pub fn encloses(&self, other: &LineSpan) -> bool {
        self.contains(&other.start) && self.contains(&other.end)
    }

    /// Merge two spans to create a span covering both.
    pub fn merge(&self, other: &LineSpan) -> LineSpan {
        LineSpan {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
