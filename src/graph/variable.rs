//! Program variables as seen by the profiler.

use crate::utils::location::LineId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarScope {
    /// Function-local storage (including parameters)
    #[default]
    Local,
    /// Global storage, visible outside every region
    Global,
}

/// A program variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    /// Source-level name
    pub name: String,
    /// Declared type as written in the source (`int`, `double*`, `float[64]`)
    #[serde(rename = "type")]
    pub ty: String,
    /// Storage scope
    #[serde(default)]
    pub scope: VarScope,
    /// Line of the declaration, if known
    #[serde(default)]
    pub def_line: Option<LineId>,
    /// Whether the address of the variable is taken somewhere
    #[serde(default)]
    pub address_taken: bool,
    /// Reduction operator (only set on reduction records)
    #[serde(default)]
    pub operation: Option<String>,
}

impl Variable {
    /// Create a function-local variable.
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            scope: VarScope::Local,
            def_line: None,
            address_taken: false,
            operation: None,
        }
    }

    /// Create a global variable.
    pub fn global(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            scope: VarScope::Global,
            ..Self::new(name, ty)
        }
    }

    /// Set the declaration line.
    pub fn with_def_line(mut self, line: LineId) -> Self {
        self.def_line = Some(line);
        self
    }

    /// Set the reduction operator.
    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    /// Mark the variable as address-taken.
    pub fn with_address_taken(mut self) -> Self {
        self.address_taken = true;
        self
    }

    /// Array or pointer storage: accessed element-wise, never privatized.
    pub fn is_aggregate(&self) -> bool {
        self.ty.contains('*') || self.ty.contains('[')
    }

    /// Whether the storage stays observable after any region that writes it.
    pub fn escapes(&self) -> bool {
        self.scope == VarScope::Global || self.address_taken || self.ty.contains('*')
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}
