//! The record every pattern detector produces.

use crate::graph::{Node, NodeId, PetGraph, WorkloadEstimator};
use crate::utils::errors::{GpuOptError, GraphResult};
use crate::utils::location::LineId;
use crate::utils::serde_ext::{memo, or_placeholder};
use once_cell::unsync::OnceCell;
use serde::Serialize;

/// Identity, position and loop statistics of a detected pattern.
///
/// Loop statistics are `-1` when the node is not a loop or was never
/// profiled. The workload is computed on first request and cached; the
/// estimator runs at most once per instance.
#[derive(Debug, Clone, Serialize)]
pub struct PatternInfo {
    /// Node the pattern was detected at
    pub node_id: NodeId,
    /// First source line
    pub start_line: LineId,
    /// Last source line
    pub end_line: LineId,
    /// Total iterations over all entries
    pub iterations_count: i64,
    /// Mean iterations per entry
    pub average_iteration_count: i64,
    /// Number of entries
    pub entries: i64,
    /// Reserved; never computed
    pub instructions_count: Option<i64>,
    #[serde(serialize_with = "memo")]
    workload: OnceCell<i64>,
}

impl PatternInfo {
    /// Create the record for `node`. Never fails.
    pub fn new(node: &Node) -> Self {
        let (average_iteration_count, iterations_count, entries) = match node.loop_data() {
            Some(d) => (d.average_iteration_count, d.total_iteration_count, d.entry_count),
            None => (-1, -1, -1),
        };
        Self {
            node_id: node.id,
            start_line: node.start_line,
            end_line: node.end_line,
            iterations_count,
            average_iteration_count,
            entries,
            instructions_count: None,
            workload: OnceCell::new(),
        }
    }

    /// Workload of the originating node, computed at most once.
    pub fn get_workload<E>(&self, graph: &PetGraph, estimator: &E) -> GraphResult<i64>
    where
        E: WorkloadEstimator + ?Sized,
    {
        self.workload
            .get_or_try_init(|| estimator.calculate_workload(graph, self.node_id))
            .copied()
    }

    /// Workload if it has already been computed.
    pub fn workload(&self) -> Option<i64> {
        self.workload.get().copied()
    }

    /// Render the record as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, GpuOptError> {
        to_json(self)
    }
}

/// Pretty-print any pattern record; values JSON cannot hold become
/// placeholders instead of errors.
pub(crate) fn to_json<T: Serialize>(record: &T) -> Result<String, GpuOptError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::pretty(&mut buf);
    or_placeholder(record, &mut ser)?;
    String::from_utf8(buf).map_err(|e| GpuOptError::Internal(e.to_string()))
}
