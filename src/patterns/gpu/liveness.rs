//! Liveness of variables across a source span.
//!
//! A variable is live when leaving a span if some path from the span's exit
//! reads it before overwriting it. Paths are approximated by program order:
//! everything after the span in the enclosing function, plus, for every
//! enclosing loop, the rest of that loop's body followed by the part of the
//! body that precedes the span (the next iteration).

use crate::graph::{Access, NodeId, PetGraph};
use crate::utils::errors::GraphResult;
use crate::utils::location::LineSpan;
use std::collections::{BTreeMap, BTreeSet};

/// Names whose first access in `accesses` is a read.
pub fn read_first<'a, I>(accesses: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Access>,
{
    let mut first: BTreeMap<&str, bool> = BTreeMap::new();
    for a in accesses {
        first.entry(a.variable.name.as_str()).or_insert(a.is_read());
    }
    first
        .into_iter()
        .filter(|(_, is_read)| *is_read)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Variables that may be read after control leaves `span`.
///
/// `node` is any node inside the span; it anchors the search for the
/// enclosing function and loops.
pub fn live_out(graph: &PetGraph, node: NodeId, span: &LineSpan) -> GraphResult<BTreeSet<String>> {
    let after: Vec<&Access> = match graph.enclosing_function(node)? {
        Some(f) => graph.accesses_around(f.id, span)?.1,
        None => graph
            .all_accesses()
            .into_iter()
            .filter(|a| a.line > span.end)
            .collect(),
    };
    let mut live = read_first(after);

    for l in graph.enclosing_loops(node)? {
        let (before, after) = graph.accesses_around(l.id, span)?;
        live.extend(read_first(after.into_iter().chain(before)));
    }

    Ok(live)
}
