use std::collections::BTreeSet;

use crate::errors::{NetworkError, Result};
use crate::pairs::PairSpill;
use crate::types::{AttributeMatch, Dataset, Key, Node};
use crate::CancellationToken;

/// Link between two nodes (by dataset position, `a < b`) and the values they share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<T> {
    pub a: usize,
    pub b: usize,
    pub label: BTreeSet<AttributeMatch<T>>,
}

impl<T> Edge<T> {
    /// Number of attribute matches.
    pub fn weight(&self) -> usize {
        self.label.len()
    }

    pub fn endpoints(&self) -> (usize, usize) {
        (self.a, self.b)
    }
}

/// Every `(attribute, value)` present in both nodes, restricted to `columns`.
pub fn shared_matches<T: Key>(
    first: &Node<T>,
    second: &Node<T>,
    columns: &[T],
) -> BTreeSet<AttributeMatch<T>> {
    let mut matches = BTreeSet::new();
    for column in columns {
        if let (Some(x), Some(y)) = (first.attributes.get(column), second.attributes.get(column)) {
            for value in x.intersection(y) {
                matches.insert(AttributeMatch {
                    attribute: column.clone(),
                    value: value.clone(),
                });
            }
        }
    }
    matches
}

/// Builds the edge between the nodes at positions `a` and `b`, if they share anything.
pub fn build_edge<T: Key>(dataset: &Dataset<T>, a: usize, b: usize) -> Option<Edge<T>> {
    let label = shared_matches(dataset.node(a), dataset.node(b), dataset.columns());
    if label.is_empty() {
        None
    } else {
        Some(Edge { a, b, label })
    }
}

/// Consumes a pair spill and collects the edges in pair order.
///
/// The cancellation token is checked before every batch.
pub fn build_edges<T: Key>(
    dataset: &Dataset<T>,
    spill: PairSpill,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Edge<T>>> {
    let mut edges = Vec::new();
    for batch in spill.batches(batch_size) {
        if cancel.is_cancelled() {
            return Err(NetworkError::Cancelled);
        }
        for (a, b) in batch? {
            if let Some(edge) = build_edge(dataset, a, b) {
                edges.push(edge);
            }
        }
    }
    Ok(edges)
}
