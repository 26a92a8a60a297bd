use std::collections::BTreeMap;

use petgraph::unionfind::UnionFind;

use crate::edges::Edge;

/// A maximal connected set of nodes, by dataset position, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Community {
    pub members: Vec<usize>,
}

impl Community {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.members.binary_search(&node).is_ok()
    }
}

/// Connected components over the given edge endpoints.
///
/// Nodes that touch no edge are in no community. The result does not depend
/// on the order of `edges`: communities are sorted by their smallest member.
pub fn detect_communities<I>(node_count: usize, edges: I) -> Vec<Community>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut sets = UnionFind::<usize>::new(node_count);
    let mut touched = vec![false; node_count];
    for (a, b) in edges {
        touched[a] = true;
        touched[b] = true;
        sets.union(a, b);
    }

    // keyed by root, members are pushed in ascending order
    let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for node in (0..node_count).filter(|&n| touched[n]) {
        by_root.entry(sets.find_mut(node)).or_default().push(node);
    }
    let mut communities: Vec<Community> = by_root
        .into_values()
        .map(|members| Community { members })
        .collect();
    communities.sort_by_key(|c| c.members[0]);
    communities
}

/// Index of the community each node belongs to, `None` for isolated nodes.
pub fn membership(node_count: usize, communities: &[Community]) -> Vec<Option<usize>> {
    let mut result = vec![None; node_count];
    for (i, community) in communities.iter().enumerate() {
        for &node in &community.members {
            result[node] = Some(i);
        }
    }
    result
}

/// Groups edge indices by the community of their endpoints.
pub fn edges_by_community<T>(
    edges: &[Edge<T>],
    node_count: usize,
    communities: &[Community],
) -> Vec<Vec<usize>> {
    let membership = membership(node_count, communities);
    let mut grouped = vec![Vec::new(); communities.len()];
    for (i, edge) in edges.iter().enumerate() {
        // both endpoints share a community, so either one decides
        if let Some(c) = membership[edge.a] {
            grouped[c].push(i);
        }
    }
    grouped
}
