use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::errors::{NetworkError, Result};

/// Bound shared by everything that can identify a node, an attribute or a value.
///
/// Plain datasets use `String`, index-encoded datasets use `u32`.
pub trait Key: Clone + Ord + Hash + fmt::Debug + Send + Sync {}

impl<T> Key for T where T: Clone + Ord + Hash + fmt::Debug + Send + Sync {}

pub type AttributeMap<T> = BTreeMap<T, BTreeSet<T>>;

/// The part of the graph an artifact is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Scope {
    Community(usize),
    Network,
}

impl Scope {
    /// File name stem (without extension) of the artifacts written for this scope.
    pub fn file_stem(&self, prefix: &str) -> String {
        match self {
            Scope::Community(i) => format!("{prefix}community_{i}"),
            Scope::Network => format!("{prefix}network"),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Community(i) => write!(f, "community {i}"),
            Scope::Network => write!(f, "entire network"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<T> {
    pub id: T,
    pub attributes: AttributeMap<T>,
}

impl<T: Key> Node<T> {
    pub fn new(id: T) -> Self {
        Node {
            id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, attribute: T, value: T) -> Self {
        self.insert(attribute, value);
        self
    }

    pub fn insert(&mut self, attribute: T, value: T) {
        self.attributes.entry(attribute).or_default().insert(value);
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.values().all(|values| values.is_empty())
    }
}

/// An attribute value shared by the two endpoints of an edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeMatch<T> {
    pub attribute: T,
    pub value: T,
}

/// The loaded records: nodes in load order plus the columns eligible for comparison.
#[derive(Debug, Clone)]
pub struct Dataset<T> {
    columns: Vec<T>,
    nodes: Vec<Node<T>>,
}

impl<T: Key> Dataset<T> {
    /// Creates a dataset, merging the values of nodes that share an identifier
    /// and dropping nodes left without any value.
    ///
    /// Fails with [`NetworkError::EmptyDataset`] when there are no nodes or no
    /// eligible columns.
    pub fn new(columns: Vec<T>, nodes: Vec<Node<T>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(NetworkError::EmptyDataset(
                "no attribute columns eligible for comparison".to_string(),
            ));
        }
        let mut merged: Vec<Node<T>> = Vec::with_capacity(nodes.len());
        let mut positions: HashMap<T, usize> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if let Some(&pos) = positions.get(&node.id) {
                for (attribute, values) in node.attributes {
                    merged[pos]
                        .attributes
                        .entry(attribute)
                        .or_default()
                        .extend(values);
                }
            } else {
                positions.insert(node.id.clone(), merged.len());
                merged.push(node);
            }
        }
        merged.retain(|node| !node.is_empty());
        if merged.is_empty() {
            return Err(NetworkError::EmptyDataset("no nodes".to_string()));
        }
        Ok(Dataset {
            columns,
            nodes: merged,
        })
    }

    /// Builds a dataset from an in-memory node → attribute map structure.
    ///
    /// Every attribute present on any node becomes an eligible column.
    pub fn from_map(map: BTreeMap<T, AttributeMap<T>>) -> Result<Self> {
        let columns: BTreeSet<T> = map
            .values()
            .flat_map(|attributes| attributes.keys().cloned())
            .collect();
        let nodes = map
            .into_iter()
            .map(|(id, attributes)| Node { id, attributes })
            .collect();
        Dataset::new(columns.into_iter().collect(), nodes)
    }

    pub fn columns(&self) -> &[T] {
        &self.columns
    }

    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node<T> {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Turns keys back into the strings written to artifacts.
pub trait Labeling<T>: Sync {
    fn node_name(&self, id: &T) -> String;

    fn attribute_name(&self, attribute: &T) -> String;

    fn value_name(&self, attribute: &T, value: &T) -> String;

    fn match_label(&self, m: &AttributeMatch<T>) -> String {
        format!(
            "{}: {}",
            self.attribute_name(&m.attribute),
            self.value_name(&m.attribute, &m.value)
        )
    }

    /// All matches of an edge as one sorted, comma separated label.
    fn edge_label(&self, matches: &BTreeSet<AttributeMatch<T>>) -> String {
        let mut items: Vec<String> = matches.iter().map(|m| self.match_label(m)).collect();
        items.sort();
        items.join(", ")
    }
}

/// Labeling for datasets that were not index-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl Labeling<String> for Verbatim {
    fn node_name(&self, id: &String) -> String {
        id.clone()
    }

    fn attribute_name(&self, attribute: &String) -> String {
        attribute.clone()
    }

    fn value_name(&self, _attribute: &String, value: &String) -> String {
        value.clone()
    }
}
