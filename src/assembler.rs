use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::edges::Edge;
use crate::errors::{NetworkError, Result};
use crate::render::{EdgeOptions, RenderEdge, RenderOptions, Renderer};
use crate::types::{Dataset, Key, Labeling, Scope};
use crate::weights::ScopeWeights;

/// One row of the exported edge table. `weight` holds the scaled edge width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub node_a: String,
    pub node_b: String,
    pub label: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub nodes_number: usize,
    pub edges_number: usize,
    /// Number of distinct edge labels.
    pub labels_number: usize,
}

impl std::ops::AddAssign for Summary {
    fn add_assign(&mut self, other: Summary) {
        self.nodes_number += other.nodes_number;
        self.edges_number += other.edges_number;
        self.labels_number += other.labels_number;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    pub table: PathBuf,
    /// The same rows as `table`, as a JSON array.
    pub table_json: PathBuf,
    pub record: PathBuf,
    pub rendered: PathBuf,
}

/// Everything produced for one scope. Written once, never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub scope: Scope,
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
    pub labels: Vec<String>,
    /// Match count per edge.
    pub weights: Vec<usize>,
    /// Widths scaled against the heaviest edge of this scope.
    pub widths: Vec<f64>,
    /// Widths of the same edges scaled against the heaviest edge of the entire graph.
    pub global_widths: Vec<f64>,
    pub summary: Summary,
    pub files: ArtifactFiles,
}

impl ArtifactRecord {
    pub fn table(&self) -> Vec<TableRow> {
        self.edges
            .iter()
            .zip(&self.labels)
            .zip(&self.widths)
            .map(|(((a, b), label), width)| TableRow {
                node_a: a.clone(),
                node_b: b.clone(),
                label: label.clone(),
                weight: *width,
            })
            .collect()
    }
}

/// Decoded edges of a scope, ready to be assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeEdges {
    pub endpoints: Vec<(String, String)>,
    pub labels: Vec<String>,
    pub weights: Vec<usize>,
    pub global_widths: Vec<f64>,
}

impl ScopeEdges {
    /// Collects the edges at `indices`, turning keys into names with `labeling`.
    ///
    /// `global_widths` is indexed like `edges`; when it is empty the scope gets
    /// no global widths.
    pub fn collect<T, L>(
        dataset: &Dataset<T>,
        edges: &[Edge<T>],
        indices: &[usize],
        global_widths: &[f64],
        labeling: &L,
    ) -> Self
    where
        T: Key,
        L: Labeling<T> + ?Sized,
    {
        let mut scope = ScopeEdges::default();
        for &i in indices {
            let edge = &edges[i];
            scope.endpoints.push((
                labeling.node_name(&dataset.node(edge.a).id),
                labeling.node_name(&dataset.node(edge.b).id),
            ));
            scope.labels.push(labeling.edge_label(&edge.label));
            scope.weights.push(edge.weight());
            if let Some(width) = global_widths.get(i) {
                scope.global_widths.push(*width);
            }
        }
        scope
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

pub fn write_table<P: AsRef<Path>>(path: P, rows: &[TableRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Vec<TableRow>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    reader
        .deserialize()
        .map(|row| row.map_err(crate::loader::row_error))
        .collect()
}

/// Writes a file so that it either appears complete or not at all.
pub(crate) fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(directory)?;
    file.write_all(content)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Produces and checkpoints the artifact of one scope.
pub struct Assembler<'a> {
    pub directory: &'a Path,
    pub prefix: &'a str,
    pub width_factor: f64,
    pub show_labels: bool,
    pub renderer: &'a dyn Renderer,
    /// Reuse checkpoints of scopes that were already completed.
    pub resume: bool,
}

impl Assembler<'_> {
    fn record_path(&self, scope: Scope) -> PathBuf {
        self.directory
            .join(format!("{}.json", scope.file_stem(self.prefix)))
    }

    /// Loads the checkpoint of a scope, if one was completed before.
    pub fn checkpoint(&self, scope: Scope) -> Result<Option<ArtifactRecord>> {
        let path = self.record_path(scope);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    pub fn assemble(&self, scope: Scope, edges: ScopeEdges) -> Result<ArtifactRecord> {
        if self.resume {
            if let Some(record) = self.checkpoint(scope)? {
                debug!("reusing checkpoint of {}", scope);
                return Ok(record);
            }
        }
        if edges.is_empty() {
            return Err(NetworkError::EmptyGraph { scope });
        }

        let ScopeEdges {
            endpoints,
            labels,
            weights,
            global_widths,
        } = edges;
        let weights = ScopeWeights::compute(weights, self.width_factor, scope)?;

        let nodes: Vec<String> = endpoints
            .iter()
            .flat_map(|(a, b)| [a, b])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect();

        let uniform = weights.is_uniform();
        let render_edges: Vec<RenderEdge> = endpoints
            .iter()
            .zip(&labels)
            .zip(&weights.widths)
            .map(|(((a, b), label), &width)| RenderEdge {
                source: a.clone(),
                target: b.clone(),
                options: EdgeOptions {
                    weight: width,
                    value: if uniform { None } else { Some(width) },
                    label: self.show_labels.then(|| label.clone()),
                },
            })
            .collect();
        let options = RenderOptions {
            scope,
            title: scope.to_string(),
            show_labels: self.show_labels,
        };
        let rendered = self
            .renderer
            .render(&nodes, &render_edges, &options)
            .map_err(|source| NetworkError::RenderFailure { scope, source })?;

        let summary = Summary {
            nodes_number: nodes.len(),
            edges_number: endpoints.len(),
            labels_number: labels.iter().collect::<BTreeSet<_>>().len(),
        };

        let stem = scope.file_stem(self.prefix);
        let files = ArtifactFiles {
            table: self.directory.join(format!("{stem}.csv")),
            table_json: self.directory.join(format!("{stem}_table.json")),
            record: self.record_path(scope),
            rendered: self
                .directory
                .join(format!("{stem}.{}", rendered.extension)),
        };
        let record = ArtifactRecord {
            scope,
            nodes,
            edges: endpoints,
            labels,
            weights: weights.weights,
            widths: weights.widths,
            global_widths,
            summary,
            files,
        };

        let rows = record.table();
        write_table(&record.files.table, &rows)?;
        write_atomically(&record.files.table_json, &serde_json::to_vec_pretty(&rows)?)?;
        write_atomically(&record.files.rendered, &rendered.content)?;
        // the record goes last, its presence marks the scope as completed
        write_atomically(&record.files.record, &serde_json::to_vec_pretty(&record)?)?;
        debug!(
            "{} assembled: {} nodes, {} edges",
            scope, summary.nodes_number, summary.edges_number
        );
        Ok(record)
    }
}
