//! The rendering seam.
//!
//! The engine hands nodes, edges with their display options and a few global
//! options to a [`Renderer`] and stores whatever bytes come back.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use petgraph::Graph;
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Scope;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Per edge display options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeOptions {
    /// Scaled width of the edge.
    pub weight: f64,
    /// Only set when the edges of the scope do not all weigh the same.
    pub value: Option<f64>,
    /// Only set when labels are shown.
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderEdge {
    pub source: String,
    pub target: String,
    pub options: EdgeOptions,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub scope: Scope,
    pub title: String,
    pub show_labels: bool,
}

/// Output of a renderer. The engine writes `content` to disk as is.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub extension: String,
    pub content: Vec<u8>,
}

pub trait Renderer: Send + Sync {
    fn render(
        &self,
        nodes: &[String],
        edges: &[RenderEdge],
        options: &RenderOptions,
    ) -> std::result::Result<RenderedArtifact, RenderError>;
}

/// Renders scopes as Graphviz DOT documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotRenderer;

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Renderer for DotRenderer {
    fn render(
        &self,
        nodes: &[String],
        edges: &[RenderEdge],
        options: &RenderOptions,
    ) -> std::result::Result<RenderedArtifact, RenderError> {
        let mut graph = Graph::<String, EdgeOptions, petgraph::Undirected>::new_undirected();
        let mut node_indices = HashMap::with_capacity(nodes.len());
        for name in nodes {
            node_indices
                .entry(name.as_str())
                .or_insert_with(|| graph.add_node(name.clone()));
        }
        for edge in edges {
            let (Some(&a), Some(&b)) = (
                node_indices.get(edge.source.as_str()),
                node_indices.get(edge.target.as_str()),
            ) else {
                return Err(RenderError(format!(
                    "edge {} -- {} references a node that was not added",
                    edge.source, edge.target
                )));
            };
            graph.add_edge(a, b, edge.options.clone());
        }

        let hue = match options.scope {
            Scope::Community(i) => ((i * 60) % 360) as f32 / 360.0,
            Scope::Network => 0.6,
        };
        let node_attributes = |_, (_, name): (NodeIndex, &String)| {
            format!(
                "label=\"{}\", style=filled, fillcolor=\"{:.3} 0.5 0.7\"",
                escape(name),
                hue
            )
        };
        let dot = Dot::with_attr_getters(
            &graph,
            &[Config::EdgeNoLabel, Config::NodeNoLabel],
            &|_, edge| {
                let options = edge.weight();
                match &options.label {
                    Some(label) => format!(
                        "penwidth={:.3}, label=\"{}\"",
                        options.weight,
                        escape(label)
                    ),
                    None => format!("penwidth={:.3}", options.weight),
                }
            },
            &node_attributes,
        );
        let content = format!("// {}\n{:?}", options.title, dot).into_bytes();
        Ok(RenderedArtifact {
            extension: "dot".to_string(),
            content,
        })
    }
}

/// Converts a written DOT file to PNG with the Graphviz `dot` executable.
pub fn dot_to_png(dot_file: &Path, output_image: &Path) -> std::io::Result<()> {
    let status = Command::new("dot")
        .arg("-Tpng")
        .arg(dot_file)
        .arg("-o")
        .arg(output_image)
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "dot exited with {status} for {}",
            dot_file.display()
        )))
    }
}
