//! Similarity networks over records with shared attribute values.
//!
//! Records become nodes, every pair of nodes sharing at least one
//! `(attribute, value)` becomes an edge, and the connected components of the
//! resulting graph are the communities. Each community (and optionally the
//! whole graph) is exported as an edge table plus a rendered document.

pub mod assembler;
pub mod catalog;
pub mod community;
pub mod config;
pub mod edges;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod pairs;
pub mod render;
pub mod synthetic;
pub mod types;
pub mod weights;
pub mod workdir;

pub use assembler::{ArtifactRecord, Summary, TableRow, read_table, write_table};
pub use catalog::IndexCatalog;
pub use community::{Community, detect_communities};
pub use config::{NetworkConfig, ParallelMode};
pub use edges::Edge;
pub use errors::{NetworkError, Result};
pub use orchestrator::{
    CancellationToken, FailureKind, Manifest, NetworkGraph, Orchestrator, ScopeEntry, ScopeStatus,
    Stage,
};
pub use render::{DotRenderer, Renderer};
pub use types::{AttributeMatch, Dataset, Labeling, Node, Scope, Verbatim};
pub use workdir::allocate_run_directory;
