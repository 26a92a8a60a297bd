//! Run configuration.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// How per-community work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParallelMode {
    /// `false` runs sequentially, `true` uses one worker per logical core.
    Enabled(bool),
    /// Explicit number of workers.
    Workers(usize),
}

impl Default for ParallelMode {
    fn default() -> Self {
        ParallelMode::Enabled(false)
    }
}

impl ParallelMode {
    /// Number of workers, `None` when running sequentially.
    pub fn workers(&self) -> Option<usize> {
        match *self {
            ParallelMode::Enabled(false) | ParallelMode::Workers(0 | 1) => None,
            ParallelMode::Enabled(true) => Some(rayon::current_num_threads().max(1)),
            ParallelMode::Workers(n) => Some(n),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Width of the heaviest edge of a scope.
    pub width_factor: f64,
    pub show_labels: bool,
    /// Also build the artifact of the whole graph.
    pub generate_entire_network: bool,
    pub parallel_mode: ParallelMode,
    /// Directory owned by this run, receiving all checkpoints.
    pub working_directory: PathBuf,
    /// Directory for pair scratch files, the system temp directory when unset.
    pub temp_directory: Option<PathBuf>,
    /// Identifier column of delimited input, the first column when unset.
    pub key_column: Option<String>,
    /// Prefix of every artifact file name.
    pub prefix: String,
    /// Pairs examined between two cancellation checks.
    pub pair_batch_size: usize,
    /// Encode identifiers with an index catalog while loading.
    pub compressed: bool,
    /// Companion index file used instead of indexing the input.
    pub index_file: Option<PathBuf>,
    /// Run id of an interrupted run to continue in `working_directory`.
    pub resume: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            width_factor: 1.0,
            show_labels: true,
            generate_entire_network: false,
            parallel_mode: ParallelMode::default(),
            working_directory: PathBuf::new(),
            temp_directory: None,
            key_column: None,
            prefix: String::new(),
            pair_batch_size: 10_000,
            compressed: false,
            index_file: None,
            resume: None,
        }
    }
}

impl NetworkConfig {
    pub fn new<P: AsRef<Path>>(working_directory: P) -> Self {
        NetworkConfig {
            working_directory: working_directory.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("loading configuration from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }
}
