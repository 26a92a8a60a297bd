use std::path::PathBuf;

use thiserror::Error;

use crate::render::RenderError;
use crate::types::Scope;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("malformed input at line {line}: {reason}")]
    InputFormat { line: u64, reason: String },
    #[error("empty dataset: {0}")]
    EmptyDataset(String),
    #[error("{scope} has no edges to build a network from")]
    EmptyGraph { scope: Scope },
    #[error("renderer rejected {scope}: {source}")]
    RenderFailure { scope: Scope, source: RenderError },
    #[error("community {community} failed: {source}")]
    PartialCommunityFailure {
        community: usize,
        source: Box<NetworkError>,
    },
    #[error("working directory {0:?} is already populated by a different run")]
    WorkingDirectoryConflict(PathBuf),
    #[error("run was cancelled")]
    Cancelled,
    #[error("too many unique items added to symbol table")]
    SymbolTableOverflow,
    #[error("worker for {0} panicked")]
    WorkerPanic(Scope),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl NetworkError {
    pub(crate) fn input_format<S: Into<String>>(line: u64, reason: S) -> Self {
        NetworkError::InputFormat {
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
