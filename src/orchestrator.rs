use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assembler::{ArtifactRecord, Assembler, ScopeEdges, Summary, write_atomically};
use crate::catalog::IndexCatalog;
use crate::community::{Community, detect_communities, edges_by_community};
use crate::config::NetworkConfig;
use crate::edges::{Edge, build_edges};
use crate::errors::{NetworkError, Result};
use crate::loader::{LoadOptions, key_column_name, load_csv, load_csv_encoded};
use crate::pairs::{PairEnumerator, pair_count, shard_ranges};
use crate::render::Renderer;
use crate::types::{Dataset, Key, Labeling, Scope, Verbatim};
use crate::weights::scaled_widths;
use crate::workdir::RunDirectory;

/// File name of the manifest written at the end of a run.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Cooperative cancellation flag shared between a caller and a running orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stage boundaries reported to the status callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Indexing,
    Loading,
    EnumeratingPairs { pairs: u64 },
    BuildingEdges,
    DetectingCommunities,
    CalculatingWeights,
    AssemblingCommunity { index: usize, total: usize },
    AssemblingNetwork,
    Finished,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Indexing => write!(f, "Indexing input values."),
            Stage::Loading => write!(f, "Loading input data."),
            Stage::EnumeratingPairs { pairs } => write!(f, "Enumerating {pairs} node pairs."),
            Stage::BuildingEdges => write!(f, "Processing network data."),
            Stage::DetectingCommunities => write!(f, "Searching for network communities."),
            Stage::CalculatingWeights => write!(f, "Calculating network edges weights."),
            Stage::AssemblingCommunity { index, total } => {
                write!(f, "Computing network community {} of {}.", index + 1, total)
            }
            Stage::AssemblingNetwork => write!(f, "Computing entire network."),
            Stage::Finished => write!(f, "Finished."),
        }
    }
}

pub type StatusCallback = Box<dyn Fn(&Stage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EmptyGraph,
    RenderFailure,
    PartialCommunityFailure,
}

impl From<&NetworkError> for FailureKind {
    fn from(e: &NetworkError) -> Self {
        match e {
            NetworkError::EmptyGraph { .. } => FailureKind::EmptyGraph,
            NetworkError::RenderFailure { .. } => FailureKind::RenderFailure,
            NetworkError::PartialCommunityFailure { source, .. } => source.as_ref().into(),
            _ => FailureKind::PartialCommunityFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScopeStatus {
    Completed {
        record: PathBuf,
        table: PathBuf,
        rendered: PathBuf,
        summary: Summary,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub scope: Scope,
    pub status: ScopeStatus,
}

impl ScopeEntry {
    fn new(scope: Scope, outcome: Result<ArtifactRecord>) -> Self {
        let status = match outcome {
            Ok(record) => ScopeStatus::Completed {
                record: record.files.record,
                table: record.files.table,
                rendered: record.files.rendered,
                summary: record.summary,
            },
            Err(e) => {
                let e = match scope {
                    Scope::Community(community) => NetworkError::PartialCommunityFailure {
                        community,
                        source: Box::new(e),
                    },
                    Scope::Network => e,
                };
                warn!("{}", e);
                ScopeStatus::Failed {
                    kind: FailureKind::from(&e),
                    reason: e.to_string(),
                }
            }
        };
        ScopeEntry { scope, status }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, ScopeStatus::Completed { .. })
    }

    pub fn summary(&self) -> Option<Summary> {
        match &self.status {
            ScopeStatus::Completed { summary, .. } => Some(*summary),
            ScopeStatus::Failed { .. } => None,
        }
    }
}

/// What a run produced: one entry per scope, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub directory: PathBuf,
    /// Nodes loaded, including isolated ones.
    pub nodes_number: usize,
    pub edges_number: usize,
    /// Nodes that share no value with any other node.
    pub isolated_nodes: usize,
    pub communities: Vec<ScopeEntry>,
    pub network: Option<ScopeEntry>,
    /// Counts of the whole-graph artifact, or the sums over the completed
    /// communities when none was produced.
    pub network_summary: Summary,
}

impl Manifest {
    pub fn succeeded(&self) -> impl Iterator<Item = &ScopeEntry> {
        self.entries().filter(|e| e.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScopeEntry> {
        self.entries().filter(|e| !e.is_completed())
    }

    pub fn entry(&self, scope: Scope) -> Option<&ScopeEntry> {
        self.entries().find(|e| e.scope == scope)
    }

    fn entries(&self) -> impl Iterator<Item = &ScopeEntry> {
        self.communities.iter().chain(self.network.iter())
    }
}

/// Edges and communities of a dataset.
#[derive(Debug, Clone)]
pub struct NetworkGraph<T> {
    pub edges: Vec<Edge<T>>,
    pub communities: Vec<Community>,
}

pub struct Orchestrator<R> {
    config: NetworkConfig,
    renderer: R,
    status: Option<StatusCallback>,
    cancel: CancellationToken,
}

impl<R: Renderer> Orchestrator<R> {
    pub fn new(config: NetworkConfig, renderer: R) -> Self {
        Orchestrator {
            config,
            renderer,
            status: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_status_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Stage) + Send + Sync + 'static,
    {
        self.status = Some(Box::new(callback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn set_status(&self, stage: Stage) {
        info!("{}", stage);
        if let Some(callback) = &self.status {
            callback(&stage);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(NetworkError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn thread_pool(&self, workers: usize) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("network-worker-{i}"))
            .build()
            .map_err(|e| std::io::Error::other(e.to_string()).into())
    }

    /// Loads a delimited file and runs the whole pipeline on it.
    ///
    /// With `compressed` set (or an `index_file` given) identifiers are
    /// dictionary-encoded while loading, and the catalog is stored next to
    /// the artifacts as `index.csv`.
    pub fn run_csv<P: AsRef<Path>>(&self, input: P) -> Result<Manifest> {
        let options = LoadOptions {
            key_column: self.config.key_column.as_deref(),
            ..Default::default()
        };
        if self.config.compressed || self.config.index_file.is_some() {
            self.set_status(Stage::Indexing);
            let key_column = key_column_name(input.as_ref(), &options)?;
            let catalog = match &self.config.index_file {
                Some(index_file) => IndexCatalog::from_index_file(index_file, Some(&key_column))?,
                None => IndexCatalog::build_from_csv(input.as_ref(), Some(&key_column), b',')?,
            };
            self.set_status(Stage::Loading);
            let dataset = load_csv_encoded(input.as_ref(), &catalog, &options)?;
            let directory = self.claim()?;
            catalog.write_index_file(directory.path.join("index.csv"))?;
            self.execute(&dataset, &catalog, directory)
        } else {
            self.set_status(Stage::Loading);
            let dataset = load_csv(input.as_ref(), &options)?;
            let directory = self.claim()?;
            self.execute(&dataset, &Verbatim, directory)
        }
    }

    /// Runs the pipeline on an already loaded dataset.
    pub fn run<T, L>(&self, dataset: &Dataset<T>, labeling: &L) -> Result<Manifest>
    where
        T: Key,
        L: Labeling<T>,
    {
        let directory = self.claim()?;
        self.execute(dataset, labeling, directory)
    }

    fn claim(&self) -> Result<RunDirectory> {
        RunDirectory::claim(&self.config.working_directory, self.config.resume.as_deref())
    }

    /// Enumerates all pairs, builds the edges and splits them into communities.
    pub fn build_graph<T: Key>(&self, dataset: &Dataset<T>) -> Result<NetworkGraph<T>> {
        let n = dataset.len();
        self.set_status(Stage::EnumeratingPairs {
            pairs: pair_count(n),
        });
        let enumerator = PairEnumerator::new(n, self.config.temp_directory.as_deref());
        let batch_size = self.config.pair_batch_size;

        let edges = match self.config.parallel_mode.workers() {
            Some(workers) => {
                let ranges = shard_ranges(n, workers);
                debug!("building edges in {} shards", ranges.len());
                self.set_status(Stage::BuildingEdges);
                let shards = self.thread_pool(workers)?.install(|| {
                    ranges
                        .into_par_iter()
                        .map(|rows| {
                            let spill = enumerator.spill(rows)?;
                            build_edges(dataset, spill, batch_size, &self.cancel)
                        })
                        .collect::<Result<Vec<_>>>()
                })?;
                shards.into_iter().flatten().collect()
            }
            None => {
                let spill = enumerator.spill_all()?;
                self.check_cancelled()?;
                self.set_status(Stage::BuildingEdges);
                build_edges(dataset, spill, batch_size, &self.cancel)?
            }
        };
        info!("found {} edges among {} nodes", edges.len(), n);

        self.check_cancelled()?;
        self.set_status(Stage::DetectingCommunities);
        let communities = detect_communities(n, edges.iter().map(Edge::endpoints));
        info!("found {} communities", communities.len());
        Ok(NetworkGraph { edges, communities })
    }

    fn execute<T, L>(
        &self,
        dataset: &Dataset<T>,
        labeling: &L,
        directory: RunDirectory,
    ) -> Result<Manifest>
    where
        T: Key,
        L: Labeling<T>,
    {
        let graph = self.build_graph(dataset)?;
        let edges = &graph.edges;
        let total = graph.communities.len();

        self.set_status(Stage::CalculatingWeights);
        let all_weights: Vec<usize> = edges.iter().map(Edge::weight).collect();
        let global_widths = scaled_widths(&all_weights, self.config.width_factor, Scope::Network);
        let global_slice: &[f64] = global_widths.as_deref().unwrap_or(&[]);
        let grouped = edges_by_community(edges, dataset.len(), &graph.communities);

        let assembler = Assembler {
            directory: &directory.path,
            prefix: &self.config.prefix,
            width_factor: self.config.width_factor,
            show_labels: self.config.show_labels,
            renderer: &self.renderer,
            resume: directory.resumed,
        };
        let assemble_community = |index: usize, indices: &[usize]| -> Result<ArtifactRecord> {
            if self.cancel.is_cancelled() {
                return Err(NetworkError::Cancelled);
            }
            self.set_status(Stage::AssemblingCommunity { index, total });
            let scope = Scope::Community(index);
            isolate_panics(scope, || {
                let scope_edges =
                    ScopeEdges::collect(dataset, edges, indices, global_slice, labeling);
                assembler.assemble(scope, scope_edges)
            })
        };

        let outcomes: Vec<Result<ArtifactRecord>> = match self.config.parallel_mode.workers() {
            Some(workers) => {
                let pool = self.thread_pool(workers)?;
                let (tx, rx) = crossbeam_channel::unbounded();
                pool.scope(|s| {
                    for (index, indices) in grouped.iter().enumerate() {
                        let tx = tx.clone();
                        let assemble_community = &assemble_community;
                        s.spawn(move |_| {
                            // the receiver outlives the scope, sending cannot fail
                            let _ = tx.send((index, assemble_community(index, indices)));
                        });
                    }
                });
                drop(tx);
                let mut results: Vec<(usize, Result<ArtifactRecord>)> = rx.iter().collect();
                results.sort_by_key(|(index, _)| *index);
                results.into_iter().map(|(_, outcome)| outcome).collect()
            }
            None => {
                let mut results = Vec::with_capacity(total);
                for (index, indices) in grouped.iter().enumerate() {
                    self.check_cancelled()?;
                    results.push(assemble_community(index, indices));
                }
                results
            }
        };
        self.check_cancelled()?;
        if outcomes
            .iter()
            .any(|o| matches!(o, Err(NetworkError::Cancelled)))
        {
            return Err(NetworkError::Cancelled);
        }

        let communities: Vec<ScopeEntry> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| ScopeEntry::new(Scope::Community(index), outcome))
            .collect();

        let network = if self.config.generate_entire_network {
            self.set_status(Stage::AssemblingNetwork);
            let outcome = global_widths.and_then(|widths| {
                let all: Vec<usize> = (0..edges.len()).collect();
                isolate_panics(Scope::Network, || {
                    let scope_edges = ScopeEdges::collect(dataset, edges, &all, &widths, labeling);
                    assembler.assemble(Scope::Network, scope_edges)
                })
            });
            Some(ScopeEntry::new(Scope::Network, outcome))
        } else {
            None
        };

        let network_summary = match network.as_ref().and_then(ScopeEntry::summary) {
            Some(summary) => summary,
            None => {
                let mut sum = Summary::default();
                for summary in communities.iter().filter_map(ScopeEntry::summary) {
                    sum += summary;
                }
                sum
            }
        };

        let manifest = Manifest {
            run_id: directory.run_id.clone(),
            directory: directory.path.clone(),
            nodes_number: dataset.len(),
            edges_number: edges.len(),
            isolated_nodes: dataset.len()
                - graph.communities.iter().map(Community::len).sum::<usize>(),
            communities,
            network,
            network_summary,
        };
        write_atomically(
            &directory.path.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;
        let failed = manifest.failed().count();
        if failed > 0 {
            warn!("{} of {} scopes failed", failed, failed + manifest.succeeded().count());
        }
        self.set_status(Stage::Finished);
        Ok(manifest)
    }
}

/// Turns a panic inside `f` into a failure of `scope`.
fn isolate_panics<F>(scope: Scope, f: F) -> Result<ArtifactRecord>
where
    F: FnOnce() -> Result<ArtifactRecord>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or(Err(NetworkError::WorkerPanic(scope)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::DotRenderer;
    use crate::types::Node;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn dataset(records: &[(&str, &str, &str)]) -> Dataset<String> {
        let nodes = records
            .iter()
            .map(|(id, attribute, value)| {
                Node::new(id.to_string()).with_value(attribute.to_string(), value.to_string())
            })
            .collect();
        Dataset::new(vec!["k".to_string()], nodes).unwrap()
    }

    #[test]
    fn stages_are_reported_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let stages = Arc::new(Mutex::new(Vec::new()));
        let recorded = stages.clone();
        let orchestrator = Orchestrator::new(NetworkConfig::new(tmp.path()), DotRenderer)
            .with_status_callback(move |stage| recorded.lock().unwrap().push(stage.clone()));

        let data = dataset(&[("a", "k", "1"), ("b", "k", "1")]);
        orchestrator.run(&data, &Verbatim).unwrap();

        let stages = stages.lock().unwrap();
        assert_eq!(
            vec![
                Stage::EnumeratingPairs { pairs: 1 },
                Stage::BuildingEdges,
                Stage::DetectingCommunities,
                Stage::CalculatingWeights,
                Stage::AssemblingCommunity { index: 0, total: 1 },
                Stage::Finished,
            ],
            *stages
        );
    }

    #[test]
    fn cancelled_run_reports_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(NetworkConfig::new(tmp.path()), DotRenderer);
        orchestrator.cancellation_token().cancel();

        let data = dataset(&[("a", "k", "1"), ("b", "k", "1")]);
        let result = orchestrator.run(&data, &Verbatim);
        assert!(matches!(result, Err(NetworkError::Cancelled)));
        assert!(!tmp.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn failure_kind_looks_through_partial_failure() {
        let e = NetworkError::PartialCommunityFailure {
            community: 2,
            source: Box::new(NetworkError::EmptyGraph {
                scope: Scope::Community(2),
            }),
        };
        assert_eq!(FailureKind::EmptyGraph, FailureKind::from(&e));
        assert_eq!(
            FailureKind::PartialCommunityFailure,
            FailureKind::from(&NetworkError::WorkerPanic(Scope::Community(0)))
        );
    }

    #[test]
    fn stage_messages() {
        assert_eq!(
            "Computing network community 3 of 5.",
            Stage::AssemblingCommunity { index: 2, total: 5 }.to_string()
        );
    }
}
