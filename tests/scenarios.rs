use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use attribute_network::render::{RenderEdge, RenderError, RenderOptions, RenderedArtifact};
use attribute_network::synthetic::generate_records_csv;
use attribute_network::{
    CancellationToken, Dataset, DotRenderer, FailureKind, Manifest, NetworkConfig, NetworkError,
    Node, Orchestrator, ParallelMode, Renderer, Scope, ScopeStatus, Stage, Summary, TableRow,
    Verbatim, read_table,
};
use pretty_assertions::assert_eq;

/// Accepts everything except scopes containing one particular node.
struct RejectsNode(&'static str);

impl Renderer for RejectsNode {
    fn render(
        &self,
        nodes: &[String],
        edges: &[RenderEdge],
        options: &RenderOptions,
    ) -> Result<RenderedArtifact, RenderError> {
        if nodes.iter().any(|n| n == self.0) {
            return Err(RenderError(format!("refusing to draw {}", self.0)));
        }
        DotRenderer.render(nodes, edges, options)
    }
}

fn write_csv(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("records.csv");
    std::fs::write(&path, content).unwrap();
    path
}

/// One `(id, attribute, value)` triple per value; repeated ids accumulate.
fn dataset(values: &[(&str, &str, &str)]) -> Dataset<String> {
    let mut map: BTreeMap<String, Node<String>> = BTreeMap::new();
    for (id, attribute, value) in values {
        map.entry(id.to_string())
            .or_insert_with(|| Node::new(id.to_string()))
            .insert(attribute.to_string(), value.to_string());
    }
    Dataset::from_map(map.into_iter().map(|(id, node)| (id, node.attributes)).collect()).unwrap()
}

fn two_communities() -> Dataset<String> {
    dataset(&[
        ("A", "color", "red"),
        ("A", "size", "big"),
        ("B", "color", "red"),
        ("B", "size", "big"),
        ("C", "taste", "sweet"),
        ("D", "taste", "sweet"),
    ])
}

fn completed_summaries(manifest: &Manifest) -> Vec<Option<Summary>> {
    manifest.communities.iter().map(|e| e.summary()).collect()
}

const SCENARIO_ONE: &str = "id,color,size,taste\nA,red,,\nB,red,big,\nC,,big,\nD,,,sweet\n";

#[test]
fn shared_values_link_records_into_one_community() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_csv(tmp.path(), SCENARIO_ONE);
    let mut config = NetworkConfig::new(tmp.path().join("run"));
    config.generate_entire_network = true;

    let manifest = Orchestrator::new(config, DotRenderer)
        .run_csv(&input)
        .unwrap();

    assert_eq!(4, manifest.nodes_number);
    assert_eq!(2, manifest.edges_number);
    assert_eq!(1, manifest.isolated_nodes);
    assert_eq!(1, manifest.communities.len());
    assert_eq!(
        Summary {
            nodes_number: 3,
            edges_number: 2,
            labels_number: 2
        },
        manifest.network_summary
    );

    let network = manifest.entry(Scope::Network).unwrap();
    let ScopeStatus::Completed { table, record, .. } = &network.status else {
        panic!("entire network failed: {:?}", network.status);
    };
    assert_eq!(
        vec![
            TableRow {
                node_a: "A".to_string(),
                node_b: "B".to_string(),
                label: "color: red".to_string(),
                weight: 1.0,
            },
            TableRow {
                node_a: "B".to_string(),
                node_b: "C".to_string(),
                label: "size: big".to_string(),
                weight: 1.0,
            },
        ],
        read_table(table).unwrap()
    );
    assert!(record.is_file());
    assert!(tmp.path().join("run").join("manifest.json").is_file());
}

#[test]
fn widths_are_scaled_per_scope() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = NetworkConfig::new(tmp.path());
    config.width_factor = 2.0;
    config.generate_entire_network = true;

    let manifest = Orchestrator::new(config, DotRenderer)
        .run(&two_communities(), &Verbatim)
        .unwrap();

    let network = manifest.entry(Scope::Network).unwrap();
    let ScopeStatus::Completed { table, .. } = &network.status else {
        panic!("entire network failed");
    };
    let widths: Vec<f64> = read_table(table).unwrap().iter().map(|r| r.weight).collect();
    assert_eq!(vec![2.0, 1.0], widths);

    // the lighter community is scaled against its own heaviest edge
    let second = manifest.entry(Scope::Community(1)).unwrap();
    let ScopeStatus::Completed { table, .. } = &second.status else {
        panic!("community 1 failed");
    };
    assert_eq!(2.0, read_table(table).unwrap()[0].weight);
}

#[test]
fn single_node_has_no_communities_and_no_network() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = NetworkConfig::new(tmp.path());
    config.generate_entire_network = true;
    let orchestrator = Orchestrator::new(config, DotRenderer);
    let data = dataset(&[("A", "color", "red")]);

    let graph = orchestrator.build_graph(&data).unwrap();
    assert!(graph.communities.is_empty());

    let manifest = orchestrator.run(&data, &Verbatim).unwrap();
    assert!(manifest.communities.is_empty());
    let network = manifest.network.unwrap();
    assert!(matches!(
        network.status,
        ScopeStatus::Failed {
            kind: FailureKind::EmptyGraph,
            ..
        }
    ));
}

fn assert_partial_failure(parallel_mode: ParallelMode) {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = NetworkConfig::new(tmp.path());
    config.parallel_mode = parallel_mode;

    let manifest = Orchestrator::new(config, RejectsNode("C"))
        .run(&two_communities(), &Verbatim)
        .unwrap();

    assert_eq!(1, manifest.succeeded().count());
    let failed: Vec<_> = manifest.failed().collect();
    assert_eq!(1, failed.len());
    assert_eq!(Scope::Community(1), failed[0].scope);
    match &failed[0].status {
        ScopeStatus::Failed { kind, reason } => {
            assert_eq!(FailureKind::RenderFailure, *kind);
            assert!(reason.contains("refusing to draw C"), "{}", reason);
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(
        Summary {
            nodes_number: 2,
            edges_number: 1,
            labels_number: 1
        },
        manifest.network_summary
    );
}

#[test]
fn failing_community_does_not_abort_siblings() {
    assert_partial_failure(ParallelMode::Enabled(false));
}

#[test]
fn failing_community_does_not_abort_parallel_siblings() {
    assert_partial_failure(ParallelMode::Workers(3));
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("generated.csv");
    generate_records_csv(120, &input).unwrap();

    let run = |name: &str, parallel_mode: ParallelMode| {
        let mut config = NetworkConfig::new(tmp.path().join(name));
        config.parallel_mode = parallel_mode;
        config.pair_batch_size = 64;
        config.generate_entire_network = true;
        Orchestrator::new(config, DotRenderer)
            .run_csv(&input)
            .unwrap()
    };
    let sequential = run("sequential", ParallelMode::Enabled(false));
    let parallel = run("parallel", ParallelMode::Workers(4));

    assert_eq!(sequential.edges_number, parallel.edges_number);
    assert_eq!(sequential.isolated_nodes, parallel.isolated_nodes);
    assert_eq!(completed_summaries(&sequential), completed_summaries(&parallel));
    assert_eq!(sequential.network_summary, parallel.network_summary);

    let table = |manifest: &Manifest| match &manifest.network.as_ref().unwrap().status {
        ScopeStatus::Completed { table, .. } => read_table(table).unwrap(),
        ScopeStatus::Failed { .. } => Vec::new(),
    };
    assert_eq!(table(&sequential), table(&parallel));
}

#[test]
fn sharded_edges_match_single_pass_edges() {
    let data = dataset(&[
        ("a", "k", "1"),
        ("a", "j", "x"),
        ("b", "k", "1"),
        ("c", "j", "x"),
        ("d", "k", "2"),
        ("e", "k", "2"),
        ("e", "j", "x"),
        ("f", "k", "3"),
    ]);
    let tmp = tempfile::tempdir().unwrap();
    let sequential = Orchestrator::new(NetworkConfig::new(tmp.path()), DotRenderer)
        .build_graph(&data)
        .unwrap();
    let mut config = NetworkConfig::new(tmp.path());
    config.parallel_mode = ParallelMode::Workers(3);
    let parallel = Orchestrator::new(config, DotRenderer)
        .build_graph(&data)
        .unwrap();

    assert_eq!(sequential.edges, parallel.edges);
    assert_eq!(sequential.communities, parallel.communities);
    for edge in &sequential.edges {
        let (a, b) = (data.node(edge.a), data.node(edge.b));
        for m in &edge.label {
            assert!(a.attributes[&m.attribute].contains(&m.value));
            assert!(b.attributes[&m.attribute].contains(&m.value));
        }
    }
}

#[test]
fn compressed_run_writes_decoded_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_csv(tmp.path(), SCENARIO_ONE);
    let mut config = NetworkConfig::new(tmp.path().join("run"));
    config.compressed = true;

    let manifest = Orchestrator::new(config, DotRenderer)
        .run_csv(&input)
        .unwrap();

    assert!(tmp.path().join("run").join("index.csv").is_file());
    let community = manifest.entry(Scope::Community(0)).unwrap();
    let ScopeStatus::Completed { table, .. } = &community.status else {
        panic!("community 0 failed");
    };
    let rows = read_table(table).unwrap();
    assert_eq!(
        vec![("A", "B", "color: red"), ("B", "C", "size: big")],
        rows.iter()
            .map(|r| (r.node_a.as_str(), r.node_b.as_str(), r.label.as_str()))
            .collect::<Vec<_>>()
    );
}

#[test]
fn index_file_can_be_reused() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_csv(tmp.path(), SCENARIO_ONE);
    let mut config = NetworkConfig::new(tmp.path().join("first"));
    config.compressed = true;
    let first = Orchestrator::new(config, DotRenderer)
        .run_csv(&input)
        .unwrap();

    let mut config = NetworkConfig::new(tmp.path().join("second"));
    config.index_file = Some(tmp.path().join("first").join("index.csv"));
    let second = Orchestrator::new(config, DotRenderer)
        .run_csv(&input)
        .unwrap();
    assert_eq!(completed_summaries(&first), completed_summaries(&second));
}

#[test]
fn index_file_order_does_not_pick_the_key_column() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_csv(tmp.path(), "id,color\nA,red\nB,red\n");
    let index_file = tmp.path().join("index.csv");
    std::fs::write(&index_file, "column,value\ncolor,red\nid,A\nid,B\n").unwrap();

    let mut config = NetworkConfig::new(tmp.path().join("run"));
    config.index_file = Some(index_file);
    let manifest = Orchestrator::new(config, DotRenderer)
        .run_csv(&input)
        .unwrap();

    let community = manifest.entry(Scope::Community(0)).unwrap();
    let ScopeStatus::Completed { table, .. } = &community.status else {
        panic!("community 0 failed: {:?}", community.status);
    };
    assert_eq!(
        vec![TableRow {
            node_a: "A".to_string(),
            node_b: "B".to_string(),
            label: "color: red".to_string(),
            weight: 1.0,
        }],
        read_table(table).unwrap()
    );
}

fn assert_cancelled_between_communities(parallel_mode: ParallelMode) {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = NetworkConfig::new(tmp.path());
    config.parallel_mode = parallel_mode;
    let token = CancellationToken::new();
    let trigger = token.clone();

    let result = Orchestrator::new(config, DotRenderer)
        .with_cancellation(token)
        .with_status_callback(move |stage| {
            if matches!(stage, Stage::AssemblingCommunity { index: 0, .. }) {
                trigger.cancel();
            }
        })
        .run(&two_communities(), &Verbatim);

    assert!(matches!(result, Err(NetworkError::Cancelled)));
    assert!(!tmp.path().join("manifest.json").exists());
}

#[test]
fn cancellation_stops_between_communities() {
    assert_cancelled_between_communities(ParallelMode::Enabled(false));
}

#[test]
fn cancellation_stops_parallel_communities() {
    assert_cancelled_between_communities(ParallelMode::Workers(2));
}

#[test]
fn occupied_working_directory_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(NetworkConfig::new(tmp.path()), DotRenderer);
    orchestrator.run(&two_communities(), &Verbatim).unwrap();

    let again = orchestrator.run(&two_communities(), &Verbatim);
    assert!(matches!(
        again,
        Err(NetworkError::WorkingDirectoryConflict(_))
    ));
}

#[test]
fn interrupted_run_can_be_resumed() {
    let tmp = tempfile::tempdir().unwrap();
    let first = Orchestrator::new(NetworkConfig::new(tmp.path()), DotRenderer)
        .run(&two_communities(), &Verbatim)
        .unwrap();

    let mut config = NetworkConfig::new(tmp.path());
    config.resume = Some(first.run_id.clone());
    // every scope is checkpointed, so the renderer is never asked again
    let resumed = Orchestrator::new(config, RejectsNode("A"))
        .run(&two_communities(), &Verbatim)
        .unwrap();
    assert_eq!(first.communities, resumed.communities);
}

#[test]
fn header_only_input_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_csv(tmp.path(), "id,color\n");
    let result = Orchestrator::new(NetworkConfig::new(tmp.path().join("run")), DotRenderer)
        .run_csv(&input);
    assert!(matches!(result, Err(NetworkError::EmptyDataset(_))));
    assert!(!tmp.path().join("run").join("manifest.json").exists());
}
