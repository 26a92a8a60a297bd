use std::path::PathBuf;

use attribute_network::render::dot_to_png;
use attribute_network::synthetic::generate_records_csv;
use attribute_network::{
    DotRenderer, NetworkConfig, Orchestrator, ParallelMode, ScopeStatus, allocate_run_directory,
};
use clap::Parser;
use log::{error, info};
use simplelog::{LevelFilter, SimpleLogger, TermLogger};

#[derive(Parser, Debug)]
#[command(author, version, about = "Builds attribute similarity networks and their communities", long_about = None)]
struct Args {
    /// Delimited input file, one record per row
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving a new network_<run id> directory per run, or the
    /// run directory itself when resuming
    #[arg(short, long)]
    work_directory: PathBuf,

    /// Run id of an interrupted run to continue
    #[arg(long)]
    resume: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Name of the column containing IDs, the first column by default
    #[arg(long)]
    key_column: Option<String>,

    /// Directory for pair scratch files, the system temp directory by default
    #[arg(long)]
    temp_directory: Option<PathBuf>,

    /// File name prefix of the artifacts
    #[arg(long)]
    prefix: Option<String>,

    #[arg(long)]
    width_factor: Option<f64>,

    /// Do not put labels on the rendered networks
    #[arg(long)]
    hide_labels: bool,

    /// Add the entire network to the results
    #[arg(long)]
    generate_entire_network: bool,

    /// Worker threads, 0 for one per logical core
    #[arg(long)]
    threads: Option<usize>,

    /// Encode identifiers with an index catalog while loading
    #[arg(long)]
    compressed: bool,

    /// Companion index file with column,value rows
    #[arg(long)]
    index_file: Option<PathBuf>,

    /// Write a random input file with this many records before running
    #[arg(long)]
    generate: Option<usize>,

    /// Also convert every rendered DOT file to PNG with Graphviz
    #[arg(long)]
    png: bool,

    #[arg(long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let log_filter = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_config = simplelog::ConfigBuilder::new().build();

    if let Err(e) = TermLogger::init(
        log_filter,
        log_config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    ) {
        println!(
            "Error, can't initialize the terminal log output: {}.\nWill degrade to a more simple logger",
            e
        );
        if let Err(e_simple) = SimpleLogger::init(log_filter, log_config) {
            println!("Simple logging failed too: {}", e_simple);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.debug);

    let mut config = match &args.config {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::default(),
    };
    if let Some(key_column) = args.key_column {
        config.key_column = Some(key_column);
    }
    if let Some(temp_directory) = args.temp_directory {
        config.temp_directory = Some(temp_directory);
    }
    if let Some(prefix) = args.prefix {
        config.prefix = prefix;
    }
    if let Some(width_factor) = args.width_factor {
        config.width_factor = width_factor;
    }
    if args.hide_labels {
        config.show_labels = false;
    }
    if args.generate_entire_network {
        config.generate_entire_network = true;
    }
    match args.threads {
        Some(0) => config.parallel_mode = ParallelMode::Enabled(true),
        Some(n) => config.parallel_mode = ParallelMode::Workers(n),
        None => {}
    }
    if args.compressed {
        config.compressed = true;
    }
    if let Some(index_file) = args.index_file {
        config.index_file = Some(index_file);
    }
    if let Some(run_id) = args.resume {
        config.resume = Some(run_id);
    }

    // 1. Generate data
    if let Some(records) = args.generate {
        info!("writing {} random records to {}", records, args.input.display());
        generate_records_csv(records, &args.input)?;
    }

    // 2. Build network and detect communities
    config.working_directory = match &config.resume {
        // an interrupted run is continued in the directory it already owns
        Some(_) => args.work_directory.clone(),
        None => allocate_run_directory(&args.work_directory)?,
    };
    let manifest = Orchestrator::new(config, DotRenderer).run_csv(&args.input)?;

    // 3. Visualize
    if args.png {
        for entry in manifest.succeeded() {
            if let ScopeStatus::Completed { rendered, .. } = &entry.status {
                let image = rendered.with_extension("png");
                if let Err(e) = dot_to_png(rendered, &image) {
                    error!("could not convert {}: {}", rendered.display(), e);
                }
            }
        }
    }

    // 4. Print community info
    println!(
        "Detected {} communities among {} nodes ({} isolated), results in {}",
        manifest.communities.len(),
        manifest.nodes_number,
        manifest.isolated_nodes,
        manifest.directory.display()
    );
    for entry in &manifest.communities {
        match &entry.status {
            ScopeStatus::Completed { summary, .. } => println!(
                "{} ({} nodes, {} edges, {} connection types)",
                entry.scope, summary.nodes_number, summary.edges_number, summary.labels_number
            ),
            ScopeStatus::Failed { reason, .. } => println!("{} failed: {}", entry.scope, reason),
        }
    }
    println!(
        "Entire network: {} nodes, {} edges, {} connection types",
        manifest.network_summary.nodes_number,
        manifest.network_summary.edges_number,
        manifest.network_summary.labels_number
    );

    Ok(())
}
