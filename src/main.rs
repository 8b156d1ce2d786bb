use anyhow::Result;
use clap::Parser;
use kg_grouping::data::{self, DataSource, JsonFileSource};
use kg_grouping::storage::{self, SessionObject};
use kg_grouping::viz::{self, RenderSnapshot};
use kg_grouping::{ClusterMethod, Config, EntityId, Graph, GraphManipulator, KCluster};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "kg-grouping",
    about = "Group and cluster the visible part of a knowledge graph"
)]
struct Cli {
    /// Fetch result JSON files to merge (repeatable)
    #[clap(long)]
    input: Vec<PathBuf>,

    /// IRIs to fetch from the --source directory (repeatable)
    #[clap(long)]
    fetch: Vec<String>,

    /// Directory of per-IRI fetch results used by --fetch
    #[clap(long)]
    source: Option<PathBuf>,

    /// Session file to restore before merging
    #[clap(long)]
    restore: Option<PathBuf>,

    /// Session file to write (.bin for bincode, JSON otherwise)
    #[clap(long, default_value = "session.json")]
    output: PathBuf,

    /// Cluster mounted top-level entities and group each cluster
    #[clap(long, value_enum)]
    cluster: Option<ClusterMethod>,

    /// Nest groups instead of flattening them
    #[clap(long)]
    hierarchical: bool,

    /// Seed for reproducible clustering
    #[clap(long)]
    seed: Option<u64>,

    /// Maximum clustering iterations
    #[clap(long, default_value_t = kg_grouping::config::DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Write a render snapshot (snapshot.json, graph.graphml) here
    #[clap(long)]
    render_dir: Option<PathBuf>,

    /// Write the clustering report here
    #[clap(long)]
    report: Option<PathBuf>,

    /// Verbose logging
    #[clap(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let config = Config::new(
        args.cluster.unwrap_or(ClusterMethod::KMeans),
        args.hierarchical,
        args.seed,
    )
    .with_max_iterations(args.max_iterations);

    // 1. Restore or start empty
    let mut session = match &args.restore {
        Some(path) => {
            log::info!("Restoring session from {}", path.display());
            storage::load_session(path)?
        }
        None => SessionObject::default(),
    };
    let mut graph = Graph::restore_from_object(&session.graph)?;

    // 2. Merge new data and mount whatever is new
    let before: Vec<_> = graph.nodes().map(|n| n.id).collect();
    for path in &args.input {
        let result = data::read_fetch_result(path)?;
        data::merge_fetch_result(&mut graph, &result);
    }
    if !args.fetch.is_empty() {
        let dir = args
            .source
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--fetch needs --source"))?;
        let source = JsonFileSource::new(dir);
        fetch_all(&mut graph, &source, &args.fetch);
    }
    let fresh: Vec<_> = graph
        .nodes()
        .map(|n| n.id)
        .filter(|id| !before.contains(id))
        .collect();
    for &id in &fresh {
        graph.set_mounted(EntityId::Node(id), true)?;
    }
    let placed = data::place_unpositioned(&mut graph, &fresh);
    if placed > 0 {
        log::info!("Placed {} new nodes without a layout position", placed);
    }

    log::info!(
        "Graph has {} nodes, {} edges and {} groups",
        graph.node_count(),
        graph.edge_count(),
        graph.group_count()
    );

    // 3. Cluster
    if let Some(method) = args.cluster {
        let targets: Vec<EntityId> = graph
            .nodes_visual()
            .into_iter()
            .filter(|&e| graph.is_visible(e) && graph.belongs_to_group(e).is_none())
            .collect();
        log::info!("Clustering {} entities with {}", targets.len(), method);

        let manipulator = GraphManipulator::from_config(&config);
        if manipulator.is_hierarchical() {
            log::info!("Hierarchical grouping enabled");
        }
        let mut clusterer = KCluster::from_config(&config);
        let (report, groups) =
            clusterer.cluster_and_group(&mut graph, &manipulator, &targets)?;
        log::info!("Created {} groups", groups.len());

        if let Some(path) = &args.report {
            storage::save_cluster_report(&report, &graph, path)?;
        }
    }

    // 4. Save
    session.graph = graph.save_to_object();
    storage::save_session(&session, &args.output)?;

    if let Some(dir) = &args.render_dir {
        viz::write_snapshot(&RenderSnapshot::capture(&graph), dir)?;
    }

    log::info!("Session saved to {}", args.output.display());

    Ok(())
}

fn fetch_all(graph: &mut Graph, source: &dyn DataSource, iris: &[String]) {
    for iri in iris {
        if let Err(err) = data::fetch_node(graph, source, iri) {
            log::error!("{:#}", err);
        }
    }
}
