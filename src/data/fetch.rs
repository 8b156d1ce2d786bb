//! Remote fetch results and merging them into the graph

use crate::graph::{EdgeKey, EdgeType, Graph, NodeId, Position};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Node preview as delivered by the data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedNode {
    pub iri: String,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Layout hint from the source, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// Payload of one fetch: `{nodes, edges, types}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    #[serde(default)]
    pub nodes: Vec<FetchedNode>,
    #[serde(default)]
    pub edges: Vec<FetchedEdge>,
    #[serde(default)]
    pub types: Vec<EdgeType>,
}

/// Counts of what a merge actually changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub edges_created: usize,
    pub edges_skipped: usize,
}

/// Something that can answer "tell me about this IRI".
pub trait DataSource {
    fn fetch(&self, iri: &str) -> Result<FetchResult>;
}

/// Fixed answers keyed by IRI.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    results: HashMap<String, FetchResult>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, iri: &str, result: FetchResult) {
        self.results.insert(iri.to_string(), result);
    }
}

impl DataSource for InMemorySource {
    fn fetch(&self, iri: &str) -> Result<FetchResult> {
        self.results
            .get(iri)
            .cloned()
            .ok_or_else(|| anyhow!("No data for {}", iri))
    }
}

/// Reads fetch results from JSON files.
///
/// A directory source looks up `<sanitised iri>.json`; a file source
/// returns the same document for every IRI.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn file_for(&self, iri: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{}.json", sanitise(iri)))
        } else {
            self.path.clone()
        }
    }
}

impl DataSource for JsonFileSource {
    fn fetch(&self, iri: &str) -> Result<FetchResult> {
        read_fetch_result(&self.file_for(iri))
    }
}

/// Load a fetch result document from disk.
pub fn read_fetch_result(path: &Path) -> Result<FetchResult> {
    if !path.exists() {
        return Err(anyhow!("File not found: {}", path.display()));
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let result = serde_json::from_str(&text)
        .with_context(|| format!("Malformed fetch result in {}", path.display()))?;
    Ok(result)
}

fn sanitise(iri: &str) -> String {
    iri.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Merge a fetch result into the graph.
///
/// Nodes are matched by IRI: known nodes get their preview refreshed
/// instead of being duplicated. Edges already present, or whose endpoints
/// are unknown after the node pass, are skipped.
pub fn merge_fetch_result(graph: &mut Graph, result: &FetchResult) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for edge_type in &result.types {
        graph.register_type(edge_type.clone());
    }

    for fetched in &result.nodes {
        let id = match graph.node_id(&fetched.iri) {
            Some(id) => {
                summary.nodes_updated += 1;
                id
            }
            None => {
                summary.nodes_created += 1;
                graph.get_or_create_node(&fetched.iri)
            }
        };
        if let Some(node) = graph.node_mut(id) {
            if fetched.label.is_some() {
                node.label = fetched.label.clone();
            }
            if fetched.node_type.is_some() {
                node.node_type = fetched.node_type.clone();
            }
            node.classes = fetched.classes.clone();
            if fetched.position.is_some() {
                node.position = fetched.position;
            }
        }
    }

    for fetched in &result.edges {
        let endpoints = (graph.node_id(&fetched.source), graph.node_id(&fetched.target));
        let (Some(source), Some(target)) = endpoints else {
            log::warn!(
                "Skipping edge {} -> {}: unknown endpoint",
                fetched.source,
                fetched.target
            );
            summary.edges_skipped += 1;
            continue;
        };

        let key = EdgeKey::new(&fetched.source, &fetched.target, &fetched.edge_type);
        if graph.edge(&key).is_some() {
            summary.edges_skipped += 1;
            continue;
        }
        if let Ok(key) = graph.create_edge(source, target, &fetched.edge_type) {
            if let Some(edge) = graph.edge_mut(&key) {
                edge.classes = fetched.classes.clone();
            }
            summary.edges_created += 1;
        }
    }

    log::info!(
        "Merged fetch result: {} new nodes, {} refreshed, {} new edges, {} skipped",
        summary.nodes_created,
        summary.nodes_updated,
        summary.edges_created,
        summary.edges_skipped
    );
    summary
}

/// Fetch `iri` and merge the answer.
///
/// An unknown IRI gets a node up front so the caller can show it while the
/// fetch is in flight; if the fetch fails that node is removed again and
/// the error is returned.
pub fn fetch_node(graph: &mut Graph, source: &dyn DataSource, iri: &str) -> Result<NodeId> {
    let speculative = graph.node_id(iri).is_none();
    let id = graph.get_or_create_node(iri);

    match source.fetch(iri) {
        Ok(result) => {
            merge_fetch_result(graph, &result);
            Ok(id)
        }
        Err(err) => {
            if speculative {
                graph.remove_node(id)?;
                log::warn!("Fetch of {} failed, discarded speculative node", iri);
            }
            Err(err.context(format!("Failed to fetch {}", iri)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FetchResult {
        serde_json::from_str(
            r#"{
                "nodes": [
                    {"iri": "http://ex.org/a", "type": "Person", "label": "A",
                     "classes": ["person"]},
                    {"iri": "http://ex.org/b", "label": "B", "classes": ["person", "admin"],
                     "position": {"x": 3.0, "y": 4.0}}
                ],
                "edges": [
                    {"source": "http://ex.org/a", "target": "http://ex.org/b", "type": "knows",
                     "classes": ["close"]},
                    {"source": "http://ex.org/a", "target": "http://ex.org/zzz", "type": "knows"}
                ],
                "types": [{"iri": "knows", "label": "knows", "description": "acquaintance"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn merge_creates_nodes_edges_and_types() {
        let mut graph = Graph::new();
        let summary = merge_fetch_result(&mut graph, &sample());

        assert_eq!(summary.nodes_created, 2);
        assert_eq!(summary.edges_created, 1);
        assert_eq!(summary.edges_skipped, 1);
        let a = graph.node_by_iri("http://ex.org/a").unwrap();
        assert_eq!(a.node_type.as_deref(), Some("Person"));
        assert_eq!(a.position, None);
        let b = graph.node_by_iri("http://ex.org/b").unwrap();
        assert_eq!(b.position, Some(Position::new(3.0, 4.0)));
        let key = EdgeKey::new("http://ex.org/a", "http://ex.org/b", "knows");
        assert_eq!(graph.edge(&key).unwrap().classes, vec!["close".to_string()]);
        let knows = graph.edge_type("knows").unwrap();
        assert_eq!(knows.description.as_deref(), Some("acquaintance"));
    }

    #[test]
    fn merging_twice_deduplicates_by_iri() {
        let mut graph = Graph::new();
        merge_fetch_result(&mut graph, &sample());
        let summary = merge_fetch_result(&mut graph, &sample());

        assert_eq!(summary.nodes_created, 0);
        assert_eq!(summary.nodes_updated, 2);
        assert_eq!(summary.edges_created, 0);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn failed_fetch_discards_speculative_node() {
        let mut graph = Graph::new();
        let source = InMemorySource::new();

        assert!(fetch_node(&mut graph, &source, "http://ex.org/missing").is_err());
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn failed_fetch_keeps_known_node() {
        let mut graph = Graph::new();
        graph.create_node("http://ex.org/known").unwrap();
        let source = InMemorySource::new();

        assert!(fetch_node(&mut graph, &source, "http://ex.org/known").is_err());
        assert!(graph.node_by_iri("http://ex.org/known").is_some());
    }

    #[test]
    fn successful_fetch_merges() {
        let mut graph = Graph::new();
        let mut source = InMemorySource::new();
        source.insert("http://ex.org/a", sample());

        let id = fetch_node(&mut graph, &source, "http://ex.org/a").unwrap();
        assert_eq!(graph.node(id).unwrap().label.as_deref(), Some("A"));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn json_file_source_reads_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        let body = serde_json::to_string(&sample()).unwrap();
        fs::write(dir.path().join("http___ex.org_a.json"), body).unwrap();

        let source = JsonFileSource::new(dir.path());
        assert_eq!(source.fetch("http://ex.org/a").unwrap(), sample());
        assert!(source.fetch("http://ex.org/b").is_err());
    }
}
