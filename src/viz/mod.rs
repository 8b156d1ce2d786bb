//! Render snapshots of the visual graph for external renderers

use crate::graph::{EntityId, Graph, GroupEdge, Position};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// One drawable node or group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: String,
    pub label: Option<String>,
    pub is_group: bool,
    pub classes: Vec<String>,
    pub position: Option<Position>,
    pub selected: bool,
    pub visible: bool,
    pub hidden_in_hierarchy: bool,
    /// Number of leaf nodes represented
    pub weight: usize,
}

/// One drawable edge between two visual nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualEdge {
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub classes: Vec<String>,
    /// True when the edge stands for several real edges crossing a group
    pub aggregated: bool,
    /// An endpoint is selected
    pub highlighted: bool,
}

/// What a renderer needs for one frame: `nodesVisual`, `edgesVisual` and
/// `groupEdges` flattened into plain records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderSnapshot {
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<VisualEdge>,
}

impl RenderSnapshot {
    pub fn capture(graph: &Graph) -> Self {
        let nodes = graph
            .nodes_visual()
            .into_iter()
            .filter_map(|entity| visual_node(graph, entity))
            .collect();

        let real = graph.edges_visual().into_iter().map(|e| VisualEdge {
            source: e.key.source.clone(),
            target: e.key.target.clone(),
            edge_type: e.key.edge_type.clone(),
            classes: e.classes.clone(),
            aggregated: false,
            highlighted: graph.edge_is_adjacent_to_selected(e),
        });
        let grouped = graph
            .group_edges()
            .into_iter()
            .filter_map(|e| visual_group_edge(graph, e));

        Self {
            nodes,
            edges: real.chain(grouped).collect(),
        }
    }
}

fn visual_node(graph: &Graph, entity: EntityId) -> Option<VisualNode> {
    let id = graph.identifier(entity)?;
    let label = match entity {
        EntityId::Node(n) => graph.node(n).and_then(|n| n.label.clone()),
        EntityId::Group(_) => None,
    };
    Some(VisualNode {
        id,
        label,
        is_group: entity.is_group(),
        classes: graph.classes(entity).into_iter().collect(),
        position: graph.position(entity),
        selected: graph.is_selected(entity),
        visible: graph.is_visible(entity),
        hidden_in_hierarchy: graph.is_hidden_in_hierarchy(entity),
        weight: graph.leaves_of(entity).len(),
    })
}

fn visual_group_edge(graph: &Graph, edge: GroupEdge) -> Option<VisualEdge> {
    let highlighted = graph.is_selected(edge.source) || graph.is_selected(edge.target);
    Some(VisualEdge {
        source: graph.identifier(edge.source)?,
        target: graph.identifier(edge.target)?,
        edge_type: edge.edge_type,
        classes: edge.classes.into_iter().collect(),
        aggregated: true,
        highlighted,
    })
}

/// Write `snapshot.json` and `graph.graphml` into `dir`.
pub fn write_snapshot(snapshot: &RenderSnapshot, dir: &Path) -> Result<()> {
    log::info!(
        "Writing render snapshot with {} nodes and {} edges to {}",
        snapshot.nodes.len(),
        snapshot.edges.len(),
        dir.display()
    );

    fs::create_dir_all(dir)?;

    let mut json_file = File::create(dir.join("snapshot.json"))?;
    json_file.write_all(serde_json::to_string_pretty(snapshot)?.as_bytes())?;

    write_graphml(snapshot, &dir.join("graph.graphml"))?;

    Ok(())
}

fn write_graphml(snapshot: &RenderSnapshot, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;

    // Write GraphML header
    writeln!(file, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(file, "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">")?;
    writeln!(file, "  <key id=\"label\" for=\"node\" attr.name=\"label\" attr.type=\"string\"/>")?;
    writeln!(file, "  <key id=\"group\" for=\"node\" attr.name=\"group\" attr.type=\"boolean\"/>")?;
    writeln!(file, "  <key id=\"type\" for=\"edge\" attr.name=\"type\" attr.type=\"string\"/>")?;
    writeln!(file, "  <graph id=\"G\" edgedefault=\"directed\">")?;

    for node in &snapshot.nodes {
        let label = node.label.as_deref().unwrap_or(&node.id);
        writeln!(
            file,
            "    <node id=\"{}\">\n      <data key=\"label\">{}</data>\n      <data key=\"group\">{}</data>\n    </node>",
            escape(&node.id),
            escape(label),
            node.is_group
        )?;
    }

    for (edge_id, edge) in snapshot.edges.iter().enumerate() {
        writeln!(
            file,
            "    <edge id=\"e{}\" source=\"{}\" target=\"{}\">\n      <data key=\"type\">{}</data>\n    </edge>",
            edge_id,
            escape(&edge.source),
            escape(&edge.target),
            escape(&edge.edge_type)
        )?;
    }

    // Write GraphML footer
    writeln!(file, "  </graph>")?;
    writeln!(file, "</graphml>")?;

    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manipulator::GraphManipulator;

    #[test]
    fn snapshot_shows_groups_instead_of_members() {
        let mut graph = Graph::new();
        let ids: Vec<_> = ["a", "b", "x"]
            .iter()
            .map(|iri| {
                let id = graph.create_node(iri).unwrap();
                graph.set_mounted(EntityId::Node(id), true).unwrap();
                id
            })
            .collect();
        graph.create_edge(ids[0], ids[2], "rel").unwrap();
        graph.create_edge(ids[1], ids[2], "rel").unwrap();
        graph.create_edge(ids[0], ids[1], "rel").unwrap();

        let before = RenderSnapshot::capture(&graph);
        assert_eq!(before.nodes.len(), 3);
        assert_eq!(before.edges.len(), 3);

        let g = GraphManipulator::new(false)
            .group_existing_nodes(&mut graph, &[EntityId::Node(ids[0]), EntityId::Node(ids[1])])
            .unwrap();
        let after = RenderSnapshot::capture(&graph);

        let group_id = graph.identifier(EntityId::Group(g)).unwrap();
        assert_eq!(after.nodes.len(), 2);
        assert!(after.nodes.iter().any(|n| n.id == group_id && n.is_group && n.weight == 2));
        assert_eq!(after.edges.len(), 1);
        assert!(after.edges[0].aggregated);
        assert_eq!(after.edges[0].source, group_id);
        assert_eq!(after.edges[0].target, "x");
        // A fresh group is selected, so its edge is highlighted.
        assert!(after.edges[0].highlighted);
    }

    #[test]
    fn write_snapshot_produces_both_files() {
        let mut graph = Graph::new();
        let a = graph.create_node("http://ex.org/a?x=1&y=<2>").unwrap();
        graph.set_mounted(EntityId::Node(a), true).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_snapshot(&RenderSnapshot::capture(&graph), dir.path()).unwrap();

        let graphml = fs::read_to_string(dir.path().join("graph.graphml")).unwrap();
        assert!(graphml.contains("&amp;y=&lt;2&gt;"));
        let json = fs::read_to_string(dir.path().join("snapshot.json")).unwrap();
        let parsed: RenderSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.nodes.len(), 1);
    }
}
