//! Saving and restoring the graph model

use crate::cluster::{metrics, ClusterReport};
use crate::graph::{EdgeType, EntityId, Graph, GroupId, HierarchyMeta, Position};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, to_string_pretty};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Reference to a node (by IRI) or to a group (by its handle in the same
/// saved object).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRef {
    Node(String),
    Group(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub iri: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub classes: Vec<String>,
    pub mounted: bool,
    pub visible: bool,
    pub selected: bool,
    pub locked_for_layouts: bool,
    pub hidden_in_hierarchy: bool,
    pub position: Option<Position>,
    pub hierarchy: HierarchyMeta,
    pub parent: Option<MemberRef>,
    pub children: Vec<MemberRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Local handle, only meaningful inside one saved object
    pub handle: u32,
    pub members: Vec<MemberRef>,
    pub mounted: bool,
    pub visible: bool,
    pub locked_for_layouts: bool,
    pub hidden_in_hierarchy: bool,
    pub position: Option<Position>,
    pub hierarchy: HierarchyMeta,
    pub parent: Option<MemberRef>,
    pub children: Vec<MemberRef>,
}

/// Plain-record form of a [`Graph`]. Group order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphObject {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub groups: Vec<GroupRecord>,
    pub types: Vec<EdgeType>,
}

/// Pan and zoom of the graph area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub pan: Position,
    pub zoom: f64,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            pan: Position::default(),
            zoom: 1.0,
        }
    }
}

/// Everything written to a session file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionObject {
    pub graph: GraphObject,
    pub viewport: ViewportState,
}

impl Graph {
    pub fn save_to_object(&self) -> GraphObject {
        let nodes = self
            .nodes()
            .map(|n| NodeRecord {
                iri: n.iri.clone(),
                label: n.label.clone(),
                node_type: n.node_type.clone(),
                classes: n.classes.clone(),
                mounted: n.mounted,
                visible: n.visible,
                selected: n.selected,
                locked_for_layouts: n.locked_for_layouts,
                hidden_in_hierarchy: n.hidden_in_hierarchy,
                position: n.position,
                hierarchy: n.hierarchy.clone(),
                parent: n.parent.and_then(|p| self.member_ref(p)),
                children: n.children.iter().filter_map(|&c| self.member_ref(c)).collect(),
            })
            .collect();

        let edges = self
            .edges()
            .map(|e| EdgeRecord {
                source: e.key.source.clone(),
                target: e.key.target.clone(),
                edge_type: e.key.edge_type.clone(),
                classes: e.classes.clone(),
            })
            .collect();

        let groups = self
            .groups()
            .map(|g| GroupRecord {
                handle: g.id.0,
                members: g.members.iter().filter_map(|&m| self.member_ref(m)).collect(),
                mounted: g.mounted,
                visible: g.visible,
                locked_for_layouts: g.locked_for_layouts,
                hidden_in_hierarchy: g.hidden_in_hierarchy,
                position: g.position,
                hierarchy: g.hierarchy.clone(),
                parent: g.parent.and_then(|p| self.member_ref(p)),
                children: g.children.iter().filter_map(|&c| self.member_ref(c)).collect(),
            })
            .collect();

        GraphObject {
            nodes,
            edges,
            groups,
            types: self.types().cloned().collect(),
        }
    }

    /// Rebuild a graph from its record form.
    ///
    /// Group ids are freshly allocated. The result is checked for
    /// consistency before it is returned.
    pub fn restore_from_object(object: &GraphObject) -> Result<Graph> {
        let mut graph = Graph::new();

        for edge_type in &object.types {
            graph.register_type(edge_type.clone());
        }

        for record in &object.nodes {
            let id = graph.create_node(&record.iri)?;
            if let Some(node) = graph.node_mut(id) {
                node.label = record.label.clone();
                node.node_type = record.node_type.clone();
                node.classes = record.classes.clone();
                node.mounted = record.mounted;
                node.visible = record.visible;
                node.selected = record.selected;
                node.locked_for_layouts = record.locked_for_layouts;
                node.hidden_in_hierarchy = record.hidden_in_hierarchy;
                node.position = record.position;
                node.hierarchy = record.hierarchy.clone();
            }
        }

        for record in &object.edges {
            let source = graph
                .node_id(&record.source)
                .ok_or_else(|| anyhow!("Edge source {} is not a saved node", record.source))?;
            let target = graph
                .node_id(&record.target)
                .ok_or_else(|| anyhow!("Edge target {} is not a saved node", record.target))?;
            let key = graph.create_edge(source, target, &record.edge_type)?;
            if let Some(edge) = graph.edge_mut(&key) {
                edge.classes = record.classes.clone();
            }
        }

        let mut handles: HashMap<u32, GroupId> = HashMap::with_capacity(object.groups.len());
        for record in &object.groups {
            let id = graph.create_group();
            if handles.insert(record.handle, id).is_some() {
                return Err(anyhow!("Group handle {} is used twice", record.handle));
            }
            if let Some(group) = graph.group_mut(id) {
                group.mounted = record.mounted;
                group.visible = record.visible;
                group.locked_for_layouts = record.locked_for_layouts;
                group.hidden_in_hierarchy = record.hidden_in_hierarchy;
                group.position = record.position;
                group.hierarchy = record.hierarchy.clone();
            }
        }

        for record in &object.groups {
            let group = handles[&record.handle];
            for member in &record.members {
                let entity = resolve(&graph, &handles, member)?;
                if graph.belongs_to_group(entity).is_some() {
                    return Err(anyhow!("{} is listed in more than one group", entity));
                }
                if let EntityId::Group(nested) = entity {
                    if nested == group || graph.group_ancestors(group).contains(&nested) {
                        return Err(anyhow!("Group membership of {} forms a cycle", entity));
                    }
                }
                graph.set_belongs_to_group(entity, Some(group));
                if let Some(entry) = graph.group_mut(group) {
                    entry.members.push(entity);
                }
            }
        }

        let owners = object
            .nodes
            .iter()
            .map(|r| (MemberRef::Node(r.iri.clone()), &r.parent, &r.children))
            .chain(
                object
                    .groups
                    .iter()
                    .map(|r| (MemberRef::Group(r.handle), &r.parent, &r.children)),
            );
        for (owner, parent, children) in owners {
            let entity = resolve(&graph, &handles, &owner)?;
            let parent = parent
                .as_ref()
                .map(|p| resolve(&graph, &handles, p))
                .transpose()?;
            let children = children
                .iter()
                .map(|c| resolve(&graph, &handles, c))
                .collect::<Result<Vec<_>>>()?;
            graph.set_parent(entity, parent);
            if let Some(list) = graph.children_mut(entity) {
                *list = children;
            }
        }

        let group_ids: Vec<GroupId> = handles.values().copied().collect();
        for id in group_ids {
            let leaves: Vec<_> = graph.collect_leaves(EntityId::Group(id)).into_iter().collect();
            if let Some(group) = graph.group_mut(id) {
                group.leaf_nodes = leaves;
            }
        }
        let node_ids: Vec<_> = graph.nodes().map(|n| n.id).collect();
        for id in node_ids {
            let ancestor = graph.compute_topmost_ancestor(id);
            if let Some(node) = graph.node_mut(id) {
                node.topmost_group_ancestor = ancestor;
            }
        }

        graph
            .check_consistency()
            .context("Restored graph is inconsistent")?;

        log::info!(
            "Restored graph with {} nodes, {} edges and {} groups",
            graph.node_count(),
            graph.edge_count(),
            graph.group_count()
        );
        Ok(graph)
    }

    fn member_ref(&self, entity: EntityId) -> Option<MemberRef> {
        match entity {
            EntityId::Node(id) => self.node(id).map(|n| MemberRef::Node(n.iri.clone())),
            EntityId::Group(id) => self.group(id).map(|g| MemberRef::Group(g.id.0)),
        }
    }
}

fn resolve(graph: &Graph, handles: &HashMap<u32, GroupId>, member: &MemberRef) -> Result<EntityId> {
    match member {
        MemberRef::Node(iri) => graph
            .node_id(iri)
            .map(EntityId::Node)
            .ok_or_else(|| anyhow!("Reference to unknown node {}", iri)),
        MemberRef::Group(handle) => handles
            .get(handle)
            .map(|&id| EntityId::Group(id))
            .ok_or_else(|| anyhow!("Reference to unknown group handle {}", handle)),
    }
}

fn is_binary(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bin")
}

/// Write a session to `path`: bincode for `.bin`, pretty JSON otherwise.
pub fn save_session(session: &SessionObject, path: &Path) -> Result<()> {
    log::info!("Saving session to {}", path.display());

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut file = File::create(path)?;

    if is_binary(path) {
        file.write_all(&bincode::serialize(session)?)?;
    } else {
        file.write_all(to_string_pretty(session)?.as_bytes())?;
    }

    Ok(())
}

pub fn load_session(path: &Path) -> Result<SessionObject> {
    if !path.exists() {
        return Err(anyhow!("File not found: {}", path.display()));
    }
    log::info!("Loading session from {}", path.display());

    let bytes = fs::read(path)?;
    let session = if is_binary(path) {
        bincode::deserialize(&bytes)?
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok(session)
}

/// Save a summary of a clustering run next to the session.
pub fn save_cluster_report(report: &ClusterReport, graph: &Graph, path: &Path) -> Result<()> {
    log::info!("Saving cluster report to {}", path.display());

    let mut file = File::create(path)?;
    let clusters = &report.clusters;

    let summary = json!({
        "k": report.k,
        "iterations": report.iterations,
        "converged": report.converged,
        "cluster_stats": {
            "cluster_count": clusters.len(),
            "grouped_clusters": clusters.iter().filter(|c| c.size > 1).count(),
            "largest_cluster_size": clusters.iter().map(|c| c.size).max().unwrap_or(0),
            "avg_density": clusters.iter().map(|c| c.density as f64).sum::<f64>() /
                           if clusters.is_empty() { 1.0 } else { clusters.len() as f64 },
            "mean_separation": metrics::mean_separation(clusters),
        },
        "clusters": clusters.iter().map(|c| {
            json!({
                "id": c.id,
                "size": c.size,
                "density": c.density,
                "mean_distance": c.mean_distance,
                "center": c.center,
                "members": c.members
                    .iter()
                    .filter_map(|&m| graph.identifier(m))
                    .collect::<Vec<_>>(),
            })
        }).collect::<Vec<_>>()
    });

    file.write_all(to_string_pretty(&summary)?.as_bytes())?;

    Ok(())
}
