//! Node, edge and group records stored in the graph arena

use crate::graph::{EntityId, GroupId, NodeId};
use serde::{Deserialize, Serialize};

/// Screen position of a node or group.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        self.squared_distance(other).sqrt()
    }

    pub fn squared_distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Arithmetic mean of the given positions, or `None` for an empty input.
    pub fn mean<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Position> {
        let mut count = 0usize;
        let mut sum = Position::default();
        for p in positions {
            sum.x += p.x;
            sum.y += p.y;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(Position::new(sum.x / count as f64, sum.y / count as f64))
    }
}

/// Direction of an edge as seen from one of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Outgoing,
    Incoming,
}

/// Adjacency entry cached on a node.
///
/// This is a denormalised view of the graph's edge table; the table is
/// authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedEdge {
    pub other: NodeId,
    pub orientation: Orientation,
    pub edge_type: String,
}

/// Description of an edge type as delivered by the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeType {
    pub iri: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Hierarchy metadata carried by nodes and propagated onto new groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyMeta {
    pub hierarchical_class: Option<String>,
    pub hierarchical_level: Option<u32>,
    pub visual_group_class: Option<String>,
}

impl HierarchyMeta {
    /// Copy every field that is still unset from `other` (first write wins).
    pub fn fill_missing_from(&mut self, other: &HierarchyMeta) {
        if self.hierarchical_class.is_none() {
            self.hierarchical_class = other.hierarchical_class.clone();
        }
        if self.hierarchical_level.is_none() {
            self.hierarchical_level = other.hierarchical_level;
        }
        if self.visual_group_class.is_none() {
            self.visual_group_class = other.visual_group_class.clone();
        }
    }
}

/// A graph vertex identified by its IRI.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub iri: String,
    pub label: Option<String>,
    pub node_type: Option<String>,
    /// Classes of the current preview.
    pub classes: Vec<String>,
    pub visible: bool,
    pub selected: bool,
    pub locked_for_layouts: bool,
    pub hidden_in_hierarchy: bool,
    pub position: Option<Position>,
    pub hierarchy: HierarchyMeta,
    pub(crate) mounted: bool,
    pub(crate) belongs_to_group: Option<GroupId>,
    pub(crate) topmost_group_ancestor: Option<GroupId>,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
    pub(crate) connected_edges: Vec<ConnectedEdge>,
}

impl Node {
    pub(crate) fn new(id: NodeId, iri: String) -> Self {
        Self {
            id,
            iri,
            label: None,
            node_type: None,
            classes: Vec::new(),
            visible: true,
            selected: false,
            locked_for_layouts: false,
            hidden_in_hierarchy: false,
            position: None,
            hierarchy: HierarchyMeta::default(),
            mounted: false,
            belongs_to_group: None,
            topmost_group_ancestor: None,
            parent: None,
            children: Vec::new(),
            connected_edges: Vec::new(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn belongs_to_group(&self) -> Option<GroupId> {
        self.belongs_to_group
    }

    pub fn topmost_group_ancestor(&self) -> Option<GroupId> {
        self.topmost_group_ancestor
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn connected_edges(&self) -> &[ConnectedEdge] {
        &self.connected_edges
    }
}

/// Composite identity of an edge: `(source IRI, target IRI, type IRI)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub edge_type: String,
}

impl EdgeKey {
    pub fn new(source: &str, target: &str, edge_type: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            edge_type: edge_type.to_string(),
        }
    }
}

/// A directed, typed relation between two nodes.
#[derive(Debug, Clone)]
pub struct Edge {
    pub key: EdgeKey,
    pub source: NodeId,
    pub target: NodeId,
    pub classes: Vec<String>,
}

impl Edge {
    pub fn edge_type(&self) -> &str {
        &self.key.edge_type
    }
}

/// A collapsible aggregate of nodes and, in hierarchical mode, nested groups.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    pub id: GroupId,
    pub visible: bool,
    pub locked_for_layouts: bool,
    pub hidden_in_hierarchy: bool,
    pub position: Option<Position>,
    pub hierarchy: HierarchyMeta,
    pub(crate) mounted: bool,
    pub(crate) members: Vec<EntityId>,
    /// Transitive closure of leaf nodes under this group.
    pub(crate) leaf_nodes: Vec<NodeId>,
    pub(crate) belongs_to_group: Option<GroupId>,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
}

impl NodeGroup {
    pub(crate) fn new(id: GroupId) -> Self {
        Self {
            id,
            visible: true,
            locked_for_layouts: false,
            hidden_in_hierarchy: false,
            position: None,
            hierarchy: HierarchyMeta::default(),
            mounted: false,
            members: Vec::new(),
            leaf_nodes: Vec::new(),
            belongs_to_group: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Direct members of the group.
    pub fn nodes(&self) -> &[EntityId] {
        &self.members
    }

    pub fn leaf_nodes(&self) -> &[NodeId] {
        &self.leaf_nodes
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn belongs_to_group(&self) -> Option<GroupId> {
        self.belongs_to_group
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.contains(&entity)
    }
}
