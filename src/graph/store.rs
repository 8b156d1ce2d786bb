//! The owning container for nodes, edges and groups

use crate::error::{GraphError, GraphResult};
use crate::graph::model::{ConnectedEdge, Edge, EdgeKey, EdgeType, Node, NodeGroup, Orientation};
use crate::graph::{EntityId, GroupId, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Arena holding every node, edge and group of one browsing session.
///
/// Relations between entries (`belongs_to_group`, `parent`, `children`) are
/// ids into these tables, never owning references.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node slots; removed nodes leave `None` behind so ids stay stable
    pub(crate) nodes: Vec<Option<Node>>,

    /// Mapping from IRIs to node slots
    pub(crate) iri_index: HashMap<String, NodeId>,

    /// Edges keyed by `(source, target, type)`
    pub(crate) edges: BTreeMap<EdgeKey, Edge>,

    pub(crate) groups: BTreeMap<GroupId, NodeGroup>,

    /// Known edge types by IRI
    pub(crate) types: BTreeMap<String, EdgeType>,

    next_group_id: u32,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node for `iri`. Fails if the IRI is already known.
    pub fn create_node(&mut self, iri: &str) -> GraphResult<NodeId> {
        if self.iri_index.contains_key(iri) {
            return Err(GraphError::DuplicateNode(iri.to_string()));
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node::new(id, iri.to_string())));
        self.iri_index.insert(iri.to_string(), id);

        log::debug!("Created {} for {}", id, iri);
        Ok(id)
    }

    /// Get the node for `iri`, creating it if needed.
    pub fn get_or_create_node(&mut self, iri: &str) -> NodeId {
        if let Some(&id) = self.iri_index.get(iri) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node::new(id, iri.to_string())));
        self.iri_index.insert(iri.to_string(), id);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn node_id(&self, iri: &str) -> Option<NodeId> {
        self.iri_index.get(iri).copied()
    }

    pub fn node_by_iri(&self, iri: &str) -> Option<&Node> {
        self.node_id(iri).and_then(|id| self.node(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn node_count(&self) -> usize {
        self.iri_index.len()
    }

    /// Create a typed edge and record it in both endpoints' adjacency.
    pub fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: &str,
    ) -> GraphResult<EdgeKey> {
        let source_iri = self
            .node(source)
            .ok_or(GraphError::UnknownNode(source))?
            .iri
            .clone();
        let target_iri = self
            .node(target)
            .ok_or(GraphError::UnknownNode(target))?
            .iri
            .clone();

        let key = EdgeKey::new(&source_iri, &target_iri, edge_type);
        if self.edges.contains_key(&key) {
            return Err(GraphError::DuplicateEdge {
                from: source_iri,
                to: target_iri,
                edge_type: edge_type.to_string(),
            });
        }

        self.edges.insert(
            key.clone(),
            Edge {
                key: key.clone(),
                source,
                target,
                classes: Vec::new(),
            },
        );

        if let Some(node) = self.node_mut(source) {
            node.connected_edges.push(ConnectedEdge {
                other: target,
                orientation: Orientation::Outgoing,
                edge_type: edge_type.to_string(),
            });
        }
        if let Some(node) = self.node_mut(target) {
            node.connected_edges.push(ConnectedEdge {
                other: source,
                orientation: Orientation::Incoming,
                edge_type: edge_type.to_string(),
            });
        }

        Ok(key)
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    pub fn edge_mut(&mut self, key: &EdgeKey) -> Option<&mut Edge> {
        self.edges.get_mut(key)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Remove one edge and its adjacency entries.
    pub fn remove_edge(&mut self, key: &EdgeKey) -> GraphResult<Edge> {
        let edge = self.edges.remove(key).ok_or_else(|| GraphError::UnknownEdge {
            from: key.source.clone(),
            to: key.target.clone(),
            edge_type: key.edge_type.clone(),
        })?;
        self.drop_adjacency(&edge);
        Ok(edge)
    }

    fn drop_adjacency(&mut self, edge: &Edge) {
        let edge_type = edge.edge_type().to_string();
        if let Some(node) = self.node_mut(edge.source) {
            if let Some(pos) = node.connected_edges.iter().position(|c| {
                c.other == edge.target
                    && c.orientation == Orientation::Outgoing
                    && c.edge_type == edge_type
            }) {
                node.connected_edges.remove(pos);
            }
        }
        if let Some(node) = self.node_mut(edge.target) {
            if let Some(pos) = node.connected_edges.iter().position(|c| {
                c.other == edge.source
                    && c.orientation == Orientation::Incoming
                    && c.edge_type == edge_type
            }) {
                node.connected_edges.remove(pos);
            }
        }
    }

    /// Remove a node together with every edge touching it.
    ///
    /// The node is also taken out of its group (groups left empty are
    /// removed, walking outward) and out of the parent/children hierarchy.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<()> {
        let node = self.node(id).ok_or(GraphError::UnknownNode(id))?;
        let iri = node.iri.clone();
        let group = node.belongs_to_group;
        let parent = node.parent;

        let doomed: Vec<EdgeKey> = self
            .edges
            .values()
            .filter(|e| e.source == id || e.target == id)
            .map(|e| e.key.clone())
            .collect();
        for key in &doomed {
            self.remove_edge(key)?;
        }

        if let Some(group) = group {
            let mut current = Some(group);
            while let Some(g) = current {
                if let Some(entry) = self.groups.get_mut(&g) {
                    entry.leaf_nodes.retain(|&leaf| leaf != id);
                    current = entry.belongs_to_group;
                } else {
                    current = None;
                }
            }
            if let Some(entry) = self.groups.get_mut(&group) {
                entry.members.retain(|&m| m != EntityId::Node(id));
            }
            self.drop_group_if_empty(group);
        }

        if let Some(parent) = parent {
            if let Some(siblings) = self.children_mut(parent) {
                siblings.retain(|&c| c != EntityId::Node(id));
            }
        }
        self.reparent(EntityId::Node(id), None);

        self.iri_index.remove(&iri);
        self.nodes[id.0 as usize] = None;

        log::debug!("Removed {} ({}) and {} edges", id, iri, doomed.len());
        Ok(())
    }

    /// Remove `group` if its membership list is empty, then repeat for the
    /// group that contained it.
    pub(crate) fn drop_group_if_empty(&mut self, group: GroupId) {
        let mut current = Some(group);
        while let Some(g) = current {
            let Some(entry) = self.groups.get(&g) else {
                return;
            };
            if !entry.members.is_empty() {
                return;
            }
            let outer = entry.belongs_to_group;
            let parent = entry.parent;

            if let Some(outer) = outer {
                if let Some(o) = self.groups.get_mut(&outer) {
                    o.members.retain(|&m| m != EntityId::Group(g));
                }
            }
            if let Some(parent) = parent {
                if let Some(siblings) = self.children_mut(parent) {
                    siblings.retain(|&c| c != EntityId::Group(g));
                }
            }
            self.reparent(EntityId::Group(g), None);
            self.groups.remove(&g);
            log::debug!("Removed empty {}", g);
            current = outer;
        }
    }

    /// Point every entity whose parent is `from` at `to` instead. Covers
    /// entities absorbed into a group, which are no longer listed in
    /// `from`'s children but still remember it.
    pub(crate) fn reparent(&mut self, from: EntityId, to: Option<EntityId>) {
        for node in self.nodes.iter_mut().flatten() {
            if node.parent == Some(from) {
                node.parent = to;
            }
        }
        for group in self.groups.values_mut() {
            if group.parent == Some(from) {
                group.parent = to;
            }
        }
    }

    /// Register a new, empty group. The caller must populate it.
    pub fn create_group(&mut self) -> GroupId {
        let id = GroupId(self.next_group_id);
        self.next_group_id += 1;
        self.groups.insert(id, NodeGroup::new(id));
        id
    }

    pub fn group(&self, id: GroupId) -> Option<&NodeGroup> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut NodeGroup> {
        self.groups.get_mut(&id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &NodeGroup> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Unregister a group without touching its members.
    ///
    /// Every entity must already have been detached from the group; otherwise
    /// the call is rejected and nothing changes.
    pub fn remove_group_ignore_nodes(&mut self, id: GroupId) -> GraphResult<NodeGroup> {
        if !self.groups.contains_key(&id) {
            return Err(GraphError::UnknownGroup(id));
        }
        let orphaned = self.nodes().any(|n| n.belongs_to_group == Some(id))
            || self.groups().any(|g| g.belongs_to_group == Some(id));
        if orphaned {
            return Err(GraphError::Invariant(format!(
                "{} still has members pointing at it",
                id
            )));
        }
        self.groups
            .remove(&id)
            .ok_or(GraphError::UnknownGroup(id))
    }

    pub fn register_type(&mut self, edge_type: EdgeType) {
        self.types.insert(edge_type.iri.clone(), edge_type);
    }

    pub fn edge_type(&self, iri: &str) -> Option<&EdgeType> {
        self.types.get(iri)
    }

    pub fn types(&self) -> impl Iterator<Item = &EdgeType> {
        self.types.values()
    }

    /// Mount or unmount an entity. Grouped entities cannot be mounted.
    pub fn set_mounted(&mut self, entity: EntityId, mounted: bool) -> GraphResult<()> {
        if !self.contains(entity) {
            return Err(unknown(entity));
        }
        if mounted && self.belongs_to_group(entity).is_some() {
            return Err(GraphError::AlreadyGrouped(entity));
        }
        self.set_mounted_unchecked(entity, mounted);
        Ok(())
    }

    /// Entities the renderer should draw: mounted nodes and mounted groups.
    pub fn nodes_visual(&self) -> Vec<EntityId> {
        let nodes = self
            .nodes()
            .filter(|n| n.mounted)
            .map(|n| EntityId::Node(n.id));
        let groups = self
            .groups()
            .filter(|g| g.mounted)
            .map(|g| EntityId::Group(g.id));
        nodes.chain(groups).collect()
    }

    /// Real edges the renderer should draw.
    pub fn edges_visual(&self) -> Vec<&Edge> {
        self.edges().filter(|e| self.edge_is_visual(e)).collect()
    }

    /// Verify every structural invariant of the model.
    ///
    /// Checks the membership bijection, that no group is empty, that leaf
    /// caches match the membership tree, that grouped entities are unmounted,
    /// that parents and children agree in both directions and that topmost
    /// ancestors are current. An entity inside a group may be missing from its
    /// parent's `children`, since the group stands in for it there.
    pub fn check_consistency(&self) -> GraphResult<()> {
        let fail = |msg: String| Err(GraphError::Invariant(msg));

        for node in self.nodes() {
            if let Some(g) = node.belongs_to_group {
                match self.group(g) {
                    Some(group) if group.members.contains(&EntityId::Node(node.id)) => {}
                    _ => return fail(format!("{} claims {} but is not listed", node.id, g)),
                }
                if node.mounted {
                    return fail(format!("{} is grouped but mounted", node.id));
                }
            }
            if node.topmost_group_ancestor != self.compute_topmost_ancestor(node.id) {
                return fail(format!("{} has a stale topmost ancestor", node.id));
            }
        }

        for group in self.groups() {
            if group.members.is_empty() {
                return fail(format!("{} is empty", group.id));
            }
            if let Some(outer) = group.belongs_to_group {
                match self.group(outer) {
                    Some(o) if o.members.contains(&EntityId::Group(group.id)) => {}
                    _ => return fail(format!("{} claims {} but is not listed", group.id, outer)),
                }
                if group.mounted {
                    return fail(format!("{} is nested but mounted", group.id));
                }
            }

            let unique: BTreeSet<_> = group.members.iter().collect();
            if unique.len() != group.members.len() {
                return fail(format!("{} lists a member twice", group.id));
            }
            for &member in &group.members {
                if self.belongs_to_group(member) != Some(group.id) {
                    return fail(format!("{} lists {} which points elsewhere", group.id, member));
                }
            }

            let cached: BTreeSet<NodeId> = group.leaf_nodes.iter().copied().collect();
            if cached.len() != group.leaf_nodes.len()
                || cached != self.collect_leaves(EntityId::Group(group.id))
            {
                return fail(format!("{} has a stale leaf cache", group.id));
            }
        }

        let entities = self
            .nodes()
            .map(|n| (EntityId::Node(n.id), &n.children))
            .chain(self.groups().map(|g| (EntityId::Group(g.id), &g.children)));
        for (entity, children) in entities {
            for &child in children {
                if self.parent(child) != Some(entity) {
                    return fail(format!("{} lists child {} with another parent", entity, child));
                }
            }
            let Some(parent) = self.parent(entity) else {
                continue;
            };
            if self.belongs_to_group(entity).is_some() {
                continue;
            }
            if !self.contains(parent) {
                return fail(format!("{} has a missing parent {}", entity, parent));
            }
            if !self.children(parent).contains(&entity) {
                return fail(format!("{} is not listed by its parent {}", entity, parent));
            }
        }

        Ok(())
    }

    /// Leaves reachable through membership, computed from scratch.
    pub(crate) fn collect_leaves(&self, entity: EntityId) -> BTreeSet<NodeId> {
        let mut leaves = BTreeSet::new();
        let mut seen = HashSet::new();
        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            match current {
                EntityId::Node(id) => {
                    leaves.insert(id);
                }
                EntityId::Group(id) => {
                    if !seen.insert(id) {
                        continue;
                    }
                    if let Some(group) = self.group(id) {
                        stack.extend(group.members.iter().copied());
                    }
                }
            }
        }
        leaves
    }
}

pub(crate) fn unknown(entity: EntityId) -> GraphError {
    match entity {
        EntityId::Node(id) => GraphError::UnknownNode(id),
        EntityId::Group(id) => GraphError::UnknownGroup(id),
    }
}
