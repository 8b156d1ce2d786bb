//! Derivation of group edges from the real edges crossing a group boundary

use crate::error::{GraphError, GraphResult};
use crate::graph::model::{EdgeKey, Orientation};
use crate::graph::{EntityId, Graph, GroupId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// All real edges of one type between a group and one other endpoint,
/// collapsed into a single drawable edge.
///
/// Group edges are never stored; they are recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEdge {
    pub source: EntityId,
    pub target: EntityId,
    pub edge_type: String,
    /// Classes every represented real edge carries.
    pub classes: BTreeSet<String>,
    /// Number of real edges represented.
    pub edge_count: usize,
}

impl Graph {
    /// Group edges of `group` in both directions, outgoing first.
    ///
    /// An invisible group has no edges.
    pub fn visible_group_edges(&self, group: GroupId) -> GraphResult<Vec<GroupEdge>> {
        if self.group(group).is_none() {
            return Err(GraphError::UnknownGroup(group));
        }
        if !self.is_visible(EntityId::Group(group)) {
            return Ok(Vec::new());
        }
        let mut edges = self.group_edges_in_direction(group, Orientation::Outgoing)?;
        edges.extend(self.group_edges_in_direction(group, Orientation::Incoming)?);
        Ok(edges)
    }

    /// Group edges of every mounted, visible group.
    ///
    /// Each group-to-group connection is emitted once, by the group holding
    /// the real source node.
    pub fn group_edges(&self) -> Vec<GroupEdge> {
        self.groups()
            .filter(|g| g.mounted)
            .filter_map(|g| self.visible_group_edges(g.id).ok())
            .flatten()
            .collect()
    }

    /// Group edges of `group` for one direction.
    pub fn group_edges_in_direction(
        &self,
        group: GroupId,
        orientation: Orientation,
    ) -> GraphResult<Vec<GroupEdge>> {
        let entry = self.group(group).ok_or(GraphError::UnknownGroup(group))?;
        let ancestors: HashSet<GroupId> = self.group_ancestors(group).into_iter().collect();

        let mut seen: HashMap<(EntityId, String), usize> = HashMap::new();
        let mut result: Vec<GroupEdge> = Vec::new();

        for &leaf in &entry.leaf_nodes {
            let Some(node) = self.node(leaf) else {
                continue;
            };
            if !node.is_visible() {
                continue;
            }

            for conn in node.connected_edges.iter().filter(|c| c.orientation == orientation) {
                let Some(far) = self.node(conn.other) else {
                    continue;
                };
                let key = match orientation {
                    Orientation::Outgoing => EdgeKey::new(&node.iri, &far.iri, &conn.edge_type),
                    Orientation::Incoming => EdgeKey::new(&far.iri, &node.iri, &conn.edge_type),
                };
                let Some(edge) = self.edge(&key) else {
                    continue;
                };
                if !far.is_visible() || !self.edge_is_visible(edge) {
                    continue;
                }

                let Some(endpoint) = self.resolve_far_endpoint(far.id, group, &ancestors) else {
                    // Internal edge: both ends are inside this group.
                    continue;
                };
                // The far group emits this edge from its own outgoing pass.
                if orientation == Orientation::Incoming && endpoint.is_group() {
                    continue;
                }
                if !self.is_visible(endpoint) {
                    continue;
                }

                let dedup_key = (endpoint, conn.edge_type.clone());
                match seen.get(&dedup_key) {
                    Some(&index) => {
                        let existing = &mut result[index];
                        existing.classes.retain(|c| edge.classes.contains(c));
                        existing.edge_count += 1;
                    }
                    None => {
                        let (source, target) = match orientation {
                            Orientation::Outgoing => (EntityId::Group(group), endpoint),
                            Orientation::Incoming => (endpoint, EntityId::Group(group)),
                        };
                        seen.insert(dedup_key, result.len());
                        result.push(GroupEdge {
                            source,
                            target,
                            edge_type: conn.edge_type.clone(),
                            classes: edge.classes.iter().cloned().collect(),
                            edge_count: 1,
                        });
                    }
                }
            }
        }

        Ok(result)
    }

    /// Entity standing in for `far` as seen from `group`.
    ///
    /// Walks outward through `far`'s groups and stops below the first group
    /// shared with `group`. Returns `None` when `far` is inside `group`.
    fn resolve_far_endpoint(
        &self,
        far: NodeId,
        group: GroupId,
        ancestors: &HashSet<GroupId>,
    ) -> Option<EntityId> {
        let mut current = EntityId::Node(far);
        loop {
            match self.belongs_to_group(current) {
                None => return Some(current),
                Some(owner) if owner == group => return None,
                Some(owner) if ancestors.contains(&owner) => return Some(current),
                Some(owner) => current = EntityId::Group(owner),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(graph: &mut Graph, iri: &str) -> NodeId {
        graph.create_node(iri).unwrap()
    }

    fn edge(graph: &mut Graph, s: NodeId, t: NodeId, ty: &str, classes: &[&str]) {
        let key = graph.create_edge(s, t, ty).unwrap();
        graph.edge_mut(&key).unwrap().classes = classes.iter().map(|c| c.to_string()).collect();
    }

    fn group_of(graph: &mut Graph, members: &[NodeId]) -> GroupId {
        let g = graph.create_group();
        for &m in members {
            let entry = graph.group_mut(g).unwrap();
            entry.members.push(EntityId::Node(m));
            entry.leaf_nodes.push(m);
            graph.node_mut(m).unwrap().belongs_to_group = Some(g);
        }
        graph.group_mut(g).unwrap().mounted = true;
        g
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parallel_edges_collapse_into_one_with_intersected_classes() {
        let mut graph = Graph::new();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let c = node(&mut graph, "c");
        let x = node(&mut graph, "x");
        edge(&mut graph, a, x, "cites", &["strong", "recent", "peer"]);
        edge(&mut graph, b, x, "cites", &["strong", "peer"]);
        edge(&mut graph, c, x, "cites", &["strong", "old"]);
        let g = group_of(&mut graph, &[a, b, c]);

        let edges = graph.visible_group_edges(g).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, EntityId::Group(g));
        assert_eq!(edges[0].target, EntityId::Node(x));
        assert_eq!(edges[0].classes, set(&["strong"]));
        assert_eq!(edges[0].edge_count, 3);
    }

    #[test]
    fn different_types_and_directions_stay_separate() {
        let mut graph = Graph::new();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let x = node(&mut graph, "x");
        edge(&mut graph, a, x, "cites", &[]);
        edge(&mut graph, b, x, "mentions", &[]);
        edge(&mut graph, x, a, "cites", &[]);
        let g = group_of(&mut graph, &[a, b]);

        let edges = graph.visible_group_edges(g).unwrap();
        assert_eq!(edges.len(), 3);
        assert!(edges
            .iter()
            .any(|e| e.source == EntityId::Node(x) && e.target == EntityId::Group(g)));
    }

    #[test]
    fn internal_edges_do_not_become_self_loops() {
        let mut graph = Graph::new();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        edge(&mut graph, a, b, "knows", &[]);
        let g = group_of(&mut graph, &[a, b]);

        assert!(graph.visible_group_edges(g).unwrap().is_empty());
    }

    #[test]
    fn invisible_far_nodes_and_members_are_skipped() {
        let mut graph = Graph::new();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let x = node(&mut graph, "x");
        let y = node(&mut graph, "y");
        edge(&mut graph, a, x, "rel", &[]);
        edge(&mut graph, b, y, "rel", &[]);
        let g = group_of(&mut graph, &[a, b]);

        graph.node_mut(x).unwrap().visible = false;
        graph.node_mut(b).unwrap().visible = false;
        assert!(graph.visible_group_edges(g).unwrap().is_empty());

        graph.node_mut(a).unwrap().visible = false;
        assert!(!graph.is_visible(EntityId::Group(g)));
        assert!(graph.visible_group_edges(g).unwrap().is_empty());
    }

    #[test]
    fn group_to_group_edges_are_emitted_once() {
        let mut graph = Graph::new();
        let a = node(&mut graph, "a");
        let b = node(&mut graph, "b");
        let c = node(&mut graph, "c");
        let d = node(&mut graph, "d");
        edge(&mut graph, a, c, "rel", &["x"]);
        edge(&mut graph, b, d, "rel", &["x", "y"]);
        let left = group_of(&mut graph, &[a, b]);
        let right = group_of(&mut graph, &[c, d]);

        let all = graph.group_edges();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].source, EntityId::Group(left));
        assert_eq!(all[0].target, EntityId::Group(right));
        assert_eq!(all[0].classes, set(&["x"]));
        assert_eq!(all[0].edge_count, 2);
    }

    #[test]
    fn far_nodes_resolve_to_their_outermost_group() {
        let mut graph = Graph::new();
        let a = node(&mut graph, "a");
        let c = node(&mut graph, "c");
        let d = node(&mut graph, "d");
        edge(&mut graph, a, c, "rel", &[]);
        let left = group_of(&mut graph, &[a]);
        let inner = group_of(&mut graph, &[c]);
        graph.group_mut(inner).unwrap().mounted = false;

        let outer = graph.create_group();
        {
            let entry = graph.group_mut(outer).unwrap();
            entry.members = vec![EntityId::Group(inner), EntityId::Node(d)];
            entry.leaf_nodes = vec![c, d];
            entry.mounted = true;
        }
        graph.group_mut(inner).unwrap().belongs_to_group = Some(outer);
        graph.node_mut(d).unwrap().belongs_to_group = Some(outer);

        let edges = graph.visible_group_edges(left).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, EntityId::Group(outer));
        assert!(graph.visible_group_edges(outer).unwrap().is_empty());
    }
}
