//! Queries shared by nodes and groups, dispatched over [`EntityId`]

use crate::error::{GraphError, GraphResult};
use crate::graph::model::{Edge, HierarchyMeta, Position};
use crate::graph::store::unknown;
use crate::graph::{EntityId, Graph, GroupId, NodeId};
use std::collections::BTreeSet;

impl Graph {
    pub fn contains(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Node(id) => self.node(id).is_some(),
            EntityId::Group(id) => self.group(id).is_some(),
        }
    }

    /// Stable identifier: the IRI for nodes, `group:<n>` for groups.
    pub fn identifier(&self, entity: EntityId) -> Option<String> {
        match entity {
            EntityId::Node(id) => self.node(id).map(|n| n.iri.clone()),
            EntityId::Group(id) => self.group(id).map(|g| format!("group:{}", g.id.0)),
        }
    }

    /// A node is visible when its flag is set; a group additionally needs at
    /// least one visible member.
    pub fn is_visible(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Node(id) => self.node(id).is_some_and(|n| n.visible),
            EntityId::Group(id) => self.group(id).is_some_and(|g| {
                g.visible && g.members.iter().any(|&m| self.is_visible(m))
            }),
        }
    }

    pub fn is_mounted(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Node(id) => self.node(id).is_some_and(|n| n.mounted),
            EntityId::Group(id) => self.group(id).is_some_and(|g| g.mounted),
        }
    }

    pub fn is_hidden_in_hierarchy(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Node(id) => self.node(id).is_some_and(|n| n.hidden_in_hierarchy),
            EntityId::Group(id) => self.group(id).is_some_and(|g| g.hidden_in_hierarchy),
        }
    }

    /// Node classes, or for a group the intersection of its members' classes.
    pub fn classes(&self, entity: EntityId) -> BTreeSet<String> {
        match entity {
            EntityId::Node(id) => self
                .node(id)
                .map(|n| n.classes.iter().cloned().collect())
                .unwrap_or_default(),
            EntityId::Group(id) => {
                let Some(group) = self.group(id) else {
                    return BTreeSet::new();
                };
                let mut members = group.members.iter();
                let Some(&first) = members.next() else {
                    return BTreeSet::new();
                };
                let mut classes = self.classes(first);
                for &member in members {
                    if classes.is_empty() {
                        break;
                    }
                    let other = self.classes(member);
                    classes.retain(|c| other.contains(c));
                }
                classes
            }
        }
    }

    /// A group counts as selected when any member is.
    pub fn is_selected(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Node(id) => self.node(id).is_some_and(|n| n.selected),
            EntityId::Group(id) => self
                .group(id)
                .is_some_and(|g| g.members.iter().any(|&m| self.is_selected(m))),
        }
    }

    /// Selecting a group selects every leaf under it.
    pub fn set_selected(&mut self, entity: EntityId, selected: bool) {
        match entity {
            EntityId::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.selected = selected;
                }
            }
            EntityId::Group(id) => {
                let leaves = self
                    .group(id)
                    .map(|g| g.leaf_nodes.clone())
                    .unwrap_or_default();
                for leaf in leaves {
                    if let Some(node) = self.node_mut(leaf) {
                        node.selected = selected;
                    }
                }
            }
        }
    }

    /// True if a node adjacent to this entity (through a real edge) is selected.
    pub fn is_neighbour_selected(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Node(id) => self.node(id).is_some_and(|n| {
                n.connected_edges
                    .iter()
                    .any(|c| self.node(c.other).is_some_and(|o| o.selected))
            }),
            EntityId::Group(id) => self
                .group(id)
                .is_some_and(|g| g.members.iter().any(|&m| self.is_neighbour_selected(m))),
        }
    }

    pub fn position(&self, entity: EntityId) -> Option<Position> {
        match entity {
            EntityId::Node(id) => self.node(id).and_then(|n| n.position),
            EntityId::Group(id) => self.group(id).and_then(|g| g.position),
        }
    }

    pub fn set_position(&mut self, entity: EntityId, position: Option<Position>) {
        match entity {
            EntityId::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.position = position;
                }
            }
            EntityId::Group(id) => {
                if let Some(group) = self.group_mut(id) {
                    group.position = position;
                }
            }
        }
    }

    pub fn hierarchy(&self, entity: EntityId) -> Option<&HierarchyMeta> {
        match entity {
            EntityId::Node(id) => self.node(id).map(|n| &n.hierarchy),
            EntityId::Group(id) => self.group(id).map(|g| &g.hierarchy),
        }
    }

    pub fn belongs_to_group(&self, entity: EntityId) -> Option<GroupId> {
        match entity {
            EntityId::Node(id) => self.node(id).and_then(|n| n.belongs_to_group),
            EntityId::Group(id) => self.group(id).and_then(|g| g.belongs_to_group),
        }
    }

    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        match entity {
            EntityId::Node(id) => self.node(id).and_then(|n| n.parent),
            EntityId::Group(id) => self.group(id).and_then(|g| g.parent),
        }
    }

    pub fn children(&self, entity: EntityId) -> &[EntityId] {
        let children = match entity {
            EntityId::Node(id) => self.node(id).map(|n| n.children.as_slice()),
            EntityId::Group(id) => self.group(id).map(|g| g.children.as_slice()),
        };
        children.unwrap_or(&[])
    }

    /// Move `child` under `parent` in the hierarchy, or to the top with `None`.
    ///
    /// Keeps both directions of the link in step. Refuses a parent that is the
    /// child itself or one of its descendants.
    pub fn set_hierarchy_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> GraphResult<()> {
        if !self.contains(child) {
            return Err(unknown(child));
        }
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(unknown(parent));
            }
            let mut current = Some(parent);
            let mut seen = BTreeSet::new();
            while let Some(entity) = current {
                if entity == child || !seen.insert(entity) {
                    return Err(GraphError::Invariant(format!(
                        "{} cannot be placed under its own descendant {}",
                        child, parent
                    )));
                }
                current = self.parent(entity);
            }
        }

        if let Some(previous) = self.parent(child) {
            if let Some(siblings) = self.children_mut(previous) {
                siblings.retain(|&c| c != child);
            }
        }
        self.set_parent(child, parent);
        if let Some(siblings) = parent.and_then(|p| self.children_mut(p)) {
            siblings.push(child);
        }
        Ok(())
    }

    /// Leaf nodes under an entity: itself for a node, the cache for a group.
    pub fn leaves_of(&self, entity: EntityId) -> Vec<NodeId> {
        match entity {
            EntityId::Node(id) => vec![id],
            EntityId::Group(id) => self
                .group(id)
                .map(|g| g.leaf_nodes.clone())
                .unwrap_or_default(),
        }
    }

    /// Groups containing `group`, innermost first. Stops at the first repeat.
    pub fn group_ancestors(&self, group: GroupId) -> Vec<GroupId> {
        let mut ancestors = Vec::new();
        let mut current = self.group(group).and_then(|g| g.belongs_to_group);
        while let Some(g) = current {
            if g == group || ancestors.contains(&g) {
                break;
            }
            ancestors.push(g);
            current = self.group(g).and_then(|g| g.belongs_to_group);
        }
        ancestors
    }

    /// Follow `belongs_to_group` from the node until it stops changing and
    /// report the last group reached, or `None` for an ungrouped node.
    pub(crate) fn compute_topmost_ancestor(&self, node: NodeId) -> Option<GroupId> {
        let start = EntityId::Node(node);
        let mut current = start;
        let mut seen = BTreeSet::new();
        loop {
            let next = self
                .belongs_to_group(current)
                .map(EntityId::Group)
                .unwrap_or(current);
            if next == current || !seen.insert(next) {
                break;
            }
            current = next;
        }
        if current == start {
            None
        } else {
            current.as_group()
        }
    }

    pub fn edge_is_visible(&self, edge: &Edge) -> bool {
        self.is_visible(EntityId::Node(edge.source))
            && self.is_visible(EntityId::Node(edge.target))
    }

    /// Drawn as a real edge: both ends mounted and neither absorbed by a group.
    pub fn edge_is_visual(&self, edge: &Edge) -> bool {
        [edge.source, edge.target].iter().all(|&id| {
            self.node(id)
                .is_some_and(|n| n.mounted && n.belongs_to_group.is_none())
        })
    }

    pub fn edge_is_adjacent_to_selected(&self, edge: &Edge) -> bool {
        self.is_selected(EntityId::Node(edge.source))
            || self.is_selected(EntityId::Node(edge.target))
    }

    pub(crate) fn set_belongs_to_group(&mut self, entity: EntityId, group: Option<GroupId>) {
        match entity {
            EntityId::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.belongs_to_group = group;
                }
            }
            EntityId::Group(id) => {
                if let Some(g) = self.group_mut(id) {
                    g.belongs_to_group = group;
                }
            }
        }
    }

    pub(crate) fn set_parent(&mut self, entity: EntityId, parent: Option<EntityId>) {
        match entity {
            EntityId::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.parent = parent;
                }
            }
            EntityId::Group(id) => {
                if let Some(group) = self.group_mut(id) {
                    group.parent = parent;
                }
            }
        }
    }

    pub(crate) fn children_mut(&mut self, entity: EntityId) -> Option<&mut Vec<EntityId>> {
        match entity {
            EntityId::Node(id) => self.node_mut(id).map(|n| &mut n.children),
            EntityId::Group(id) => self.group_mut(id).map(|g| &mut g.children),
        }
    }

    pub(crate) fn set_mounted_unchecked(&mut self, entity: EntityId, mounted: bool) {
        match entity {
            EntityId::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.mounted = mounted;
                }
            }
            EntityId::Group(id) => {
                if let Some(group) = self.group_mut(id) {
                    group.mounted = mounted;
                }
            }
        }
    }

    pub(crate) fn set_hidden_in_hierarchy(&mut self, entity: EntityId, hidden: bool) {
        match entity {
            EntityId::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.hidden_in_hierarchy = hidden;
                }
            }
            EntityId::Group(id) => {
                if let Some(group) = self.group_mut(id) {
                    group.hidden_in_hierarchy = hidden;
                }
            }
        }
    }
}
