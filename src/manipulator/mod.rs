//! Grouping, degrouping, splitting and leaving groups

use crate::config::Config;
use crate::error::{GraphError, GraphResult};
use crate::graph::store::unknown;
use crate::graph::{EntityId, Graph, GroupId, HierarchyMeta, NodeId, Position};
use itertools::Itertools;

/// Stateless service applying grouping transitions to a [`Graph`].
///
/// Every transition validates its input before the first write, so a
/// rejected call leaves the graph untouched. In debug builds the full model
/// is re-checked after each successful transition.
#[derive(Debug, Clone)]
pub struct GraphManipulator {
    /// Keep nested groups as members and maintain the parent/children tree
    hierarchical: bool,

    /// Position for new groups whose inputs have none
    fallback_position: Position,
}

impl Default for GraphManipulator {
    fn default() -> Self {
        Self::new(false)
    }
}

impl GraphManipulator {
    pub fn new(hierarchical: bool) -> Self {
        Self {
            hierarchical,
            fallback_position: Position::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            hierarchical: config.hierarchical,
            fallback_position: config.fallback_position,
        }
    }

    pub fn with_fallback_position(mut self, position: Position) -> Self {
        self.fallback_position = position;
        self
    }

    pub fn is_hierarchical(&self) -> bool {
        self.hierarchical
    }

    /// Collapse `inputs` into a new mounted group.
    ///
    /// Outside hierarchical mode, input groups are flattened into the new
    /// group and discarded. In hierarchical mode they are nested as members.
    pub fn group_existing_nodes(
        &self,
        graph: &mut Graph,
        inputs: &[EntityId],
    ) -> GraphResult<GroupId> {
        let inputs: Vec<EntityId> = inputs.iter().copied().unique().collect();
        if inputs.is_empty() {
            return Err(GraphError::EmptyInput);
        }
        for &input in &inputs {
            if !graph.contains(input) {
                return Err(unknown(input));
            }
            if graph.belongs_to_group(input).is_some() {
                return Err(GraphError::AlreadyGrouped(input));
            }
        }

        let positions: Vec<Position> = inputs.iter().filter_map(|&e| graph.position(e)).collect();
        let group = graph.create_group();
        let group_entity = EntityId::Group(group);
        let mut meta = HierarchyMeta::default();
        let mut attached_to_parent = false;

        for &input in &inputs {
            if let Some(input_meta) = graph.hierarchy(input).cloned() {
                meta.fill_missing_from(&input_meta);
            }

            if self.hierarchical {
                if let Some(parent) = graph.parent(input) {
                    if let Some(siblings) = graph.children_mut(parent) {
                        siblings.retain(|&c| c != input);
                        if !attached_to_parent {
                            siblings.push(group_entity);
                        }
                    }
                    if !attached_to_parent {
                        graph.set_parent(group_entity, Some(parent));
                        attached_to_parent = true;
                    }
                }
            }

            match input {
                EntityId::Group(old) if !self.hierarchical => {
                    self.hoist_members(graph, old, group)?;
                }
                _ => {
                    let leaves = graph.leaves_of(input);
                    graph.set_belongs_to_group(input, Some(group));
                    graph.set_mounted_unchecked(input, false);
                    if let Some(entry) = graph.group_mut(group) {
                        entry.members.push(input);
                        entry.leaf_nodes.extend(leaves);
                    }
                }
            }
        }

        let position = Position::mean(&positions).unwrap_or_else(|| {
            log::warn!("No input of {} has a position, using fallback", group);
            self.fallback_position
        });
        let leaves = match graph.group_mut(group) {
            Some(entry) => {
                entry.hierarchy = meta;
                entry.position = Some(position);
                entry.mounted = true;
                entry.leaf_nodes.clone()
            }
            None => Vec::new(),
        };
        for leaf in leaves {
            self.set_new_topmost_group_ancestor(graph, leaf);
        }
        if !self.hierarchical {
            graph.set_selected(group_entity, true);
        }

        log::info!("Grouped {} entities into {}", inputs.len(), group);
        self.debug_check(graph);
        Ok(group)
    }

    /// Move every member of `old` into `group` and unregister `old`.
    fn hoist_members(&self, graph: &mut Graph, old: GroupId, group: GroupId) -> GraphResult<()> {
        let Some(entry) = graph.group_mut(old) else {
            return Err(GraphError::UnknownGroup(old));
        };
        let members = std::mem::take(&mut entry.members);
        let leaves = std::mem::take(&mut entry.leaf_nodes);
        let children = std::mem::take(&mut entry.children);
        let parent = entry.parent.take();

        for &member in &members {
            graph.set_belongs_to_group(member, Some(group));
        }
        for &child in &children {
            graph.set_parent(child, Some(EntityId::Group(group)));
        }
        if let Some(parent) = parent {
            if let Some(siblings) = graph.children_mut(parent) {
                siblings.retain(|&c| c != EntityId::Group(old));
            }
        }
        if let Some(entry) = graph.group_mut(group) {
            entry.members.extend(members);
            entry.leaf_nodes.extend(leaves);
            entry.children.extend(children);
        }

        graph.remove_group_ignore_nodes(old)?;
        log::debug!("Flattened {} into {}", old, group);
        Ok(())
    }

    /// Dissolve `group`, handing its members to the enclosing group (or to
    /// the top level). Returns the released members.
    pub fn de_group(&self, graph: &mut Graph, group: GroupId) -> GraphResult<Vec<EntityId>> {
        let entry = graph.group(group).ok_or(GraphError::UnknownGroup(group))?;
        let members = entry.members.clone();
        let leaves = entry.leaf_nodes.clone();
        let children = entry.children.clone();
        let outer = entry.belongs_to_group;
        let parent = entry.parent;
        let mounted = entry.mounted;
        let hidden = entry.hidden_in_hierarchy;
        let position = entry.position;
        let group_entity = EntityId::Group(group);

        for &member in &members {
            graph.set_belongs_to_group(member, outer);
            match outer {
                Some(outer) => {
                    graph.set_mounted_unchecked(member, false);
                    if let Some(o) = graph.group_mut(outer) {
                        o.members.push(member);
                    }
                }
                None => {
                    graph.set_mounted_unchecked(member, mounted);
                    graph.set_hidden_in_hierarchy(member, hidden);
                }
            }
            if graph.position(member).is_none() {
                graph.set_position(member, position);
            }
        }

        if let Some(outer) = outer {
            if let Some(o) = graph.group_mut(outer) {
                o.members.retain(|&m| m != group_entity);
            }
        }

        if let Some(siblings) = parent.and_then(|p| graph.children_mut(p)) {
            siblings.retain(|&c| c != group_entity);
        }
        graph.reparent(group_entity, parent);
        if let Some(siblings) = parent.and_then(|p| graph.children_mut(p)) {
            siblings.extend(children);
        }
        for &member in &members {
            self.relist_under_parent(graph, member);
        }

        graph.remove_group_ignore_nodes(group)?;
        for leaf in leaves {
            self.set_new_topmost_group_ancestor(graph, leaf);
        }

        log::info!("Dissolved {} releasing {} members", group, members.len());
        self.debug_check(graph);
        Ok(members)
    }

    /// Move `entities` out of `group` into a new sibling group.
    ///
    /// The new group inherits the donor's metadata, enclosing group and
    /// parent. A donor left empty is removed.
    pub fn split_group(
        &self,
        graph: &mut Graph,
        entities: &[EntityId],
        group: GroupId,
    ) -> GraphResult<GroupId> {
        let entities = self.validate_members(graph, entities, group)?;
        let (outer, parent, mounted, hidden, meta, donor_position) = {
            let donor = graph.group(group).ok_or(GraphError::UnknownGroup(group))?;
            (
                donor.belongs_to_group,
                donor.parent,
                donor.mounted,
                donor.hidden_in_hierarchy,
                donor.hierarchy.clone(),
                donor.position,
            )
        };

        let positions: Vec<Position> = entities.iter().filter_map(|&e| graph.position(e)).collect();
        let split = graph.create_group();
        let split_entity = EntityId::Group(split);
        if let Some(entry) = graph.group_mut(split) {
            entry.hierarchy = meta;
            entry.mounted = mounted;
            entry.hidden_in_hierarchy = hidden;
            entry.belongs_to_group = outer;
            entry.position = Position::mean(&positions).or(donor_position);
        }
        if let Some(o) = outer.and_then(|o| graph.group_mut(o)) {
            o.members.push(split_entity);
        }
        if let Some(parent) = parent {
            graph.set_parent(split_entity, Some(parent));
            if let Some(siblings) = graph.children_mut(parent) {
                siblings.push(split_entity);
            }
        }

        let moved = self.detach_members(graph, &entities, group);
        for &entity in &entities {
            graph.set_belongs_to_group(entity, Some(split));
        }
        if let Some(entry) = graph.group_mut(split) {
            entry.members.extend(entities.iter().copied());
            entry.leaf_nodes.extend(moved.iter().copied());
        }

        graph.drop_group_if_empty(group);
        for leaf in moved {
            self.set_new_topmost_group_ancestor(graph, leaf);
        }

        log::info!("Split {} entities from {} into {}", entities.len(), group, split);
        self.debug_check(graph);
        Ok(split)
    }

    /// Move `entities` out of `group` one level up: into the group's own
    /// enclosing group and under its parent. A donor left empty is removed.
    pub fn leave_group(
        &self,
        graph: &mut Graph,
        entities: &[EntityId],
        group: GroupId,
    ) -> GraphResult<()> {
        let entities = self.validate_members(graph, entities, group)?;
        let (outer, parent, mounted, hidden, donor_position) = {
            let donor = graph.group(group).ok_or(GraphError::UnknownGroup(group))?;
            (
                donor.belongs_to_group,
                donor.parent,
                donor.mounted,
                donor.hidden_in_hierarchy,
                donor.position,
            )
        };

        let moved = self.detach_members(graph, &entities, group);
        for &entity in &entities {
            graph.set_belongs_to_group(entity, outer);
            match outer {
                Some(outer) => {
                    graph.set_mounted_unchecked(entity, false);
                    if let Some(o) = graph.group_mut(outer) {
                        o.members.push(entity);
                    }
                }
                None => {
                    graph.set_mounted_unchecked(entity, mounted);
                    graph.set_hidden_in_hierarchy(entity, hidden);
                }
            }

            if let Some(parent) = parent {
                if let Err(e) = graph.set_hierarchy_parent(entity, Some(parent)) {
                    log::debug!("{} keeps its parent: {}", entity, e);
                }
            }
            self.relist_under_parent(graph, entity);

            if graph.position(entity).is_none() {
                graph.set_position(entity, donor_position);
            }
        }

        graph.drop_group_if_empty(group);
        for leaf in moved {
            self.set_new_topmost_group_ancestor(graph, leaf);
        }

        log::info!("{} entities left {}", entities.len(), group);
        self.debug_check(graph);
        Ok(())
    }

    /// Recompute the outermost group containing `node`.
    pub fn set_new_topmost_group_ancestor(&self, graph: &mut Graph, node: NodeId) {
        let ancestor = graph.compute_topmost_ancestor(node);
        if let Some(entry) = graph.node_mut(node) {
            entry.topmost_group_ancestor = ancestor;
        }
    }

    /// Put an entity that is no longer grouped back into its parent's
    /// `children`.
    fn relist_under_parent(&self, graph: &mut Graph, entity: EntityId) {
        if graph.belongs_to_group(entity).is_some() {
            return;
        }
        if let Some(siblings) = graph.parent(entity).and_then(|p| graph.children_mut(p)) {
            if !siblings.contains(&entity) {
                siblings.push(entity);
            }
        }
    }

    fn validate_members(
        &self,
        graph: &Graph,
        entities: &[EntityId],
        group: GroupId,
    ) -> GraphResult<Vec<EntityId>> {
        let donor = graph.group(group).ok_or(GraphError::UnknownGroup(group))?;
        let entities: Vec<EntityId> = entities.iter().copied().unique().collect();
        if entities.is_empty() {
            return Err(GraphError::EmptyInput);
        }
        if let Some(&stray) = entities.iter().find(|&&e| !donor.contains(e)) {
            return Err(GraphError::NotAMember {
                entity: stray,
                group,
            });
        }
        Ok(entities)
    }

    /// Remove `entities` from the donor's member list and leaf cache,
    /// returning the leaves that went with them.
    fn detach_members(
        &self,
        graph: &mut Graph,
        entities: &[EntityId],
        group: GroupId,
    ) -> Vec<NodeId> {
        let moved: Vec<NodeId> = entities.iter().flat_map(|&e| graph.leaves_of(e)).collect();
        if let Some(donor) = graph.group_mut(group) {
            donor.members.retain(|m| !entities.contains(m));
            donor.leaf_nodes.retain(|l| !moved.contains(l));
        }
        moved
    }

    fn debug_check(&self, graph: &Graph) {
        if cfg!(debug_assertions) {
            if let Err(e) = graph.check_consistency() {
                panic!("graph left inconsistent: {}", e);
            }
        }
    }
}
