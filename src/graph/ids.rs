//! Typed arena indices for nodes and groups

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a [`Node`](crate::graph::Node) in its graph's node table.
///
/// Slots are never reused, so a stale id keeps pointing at nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identifier of a [`NodeGroup`](crate::graph::NodeGroup), drawn from the
/// owning graph's monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Either a leaf node or a group.
///
/// Most operations that accept "a node" accept both kinds; shared queries
/// live on [`Graph`](crate::graph::Graph) as match arms over this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Node(NodeId),
    Group(GroupId),
}

impl EntityId {
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            EntityId::Node(id) => Some(id),
            EntityId::Group(_) => None,
        }
    }

    pub fn as_group(self) -> Option<GroupId> {
        match self {
            EntityId::Group(id) => Some(id),
            EntityId::Node(_) => None,
        }
    }

    pub fn is_group(self) -> bool {
        matches!(self, EntityId::Group(_))
    }
}

impl From<NodeId> for EntityId {
    fn from(id: NodeId) -> Self {
        EntityId::Node(id)
    }
}

impl From<GroupId> for EntityId {
    fn from(id: GroupId) -> Self {
        EntityId::Group(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Node(id) => id.fmt(f),
            EntityId::Group(id) => id.fmt(f),
        }
    }
}
