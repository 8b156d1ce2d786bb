//! Error types for graph model operations

use crate::graph::{EntityId, GroupId, NodeId};
use thiserror::Error;

/// Errors raised by [`Graph`](crate::graph::Graph) and
/// [`GraphManipulator`](crate::manipulator::GraphManipulator) operations.
///
/// A call that returns one of these has not mutated the graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node `{0}` already exists")]
    DuplicateNode(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("edge {from} -[{edge_type}]-> {to} already exists")]
    DuplicateEdge {
        from: String,
        to: String,
        edge_type: String,
    },

    #[error("edge {from} -[{edge_type}]-> {to} does not exist")]
    UnknownEdge {
        from: String,
        to: String,
        edge_type: String,
    },

    #[error("operation requires at least one entity")]
    EmptyInput,

    #[error("{entity} is not a direct member of {group}")]
    NotAMember { entity: EntityId, group: GroupId },

    #[error("{0} already belongs to a group")]
    AlreadyGrouped(EntityId),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
