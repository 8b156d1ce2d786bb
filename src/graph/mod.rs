//! Graph data model: nodes, edges, groups and derived group edges

pub mod entity;
pub mod group_edges;
pub mod ids;
pub mod model;
pub mod store;

pub use group_edges::GroupEdge;
pub use ids::{EntityId, GroupId, NodeId};
pub use model::{
    ConnectedEdge, Edge, EdgeKey, EdgeType, HierarchyMeta, Node, NodeGroup, Orientation, Position,
};
pub use store::Graph;
