//! Initial placement for nodes that arrive without a position

use crate::graph::{EntityId, Graph, NodeId, Position};
use std::f64::consts::PI;

/// Radius of the ring fresh nodes are placed on
pub const INITIAL_RADIUS: f64 = 100.0;

/// Place every node in `ids` that has no position on a ring around the
/// centroid of the already placed entities (the origin if there are none).
///
/// The ring is evenly divided in `ids` order, so the same input always gives
/// the same layout. Returns how many nodes were placed.
pub fn place_unpositioned(graph: &mut Graph, ids: &[NodeId]) -> usize {
    let pending: Vec<NodeId> = ids
        .iter()
        .copied()
        .filter(|&id| graph.node(id).is_some_and(|n| n.position.is_none()))
        .collect();
    if pending.is_empty() {
        return 0;
    }

    let placed: Vec<Position> = graph
        .nodes_visual()
        .into_iter()
        .filter_map(|entity| graph.position(entity))
        .collect();
    let center = Position::mean(&placed).unwrap_or_default();

    for (i, &id) in pending.iter().enumerate() {
        let angle = (i as f64) * 2.0 * PI / pending.len() as f64;
        let position = Position::new(
            center.x + INITIAL_RADIUS * angle.cos(),
            center.y + INITIAL_RADIUS * angle.sin(),
        );
        graph.set_position(EntityId::Node(id), Some(position));
    }

    log::debug!(
        "Placed {} nodes on a ring around ({:.1}, {:.1})",
        pending.len(),
        center.x,
        center.y
    );
    pending.len()
}
