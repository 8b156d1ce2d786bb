//! Cluster statistics and metrics

use crate::cluster::Cluster;
use crate::graph::{EntityId, Graph, NodeId, Position};
use itertools::Itertools;
use std::collections::HashSet;

/// Fill in the derived metrics of a cluster.
pub fn calculate_cluster_metrics(cluster: &mut Cluster, graph: &Graph) {
    cluster.size = cluster.members.len();
    cluster.density = calculate_density(graph, &cluster.members);
    cluster.mean_distance = mean_pairwise_distance(graph, &cluster.members);
}

/// Calculate density (actual edges / potential edges) over the leaf nodes
/// under `members`.
pub fn calculate_density(graph: &Graph, members: &[EntityId]) -> f32 {
    let leaves: HashSet<NodeId> = members.iter().flat_map(|&m| graph.leaves_of(m)).collect();
    let n = leaves.len();
    if n <= 1 {
        return 1.0; // By convention, singleton clusters have density 1
    }

    // Potential edges = n * (n - 1) for a directed graph, ignoring edge types
    let potential_edges = n * (n - 1);

    let actual_edges = graph
        .edges()
        .filter(|e| e.source != e.target)
        .filter(|e| leaves.contains(&e.source) && leaves.contains(&e.target))
        .map(|e| (e.source, e.target))
        .unique()
        .count();

    actual_edges as f32 / potential_edges as f32
}

/// Mean distance between every pair of positioned members.
pub fn mean_pairwise_distance(graph: &Graph, members: &[EntityId]) -> Option<f64> {
    let positions: Vec<Position> = members.iter().filter_map(|&m| graph.position(m)).collect();
    if positions.len() < 2 {
        return None;
    }
    let distances: Vec<f64> = positions
        .iter()
        .tuple_combinations()
        .map(|(a, b)| a.distance(b))
        .collect();
    Some(distances.iter().sum::<f64>() / distances.len() as f64)
}

/// Mean distance between the centers of distinct clusters.
pub fn mean_separation(clusters: &[Cluster]) -> Option<f64> {
    let centers: Vec<Position> = clusters.iter().filter_map(|c| c.center).collect();
    if centers.len() < 2 {
        return None;
    }
    let distances: Vec<f64> = centers
        .iter()
        .tuple_combinations()
        .map(|(a, b)| a.distance(b))
        .collect();
    Some(distances.iter().sum::<f64>() / distances.len() as f64)
}
