//! K-means / K-medoids partitioning of nodes by screen position

use crate::cluster::{metrics, Cluster, ClusterMethod, ClusterReport};
use crate::config::{Config, DEFAULT_MAX_ITERATIONS};
use crate::error::{GraphError, GraphResult};
use crate::graph::store::unknown;
use crate::graph::{EntityId, Graph, GroupId, Position};
use crate::manipulator::GraphManipulator;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lloyd-style clusterer over 2-D positions.
///
/// Splits `n` entities into `max(1, n / 2)` clusters and refines for at
/// most `max_iterations` rounds.
pub struct KCluster {
    method: ClusterMethod,
    max_iterations: usize,
    rng: StdRng,
}

/// Cluster assignment over indices into the placed points.
struct Assignment {
    clusters: Vec<Vec<usize>>,
    centers: Vec<Position>,
    iterations: usize,
    converged: bool,
}

impl KCluster {
    pub fn new(method: ClusterMethod) -> Self {
        Self {
            method,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(method: ClusterMethod, seed: u64) -> Self {
        Self {
            method,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let clusterer = match config.seed {
            Some(seed) => Self::with_seed(config.method, seed),
            None => Self::new(config.method),
        };
        clusterer.with_max_iterations(config.max_iterations)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn method(&self) -> ClusterMethod {
        self.method
    }

    /// Partition `entities` without touching the graph.
    ///
    /// Every input appears in exactly one cluster. Entities without a
    /// position cannot be placed and come back as singleton clusters.
    pub fn partition(&mut self, graph: &Graph, entities: &[EntityId]) -> ClusterReport {
        let entities: Vec<EntityId> = entities.iter().copied().unique().collect();
        if entities.is_empty() {
            return ClusterReport::empty();
        }

        let (placed, unplaced): (Vec<_>, Vec<_>) = entities
            .iter()
            .map(|&e| (e, graph.position(e)))
            .partition(|(_, position)| position.is_some());
        let ids: Vec<EntityId> = placed.iter().map(|&(e, _)| e).collect();
        let points: Vec<Position> = placed.iter().filter_map(|&(_, p)| p).collect();
        if !unplaced.is_empty() {
            log::warn!("{} entities have no position and stay unclustered", unplaced.len());
        }

        let mut clusters = Vec::new();
        let mut k = 0;
        let mut iterations = 0;
        let mut converged = true;

        if !points.is_empty() {
            k = (points.len() / 2).max(1);
            log::info!("Running {} with k={} over {} entities", self.method, k, points.len());

            let assignment = match self.method {
                ClusterMethod::KMeans => self.kmeans(&points, k),
                ClusterMethod::KMedoids => self.kmedoids(&points, k),
            };
            iterations = assignment.iterations;
            converged = assignment.converged;

            for (members, center) in assignment.clusters.iter().zip(&assignment.centers) {
                if members.is_empty() {
                    continue;
                }
                let members: Vec<EntityId> = members.iter().map(|&i| ids[i]).collect();
                let id = clusters.len() as u32;
                clusters.push(self.make_cluster(graph, id, members, Some(*center)));
            }
        }

        for (entity, _) in unplaced {
            clusters.push(self.make_cluster(graph, clusters.len() as u32, vec![entity], None));
        }

        log::info!(
            "Partitioned into {} clusters after {} iterations (converged: {})",
            clusters.len(),
            iterations,
            converged
        );

        ClusterReport {
            clusters,
            k,
            iterations,
            converged,
        }
    }

    /// Partition `entities` and collapse every cluster with more than one
    /// member into a group. Singleton clusters stay as they are.
    pub fn cluster_and_group(
        &mut self,
        graph: &mut Graph,
        manipulator: &GraphManipulator,
        entities: &[EntityId],
    ) -> GraphResult<(ClusterReport, Vec<GroupId>)> {
        for &entity in entities {
            if !graph.contains(entity) {
                return Err(unknown(entity));
            }
            if graph.belongs_to_group(entity).is_some() {
                return Err(GraphError::AlreadyGrouped(entity));
            }
        }

        let report = self.partition(graph, entities);
        let mut groups = Vec::new();
        for cluster in report.clusters.iter().filter(|c| c.size > 1) {
            groups.push(manipulator.group_existing_nodes(graph, &cluster.members)?);
        }

        log::info!("Created {} groups from {} clusters", groups.len(), report.clusters.len());
        Ok((report, groups))
    }

    fn make_cluster(
        &self,
        graph: &Graph,
        id: u32,
        members: Vec<EntityId>,
        center: Option<Position>,
    ) -> Cluster {
        let mut cluster = Cluster {
            id,
            size: members.len(),
            members,
            center,
            density: 1.0,
            mean_distance: None,
        };
        metrics::calculate_cluster_metrics(&mut cluster, graph);
        cluster
    }

    fn kmeans(&mut self, points: &[Position], k: usize) -> Assignment {
        let (min_x, max_x) = points
            .iter()
            .map(|p| p.x)
            .minmax()
            .into_option()
            .unwrap_or((0.0, 0.0));
        let (min_y, max_y) = points
            .iter()
            .map(|p| p.y)
            .minmax()
            .into_option()
            .unwrap_or((0.0, 0.0));

        // A box too wide for `gen_range` seeds from the inputs instead.
        let spans_finite = (max_x - min_x).is_finite() && (max_y - min_y).is_finite();
        if !spans_finite {
            log::warn!("Positions span too far to sample uniformly, seeding from inputs");
        }
        let mut centers: Vec<Position> = (0..k)
            .map(|_| {
                if spans_finite {
                    Position::new(
                        self.rng.gen_range(min_x..=max_x),
                        self.rng.gen_range(min_y..=max_y),
                    )
                } else {
                    points[self.rng.gen_range(0..points.len())]
                }
            })
            .collect();

        let all: Vec<usize> = (0..points.len()).collect();
        let mut clusters = vec![Vec::new(); k];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;
            clusters = assign(points, &all, &centers);

            let updated: Vec<Position> = clusters
                .iter()
                .zip(&centers)
                .map(|(members, old)| {
                    Position::mean(members.iter().map(|&i| &points[i])).unwrap_or(*old)
                })
                .collect();

            converged = centers
                .iter()
                .zip(&updated)
                .all(|(old, new)| round4(old) == round4(new));
            centers = updated;
            log::debug!("kmeans iteration {}: converged={}", iterations, converged);

            if converged {
                break;
            }
        }

        Assignment {
            clusters,
            centers,
            iterations,
            converged,
        }
    }

    fn kmedoids(&mut self, points: &[Position], k: usize) -> Assignment {
        let k = k.min(points.len());
        let mut medoids: Vec<usize> =
            rand::seq::index::sample(&mut self.rng, points.len(), k).into_vec();

        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;

            let rest: Vec<usize> = (0..points.len()).filter(|i| !medoids.contains(i)).collect();
            let centers: Vec<Position> = medoids.iter().map(|&m| points[m]).collect();
            clusters = assign(points, &rest, &centers);
            for (members, &medoid) in clusters.iter_mut().zip(&medoids) {
                members.insert(0, medoid);
            }

            let mut swapped = false;
            for (members, medoid) in clusters.iter().zip(medoids.iter_mut()) {
                let mut best = *medoid;
                let mut best_cost = medoid_cost(points, members, best);
                for &candidate in members {
                    if candidate == *medoid {
                        continue;
                    }
                    let cost = medoid_cost(points, members, candidate);
                    if cost < best_cost {
                        best = candidate;
                        best_cost = cost;
                    }
                }
                if best != *medoid {
                    *medoid = best;
                    swapped = true;
                }
            }
            log::debug!("kmedoids iteration {}: swapped={}", iterations, swapped);

            if !swapped {
                converged = true;
                break;
            }
        }

        Assignment {
            centers: medoids.iter().map(|&m| points[m]).collect(),
            clusters,
            iterations,
            converged,
        }
    }
}

/// Assign each of `indices` to its nearest center; ties go to the lowest
/// center index.
fn assign(points: &[Position], indices: &[usize], centers: &[Position]) -> Vec<Vec<usize>> {
    let mut clusters = vec![Vec::new(); centers.len()];
    for &i in indices {
        let mut nearest = 0;
        let mut nearest_distance = f64::INFINITY;
        for (c, center) in centers.iter().enumerate() {
            let distance = points[i].distance(center);
            if distance < nearest_distance {
                nearest = c;
                nearest_distance = distance;
            }
        }
        if let Some(cluster) = clusters.get_mut(nearest) {
            cluster.push(i);
        }
    }
    clusters
}

fn medoid_cost(points: &[Position], members: &[usize], candidate: usize) -> f64 {
    members
        .iter()
        .map(|&m| points[m].squared_distance(&points[candidate]))
        .sum()
}

fn round4(p: &Position) -> (i64, i64) {
    ((p.x * 10_000.0).round() as i64, (p.y * 10_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn placed(points: &[(f64, f64)]) -> (Graph, Vec<EntityId>) {
        let mut graph = Graph::new();
        let ids = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let id = graph.create_node(&format!("n{}", i)).unwrap();
                graph.set_mounted(EntityId::Node(id), true).unwrap();
                graph.node_mut(id).unwrap().position = Some(Position::new(x, y));
                EntityId::Node(id)
            })
            .collect();
        (graph, ids)
    }

    fn two_blobs() -> (Graph, Vec<EntityId>) {
        placed(&[
            (0.0, 0.0),
            (0.5, 0.0),
            (0.0, 0.5),
            (100.0, 100.0),
            (100.5, 100.0),
            (100.0, 100.5),
        ])
    }

    fn assert_exact_cover(report: &ClusterReport, input: &[EntityId]) {
        let all: Vec<EntityId> =
            report.clusters.iter().flat_map(|c| c.members.clone()).collect();
        let unique: BTreeSet<EntityId> = all.iter().copied().collect();
        assert_eq!(all.len(), input.len());
        assert_eq!(unique, input.iter().copied().collect());
    }

    #[test]
    fn empty_input_does_nothing() {
        let graph = Graph::new();
        let report = KCluster::with_seed(ClusterMethod::KMeans, 1).partition(&graph, &[]);
        assert!(report.clusters.is_empty());
        assert_eq!(report.k, 0);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn kmeans_uses_half_as_many_centers() {
        let (graph, ids) = two_blobs();
        let mut clusterer = KCluster::with_seed(ClusterMethod::KMeans, 7);
        let report = clusterer.partition(&graph, &ids);

        assert!(report.clusters.len() <= 3);
        assert!(report.iterations >= 1 && report.iterations <= DEFAULT_MAX_ITERATIONS);
        assert_exact_cover(&report, &ids);
    }

    #[test]
    fn kmeans_keeps_tight_blobs_together() {
        let (graph, ids) = two_blobs();
        let mut tight = 0;
        let mut multi = 0;

        for seed in 0..10 {
            let report = KCluster::with_seed(ClusterMethod::KMeans, seed).partition(&graph, &ids);
            assert_eq!(report.k, 3);
            assert!(report.clusters.len() <= 3);
            assert_exact_cover(&report, &ids);

            let separation = metrics::mean_separation(&report.clusters);
            for cluster in report.clusters.iter().filter(|c| c.size > 1) {
                multi += 1;
                if let (Some(within), Some(between)) = (cluster.mean_distance, separation) {
                    if within < between {
                        tight += 1;
                    }
                }
            }
        }

        assert!(multi > 0);
        assert!(tight * 2 > multi, "only {} of {} clusters were tight", tight, multi);
    }

    #[test]
    fn kmeans_survives_positions_at_the_edge_of_f64() {
        let (graph, ids) = placed(&[(-1e308, -1e308), (1e308, 1e308), (-1e308, 1e308), (0.0, 0.0)]);
        for seed in 0..4 {
            let report = KCluster::with_seed(ClusterMethod::KMeans, seed).partition(&graph, &ids);
            assert_eq!(report.k, 2);
            assert_exact_cover(&report, &ids);
        }
    }

    #[test]
    fn kmedoids_picks_real_members_as_centers() {
        let (graph, ids) = two_blobs();
        let mut clusterer = KCluster::with_seed(ClusterMethod::KMedoids, 3);
        let report = clusterer.partition(&graph, &ids);

        assert_eq!(report.clusters.len(), 3);
        assert_exact_cover(&report, &ids);
        for cluster in &report.clusters {
            let center = cluster.center.unwrap();
            assert!(cluster
                .members
                .iter()
                .any(|&m| graph.position(m) == Some(center)));
        }
    }

    #[test]
    fn single_entity_forms_one_cluster() {
        let (graph, ids) = placed(&[(3.0, 4.0)]);
        for method in [ClusterMethod::KMeans, ClusterMethod::KMedoids] {
            let report = KCluster::with_seed(method, 0).partition(&graph, &ids);
            assert_eq!(report.clusters.len(), 1);
            assert_eq!(report.clusters[0].members, ids);
        }
    }

    #[test]
    fn coincident_points_converge_immediately() {
        let (graph, ids) = placed(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]);
        let report = KCluster::with_seed(ClusterMethod::KMeans, 11).partition(&graph, &ids);
        assert!(report.converged);
        assert_exact_cover(&report, &ids);
    }

    #[test]
    fn unplaced_entities_become_singletons() {
        let (mut graph, mut ids) = placed(&[(0.0, 0.0), (1.0, 0.0)]);
        let loose = graph.create_node("loose").unwrap();
        ids.push(EntityId::Node(loose));

        let report = KCluster::with_seed(ClusterMethod::KMeans, 5).partition(&graph, &ids);
        assert_exact_cover(&report, &ids);
        let last = report.clusters.last().unwrap();
        assert_eq!(last.members, vec![EntityId::Node(loose)]);
        assert_eq!(last.center, None);
    }

    #[test]
    fn cluster_and_group_collapses_non_singletons() {
        let (mut graph, ids) = two_blobs();
        let manipulator = GraphManipulator::new(false);
        let mut clusterer = KCluster::with_seed(ClusterMethod::KMedoids, 9);

        let (report, groups) = clusterer
            .cluster_and_group(&mut graph, &manipulator, &ids)
            .unwrap();

        let multi = report.clusters.iter().filter(|c| c.size > 1).count();
        assert_eq!(groups.len(), multi);
        assert_eq!(graph.group_count(), multi);
        for cluster in &report.clusters {
            let grouped = cluster.members.iter().all(|&m| graph.belongs_to_group(m).is_some());
            assert_eq!(grouped, cluster.size > 1);
        }
        graph.check_consistency().unwrap();
    }

    #[test]
    fn cluster_and_group_rejects_grouped_input() {
        let (mut graph, ids) = two_blobs();
        let manipulator = GraphManipulator::new(false);
        manipulator.group_existing_nodes(&mut graph, &ids[..2]).unwrap();

        let mut clusterer = KCluster::with_seed(ClusterMethod::KMeans, 1);
        assert_eq!(
            clusterer.cluster_and_group(&mut graph, &manipulator, &ids).map(|_| ()),
            Err(GraphError::AlreadyGrouped(ids[0]))
        );
        assert_eq!(graph.group_count(), 1);
    }
}
