use kg_grouping::data::{self, FetchResult};
use kg_grouping::graph::Position;
use kg_grouping::{ClusterMethod, EntityId, Graph, GraphManipulator, GroupId, KCluster};
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Op {
    Group(Vec<usize>),
    DeGroup(usize),
    Split(usize, Vec<usize>),
    Leave(usize, Vec<usize>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let picks = prop::collection::vec(0usize..32, 1..5);
    prop_oneof![
        3 => picks.clone().prop_map(Op::Group),
        1 => (0usize..8).prop_map(Op::DeGroup),
        1 => (0usize..8, picks.clone()).prop_map(|(g, p)| Op::Split(g, p)),
        1 => (0usize..8, picks).prop_map(|(g, p)| Op::Leave(g, p)),
    ]
}

fn point_strategy() -> impl Strategy<Value = (f64, f64)> {
    (-100.0f64..100.0, -100.0f64..100.0)
}

fn build_graph(points: &[(f64, f64)], edges: &[(usize, usize)]) -> Graph {
    build_forest(points, edges, &[])
}

/// Like `build_graph`, and node `i` is placed under node `p % i` for every
/// `Some(p)` at index `i` of `parents`, which always yields a forest.
fn build_forest(
    points: &[(f64, f64)],
    edges: &[(usize, usize)],
    parents: &[Option<usize>],
) -> Graph {
    let mut graph = Graph::new();
    let ids: Vec<_> = points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            let id = graph.create_node(&format!("http://ex.org/n{}", i)).unwrap();
            graph.node_mut(id).unwrap().position = Some(Position::new(x, y));
            graph.set_mounted(EntityId::Node(id), true).unwrap();
            id
        })
        .collect();
    for &(s, t) in edges {
        let _ = graph.create_edge(ids[s % ids.len()], ids[t % ids.len()], "rel");
    }
    for (i, parent) in parents.iter().enumerate().skip(1).take(ids.len().saturating_sub(1)) {
        if let Some(p) = parent {
            let child = EntityId::Node(ids[i]);
            let parent = EntityId::Node(ids[p % i]);
            graph.set_hierarchy_parent(child, Some(parent)).unwrap();
        }
    }
    graph
}

fn top_level(graph: &Graph) -> Vec<EntityId> {
    graph
        .nodes_visual()
        .into_iter()
        .filter(|&e| graph.belongs_to_group(e).is_none())
        .collect()
}

fn group_ids(graph: &Graph) -> Vec<GroupId> {
    graph.groups().map(|g| g.id).collect()
}

fn pick<T: Copy>(items: &[T], picks: &[usize]) -> Vec<T> {
    if items.is_empty() {
        return Vec::new();
    }
    picks.iter().map(|&i| items[i % items.len()]).collect()
}

fn apply(graph: &mut Graph, manipulator: &GraphManipulator, op: &Op) {
    let groups = group_ids(graph);
    match op {
        Op::Group(picks) => {
            let inputs = pick(&top_level(graph), picks);
            if !inputs.is_empty() {
                let _ = manipulator.group_existing_nodes(graph, &inputs);
            }
        }
        Op::DeGroup(g) => {
            if let Some(&group) = pick(&groups, &[*g]).first() {
                let _ = manipulator.de_group(graph, group);
            }
        }
        Op::Split(g, picks) | Op::Leave(g, picks) => {
            let Some(&group) = pick(&groups, &[*g]).first() else {
                return;
            };
            let members = graph.group(group).unwrap().nodes().to_vec();
            let chosen = pick(&members, picks);
            let _ = match op {
                Op::Split(..) => manipulator.split_group(graph, &chosen, group).map(|_| ()),
                _ => manipulator.leave_group(graph, &chosen, group),
            };
        }
    }
}

fn leaf_count(graph: &Graph) -> usize {
    top_level(graph).iter().map(|&e| graph.leaves_of(e).len()).sum()
}

proptest! {
    /// Any sequence of manipulations keeps the model consistent and never
    /// loses or duplicates a node.
    #[test]
    fn manipulations_preserve_invariants(
        points in prop::collection::vec(point_strategy(), 2..12),
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..20),
        parents in prop::collection::vec(prop::option::of(0usize..12), 0..12),
        ops in prop::collection::vec(op_strategy(), 1..25),
        hierarchical in any::<bool>(),
    ) {
        let mut graph = build_forest(&points, &edges, &parents);
        prop_assert_eq!(graph.check_consistency(), Ok(()));
        let manipulator = GraphManipulator::new(hierarchical);

        for op in &ops {
            apply(&mut graph, &manipulator, op);
            prop_assert_eq!(graph.check_consistency(), Ok(()));
            prop_assert!(graph.groups().all(|g| !g.nodes().is_empty()));
            prop_assert_eq!(leaf_count(&graph), points.len());
            if !hierarchical {
                prop_assert!(graph.groups().all(|g| g.nodes().iter().all(|m| !m.is_group())));
            }
        }
    }

    /// Group edges never point into their own group and never repeat a
    /// (direction, endpoint, type) triple.
    #[test]
    fn group_edges_are_deduplicated(
        points in prop::collection::vec(point_strategy(), 3..10),
        edges in prop::collection::vec((0usize..10, 0usize..10), 1..30),
        picks in prop::collection::vec(0usize..10, 2..6),
    ) {
        let mut graph = build_graph(&points, &edges);
        let inputs: Vec<EntityId> = pick(&top_level(&graph), &picks);
        let group = GraphManipulator::new(false)
            .group_existing_nodes(&mut graph, &inputs)
            .unwrap();
        let me = EntityId::Group(group);

        let group_edges = graph.visible_group_edges(group).unwrap();
        let mut seen = BTreeSet::new();
        for edge in &group_edges {
            prop_assert!(edge.source != edge.target);
            prop_assert!(edge.source == me || edge.target == me);
            let key = (edge.source, edge.target, edge.edge_type.clone());
            prop_assert!(seen.insert(key));
            prop_assert!(edge.edge_count >= 1);
        }
    }

    /// Pulling one more node into a group never grows its class set.
    #[test]
    fn adding_a_member_never_grows_classes(
        class_sets in prop::collection::vec(prop::collection::btree_set("[a-d]", 0..4), 3..8),
    ) {
        let points: Vec<(f64, f64)> = class_sets.iter().map(|_| (0.0, 0.0)).collect();
        let mut graph = build_graph(&points, &[]);
        let nodes: Vec<_> = graph.nodes().map(|n| n.id).collect();
        for (id, classes) in nodes.iter().zip(&class_sets) {
            graph.node_mut(*id).unwrap().classes = classes.iter().cloned().collect();
        }

        let manipulator = GraphManipulator::new(false);
        let first = manipulator
            .group_existing_nodes(
                &mut graph,
                &[EntityId::Node(nodes[0]), EntityId::Node(nodes[1])],
            )
            .unwrap();
        let before = graph.classes(EntityId::Group(first));

        let second = manipulator
            .group_existing_nodes(&mut graph, &[EntityId::Group(first), EntityId::Node(nodes[2])])
            .unwrap();
        let after = graph.classes(EntityId::Group(second));

        prop_assert!(after.is_subset(&before));
    }

    /// Clustering covers every input exactly once within the iteration cap.
    #[test]
    fn clustering_is_an_exact_cover(
        points in prop::collection::vec(point_strategy(), 1..16),
        seed in any::<u64>(),
        medoids in any::<bool>(),
    ) {
        let graph = build_graph(&points, &[]);
        let inputs = top_level(&graph);
        let method = if medoids { ClusterMethod::KMedoids } else { ClusterMethod::KMeans };
        let report = KCluster::with_seed(method, seed).partition(&graph, &inputs);

        prop_assert!(report.iterations <= 10);
        prop_assert!(report.clusters.len() <= (inputs.len() / 2).max(1));
        let covered: Vec<EntityId> =
            report.clusters.iter().flat_map(|c| c.members.clone()).collect();
        prop_assert_eq!(covered.len(), inputs.len());
        let unique: BTreeSet<EntityId> = covered.into_iter().collect();
        prop_assert_eq!(unique, inputs.iter().copied().collect::<BTreeSet<_>>());
    }

    /// The same seed gives the same partition.
    #[test]
    fn clustering_is_reproducible(
        points in prop::collection::vec(point_strategy(), 2..12),
        seed in any::<u64>(),
    ) {
        let graph = build_graph(&points, &[]);
        let inputs = top_level(&graph);
        let first = KCluster::with_seed(ClusterMethod::KMeans, seed).partition(&graph, &inputs);
        let second = KCluster::with_seed(ClusterMethod::KMeans, seed).partition(&graph, &inputs);
        let members = |r: &kg_grouping::ClusterReport| {
            r.clusters.iter().map(|c| c.members.clone()).collect::<Vec<_>>()
        };
        prop_assert_eq!(members(&first), members(&second));
    }
}

#[test]
fn cluster_and_group_then_save_and_restore() {
    let points = [
        (0.0, 0.0),
        (0.5, 0.5),
        (1.0, 0.0),
        (50.0, 50.0),
        (50.5, 50.0),
        (51.0, 51.0),
    ];
    let mut graph = build_graph(&points, &[(0, 1), (1, 2), (3, 4), (2, 3)]);
    let inputs = top_level(&graph);

    let manipulator = GraphManipulator::new(false);
    let (report, groups) = KCluster::with_seed(ClusterMethod::KMedoids, 42)
        .cluster_and_group(&mut graph, &manipulator, &inputs)
        .unwrap();

    assert!(!groups.is_empty());
    assert_eq!(
        report.clusters.iter().filter(|c| c.size > 1).count(),
        groups.len()
    );
    graph.check_consistency().unwrap();

    let restored = Graph::restore_from_object(&graph.save_to_object()).unwrap();
    assert_eq!(restored.group_count(), graph.group_count());
    assert_eq!(restored.group_edges().len(), graph.group_edges().len());
    assert_eq!(top_level(&restored).len(), top_level(&graph).len());
}

#[test]
fn fetched_nodes_without_positions_still_form_groups() {
    let result: FetchResult = serde_json::from_str(
        r#"{
            "nodes": [
                {"iri": "http://ex.org/a"},
                {"iri": "http://ex.org/b"},
                {"iri": "http://ex.org/c"},
                {"iri": "http://ex.org/d"}
            ],
            "edges": [
                {"source": "http://ex.org/a", "target": "http://ex.org/b", "type": "rel"}
            ]
        }"#,
    )
    .unwrap();

    let mut graph = Graph::new();
    data::merge_fetch_result(&mut graph, &result);
    let fresh: Vec<_> = graph.nodes().map(|n| n.id).collect();
    for &id in &fresh {
        graph.set_mounted(EntityId::Node(id), true).unwrap();
    }
    assert_eq!(data::place_unpositioned(&mut graph, &fresh), 4);

    for method in [ClusterMethod::KMeans, ClusterMethod::KMedoids] {
        let mut graph = graph.clone();
        let inputs = top_level(&graph);
        let (report, groups) = KCluster::with_seed(method, 3)
            .cluster_and_group(&mut graph, &GraphManipulator::new(false), &inputs)
            .unwrap();

        assert!(report.clusters.len() <= 2);
        assert!(!groups.is_empty(), "{} produced only singletons", method);
        graph.check_consistency().unwrap();
    }
}
