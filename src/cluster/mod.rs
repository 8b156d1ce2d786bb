//! Cluster analysis module

pub mod kcluster;
pub mod metrics;

pub use kcluster::KCluster;

use crate::graph::{EntityId, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Partitioning strategy used by [`KCluster`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMethod {
    /// Synthetic centers moved to the mean of their members
    #[value(name = "kmeans")]
    KMeans,

    /// Centers are real members chosen to minimise squared distance
    #[value(name = "kmedoids")]
    KMedoids,
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterMethod::KMeans => write!(f, "kmeans"),
            ClusterMethod::KMedoids => write!(f, "kmedoids"),
        }
    }
}

/// One part of a partition produced by [`KCluster`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Identifier within one partition
    pub id: u32,

    /// Members of this cluster
    pub members: Vec<EntityId>,

    /// Size of the cluster
    pub size: usize,

    /// Final center (mean or medoid position); `None` for unplaced entities
    pub center: Option<Position>,

    /// Density: real edges among member leaves / potential edges
    pub density: f32,

    /// Mean pairwise distance between members, if they have positions
    pub mean_distance: Option<f64>,
}

/// Result of one clustering run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterReport {
    pub clusters: Vec<Cluster>,

    /// Number of centers the run started with (0 when nothing was placed)
    pub k: usize,

    /// Refinement iterations actually performed
    pub iterations: usize,

    /// Whether the run stopped because nothing changed
    pub converged: bool,
}

impl ClusterReport {
    pub fn empty() -> Self {
        Self {
            clusters: Vec::new(),
            k: 0,
            iterations: 0,
            converged: true,
        }
    }
}
