//! Configuration management for grouping and clustering

use crate::cluster::ClusterMethod;
use crate::graph::Position;
use serde::{Deserialize, Serialize};

/// Iteration cap for the clustering refinement loop.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Runtime configuration shared by the manipulator and the clusterer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Clustering method used for automatic grouping
    pub method: ClusterMethod,

    /// Maximum number of refinement iterations
    pub max_iterations: usize,

    /// Nest groups and maintain the parent/children tree
    pub hierarchical: bool,

    /// Seed for reproducible clustering; `None` draws from entropy
    pub seed: Option<u64>,

    /// Position given to a new group when none of its inputs has one
    pub fallback_position: Position,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            method: ClusterMethod::KMeans,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            hierarchical: false,
            seed: None,
            fallback_position: Position::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with custom values
    pub fn new(method: ClusterMethod, hierarchical: bool, seed: Option<u64>) -> Self {
        Self {
            method,
            hierarchical,
            seed,
            ..Self::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }
}
