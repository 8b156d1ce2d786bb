//! Grouping and clustering core for an interactive knowledge-graph explorer

pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod manipulator;
pub mod storage;
pub mod viz;

pub use anyhow::{anyhow, Result};
pub use cluster::{ClusterMethod, ClusterReport, KCluster};
pub use config::Config;
pub use error::{GraphError, GraphResult};
pub use graph::{EntityId, Graph, GroupEdge, GroupId, NodeId};
pub use manipulator::GraphManipulator;
