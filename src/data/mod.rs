//! Loading node and edge data from external sources

pub mod fetch;
pub mod layout;

pub use fetch::{
    fetch_node, merge_fetch_result, read_fetch_result, DataSource, FetchResult, FetchedEdge,
    FetchedNode, InMemorySource, JsonFileSource, MergeSummary,
};
pub use layout::place_unpositioned;
