//! Graph Store (C6): dual-ID (version id / canonical id) objects and typed,
//! temporally invalidated relationships, with BFS/embedding-guided subgraph
//! expansion.

pub mod store;
pub mod traversal;
pub mod types;

pub use store::GraphStore;
pub use traversal::expand_graph;
pub use types::{CreateObjectRequest, EdgeFilter, GraphObject, GraphRelationship, Subgraph};
