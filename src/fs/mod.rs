//! Remote node model, key resolution, path tree and chunk planning.

pub mod chunks;
pub mod node;
pub mod resolver;
pub mod tree;

pub use chunks::{plan, Chunk, ChunkPlanner};
pub use node::{FetchNodesResponse, Node, NodeKeys, NodeType, RawNode};
pub use resolver::{NodeResolver, SharedKeyTable, EXPORT_OWNER};
pub use tree::PathTree;
