//! Streaming sparse voxel octree construction.
//!
//! The builder consumes occupied-voxel Morton codes in non-decreasing order
//! and emits finalized nodes to a sink as soon as no further input can touch
//! them, keeping only the open root-to-leaf path in memory. Peak memory is
//! O(tree depth) no matter how many voxels the mesh produces.

mod builder;
mod node;
mod writer;

pub use builder::OctreeBuilder;
pub use node::OctreeNode;
pub use writer::{MemorySink, NodeSink, OctreeFileWriter, OctreeInfo};
