//! Mesh input: geometry types, the `.tri` header, and the triangle streams.
//!
//! A mesh on disk is a `.tri` header describing an accompanying `.tridata`
//! payload of raw triangles. The core never holds more than one read batch of
//! triangles in memory at a time.

mod header;
mod reader;
mod types;
mod writer;

pub use header::MeshHeader;
pub use reader::TriangleReader;
pub use types::{Aabb, Triangle};
pub use writer::TriangleWriter;
