//! Shared constants for on-disk formats and default build settings.

/// Magic number at the head of a `.tri` mesh header
pub const TRI_MAGIC: u32 = 0x5452_4931; // "TRI1"

/// Magic number at the head of a `.trip` partition header
pub const TRIP_MAGIC: u32 = 0x5452_5031; // "TRP1"

/// Magic number at the head of a `.octree` header
pub const OCTREE_MAGIC: u32 = 0x4F43_5431; // "OCT1"

/// Version stamped into every header this crate writes
pub const FORMAT_VERSION: u32 = 1;

/// Largest supported grid edge: 21 bits per axis fit a 64-bit Morton code
pub const MAX_GRID_SIZE: u32 = 1 << crate::morton::COORD_BITS;

/// Bytes per triangle in a `.tridata` payload (nine little-endian f32)
pub const TRIANGLE_SIZE_BYTES: u64 = 36;

/// Triangles held in memory per read batch
pub const DEFAULT_INPUT_BUFFER: usize = 8192;

/// Fraction of the memory budget granted to the sparse code list
pub const DEFAULT_SPARSENESS_LIMIT: f32 = 0.10;

/// Default voxel memory budget for the binary, in MiB
pub const DEFAULT_MEMORY_BUDGET_MB: u64 = 1024;

/// Default grid edge for the binary
pub const DEFAULT_GRIDSIZE: u32 = 512;
