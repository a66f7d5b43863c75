//! svo-forge: out-of-core sparse voxel octree construction.
//!
//! Converts triangle meshes too large to voxelize in memory into a sparse
//! voxel octree on disk, using a bounded amount of RAM regardless of input
//! size. Three cooperating phases, all ordered by a Morton space-filling
//! curve:
//!
//! 1. the [`partition`] planner splits the voxel grid into Morton ranges
//!    small enough to voxelize within the memory budget and streams the mesh
//!    once into per-partition triangle subsets on disk;
//! 2. the [`voxelize`] phase runs an exact triangle-box test over each
//!    partition's candidate cells, trading between a bounded sparse code
//!    list and a dense fallback array;
//! 3. the [`octree`] builder consumes the occupied codes in globally
//!    increasing order and flushes finished subtrees to disk, holding only
//!    the open root-to-leaf path.
//!
//! [`pipeline::build_svo`] wires the phases together.

// Constants module
pub mod constants;

// Core phases
pub mod error;
pub mod grid;
pub mod mesh;
pub mod morton;
pub mod octree;
pub mod partition;
pub mod pipeline;
pub mod voxelize;

mod utils;

use std::path::PathBuf;

use crate::constants::{
    DEFAULT_GRIDSIZE, DEFAULT_INPUT_BUFFER, DEFAULT_MEMORY_BUDGET_MB, DEFAULT_SPARSENESS_LIMIT,
    MAX_GRID_SIZE,
};

pub use error::{ForgeError, ForgeResult};
pub use grid::GridParameters;
pub use mesh::{Aabb, MeshHeader, Triangle, TriangleReader, TriangleWriter};
pub use octree::{MemorySink, NodeSink, OctreeBuilder, OctreeFileWriter, OctreeInfo, OctreeNode};
pub use partition::{estimate_partitions, partition, MortonRange, Partition, PartitionSet};
pub use pipeline::{build_svo, BuildStats};
pub use voxelize::{
    tri_box_overlap, voxelize_partition, CpuEvaluator, OccupancyEvaluator, OccupancySet,
    VoxelBuffer,
};

/// Configuration for one build run, constructed once at startup and passed by
/// reference to each phase; there is no process-wide mutable state.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Path of the `.tri` mesh header.
    pub input: PathBuf,
    /// Base path for the `.octree`/`.octreenodes` output pair.
    pub output: PathBuf,
    /// Voxels per axis; a power of two.
    pub gridsize: u32,
    /// Voxel memory budget in bytes; one partition's dense buffer must fit.
    pub memory_budget: u64,
    /// Fraction of the budget granted to the sparse code list before the
    /// dense fallback takes over.
    pub sparseness_limit: f32,
    /// Store averaged fill densities on intermediate levels.
    pub generate_levels: bool,
    /// Triangles per read batch.
    pub input_buffer: usize,
}

impl BuildConfig {
    /// Config with default tuning for the given input/output paths.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            gridsize: DEFAULT_GRIDSIZE,
            memory_budget: DEFAULT_MEMORY_BUDGET_MB * 1024 * 1024,
            sparseness_limit: DEFAULT_SPARSENESS_LIMIT,
            generate_levels: false,
            input_buffer: DEFAULT_INPUT_BUFFER,
        }
    }

    /// Validate configuration parameters. Runs before any I/O.
    pub fn validate(&self) -> ForgeResult<()> {
        if !self.gridsize.is_power_of_two() || self.gridsize < 2 || self.gridsize > MAX_GRID_SIZE {
            return Err(ForgeError::InvalidConfig {
                field: "gridsize",
                value: self.gridsize.to_string(),
                reason: "must be a power of two in [2, 2^21]",
            });
        }
        if self.memory_budget == 0 {
            return Err(ForgeError::InvalidConfig {
                field: "memory_budget",
                value: "0".into(),
                reason: "must be positive",
            });
        }
        if !(0.0..=1.0).contains(&self.sparseness_limit) {
            return Err(ForgeError::InvalidConfig {
                field: "sparseness_limit",
                value: self.sparseness_limit.to_string(),
                reason: "must lie in [0, 1]",
            });
        }
        if self.input_buffer == 0 {
            return Err(ForgeError::InvalidConfig {
                field: "input_buffer",
                value: "0".into(),
                reason: "must be positive",
            });
        }
        if self.input.extension().map_or(true, |ext| ext != "tri") {
            return Err(ForgeError::InvalidConfig {
                field: "input",
                value: self.input.display().to_string(),
                reason: "expected a .tri mesh header",
            });
        }
        Ok(())
    }
}
