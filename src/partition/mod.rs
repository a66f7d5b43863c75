//! Out-of-core mesh partitioning.
//!
//! The partitioner splits the voxel grid into disjoint Morton ranges small
//! enough to voxelize in memory and streams every triangle of the source mesh
//! into a subset file per range. It is the only phase that touches the whole
//! triangle set; everything downstream works one partition at a time.

mod header;
mod planner;

pub use header::PartitionSet;
pub use planner::{estimate_partitions, partition};

use std::path::PathBuf;

use glam::UVec3;

use crate::grid::GridParameters;
use crate::mesh::Aabb;
use crate::morton;

/// Half-open range `[start, end)` of Morton ordinals.
///
/// Partition counts are powers of eight, so every range is an octree-aligned
/// cube of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MortonRange {
    pub start: u64,
    pub end: u64,
}

impl MortonRange {
    /// Range covered by partition `index` out of `n` over `morton_part`
    /// voxels each.
    pub fn for_partition(index: u64, morton_part: u64) -> Self {
        Self {
            start: index * morton_part,
            end: (index + 1) * morton_part,
        }
    }

    #[inline]
    pub fn contains(&self, code: u64) -> bool {
        code >= self.start && code < self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive grid-cell corners `(lowest, highest)` of the cube this range
    /// covers.
    pub fn cell_bounds(&self) -> (UVec3, UVec3) {
        let side = 1u32 << (self.len().trailing_zeros() / 3);
        let (x, y, z) = morton::decode(self.start);
        let min = UVec3::new(x, y, z);
        (min, min + UVec3::splat(side - 1))
    }

    /// World-space box of the range's cube.
    pub fn world_aabb(&self, grid: &GridParameters) -> Aabb {
        let (min, max) = self.cell_bounds();
        Aabb::new(grid.cell_min(min), grid.cell_min(max + UVec3::ONE))
    }
}

/// One spatial partition: its place in the grid and its triangle subset file.
#[derive(Debug, Clone)]
pub struct Partition {
    pub index: u64,
    pub range: MortonRange,
    pub n_triangles: u64,
    pub data_path: PathBuf,
}
