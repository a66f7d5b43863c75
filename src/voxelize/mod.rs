//! Triangle voxelization (Schwarz method).
//!
//! For each triangle, only the grid cells its bounding box can touch are
//! tested, each with an exact separating-axis triangle-box test. Occupancy is
//! a monotone OR over all triangle contributions, so triangles are fanned out
//! across worker threads with no ordering between them; the shared
//! [`VoxelBuffer`] absorbs their results.

mod buffer;
mod tribox;

pub use buffer::{Codes, OccupancySet, VoxelBuffer, EMPTY_VOXEL, FULL_VOXEL, WORKING_VOXEL};
pub use tribox::tri_box_overlap;

use glam::{UVec3, Vec3};
use log::debug;
use rayon::prelude::*;

use crate::error::ForgeResult;
use crate::grid::GridParameters;
use crate::mesh::{Triangle, TriangleReader};
use crate::morton;
use crate::partition::MortonRange;

/// Something that can determine which voxels of a Morton range a batch of
/// triangles intersects.
///
/// The CPU-threaded [`CpuEvaluator`] is the implementation shipped here; a
/// device-offloaded evaluator (for example a count-then-fill GPU kernel) is
/// an equally valid implementer as long as it records the same occupancy.
pub trait OccupancyEvaluator {
    fn evaluate(
        &self,
        triangles: &[Triangle],
        grid: &GridParameters,
        range: MortonRange,
        buffer: &VoxelBuffer,
    ) -> ForgeResult<()>;
}

/// Rayon-parallel evaluator: one task per triangle.
#[derive(Debug, Default)]
pub struct CpuEvaluator;

impl OccupancyEvaluator for CpuEvaluator {
    fn evaluate(
        &self,
        triangles: &[Triangle],
        grid: &GridParameters,
        range: MortonRange,
        buffer: &VoxelBuffer,
    ) -> ForgeResult<()> {
        triangles
            .par_iter()
            .try_for_each(|tri| voxelize_triangle(tri, grid, range, buffer))
    }
}

/// Voxelize one partition's triangle subset.
///
/// Streams the reader batch by batch through `evaluator` and returns the
/// final occupancy, ready to feed the octree builder in Morton order.
pub fn voxelize_partition<E: OccupancyEvaluator>(
    reader: &mut TriangleReader,
    grid: &GridParameters,
    range: MortonRange,
    sparseness_limit: f32,
    memory_budget: u64,
    evaluator: &E,
) -> ForgeResult<OccupancySet> {
    let buffer = VoxelBuffer::new(range, sparseness_limit, memory_budget)?;
    debug!(
        "voxelizing morton range [{}, {}): sparse capacity {} codes",
        range.start,
        range.end,
        buffer.data_max_items()
    );
    while let Some(batch) = reader.next_batch()? {
        evaluator.evaluate(batch, grid, range, &buffer)?;
    }
    if !buffer.is_sparse() {
        debug!(
            "morton range [{}, {}) finished on the dense fallback",
            range.start, range.end
        );
    }
    Ok(buffer.finish())
}

/// Test one triangle against every cell of `range` its bounding box can
/// touch.
fn voxelize_triangle(
    tri: &Triangle,
    grid: &GridParameters,
    range: MortonRange,
    buffer: &VoxelBuffer,
) -> ForgeResult<()> {
    let aabb = tri.aabb();
    let (part_min, part_max) = range.cell_bounds();
    let lo = grid.world_to_cell(aabb.min).max(part_min);
    let hi = grid.world_to_cell(aabb.max).min(part_max);
    if lo.cmpgt(hi).any() {
        return Ok(());
    }

    let half = Vec3::splat(grid.unitlength * 0.5);
    let sparse_mode = buffer.is_sparse();
    let mut hits = Vec::new();

    for z in lo.z..=hi.z {
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                let code = morton::encode(x, y, z);
                if buffer.is_full(code) {
                    continue;
                }
                buffer.claim(code);
                if tri_box_overlap(grid.cell_center(UVec3::new(x, y, z)), half, tri) {
                    if sparse_mode {
                        hits.push(code);
                    } else {
                        buffer.mark_full(code);
                    }
                }
            }
        }
    }

    buffer.record(&hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Aabb;
    use std::collections::BTreeSet;

    /// 8^3 grid over the unit-length [0, 8] cube, one partition.
    fn grid8() -> GridParameters {
        GridParameters::new(&Aabb::new(Vec3::ZERO, Vec3::splat(8.0)), 8, 1).unwrap()
    }

    fn full_range(grid: &GridParameters) -> MortonRange {
        MortonRange {
            start: 0,
            end: grid.volume(),
        }
    }

    fn occupancy(
        tris: &[Triangle],
        grid: &GridParameters,
        sparseness_limit: f32,
    ) -> ForgeResult<BTreeSet<u64>> {
        let range = full_range(grid);
        let buffer = VoxelBuffer::new(range, sparseness_limit, grid.volume())?;
        CpuEvaluator.evaluate(tris, grid, range, &buffer)?;
        Ok(buffer.finish().codes().collect())
    }

    #[test]
    fn test_flat_triangle_fills_expected_cells() {
        let grid = grid8();
        // right triangle in the z = 1.5 plane covering cells {0,1}^2
        let tri = Triangle::new(
            Vec3::new(0.2, 0.2, 1.5),
            Vec3::new(1.8, 0.2, 1.5),
            Vec3::new(0.2, 1.8, 1.5),
        );
        let expected: BTreeSet<u64> = [(0, 0, 1), (1, 0, 1), (0, 1, 1), (1, 1, 1)]
            .into_iter()
            .map(|(x, y, z)| morton::encode(x, y, z))
            .collect();

        assert_eq!(occupancy(&[tri], &grid, 1.0).unwrap(), expected);
    }

    #[test]
    fn test_sparse_and_dense_paths_agree() {
        let grid = grid8();
        let tris = [
            Triangle::new(
                Vec3::new(0.5, 0.5, 0.5),
                Vec3::new(6.5, 1.0, 3.0),
                Vec3::new(3.0, 6.0, 6.5),
            ),
            Triangle::new(
                Vec3::new(7.5, 7.5, 7.5),
                Vec3::new(5.0, 7.0, 6.0),
                Vec3::new(6.0, 5.0, 7.0),
            ),
        ];

        let sparse = occupancy(&tris, &grid, 1.0).unwrap();
        // zero sparse capacity forces the dense path from the start
        let dense = occupancy(&tris, &grid, 0.0).unwrap();

        assert!(!sparse.is_empty());
        assert_eq!(sparse, dense);
    }

    #[test]
    fn test_overflow_mid_partition_agrees_with_sparse() {
        let grid = grid8();
        let tris = [
            Triangle::new(
                Vec3::new(0.5, 0.5, 0.5),
                Vec3::new(6.5, 1.0, 3.0),
                Vec3::new(3.0, 6.0, 6.5),
            ),
            Triangle::new(
                Vec3::new(1.0, 6.0, 1.0),
                Vec3::new(7.0, 6.5, 2.0),
                Vec3::new(4.0, 1.5, 7.0),
            ),
        ];

        let reference = occupancy(&tris, &grid, 1.0).unwrap();
        // capacity of three codes: overflows partway through
        let flipped = occupancy(&tris, &grid, 0.05).unwrap();

        assert!(reference.len() > 4);
        assert_eq!(reference, flipped);
    }

    #[test]
    fn test_triangle_outside_partition_is_ignored() {
        let grid = GridParameters::new(&Aabb::new(Vec3::ZERO, Vec3::splat(8.0)), 8, 8).unwrap();
        // partition 0 covers cells [0,4)^3
        let range = MortonRange::for_partition(0, grid.morton_part);
        let tri = Triangle::new(
            Vec3::new(6.0, 6.0, 6.0),
            Vec3::new(7.0, 6.0, 6.0),
            Vec3::new(6.0, 7.0, 6.0),
        );
        let buffer = VoxelBuffer::new(range, 1.0, grid.morton_part).unwrap();
        CpuEvaluator.evaluate(&[tri], &grid, range, &buffer).unwrap();
        assert_eq!(buffer.finish().nfilled(), 0);
    }

    #[test]
    fn test_partition_clamp_matches_full_grid() {
        // a triangle straddling the partition seam: the union of per-partition
        // occupancies must equal the single-partition result
        let bbox = Aabb::new(Vec3::ZERO, Vec3::splat(8.0));
        let whole = GridParameters::new(&bbox, 8, 1).unwrap();
        let split = GridParameters::new(&bbox, 8, 8).unwrap();
        let tri = Triangle::new(
            Vec3::new(3.0, 3.0, 3.8),
            Vec3::new(5.0, 3.5, 3.8),
            Vec3::new(4.0, 5.0, 4.2),
        );

        let reference = occupancy(&[tri], &whole, 1.0).unwrap();

        let mut union = BTreeSet::new();
        for i in 0..8 {
            let range = MortonRange::for_partition(i, split.morton_part);
            let buffer = VoxelBuffer::new(range, 1.0, split.morton_part).unwrap();
            CpuEvaluator.evaluate(&[tri], &split, range, &buffer).unwrap();
            union.extend(buffer.finish().codes());
        }

        assert_eq!(union, reference);
    }
}
