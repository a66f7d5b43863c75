//! Derived voxel grid parameters.

use glam::{UVec3, Vec3};

use crate::constants::MAX_GRID_SIZE;
use crate::error::{ForgeError, ForgeResult};
use crate::mesh::Aabb;

/// Everything the voxelization and partitioning phases need to map between
/// world space, grid cells, and Morton ordinals.
///
/// The mesh bounding box is grown into a cube on construction so a single
/// `unitlength` serves all three axes. Cell `c` covers the half-open world
/// interval `[min + c * unitlength, min + (c + 1) * unitlength)`; geometry
/// landing exactly on a cell boundary belongs to the upper cell.
#[derive(Debug, Clone)]
pub struct GridParameters {
    /// Voxels per axis, a power of two.
    pub gridsize: u32,
    /// World-space edge length of one voxel.
    pub unitlength: f32,
    /// Cubed world bounds of the grid.
    pub bbox: Aabb,
    /// Number of spatial partitions the grid is split into.
    pub n_partitions: u64,
    /// Voxels covered by one partition: `gridsize³ / n_partitions`.
    pub morton_part: u64,
}

impl GridParameters {
    pub fn new(mesh_bbox: &Aabb, gridsize: u32, n_partitions: u64) -> ForgeResult<Self> {
        if !gridsize.is_power_of_two() || gridsize < 2 || gridsize > MAX_GRID_SIZE {
            return Err(ForgeError::InvalidConfig {
                field: "gridsize",
                value: gridsize.to_string(),
                reason: "must be a power of two in [2, 2^21]",
            });
        }
        let volume = (gridsize as u64).pow(3);
        if n_partitions == 0 || volume % n_partitions != 0 {
            return Err(ForgeError::InvalidConfig {
                field: "n_partitions",
                value: n_partitions.to_string(),
                reason: "must divide the grid volume evenly",
            });
        }
        let bbox = mesh_bbox.cubed();
        let extent = bbox.max.x - bbox.min.x;
        if !extent.is_finite() || extent <= 0.0 {
            return Err(ForgeError::InvalidConfig {
                field: "bbox",
                value: format!("{:?}", mesh_bbox),
                reason: "degenerate mesh bounding box",
            });
        }
        Ok(Self {
            gridsize,
            unitlength: extent / gridsize as f32,
            bbox,
            n_partitions,
            morton_part: volume / n_partitions,
        })
    }

    /// Total voxel count of the grid.
    pub fn volume(&self) -> u64 {
        (self.gridsize as u64).pow(3)
    }

    /// Octree depth below the root: `log2(gridsize)`.
    pub fn max_depth(&self) -> u32 {
        self.gridsize.trailing_zeros()
    }

    /// Grid cell containing a world point, clamped into the grid.
    #[inline]
    pub fn world_to_cell(&self, p: Vec3) -> UVec3 {
        let scaled = (p - self.bbox.min) / self.unitlength;
        let hi = self.gridsize - 1;
        UVec3::new(
            (scaled.x.floor().max(0.0) as u32).min(hi),
            (scaled.y.floor().max(0.0) as u32).min(hi),
            (scaled.z.floor().max(0.0) as u32).min(hi),
        )
    }

    /// World-space minimum corner of a cell.
    #[inline]
    pub fn cell_min(&self, c: UVec3) -> Vec3 {
        self.bbox.min + c.as_vec3() * self.unitlength
    }

    /// World-space center of a cell.
    #[inline]
    pub fn cell_center(&self, c: UVec3) -> Vec3 {
        self.cell_min(c) + Vec3::splat(self.unitlength * 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid() -> GridParameters {
        let bbox = Aabb::new(Vec3::ZERO, Vec3::splat(8.0));
        GridParameters::new(&bbox, 8, 1).unwrap()
    }

    #[test]
    fn test_unitlength_from_cubed_bbox() {
        let bbox = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 8.0, 2.0));
        let grid = GridParameters::new(&bbox, 8, 1).unwrap();
        assert_eq!(grid.unitlength, 1.0);
        assert_eq!(grid.bbox.max, Vec3::splat(8.0));
        assert_eq!(grid.max_depth(), 3);
    }

    #[test]
    fn test_boundary_point_belongs_to_upper_cell() {
        let grid = unit_grid();
        assert_eq!(grid.world_to_cell(Vec3::splat(1.0)), UVec3::splat(1));
        assert_eq!(grid.world_to_cell(Vec3::splat(0.999)), UVec3::splat(0));
        // the grid's outer edge clamps back into the last cell
        assert_eq!(grid.world_to_cell(Vec3::splat(8.0)), UVec3::splat(7));
        assert_eq!(grid.world_to_cell(Vec3::splat(-3.0)), UVec3::splat(0));
    }

    #[test]
    fn test_rejects_bad_gridsize() {
        let bbox = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(GridParameters::new(&bbox, 7, 1).is_err());
        assert!(GridParameters::new(&bbox, 0, 1).is_err());
        assert!(GridParameters::new(&bbox, 8, 3).is_err());
    }

    #[test]
    fn test_rejects_degenerate_bbox() {
        let bbox = Aabb::new(Vec3::ONE, Vec3::ONE);
        assert!(GridParameters::new(&bbox, 8, 1).is_err());
    }
}
