//! Exact triangle-box intersection via the separating axis theorem.
//!
//! Thirteen candidate axes: the three box face normals, the triangle's plane
//! normal, and the nine cross products of triangle edges with box axes. The
//! triangle and box overlap iff no axis separates them. Touching contact
//! counts as intersection, which keeps voxelization conservative at cell
//! boundaries.

use glam::Vec3;

use crate::mesh::Triangle;

/// Does `tri` intersect the axis-aligned box at `center` with half-extents
/// `half`?
pub fn tri_box_overlap(center: Vec3, half: Vec3, tri: &Triangle) -> bool {
    // move the box to the origin
    let v0 = tri.v0 - center;
    let v1 = tri.v1 - center;
    let v2 = tri.v2 - center;

    // box face normals: plain AABB overlap per axis
    for axis in 0..3 {
        let (lo, hi) = min_max(v0[axis], v1[axis], v2[axis]);
        if lo > half[axis] || hi < -half[axis] {
            return false;
        }
    }

    let e0 = v1 - v0;
    let e1 = v2 - v1;
    let e2 = v0 - v2;

    // nine edge cross-product axes
    for edge in [e0, e1, e2] {
        for unit in [Vec3::X, Vec3::Y, Vec3::Z] {
            let axis = edge.cross(unit);
            let r = half.dot(axis.abs());
            let (lo, hi) = min_max(v0.dot(axis), v1.dot(axis), v2.dot(axis));
            if lo > r || hi < -r {
                return false;
            }
        }
    }

    // triangle plane
    let normal = e0.cross(e1);
    let d = normal.dot(v0);
    let r = half.dot(normal.abs());
    d.abs() <= r
}

#[inline]
fn min_max(a: f32, b: f32, c: f32) -> (f32, f32) {
    (a.min(b).min(c), a.max(b).max(c))
}
