//! Morton (Z-order) codec for voxel coordinates.
//!
//! Interleaves the bits of three grid coordinates into one 64-bit ordinal so
//! that the resulting total order matches recursive octree subdivision: the
//! top three used bits select the root octant, the next three the grandchild
//! octant, and so on down to the leaf. Streaming both the partitioner and the
//! octree builder in this order is what makes out-of-core construction work.
//!
//! Bit layout: bit `i` of `x` lands on code bit `3i`, `y` on `3i + 1`, `z` on
//! `3i + 2`, so a per-level octant index reads `z << 2 | y << 1 | x`.

use static_assertions::const_assert;

/// Usable bits per axis; three axes must fit one u64.
pub const COORD_BITS: u32 = 21;

const_assert!(COORD_BITS * 3 <= 64);

/// Spread the low 21 bits of `v` so bit `i` moves to bit `3i`.
#[inline]
fn spread_1by2(v: u64) -> u64 {
    let mut v = v & 0x1f_ffff;
    v = (v | v << 32) & 0x1f00_0000_0000_ffff;
    v = (v | v << 16) & 0x1f_0000_ff00_00ff;
    v = (v | v << 8) & 0x100f_00f0_0f00_f00f;
    v = (v | v << 4) & 0x10c3_0c30_c30c_30c3;
    v = (v | v << 2) & 0x1249_2492_4924_9249;
    v
}

/// Exact inverse of [`spread_1by2`].
#[inline]
fn compact_1by2(v: u64) -> u64 {
    let mut v = v & 0x1249_2492_4924_9249;
    v = (v ^ (v >> 2)) & 0x10c3_0c30_c30c_30c3;
    v = (v ^ (v >> 4)) & 0x100f_00f0_0f00_f00f;
    v = (v ^ (v >> 8)) & 0x1f_0000_ff00_00ff;
    v = (v ^ (v >> 16)) & 0x1f00_0000_0000_ffff;
    v = (v ^ (v >> 32)) & 0x1f_ffff;
    v
}

/// Encode a grid coordinate as a Morton code.
///
/// Callers keep each coordinate below the grid edge; out-of-range bits above
/// [`COORD_BITS`] are masked off.
#[inline]
pub fn encode(x: u32, y: u32, z: u32) -> u64 {
    spread_1by2(x as u64) | spread_1by2(y as u64) << 1 | spread_1by2(z as u64) << 2
}

/// Decode a Morton code back into its grid coordinate.
#[inline]
pub fn decode(code: u64) -> (u32, u32, u32) {
    (
        compact_1by2(code) as u32,
        compact_1by2(code >> 1) as u32,
        compact_1by2(code >> 2) as u32,
    )
}
