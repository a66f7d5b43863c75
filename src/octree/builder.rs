//! Incremental octree construction over a sorted Morton stream.

use log::debug;

use crate::constants::MAX_GRID_SIZE;
use crate::error::{ForgeError, ForgeResult};
use crate::octree::{NodeSink, OctreeNode};

/// An ancestor node still accepting children.
struct OpenNode {
    mask: u8,
    /// Sum of finalized children's densities, for level generation.
    child_density_sum: f32,
}

/// Streaming SVO builder.
///
/// [`add_voxel`](Self::add_voxel) accepts occupied-voxel Morton codes in
/// non-decreasing order; whenever a code diverges from the open root-to-leaf
/// path, every deeper open node is complete (later codes can only be larger)
/// and is emitted to the sink, deepest first. The active path holds at most
/// `log2(gridsize)` open nodes, which bounds the builder's memory by tree
/// depth rather than voxel count.
///
/// Codes arriving out of order are a protocol violation and fail fast: the
/// active-path scheme is only correct under monotone input.
pub struct OctreeBuilder<S: NodeSink> {
    sink: S,
    /// `log2(gridsize)`: number of internal levels, root at depth 0.
    max_depth: u32,
    volume: u64,
    path: Vec<OpenNode>,
    last_code: Option<u64>,
    generate_levels: bool,
    n_voxels: u64,
    n_nodes: u64,
    finalized: bool,
}

impl<S: NodeSink> OctreeBuilder<S> {
    pub fn new(sink: S, gridsize: u32, generate_levels: bool) -> ForgeResult<Self> {
        if !gridsize.is_power_of_two() || gridsize < 2 || gridsize > MAX_GRID_SIZE {
            return Err(ForgeError::InvalidConfig {
                field: "gridsize",
                value: gridsize.to_string(),
                reason: "must be a power of two in [2, 2^21]",
            });
        }
        let max_depth = gridsize.trailing_zeros();
        Ok(Self {
            sink,
            max_depth,
            volume: (gridsize as u64).pow(3),
            path: Vec::with_capacity(max_depth as usize),
            last_code: None,
            generate_levels,
            n_voxels: 0,
            n_nodes: 0,
            finalized: false,
        })
    }

    /// Record one occupied voxel. Codes must be non-decreasing; a repeated
    /// code is a no-op.
    pub fn add_voxel(&mut self, code: u64) -> ForgeResult<()> {
        if self.finalized {
            return Err(ForgeError::BuilderFinalized);
        }
        if code >= self.volume {
            return Err(ForgeError::CodeOutOfRange {
                code,
                volume: self.volume,
            });
        }
        match self.last_code {
            Some(last) if code < last => {
                return Err(ForgeError::UnsortedInput { last, code });
            }
            Some(last) if code == last => return Ok(()),
            Some(last) => {
                let diverge = self.diverge_depth(last, code);
                // everything below the common ancestor is complete
                while self.path.len() > (diverge + 1) as usize {
                    self.close_deepest()?;
                }
                self.path[diverge as usize].mask |= 1 << self.octant(code, diverge);
                for depth in (diverge + 1)..self.max_depth {
                    self.open_node(code, depth);
                }
            }
            None => {
                for depth in 0..self.max_depth {
                    self.open_node(code, depth);
                }
            }
        }
        self.last_code = Some(code);
        self.n_voxels += 1;
        Ok(())
    }

    /// Close every remaining open node, root last. After this the tree on
    /// the sink is complete and the builder accepts no further input.
    pub fn finalize_tree(&mut self) -> ForgeResult<()> {
        if self.finalized {
            return Err(ForgeError::BuilderFinalized);
        }
        while !self.path.is_empty() {
            self.close_deepest()?;
        }
        self.finalized = true;
        debug!(
            "octree finalized: {} nodes for {} voxels",
            self.n_nodes, self.n_voxels
        );
        Ok(())
    }

    /// Currently open ancestor nodes.
    pub fn active_nodes(&self) -> usize {
        self.path.len()
    }

    /// Distinct voxels accepted so far.
    pub fn n_voxels(&self) -> u64 {
        self.n_voxels
    }

    /// Nodes emitted so far.
    pub fn n_nodes(&self) -> u64 {
        self.n_nodes
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Child octant of `code` at internal depth `depth`.
    #[inline]
    fn octant(&self, code: u64, depth: u32) -> u8 {
        ((code >> (3 * (self.max_depth - 1 - depth))) & 7) as u8
    }

    /// Deepest internal depth at which both codes still share an octant
    /// chain, i.e. their common ancestor's depth.
    #[inline]
    fn diverge_depth(&self, last: u64, code: u64) -> u32 {
        let highest_bit = 63 - (last ^ code).leading_zeros();
        self.max_depth - 1 - highest_bit / 3
    }

    fn open_node(&mut self, code: u64, depth: u32) {
        self.path.push(OpenNode {
            mask: 1 << self.octant(code, depth),
            child_density_sum: 0.0,
        });
    }

    /// Emit the deepest open node; its mask can no longer change.
    fn close_deepest(&mut self) -> ForgeResult<()> {
        let open = match self.path.pop() {
            Some(open) => open,
            None => return Ok(()),
        };
        let depth = self.path.len() as u32;
        let density = if !self.generate_levels {
            0.0
        } else if depth == self.max_depth - 1 {
            // mask bits at the deepest level are the leaves themselves
            open.mask.count_ones() as f32 / 8.0
        } else {
            open.child_density_sum / 8.0
        };
        self.sink.write_node(&OctreeNode {
            mask: open.mask,
            density,
        })?;
        self.n_nodes += 1;
        if let Some(parent) = self.path.last_mut() {
            parent.child_density_sum += density;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morton;
    use crate::octree::MemorySink;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn build(gridsize: u32, codes: &[u64], levels: bool) -> (Vec<OctreeNode>, u64, u64) {
        let mut builder = OctreeBuilder::new(MemorySink::default(), gridsize, levels).unwrap();
        for &code in codes {
            builder.add_voxel(code).unwrap();
        }
        builder.finalize_tree().unwrap();
        let (n_nodes, n_voxels) = (builder.n_nodes(), builder.n_voxels());
        (builder.into_sink().nodes, n_nodes, n_voxels)
    }

    /// Walk a post-order node stream back into the occupied-voxel set.
    fn reconstruct(nodes: &[OctreeNode], max_depth: u32) -> BTreeSet<u64> {
        fn walk(
            iter: &mut impl Iterator<Item = OctreeNode>,
            depth: u32,
            max_depth: u32,
            prefix: u64,
            out: &mut BTreeSet<u64>,
        ) {
            let node = iter.next().expect("truncated node stream");
            if depth == max_depth - 1 {
                for octant in 0..8u64 {
                    if node.mask & (1 << octant) != 0 {
                        out.insert(prefix << 3 | octant);
                    }
                }
                return;
            }
            // reversed stream: children come after their parent, highest
            // octant first
            for octant in (0..8u64).rev() {
                if node.mask & (1 << octant) != 0 {
                    walk(iter, depth + 1, max_depth, prefix << 3 | octant, out);
                }
            }
        }

        let mut out = BTreeSet::new();
        if !nodes.is_empty() {
            walk(&mut nodes.iter().rev().copied(), 0, max_depth, 0, &mut out);
        }
        out
    }

    #[test]
    fn test_occupancy_roundtrip_small() {
        let codes = [0u64, 1, 9, 10, 63];
        let (nodes, n_nodes, n_voxels) = build(4, &codes, false);
        assert_eq!(n_voxels, 5);
        assert_eq!(n_nodes as usize, nodes.len());
        assert_eq!(reconstruct(&nodes, 2), codes.iter().copied().collect());
    }

    #[test]
    fn test_occupancy_roundtrip_random() {
        let mut rng = StdRng::seed_from_u64(0x0c7);
        let mut codes: Vec<u64> = (0..600).map(|_| rng.gen_range(0..4096)).collect();
        codes.sort_unstable();
        codes.dedup();

        let (nodes, _, n_voxels) = build(16, &codes, false);
        assert_eq!(n_voxels, codes.len() as u64);
        assert_eq!(reconstruct(&nodes, 4), codes.iter().copied().collect());
    }

    #[test]
    fn test_root_emitted_last() {
        // voxels in two different root octants
        let codes = [morton::encode(0, 0, 0), morton::encode(7, 7, 7)];
        let (nodes, ..) = build(8, &codes, false);
        let root = nodes.last().unwrap();
        assert_eq!(root.mask, 0b1000_0001);
    }

    #[test]
    fn test_duplicate_codes_are_idempotent() {
        let (nodes, _, n_voxels) = build(4, &[5, 5, 5, 9], false);
        assert_eq!(n_voxels, 2);
        assert_eq!(reconstruct(&nodes, 2), BTreeSet::from([5, 9]));
    }

    #[test]
    fn test_unsorted_input_fails_fast() {
        let mut builder = OctreeBuilder::new(MemorySink::default(), 8, false).unwrap();
        builder.add_voxel(10).unwrap();
        assert!(matches!(
            builder.add_voxel(3),
            Err(ForgeError::UnsortedInput { last: 10, code: 3 })
        ));
    }

    #[test]
    fn test_add_after_finalize_fails() {
        let mut builder = OctreeBuilder::new(MemorySink::default(), 8, false).unwrap();
        builder.add_voxel(1).unwrap();
        builder.finalize_tree().unwrap();
        assert!(matches!(
            builder.add_voxel(2),
            Err(ForgeError::BuilderFinalized)
        ));
        assert!(matches!(
            builder.finalize_tree(),
            Err(ForgeError::BuilderFinalized)
        ));
    }

    #[test]
    fn test_code_out_of_range_rejected() {
        let mut builder = OctreeBuilder::new(MemorySink::default(), 4, false).unwrap();
        assert!(matches!(
            builder.add_voxel(64),
            Err(ForgeError::CodeOutOfRange { code: 64, volume: 64 })
        ));
    }

    #[test]
    fn test_active_path_bounded_by_depth() {
        let gridsize = 32u32; // depth 5
        let mut rng = StdRng::seed_from_u64(0xca7);
        let mut codes: Vec<u64> = (0..5_000).map(|_| rng.gen_range(0..32_768)).collect();
        codes.sort_unstable();

        let mut builder = OctreeBuilder::new(MemorySink::default(), gridsize, false).unwrap();
        let mut peak = 0;
        for code in codes {
            builder.add_voxel(code).unwrap();
            peak = peak.max(builder.active_nodes());
        }
        assert_eq!(peak, 5);
        builder.finalize_tree().unwrap();
        assert_eq!(builder.active_nodes(), 0);
    }

    #[test]
    fn test_empty_input_emits_no_nodes() {
        let (nodes, n_nodes, n_voxels) = build(8, &[], false);
        assert!(nodes.is_empty());
        assert_eq!(n_nodes, 0);
        assert_eq!(n_voxels, 0);
    }

    #[test]
    fn test_level_densities() {
        // one occupied voxel in a 4^3 grid: the leaf-parent holds 1 of 8
        // leaves, the root averages that over its 8 children
        let (nodes, ..) = build(4, &[0], true);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].density, 0.125);
        assert_eq!(nodes[1].density, 0.125 / 8.0);

        // a full leaf-parent octant
        let (nodes, ..) = build(4, &[0, 1, 2, 3, 4, 5, 6, 7], true);
        assert_eq!(nodes[0].density, 1.0);
        assert_eq!(nodes[1].density, 0.125);
    }
}
