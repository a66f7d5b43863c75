//! Per-partition voxel occupancy storage.
//!
//! A partition starts in sparse mode: occupied Morton codes are appended to a
//! bounded list (duplicates allowed, resolved by sort + dedup afterwards).
//! If the list would outgrow its capacity the buffer flips, once and for the
//! rest of the partition, to a dense array of tri-state cells, draining the
//! codes collected so far into it so no occupancy is lost. The flip decision
//! happens under the list lock and is published through an atomic flag, so a
//! worker never keeps appending after overflow is declared.
//!
//! Dense cells follow the monotone lattice `EMPTY < WORKING < FULL`; writes
//! go through `fetch_max`, so a cell can only move forward and the final
//! state is independent of worker interleaving.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::{ForgeError, ForgeResult};
use crate::partition::MortonRange;

/// Cell never touched by a triangle test.
pub const EMPTY_VOXEL: u8 = 0;
/// Advisory claim: some worker is running the exact test on this cell.
pub const WORKING_VOXEL: u8 = 1;
/// A triangle was proven to intersect this cell.
pub const FULL_VOXEL: u8 = 2;

/// Shared occupancy buffer for one partition's voxelization pass.
pub struct VoxelBuffer {
    range: MortonRange,
    memory_budget: u64,
    data_max_items: usize,
    use_data: AtomicBool,
    sparse: Mutex<Vec<u64>>,
    dense: OnceLock<Box<[AtomicU8]>>,
    nfilled: AtomicU64,
}

impl VoxelBuffer {
    /// Create the buffer for `range`.
    ///
    /// The sparse list capacity is `sparseness_limit` of the partition's
    /// dense byte size, divided by the 8-byte code width. A capacity of zero
    /// allocates the dense array up front, which fails with
    /// [`ForgeError::ResourceExhausted`] if it cannot fit `memory_budget`.
    pub fn new(range: MortonRange, sparseness_limit: f32, memory_budget: u64) -> ForgeResult<Self> {
        let max_bytes_data = (range.len() as f64 * sparseness_limit as f64) as u64;
        let data_max_items = (max_bytes_data / std::mem::size_of::<u64>() as u64) as usize;
        let buffer = Self {
            range,
            memory_budget,
            data_max_items,
            use_data: AtomicBool::new(true),
            sparse: Mutex::new(Vec::new()),
            dense: OnceLock::new(),
            nfilled: AtomicU64::new(0),
        };
        if data_max_items == 0 {
            let mut vec = buffer.sparse.lock();
            buffer.switch_to_dense(&mut vec)?;
            drop(vec);
        }
        Ok(buffer)
    }

    /// Items the sparse list may hold before the dense fallback takes over.
    pub fn data_max_items(&self) -> usize {
        self.data_max_items
    }

    /// True while the sparse list is still the active representation.
    pub fn is_sparse(&self) -> bool {
        self.use_data.load(Ordering::Acquire)
    }

    /// Dense mode: is this cell already proven occupied? Sparse mode never
    /// skips, duplicates are cheaper than the bookkeeping.
    #[inline]
    pub fn is_full(&self, code: u64) -> bool {
        match self.dense_cells() {
            Some(cells) => {
                cells[(code - self.range.start) as usize].load(Ordering::Relaxed) == FULL_VOXEL
            }
            None => false,
        }
    }

    /// Dense mode: advisory claim before running the exact test. Carries no
    /// correctness weight, it only lets concurrent workers see the cell is
    /// being handled.
    #[inline]
    pub fn claim(&self, code: u64) {
        if let Some(cells) = self.dense_cells() {
            cells[(code - self.range.start) as usize].fetch_max(WORKING_VOXEL, Ordering::Relaxed);
        }
    }

    /// Dense mode: mark a cell as proven occupied.
    #[inline]
    pub fn mark_full(&self, code: u64) {
        let Some(cells) = self.dense_cells() else {
            unreachable!("mark_full called while sparse mode is active");
        };
        Self::fill_cell(cells, self.range.start, code, &self.nfilled);
    }

    /// Append a batch of occupied codes.
    ///
    /// In sparse mode the batch lands on the shared list; if it would push
    /// the list past capacity, the buffer flips to dense and this batch (plus
    /// everything collected before it) lands there instead.
    pub fn record(&self, codes: &[u64]) -> ForgeResult<()> {
        if codes.is_empty() {
            return Ok(());
        }
        if self.use_data.load(Ordering::Acquire) {
            let mut vec = self.sparse.lock();
            // recheck: another worker may have flipped while we waited
            if self.use_data.load(Ordering::Relaxed) {
                if vec.len() + codes.len() <= self.data_max_items {
                    vec.extend_from_slice(codes);
                    return Ok(());
                }
                self.switch_to_dense(&mut vec)?;
            }
        }
        let Some(cells) = self.dense_cells() else {
            unreachable!("dense cells are installed before sparse mode is cleared");
        };
        for &code in codes {
            Self::fill_cell(cells, self.range.start, code, &self.nfilled);
        }
        Ok(())
    }

    /// Consume the buffer into the final occupancy set.
    pub fn finish(self) -> OccupancySet {
        if self.use_data.load(Ordering::Acquire) {
            let mut codes = self.sparse.into_inner();
            codes.par_sort_unstable();
            codes.dedup();
            OccupancySet::Sparse { codes }
        } else {
            let Some(cells) = self.dense.into_inner() else {
                unreachable!("dense cells are installed before sparse mode is cleared");
            };
            OccupancySet::Dense {
                cells,
                start: self.range.start,
                nfilled: self.nfilled.into_inner(),
            }
        }
    }

    #[inline]
    fn dense_cells(&self) -> Option<&[AtomicU8]> {
        if self.use_data.load(Ordering::Acquire) {
            None
        } else {
            self.dense.get().map(|cells| &cells[..])
        }
    }

    #[inline]
    fn fill_cell(cells: &[AtomicU8], start: u64, code: u64, nfilled: &AtomicU64) {
        let prev = cells[(code - start) as usize].fetch_max(FULL_VOXEL, Ordering::Relaxed);
        if prev != FULL_VOXEL {
            nfilled.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Abandon the sparse list: allocate the dense array, drain the collected
    /// codes into it, and publish the mode switch. Caller holds the list
    /// lock.
    fn switch_to_dense(&self, vec: &mut Vec<u64>) -> ForgeResult<()> {
        let requested = self.range.len();
        if requested > self.memory_budget {
            return Err(ForgeError::ResourceExhausted {
                requested,
                budget: self.memory_budget,
            });
        }
        let cells: Box<[AtomicU8]> = (0..requested)
            .map(|_| AtomicU8::new(EMPTY_VOXEL))
            .collect();
        for &code in vec.iter() {
            Self::fill_cell(&cells, self.range.start, code, &self.nfilled);
        }
        *vec = Vec::new();
        if self.dense.set(cells).is_err() {
            unreachable!("dense fallback installed twice");
        }
        self.use_data.store(false, Ordering::Release);
        Ok(())
    }
}

/// Final occupancy of one partition, ready to stream into the octree builder.
pub enum OccupancySet {
    /// Sorted, de-duplicated Morton codes.
    Sparse { codes: Vec<u64> },
    /// Tri-state cell array; occupied cells are the `FULL_VOXEL` entries.
    Dense {
        cells: Box<[AtomicU8]>,
        start: u64,
        nfilled: u64,
    },
}

impl OccupancySet {
    /// Exact count of distinct occupied voxels.
    pub fn nfilled(&self) -> u64 {
        match self {
            OccupancySet::Sparse { codes } => codes.len() as u64,
            OccupancySet::Dense { nfilled, .. } => *nfilled,
        }
    }

    /// Occupied codes in increasing Morton order. The dense array is scanned
    /// in index order, which is already Morton order.
    pub fn codes(&self) -> Codes<'_> {
        match self {
            OccupancySet::Sparse { codes } => Codes::Sparse(codes.iter()),
            OccupancySet::Dense { cells, start, .. } => Codes::Dense {
                cells: cells.iter().enumerate(),
                start: *start,
            },
        }
    }
}

/// Iterator over an [`OccupancySet`]'s codes.
pub enum Codes<'a> {
    Sparse(std::slice::Iter<'a, u64>),
    Dense {
        cells: std::iter::Enumerate<std::slice::Iter<'a, AtomicU8>>,
        start: u64,
    },
}

impl Iterator for Codes<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        match self {
            Codes::Sparse(iter) => iter.next().copied(),
            Codes::Dense { cells, start } => cells
                .find(|(_, cell)| cell.load(Ordering::Relaxed) == FULL_VOXEL)
                .map(|(i, _)| *start + i as u64),
        }
    }
}
