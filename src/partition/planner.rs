//! Partition planning: sizing the partition count against the memory budget
//! and streaming the mesh into per-partition triangle subsets.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::constants::MAX_GRID_SIZE;
use crate::error::{ForgeError, ForgeResult};
use crate::grid::GridParameters;
use crate::mesh::{MeshHeader, TriangleReader};
use crate::partition::{MortonRange, PartitionSet};

/// Smallest power-of-eight partition count whose dense voxel buffer
/// (`gridsize³ / n` bytes, one byte per voxel) fits `memory_budget` bytes.
///
/// Powers of eight keep every partition an octree-aligned cube and guarantee
/// the count divides the grid volume evenly. Fails fast, before any triangle
/// I/O, when the parameters can never produce a valid split.
pub fn estimate_partitions(gridsize: u32, memory_budget: u64) -> ForgeResult<u64> {
    if !gridsize.is_power_of_two() || gridsize < 2 || gridsize > MAX_GRID_SIZE {
        return Err(ForgeError::InvalidConfig {
            field: "gridsize",
            value: gridsize.to_string(),
            reason: "must be a power of two in [2, 2^21]",
        });
    }
    if memory_budget == 0 {
        return Err(ForgeError::InvalidConfig {
            field: "memory_budget",
            value: "0".into(),
            reason: "must be positive",
        });
    }
    let volume = (gridsize as u64).pow(3);
    let mut n_partitions = 1u64;
    while volume / n_partitions > memory_budget {
        n_partitions *= 8;
    }
    debug!(
        "grid volume {} voxels, budget {} bytes: {} partition(s) of {} voxels",
        volume,
        memory_budget,
        n_partitions,
        volume / n_partitions
    );
    Ok(n_partitions)
}

/// Stream every triangle of the mesh once, appending it to the subset file of
/// each partition whose cube its bounding box overlaps.
///
/// A triangle straddling a partition boundary is written to every overlapping
/// partition; conservative duplication is correct for occupancy testing,
/// omission is not. The `.trip` header is written only after every subset
/// file has been flushed; on any I/O failure the partial files are removed
/// and no header is left behind.
pub fn partition(
    mesh: &MeshHeader,
    n_partitions: u64,
    gridsize: u32,
    reader: &mut TriangleReader,
    base: &Path,
) -> ForgeResult<PartitionSet> {
    let grid = GridParameters::new(&mesh.bbox, gridsize, n_partitions)?;
    let set = PartitionSet::new(
        gridsize,
        n_partitions,
        mesh.bbox,
        vec![0; n_partitions as usize],
        base,
    );

    match stream_into_subsets(&grid, reader, &set) {
        Ok(tricounts) => {
            let set = PartitionSet::new(gridsize, n_partitions, mesh.bbox, tricounts, base);
            set.write()?;
            Ok(set)
        }
        Err(e) => {
            // never leave a partial partition set referenced by a header
            let _ = set.remove_files();
            Err(e)
        }
    }
}

fn stream_into_subsets(
    grid: &GridParameters,
    reader: &mut TriangleReader,
    set: &PartitionSet,
) -> ForgeResult<Vec<u64>> {
    let n = set.n_partitions;
    let bounds: Vec<_> = (0..n)
        .map(|i| MortonRange::for_partition(i, grid.morton_part).world_aabb(grid))
        .collect();

    let mut writers = Vec::with_capacity(n as usize);
    for i in 0..n {
        let path = set.data_path(i);
        let file = File::create(&path).map_err(|e| ForgeError::io(&path, e))?;
        writers.push(BufWriter::new(file));
    }

    let mut tricounts = vec![0u64; n as usize];
    while let Some(batch) = reader.next_batch()? {
        for tri in batch {
            let tri_aabb = tri.aabb();
            for (i, partition_aabb) in bounds.iter().enumerate() {
                if tri_aabb.intersects(partition_aabb) {
                    writers[i]
                        .write_all(bytemuck::bytes_of(tri))
                        .map_err(|e| ForgeError::io(set.data_path(i as u64), e))?;
                    tricounts[i] += 1;
                }
            }
        }
    }

    for (i, writer) in writers.iter_mut().enumerate() {
        writer
            .flush()
            .map_err(|e| ForgeError::io(set.data_path(i as u64), e))?;
    }

    // drop empty subset files instead of leaving zero-byte clutter
    for (i, &count) in tricounts.iter().enumerate() {
        if count == 0 {
            let _ = fs::remove_file(set.data_path(i as u64));
        }
    }

    Ok(tricounts)
}
