//! The `.trip` partition header: the contract between the partitioning and
//! voxelization phases. Whatever the planner writes, `PartitionSet::open`
//! reproduces exactly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{FORMAT_VERSION, TRIANGLE_SIZE_BYTES, TRIP_MAGIC};
use crate::error::{ForgeError, ForgeResult};
use crate::mesh::Aabb;
use crate::partition::{MortonRange, Partition};
use crate::utils;

#[derive(Serialize, Deserialize)]
struct RawTripHeader {
    magic: u32,
    version: u32,
    gridsize: u32,
    n_partitions: u64,
    bbox: Aabb,
    tricounts: Vec<u64>,
}

/// Metadata for a complete partition set on disk.
///
/// `base` is the path prefix: the header lives at `<base>.trip` and partition
/// `i`'s triangle subset at `<base>_<i>.tripdata`.
#[derive(Debug, Clone)]
pub struct PartitionSet {
    pub gridsize: u32,
    pub n_partitions: u64,
    /// Bounding box of the source mesh (not yet cubed).
    pub bbox: Aabb,
    /// Triangles assigned to each partition; duplicates across partitions
    /// are counted in every partition holding them.
    pub tricounts: Vec<u64>,
    base: PathBuf,
}

impl PartitionSet {
    pub fn new(
        gridsize: u32,
        n_partitions: u64,
        bbox: Aabb,
        tricounts: Vec<u64>,
        base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gridsize,
            n_partitions,
            bbox,
            tricounts,
            base: base.into(),
        }
    }

    /// Read and validate a `.trip` header.
    pub fn open(path: &Path) -> ForgeResult<Self> {
        let raw: RawTripHeader = utils::read_header(path)?;
        if raw.magic != TRIP_MAGIC {
            return Err(ForgeError::CorruptHeader {
                path: path.to_path_buf(),
                reason: "not a .trip header (bad magic)".into(),
            });
        }
        if raw.version != FORMAT_VERSION {
            return Err(ForgeError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: raw.version,
            });
        }
        if raw.tricounts.len() as u64 != raw.n_partitions {
            return Err(ForgeError::CorruptHeader {
                path: path.to_path_buf(),
                reason: format!(
                    "{} partitions but {} triangle counts",
                    raw.n_partitions,
                    raw.tricounts.len()
                ),
            });
        }
        Ok(Self {
            gridsize: raw.gridsize,
            n_partitions: raw.n_partitions,
            bbox: raw.bbox,
            tricounts: raw.tricounts,
            base: path.with_extension(""),
        })
    }

    /// Write the `.trip` header.
    pub fn write(&self) -> ForgeResult<()> {
        let raw = RawTripHeader {
            magic: TRIP_MAGIC,
            version: FORMAT_VERSION,
            gridsize: self.gridsize,
            n_partitions: self.n_partitions,
            bbox: self.bbox,
            tricounts: self.tricounts.clone(),
        };
        utils::write_header(&self.header_path(), &raw)
    }

    pub fn header_path(&self) -> PathBuf {
        self.base.with_extension("trip")
    }

    /// Subset file of partition `i`.
    pub fn data_path(&self, index: u64) -> PathBuf {
        let name = match self.base.file_name() {
            Some(stem) => format!("{}_{}.tripdata", stem.to_string_lossy(), index),
            None => format!("_{}.tripdata", index),
        };
        self.base.with_file_name(name)
    }

    /// Voxels per partition.
    pub fn morton_part(&self) -> u64 {
        (self.gridsize as u64).pow(3) / self.n_partitions
    }

    /// Assemble the descriptor for partition `i`.
    pub fn partition(&self, index: u64) -> Partition {
        Partition {
            index,
            range: MortonRange::for_partition(index, self.morton_part()),
            n_triangles: self.tricounts[index as usize],
            data_path: self.data_path(index),
        }
    }

    /// True when every non-empty partition's subset file is present with the
    /// byte length its triangle count implies.
    pub fn files_exist(&self) -> bool {
        self.tricounts.iter().enumerate().all(|(i, &count)| {
            count == 0 || utils::file_len(&self.data_path(i as u64)) == Some(count * TRIANGLE_SIZE_BYTES)
        })
    }

    /// Delete the header and all subset files. Called after the octree is
    /// finalized, and on the pipeline's error path.
    pub fn remove_files(&self) -> ForgeResult<()> {
        for i in 0..self.n_partitions {
            let path = self.data_path(i);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ForgeError::io(path, e)),
            }
        }
        let header = self.header_path();
        match fs::remove_file(&header) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ForgeError::io(header, e)),
        }
    }
}
