//! The `.tri` mesh header.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{FORMAT_VERSION, TRIANGLE_SIZE_BYTES, TRI_MAGIC};
use crate::error::{ForgeError, ForgeResult};
use crate::mesh::Aabb;
use crate::utils;

/// Serialized form of the `.tri` header.
#[derive(Serialize, Deserialize)]
struct RawTriHeader {
    magic: u32,
    version: u32,
    n_triangles: u64,
    geometry_only: bool,
    bbox: Aabb,
}

/// Parsed `.tri` mesh header.
///
/// Immutable once read. `base` is the header path without its extension; the
/// triangle payload lives next to it as `<base>.tridata`.
#[derive(Debug, Clone)]
pub struct MeshHeader {
    pub n_triangles: u64,
    pub bbox: Aabb,
    pub geometry_only: bool,
    base: PathBuf,
}

impl MeshHeader {
    pub fn new(n_triangles: u64, bbox: Aabb, geometry_only: bool, base: impl Into<PathBuf>) -> Self {
        Self {
            n_triangles,
            bbox,
            geometry_only,
            base: base.into(),
        }
    }

    /// Read and validate a `.tri` header.
    pub fn read(path: &Path) -> ForgeResult<Self> {
        let raw: RawTriHeader = utils::read_header(path)?;
        if raw.magic != TRI_MAGIC {
            return Err(ForgeError::CorruptHeader {
                path: path.to_path_buf(),
                reason: "not a .tri header (bad magic)".into(),
            });
        }
        if raw.version != FORMAT_VERSION {
            return Err(ForgeError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: raw.version,
            });
        }
        Ok(Self {
            n_triangles: raw.n_triangles,
            bbox: raw.bbox,
            geometry_only: raw.geometry_only,
            base: path.with_extension(""),
        })
    }

    /// Write this header to `<base>.tri`.
    pub fn write(&self) -> ForgeResult<()> {
        let raw = RawTriHeader {
            magic: TRI_MAGIC,
            version: FORMAT_VERSION,
            n_triangles: self.n_triangles,
            geometry_only: self.geometry_only,
            bbox: self.bbox,
        };
        utils::write_header(&self.base.with_extension("tri"), &raw)
    }

    /// Path of the raw triangle payload.
    pub fn data_path(&self) -> PathBuf {
        self.base.with_extension("tridata")
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// True when the `.tridata` payload exists with the exact byte length the
    /// triangle count implies.
    pub fn files_exist(&self) -> bool {
        utils::file_len(&self.data_path()) == Some(self.n_triangles * TRIANGLE_SIZE_BYTES)
    }
}
