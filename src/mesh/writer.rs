//! Triangle stream writer, the inverse of the triangle reader.
//!
//! Used to produce `.tri`/`.tridata` pairs for test fixtures and mesh
//! conversion front-ends; the build pipeline itself only reads.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{ForgeError, ForgeResult};
use crate::mesh::{Aabb, MeshHeader, Triangle};

pub struct TriangleWriter {
    writer: BufWriter<File>,
    base: PathBuf,
    count: u64,
    bbox: Aabb,
}

impl TriangleWriter {
    /// Start a new `<base>.tridata` payload.
    pub fn create(base: &Path) -> ForgeResult<Self> {
        let data_path = base.with_extension("tridata");
        let file = File::create(&data_path).map_err(|e| ForgeError::io(&data_path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            base: base.to_path_buf(),
            count: 0,
            bbox: Aabb::empty(),
        })
    }

    pub fn push(&mut self, tri: &Triangle) -> ForgeResult<()> {
        self.writer
            .write_all(bytemuck::bytes_of(tri))
            .map_err(|e| ForgeError::io(self.base.with_extension("tridata"), e))?;
        self.count += 1;
        self.bbox.grow(tri.v0);
        self.bbox.grow(tri.v1);
        self.bbox.grow(tri.v2);
        Ok(())
    }

    /// Flush the payload and write the `.tri` header with the accumulated
    /// bounding box.
    pub fn finish(self) -> ForgeResult<MeshHeader> {
        let bbox = self.bbox;
        self.finish_with_bbox(bbox)
    }

    /// Like [`finish`](Self::finish) but with an explicit bounding box, for
    /// meshes that should sit inside a larger voxel grid than they span.
    pub fn finish_with_bbox(mut self, bbox: Aabb) -> ForgeResult<MeshHeader> {
        self.writer
            .flush()
            .map_err(|e| ForgeError::io(self.base.with_extension("tridata"), e))?;
        let header = MeshHeader::new(self.count, bbox, true, self.base);
        header.write()?;
        Ok(header)
    }
}
