//! Buffered triangle stream reader.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bytemuck::Zeroable;

use crate::error::{ForgeError, ForgeResult};
use crate::mesh::Triangle;

/// Streams a fixed number of triangles out of a `.tridata` payload in
/// batches, holding at most one batch in memory.
///
/// Restartable: open a fresh reader on the same path for another pass.
pub struct TriangleReader {
    reader: BufReader<File>,
    path: PathBuf,
    remaining: u64,
    batch: Vec<Triangle>,
}

impl TriangleReader {
    /// Open `path` expecting `n_triangles` records, reading up to
    /// `buffer_size` triangles per batch.
    pub fn open(path: &Path, n_triangles: u64, buffer_size: usize) -> ForgeResult<Self> {
        let file = File::open(path).map_err(|e| ForgeError::io(path, e))?;
        let batch_len = buffer_size.max(1).min(n_triangles.max(1) as usize);
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            remaining: n_triangles,
            batch: vec![Triangle::zeroed(); batch_len],
        })
    }

    /// Triangles not yet produced.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the next batch, or `None` once the declared count is exhausted.
    ///
    /// A short file is an I/O error: the header promised more triangles than
    /// the payload holds.
    pub fn next_batch(&mut self) -> ForgeResult<Option<&[Triangle]>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let n = (self.batch.len() as u64).min(self.remaining) as usize;
        let bytes = bytemuck::cast_slice_mut(&mut self.batch[..n]);
        self.reader
            .read_exact(bytes)
            .map_err(|e| ForgeError::io(&self.path, e))?;
        self.remaining -= n as u64;
        Ok(Some(&self.batch[..n]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriangleWriter;
    use glam::Vec3;

    fn tri(i: f32) -> Triangle {
        Triangle::new(Vec3::splat(i), Vec3::splat(i + 0.25), Vec3::splat(i + 0.5))
    }

    #[test]
    fn test_batched_read_yields_all_triangles() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("strip");
        let mut writer = TriangleWriter::create(&base).unwrap();
        for i in 0..10 {
            writer.push(&tri(i as f32)).unwrap();
        }
        let header = writer.finish().unwrap();

        let mut reader = TriangleReader::open(&header.data_path(), 10, 4).unwrap();
        let mut seen = Vec::new();
        while let Some(batch) = reader.next_batch().unwrap() {
            assert!(batch.len() <= 4);
            seen.extend_from_slice(batch);
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[7], tri(7.0));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.tridata");
        std::fs::write(&path, [0u8; 40]).unwrap(); // less than 2 triangles

        let mut reader = TriangleReader::open(&path, 2, 8).unwrap();
        assert!(matches!(
            reader.next_batch(),
            Err(ForgeError::Io { .. })
        ));
    }
}
