//! Node sinks: where finalized octree nodes go.
//!
//! The builder only dictates emission order (children before their parent,
//! root last overall); the byte layout belongs to the sink.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{FORMAT_VERSION, OCTREE_MAGIC};
use crate::error::{ForgeError, ForgeResult};
use crate::octree::OctreeNode;
use crate::utils;

/// Receives finalized nodes in emission order.
pub trait NodeSink {
    fn write_node(&mut self, node: &OctreeNode) -> ForgeResult<()>;
}

/// Collects nodes in memory. Used by tests and by consumers that want to
/// inspect a small tree without touching disk.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub nodes: Vec<OctreeNode>,
}

impl NodeSink for MemorySink {
    fn write_node(&mut self, node: &OctreeNode) -> ForgeResult<()> {
        self.nodes.push(*node);
        Ok(())
    }
}

/// Appends node records to `<base>.octreenodes`: one mask byte per node,
/// followed by a little-endian f32 density when level generation is on.
/// `finish` writes the `<base>.octree` header, which is what marks the
/// output as complete.
pub struct OctreeFileWriter {
    writer: BufWriter<File>,
    base: PathBuf,
    gridsize: u32,
    generate_levels: bool,
    n_nodes: u64,
}

impl OctreeFileWriter {
    pub fn create(base: &Path, gridsize: u32, generate_levels: bool) -> ForgeResult<Self> {
        let nodes_path = base.with_extension("octreenodes");
        let file = File::create(&nodes_path).map_err(|e| ForgeError::io(&nodes_path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            base: base.to_path_buf(),
            gridsize,
            generate_levels,
            n_nodes: 0,
        })
    }

    /// Flush the node stream and write the header.
    pub fn finish(mut self, n_voxels: u64) -> ForgeResult<OctreeInfo> {
        self.writer
            .flush()
            .map_err(|e| ForgeError::io(self.base.with_extension("octreenodes"), e))?;
        let info = OctreeInfo {
            gridsize: self.gridsize,
            n_nodes: self.n_nodes,
            n_voxels,
            generate_levels: self.generate_levels,
            base: self.base,
        };
        info.write()?;
        Ok(info)
    }

    /// Best-effort removal of both output files; the pipeline's error path.
    pub fn remove_files(base: &Path) {
        let _ = fs::remove_file(base.with_extension("octree"));
        let _ = fs::remove_file(base.with_extension("octreenodes"));
    }
}

impl NodeSink for OctreeFileWriter {
    fn write_node(&mut self, node: &OctreeNode) -> ForgeResult<()> {
        let path = || self.base.with_extension("octreenodes");
        self.writer
            .write_all(&[node.mask])
            .map_err(|e| ForgeError::io(path(), e))?;
        if self.generate_levels {
            self.writer
                .write_all(&node.density.to_le_bytes())
                .map_err(|e| ForgeError::io(path(), e))?;
        }
        self.n_nodes += 1;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct RawOctreeHeader {
    magic: u32,
    version: u32,
    gridsize: u32,
    n_nodes: u64,
    n_voxels: u64,
    generate_levels: bool,
}

/// Parsed `.octree` header describing a finished octree on disk.
#[derive(Debug, Clone)]
pub struct OctreeInfo {
    pub gridsize: u32,
    pub n_nodes: u64,
    pub n_voxels: u64,
    pub generate_levels: bool,
    base: PathBuf,
}

impl OctreeInfo {
    pub fn read(path: &Path) -> ForgeResult<Self> {
        let raw: RawOctreeHeader = utils::read_header(path)?;
        if raw.magic != OCTREE_MAGIC {
            return Err(ForgeError::CorruptHeader {
                path: path.to_path_buf(),
                reason: "not a .octree header (bad magic)".into(),
            });
        }
        if raw.version != FORMAT_VERSION {
            return Err(ForgeError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: raw.version,
            });
        }
        Ok(Self {
            gridsize: raw.gridsize,
            n_nodes: raw.n_nodes,
            n_voxels: raw.n_voxels,
            generate_levels: raw.generate_levels,
            base: path.with_extension(""),
        })
    }

    fn write(&self) -> ForgeResult<()> {
        let raw = RawOctreeHeader {
            magic: OCTREE_MAGIC,
            version: FORMAT_VERSION,
            gridsize: self.gridsize,
            n_nodes: self.n_nodes,
            n_voxels: self.n_voxels,
            generate_levels: self.generate_levels,
        };
        utils::write_header(&self.base.with_extension("octree"), &raw)
    }

    pub fn nodes_path(&self) -> PathBuf {
        self.base.with_extension("octreenodes")
    }

    /// Load the node records back in emission order, for traversal and
    /// verification.
    pub fn read_nodes(&self) -> ForgeResult<Vec<OctreeNode>> {
        let path = self.nodes_path();
        let mut file = File::open(&path).map_err(|e| ForgeError::io(&path, e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ForgeError::io(&path, e))?;

        let record = if self.generate_levels { 5 } else { 1 };
        if bytes.len() as u64 != self.n_nodes * record as u64 {
            return Err(ForgeError::MissingFiles { path });
        }
        Ok(bytes
            .chunks_exact(record)
            .map(|chunk| OctreeNode {
                mask: chunk[0],
                density: if self.generate_levels {
                    f32::from_le_bytes([chunk[1], chunk[2], chunk[3], chunk[4]])
                } else {
                    0.0
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_stream_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tree");
        let nodes = [
            OctreeNode {
                mask: 0b0000_0001,
                density: 0.125,
            },
            OctreeNode {
                mask: 0b1100_0000,
                density: 0.25,
            },
        ];

        let mut writer = OctreeFileWriter::create(&base, 8, true).unwrap();
        for node in &nodes {
            writer.write_node(node).unwrap();
        }
        let info = writer.finish(9).unwrap();
        assert_eq!(info.n_nodes, 2);
        assert_eq!(info.n_voxels, 9);

        let reopened = OctreeInfo::read(&base.with_extension("octree")).unwrap();
        assert_eq!(reopened.gridsize, 8);
        assert_eq!(reopened.read_nodes().unwrap(), nodes);
    }

    #[test]
    fn test_mask_only_records_without_levels() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tree");

        let mut writer = OctreeFileWriter::create(&base, 4, false).unwrap();
        writer
            .write_node(&OctreeNode {
                mask: 0xff,
                density: 0.0,
            })
            .unwrap();
        let info = writer.finish(8).unwrap();

        let len = std::fs::metadata(info.nodes_path()).unwrap().len();
        assert_eq!(len, 1);
        assert_eq!(info.read_nodes().unwrap()[0].mask, 0xff);
    }

    #[test]
    fn test_remove_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tree");
        let writer = OctreeFileWriter::create(&base, 4, false).unwrap();
        drop(writer);
        assert!(base.with_extension("octreenodes").exists());
        OctreeFileWriter::remove_files(&base);
        assert!(!base.with_extension("octreenodes").exists());
    }
}
