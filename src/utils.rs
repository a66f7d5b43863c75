//! Small I/O helpers shared by the header formats.
//!
//! Every header file this crate writes is framed as a little-endian CRC32 of
//! the bincode payload followed by the payload itself, so a truncated or
//! bit-rotted header is detected before any phase trusts its contents.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ForgeError, ForgeResult};

/// Serialize `value` with bincode and write it to `path` behind a CRC32.
pub(crate) fn write_header<T: Serialize>(path: &Path, value: &T) -> ForgeResult<()> {
    let body = bincode::serialize(value).map_err(|e| ForgeError::CorruptHeader {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut bytes = Vec::with_capacity(4 + body.len());
    bytes.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    bytes.extend_from_slice(&body);
    fs::write(path, bytes).map_err(|e| ForgeError::io(path, e))
}

/// Read a header written by [`write_header`], verifying its checksum.
pub(crate) fn read_header<T: DeserializeOwned>(path: &Path) -> ForgeResult<T> {
    let bytes = fs::read(path).map_err(|e| ForgeError::io(path, e))?;
    if bytes.len() < 4 {
        return Err(ForgeError::CorruptHeader {
            path: path.to_path_buf(),
            reason: "shorter than checksum frame".into(),
        });
    }
    let (crc_bytes, body) = bytes.split_at(4);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if crc32fast::hash(body) != stored {
        return Err(ForgeError::CorruptHeader {
            path: path.to_path_buf(),
            reason: "checksum mismatch".into(),
        });
    }
    bincode::deserialize(body).map_err(|e| ForgeError::CorruptHeader {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Byte length of a file, or `None` if it cannot be read.
pub(crate) fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        magic: u32,
        counts: Vec<u64>,
    }

    #[test]
    fn test_header_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.hdr");
        let probe = Probe {
            magic: 0xabad_cafe,
            counts: vec![1, 2, 3],
        };
        write_header(&path, &probe).unwrap();
        assert_eq!(read_header::<Probe>(&path).unwrap(), probe);
    }

    #[test]
    fn test_flipped_bit_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.hdr");
        write_header(
            &path,
            &Probe {
                magic: 7,
                counts: vec![9],
            },
        )
        .unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_header::<Probe>(&path),
            Err(ForgeError::CorruptHeader { .. })
        ));
    }
}
