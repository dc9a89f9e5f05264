//! Binary on-disk format for index vectors, read back through a memory map.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic `CIMV`, format version, dimension, vector count
//! - Records: chunk id (u32 LE) followed by `dimension` f32 LE values
//!
//! Records appear in index insertion order, which keeps tie-breaking stable
//! across save/load cycles.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::MmapOptions;

use crate::corpus::ChunkId;
use crate::vector::{VectorDimension, VectorError};

/// File name of the vector store inside the index directory.
pub const VECTORS_FILE: &str = "vectors.bin";

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

const HEADER_SIZE: usize = 16;

const MAGIC_BYTES: &[u8; 4] = b"CIMV";

const BYTES_PER_F32: usize = 4;

const BYTES_PER_ID: usize = 4;

/// Writes all vectors to `path`, replacing any existing file.
pub fn write_vectors(
    path: &Path,
    dimension: VectorDimension,
    entries: &[(ChunkId, Vec<f32>)],
) -> Result<(), VectorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let count = u32::try_from(entries.len())
        .map_err(|_| VectorError::InvalidFormat("Too many vectors for storage".to_string()))?;
    let dim = u32::try_from(dimension.get())
        .map_err(|_| VectorError::InvalidFormat("Dimension does not fit in u32".to_string()))?;

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC_BYTES)?;
    writer.write_all(&STORAGE_VERSION.to_le_bytes())?;
    writer.write_all(&dim.to_le_bytes())?;
    writer.write_all(&count.to_le_bytes())?;

    for (id, vector) in entries {
        dimension.validate_vector(vector)?;
        writer.write_all(&id.to_bytes())?;
        for &value in vector {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Reads every vector stored at `path`.
pub fn read_vectors(path: &Path) -> Result<(VectorDimension, Vec<(ChunkId, Vec<f32>)>), VectorError> {
    let file = File::open(path)?;
    // SAFETY: the file is only written by `write_vectors`, which replaces it
    // wholesale; the map is dropped before this function returns.
    let mmap = unsafe { MmapOptions::new().map(&file)? };

    if mmap.len() < HEADER_SIZE {
        return Err(VectorError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }
    if &mmap[0..4] != MAGIC_BYTES {
        return Err(VectorError::InvalidFormat("Invalid magic bytes".to_string()));
    }

    let version = read_u32(&mmap, 4);
    if version != STORAGE_VERSION {
        return Err(VectorError::VersionMismatch {
            expected: STORAGE_VERSION,
            actual: version,
        });
    }

    let dimension = VectorDimension::new(read_u32(&mmap, 8) as usize)?;
    let count = read_u32(&mmap, 12) as usize;

    let record_size = dimension
        .get()
        .checked_mul(BYTES_PER_F32)
        .and_then(|bytes| bytes.checked_add(BYTES_PER_ID));
    let expected_len = record_size
        .and_then(|size| size.checked_mul(count))
        .and_then(|bytes| bytes.checked_add(HEADER_SIZE));
    let (Some(record_size), Some(expected_len)) = (record_size, expected_len) else {
        return Err(VectorError::InvalidFormat(format!(
            "Header declares {count} vectors of dimension {}, beyond addressable size",
            dimension.get()
        )));
    };
    if mmap.len() != expected_len {
        return Err(VectorError::InvalidFormat(format!(
            "Expected {expected_len} bytes for {count} vectors, found {}",
            mmap.len()
        )));
    }

    let mut entries = Vec::with_capacity(count);
    for record in mmap[HEADER_SIZE..].chunks_exact(record_size) {
        let id = ChunkId::from_bytes([record[0], record[1], record[2], record[3]])
            .ok_or_else(|| VectorError::InvalidFormat("Invalid chunk ID".to_string()))?;

        let vector = record[BYTES_PER_ID..]
            .chunks_exact(BYTES_PER_F32)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        entries.push((id, vector));
    }

    Ok((dimension, entries))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
