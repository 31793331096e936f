//! On-disk artifacts of the flat index.
//!
//! A committed index consists of three files:
//!
//! - `vectors.<generation>.bin`: raw vector data (`LVEC` header + little-endian f32)
//! - `mapping.<generation>.bin`: bincode encoded positional maps
//! - `manifest.json`: names the current generation and the checksums of both files
//!
//! Generation files are written first; the manifest is replaced atomically
//! afterwards, so a reader following the manifest always sees vectors and maps
//! from the same commit.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{LuminaError, Result};
use crate::storage::{Storage, read_all, write_atomic};
use crate::vector::core::embedding::ImageId;
use crate::vector::index::flat::FlatIndex;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

const VECTORS_MAGIC: &[u8; 4] = b"LVEC";
const VECTORS_FORMAT_VERSION: u32 = 1;
const VECTORS_PREFIX: &str = "vectors.";
const MAPPING_PREFIX: &str = "mapping.";

/// Commit record of one persisted generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub generation: u64,
    pub dimension: usize,
    pub count: usize,
    pub vectors_file: String,
    pub mapping_file: String,
    pub vectors_crc32: u32,
    pub mapping_crc32: u32,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingArtifact {
    position_to_id: Vec<ImageId>,
    id_to_position: Vec<(ImageId, u64)>,
}

fn vectors_file_name(generation: u64) -> String {
    format!("{VECTORS_PREFIX}{generation}.bin")
}

fn mapping_file_name(generation: u64) -> String {
    format!("{MAPPING_PREFIX}{generation}.bin")
}

/// Encode the raw vector artifact.
pub fn encode_vectors(index: &FlatIndex) -> Result<Vec<u8>> {
    let data = index.raw_data();
    let mut buffer = Vec::with_capacity(20 + data.len() * 4);

    buffer.extend_from_slice(VECTORS_MAGIC);
    buffer.write_u32::<LittleEndian>(VECTORS_FORMAT_VERSION)?;
    buffer.write_u32::<LittleEndian>(index.dimension() as u32)?;
    buffer.write_u64::<LittleEndian>(index.len() as u64)?;
    for value in data {
        buffer.write_f32::<LittleEndian>(*value)?;
    }

    Ok(buffer)
}

/// Decode the raw vector artifact into `(dimension, count, values)`.
pub fn decode_vectors(bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    let unreadable =
        |e: std::io::Error| LuminaError::storage_unreadable(format!("vector artifact: {e}"));

    let mut input = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic).map_err(unreadable)?;
    if &magic != VECTORS_MAGIC {
        return Err(LuminaError::storage_unreadable(
            "vector artifact has a bad magic number",
        ));
    }

    let version = input.read_u32::<LittleEndian>().map_err(unreadable)?;
    if version != VECTORS_FORMAT_VERSION {
        return Err(LuminaError::storage_unreadable(format!(
            "unsupported vector artifact version {version}"
        )));
    }

    let dimension = input.read_u32::<LittleEndian>().map_err(unreadable)? as usize;
    let count = input.read_u64::<LittleEndian>().map_err(unreadable)? as usize;

    let expected_values = count.checked_mul(dimension);
    let expected_bytes = expected_values
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| LuminaError::storage_unreadable("vector artifact header overflows"))?;
    let expected_values = expected_bytes / 4;
    let remaining = bytes.len() - input.position() as usize;
    if remaining != expected_bytes {
        return Err(LuminaError::storage_unreadable(format!(
            "vector artifact holds {remaining} data bytes, header announces {expected_bytes}"
        )));
    }

    let mut values = vec![0.0f32; expected_values];
    input
        .read_f32_into::<LittleEndian>(&mut values)
        .map_err(unreadable)?;

    Ok((dimension, count, values))
}

/// Encode the positional maps artifact.
pub fn encode_mapping(index: &FlatIndex) -> Result<Vec<u8>> {
    let artifact = MappingArtifact {
        position_to_id: index.position_to_id().to_vec(),
        id_to_position: index.id_to_position_pairs(),
    };
    bincode::serialize(&artifact)
        .map_err(|e| LuminaError::other(format!("failed to encode mapping artifact: {e}")))
}

fn decode_mapping(bytes: &[u8]) -> Result<MappingArtifact> {
    bincode::deserialize(bytes)
        .map_err(|e| LuminaError::storage_unreadable(format!("mapping artifact: {e}")))
}

/// Persist `index` as `generation` and commit it through the manifest.
///
/// The generation is committed once `manifest.json` has been replaced. Any
/// failure before that point is reported as [`LuminaError::StorageWrite`] and
/// leaves the previous generation in place. A failed directory sync after the
/// replacement is only logged, since the manifest already names the new files.
/// Files of older generations are removed only after the commit.
pub fn write_index(
    storage: &dyn Storage,
    index: &FlatIndex,
    generation: u64,
) -> Result<IndexManifest> {
    let vectors = encode_vectors(index)?;
    let mapping = encode_mapping(index)?;

    let manifest = IndexManifest {
        version: MANIFEST_VERSION,
        generation,
        dimension: index.dimension(),
        count: index.len(),
        vectors_file: vectors_file_name(generation),
        mapping_file: mapping_file_name(generation),
        vectors_crc32: crc32fast::hash(&vectors),
        mapping_crc32: crc32fast::hash(&mapping),
        written_at: Utc::now(),
    };

    if let Err(e) = commit(storage, &manifest, &vectors, &mapping) {
        storage.delete_file(&manifest.vectors_file).ok();
        storage.delete_file(&manifest.mapping_file).ok();
        return Err(LuminaError::storage_write(e.to_string()));
    }

    if let Err(e) = storage.sync() {
        warn!("Index generation {generation} committed but storage sync failed: {e}");
    }

    remove_stale_generations(storage, &manifest);
    Ok(manifest)
}

/// Write both artifacts, then replace the manifest.
fn commit(
    storage: &dyn Storage,
    manifest: &IndexManifest,
    vectors: &[u8],
    mapping: &[u8],
) -> Result<()> {
    write_atomic(storage, &manifest.vectors_file, vectors)?;
    write_atomic(storage, &manifest.mapping_file, mapping)?;
    let serialized = serde_json::to_vec_pretty(manifest)?;
    write_atomic(storage, MANIFEST_FILE, &serialized)
}

fn remove_stale_generations(storage: &dyn Storage, manifest: &IndexManifest) {
    let files = match storage.list_files() {
        Ok(files) => files,
        Err(e) => {
            warn!("Could not list index files for cleanup: {e}");
            return;
        }
    };

    for file in files {
        let is_generation_file =
            file.starts_with(VECTORS_PREFIX) || file.starts_with(MAPPING_PREFIX);
        if is_generation_file && file != manifest.vectors_file && file != manifest.mapping_file {
            if let Err(e) = storage.delete_file(&file) {
                warn!("Could not delete stale index file {file}: {e}");
            }
        }
    }
}

/// Remove scratch files left behind by an interrupted write.
pub fn remove_scratch_files(storage: &dyn Storage) {
    if let Ok(files) = storage.list_files() {
        for file in files.into_iter().filter(|f| f.ends_with(".tmp")) {
            debug!("Removing leftover scratch file {file}");
            storage.delete_file(&file).ok();
        }
    }
}

/// Load the committed index.
///
/// Returns `Ok(None)` when nothing was ever committed. Any artifact that is
/// missing, truncated, fails its checksum, or disagrees with `dimension` or
/// with the other artifact yields [`LuminaError::StorageUnreadable`].
pub fn read_index(
    storage: &dyn Storage,
    dimension: usize,
) -> Result<Option<(FlatIndex, IndexManifest)>> {
    if !storage.file_exists(MANIFEST_FILE) {
        return Ok(None);
    }

    let manifest_bytes = read_all(storage, MANIFEST_FILE)
        .map_err(|e| LuminaError::storage_unreadable(format!("manifest: {e}")))?;
    let manifest: IndexManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| LuminaError::storage_unreadable(format!("manifest: {e}")))?;

    if manifest.version != MANIFEST_VERSION {
        return Err(LuminaError::storage_unreadable(format!(
            "unsupported manifest version {}",
            manifest.version
        )));
    }
    if manifest.dimension != dimension {
        return Err(LuminaError::storage_unreadable(format!(
            "persisted dimension {} does not match configured dimension {dimension}",
            manifest.dimension
        )));
    }

    let vectors = read_checked(storage, &manifest.vectors_file, manifest.vectors_crc32)?;
    let mapping = read_checked(storage, &manifest.mapping_file, manifest.mapping_crc32)?;

    let (stored_dimension, count, data) = decode_vectors(&vectors)?;
    if stored_dimension != dimension || count != manifest.count {
        return Err(LuminaError::storage_unreadable(format!(
            "vector artifact holds {count}x{stored_dimension}, manifest announces {}x{}",
            manifest.count, manifest.dimension
        )));
    }

    let mapping = decode_mapping(&mapping)?;
    let index = FlatIndex::from_parts(
        dimension,
        data,
        mapping.position_to_id,
        &mapping.id_to_position,
    )?;

    Ok(Some((index, manifest)))
}

fn read_checked(storage: &dyn Storage, name: &str, expected_crc: u32) -> Result<Vec<u8>> {
    let bytes = read_all(storage, name)
        .map_err(|e| LuminaError::storage_unreadable(format!("{name}: {e}")))?;
    let actual_crc = crc32fast::hash(&bytes);
    if actual_crc != expected_crc {
        return Err(LuminaError::storage_unreadable(format!(
            "{name}: checksum {actual_crc:08x} does not match manifest {expected_crc:08x}"
        )));
    }
    Ok(bytes)
}
