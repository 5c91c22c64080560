//! On-disk layout: `<root>/<identity>/<stage tag>.lz4` holding the LZ4
//! compressed buffer, next to `<stage tag>.json` holding its [`CacheRecord`].
//!
//! Files are written under a temporary name and renamed into place, so a
//! record is either complete or absent.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use tracing::{debug, warn};

use crate::image_pipeline::cache::types::{CacheError, CacheRecord, ImageIdentity, StageResult};
use crate::image_pipeline::state::Stage;

pub fn identity_dir(root: &Path, identity: &ImageIdentity) -> PathBuf {
    root.join(identity.dir_name())
}

fn blob_path(dir: &Path, stage: Stage) -> PathBuf {
    dir.join(format!("{:08x}.lz4", stage.tag()))
}

fn sidecar_path(dir: &Path, stage: Stage) -> PathBuf {
    dir.join(format!("{:08x}.json", stage.tag()))
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Writes `result` as the only record of `identity`.
pub fn write(root: &Path, identity: &ImageIdentity, result: &StageResult) -> Result<CacheRecord, CacheError> {
    let dir = identity_dir(root, identity);
    remove(root, identity)?;
    fs::create_dir_all(&dir)?;

    let compressed = compress_prepend_size(bytemuck::cast_slice(&result.data));
    write_atomic(&blob_path(&dir, result.stage), &compressed)?;

    let record = CacheRecord {
        identity: identity.clone(),
        stage: result.stage,
        format: result.format,
        width: result.width,
        height: result.height,
        quarter_turns: result.quarter_turns,
        byte_size: compressed.len() as u64,
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    write_atomic(&sidecar_path(&dir, result.stage), &serde_json::to_vec_pretty(&record)?)?;

    debug!(
        "Wrote {} cache blob for {}: {} -> {} bytes",
        result.stage,
        identity,
        result.byte_size(),
        compressed.len()
    );
    Ok(record)
}

/// Loads and decompresses the blob `record` describes.
pub fn read(root: &Path, record: &CacheRecord) -> Result<StageResult, CacheError> {
    let corrupt = |what: String| CacheError::Corrupt(format!("{}: {what}", record.identity));
    let len = StageResult::expected_len(record.format, record.width, record.height)
        .ok_or_else(|| corrupt(format!("{}x{} overflows", record.width, record.height)))?;
    let byte_len = len
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| corrupt(format!("{len} floats overflow")))?;

    let dir = identity_dir(root, &record.identity);
    let compressed = fs::read(blob_path(&dir, record.stage))?;
    // Blobs start with their little-endian u32 decompressed size.
    let prepended = compressed
        .get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
        .ok_or_else(|| corrupt("blob too short".to_string()))?;
    if prepended != byte_len {
        return Err(corrupt(format!(
            "expected {byte_len} bytes, blob declares {prepended}"
        )));
    }
    let bytes = decompress_size_prepended(&compressed).map_err(|e| corrupt(e.to_string()))?;
    if bytes.len() != byte_len {
        return Err(corrupt(format!(
            "expected {} floats, blob holds {} bytes",
            len,
            bytes.len()
        )));
    }
    let mut data = vec![0.0f32; len];
    bytemuck::cast_slice_mut::<f32, u8>(&mut data).copy_from_slice(&bytes);

    Ok(StageResult {
        stage: record.stage,
        format: record.format,
        width: record.width,
        height: record.height,
        quarter_turns: record.quarter_turns,
        data,
    })
}

/// Deletes every file of `identity`.
pub fn remove(root: &Path, identity: &ImageIdentity) -> Result<(), CacheError> {
    match fs::remove_dir_all(identity_dir(root, identity)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reads every sidecar under `root` whose blob is present.
pub fn scan(root: &Path) -> Result<Vec<CacheRecord>, CacheError> {
    let mut records = Vec::new();
    for dir in fs::read_dir(root)? {
        let dir = dir?.path();
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record: CacheRecord = match fs::read(&path)
                .map_err(CacheError::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(CacheError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable cache sidecar {}: {}", path.display(), e);
                    continue;
                }
            };
            if !blob_path(&dir, record.stage).is_file() {
                warn!("Cache sidecar {} has no blob", path.display());
                continue;
            }
            records.push(record);
        }
    }
    Ok(records)
}
