use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_pipeline::common::{PipelineError, PlanarBuffer};
use crate::image_pipeline::state::Stage;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache record: {0}")]
    Corrupt(String),

    #[error("Failed to encode cache sidecar: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Caller-chosen key of one image. Callers switch to a new identity whenever
/// a parameter that affects the cached stages changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageIdentity(String);

impl ImageIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the identity's directory under the cache root.
    ///
    /// Identities made of `[A-Za-z0-9_-]` are used verbatim; anything else is
    /// hex encoded behind an `x-` prefix.
    pub fn dir_name(&self) -> String {
        let plain = !self.0.is_empty()
            && !self.0.starts_with("x-")
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if plain {
            self.0.clone()
        } else {
            let hex: String = self.0.bytes().map(|b| format!("{b:02x}")).collect();
            format!("x-{hex}")
        }
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ImageIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferFormat {
    /// Three `f32` planes stored back to back.
    PlanarF32,
}

/// Buffer produced at a checkpoint, tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: Stage,
    pub format: BufferFormat,
    pub width: usize,
    pub height: usize,
    /// Orientation still to apply to the buffer.
    pub quarter_turns: u8,
    pub data: Vec<f32>,
}

impl StageResult {
    pub fn from_planar(stage: Stage, planar: &PlanarBuffer, quarter_turns: u8) -> Self {
        Self {
            stage,
            format: BufferFormat::PlanarF32,
            width: planar.width(),
            height: planar.height(),
            quarter_turns,
            data: planar.to_contiguous(),
        }
    }

    pub fn to_planar(&self) -> Result<PlanarBuffer, PipelineError> {
        PlanarBuffer::from_contiguous(self.width, self.height, &self.data)
    }

    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Float count a buffer of this shape holds; `None` on overflow.
    pub(crate) fn expected_len(format: BufferFormat, width: usize, height: usize) -> Option<usize> {
        match format {
            BufferFormat::PlanarF32 => width.checked_mul(height)?.checked_mul(3),
        }
    }
}

/// Sidecar written next to every blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub identity: ImageIdentity,
    pub stage: Stage,
    pub format: BufferFormat,
    pub width: usize,
    pub height: usize,
    pub quarter_turns: u8,
    /// Size of the compressed blob on disk.
    pub byte_size: u64,
    /// Seconds since the Unix epoch when the record was written.
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub memory_budget: usize,
    pub disk_budget: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("raw_develop_cache"),
            memory_budget: 512 * 1024 * 1024,
            disk_budget: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct CacheConfigBuilder {
    root: Option<PathBuf>,
    memory_budget: Option<usize>,
    disk_budget: Option<u64>,
}

impl CacheConfigBuilder {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn disk_budget(mut self, bytes: u64) -> Self {
        self.disk_budget = Some(bytes);
        self
    }

    pub fn build(self) -> CacheConfig {
        let default = CacheConfig::default();
        CacheConfig {
            root: self.root.unwrap_or(default.root),
            memory_budget: self.memory_budget.unwrap_or(default.memory_budget),
            disk_budget: self.disk_budget.unwrap_or(default.disk_budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identities_keep_their_name() {
        assert_eq!(ImageIdentity::new("IMG_0042-v2").dir_name(), "IMG_0042-v2");
        assert_eq!(ImageIdentity::new("a/b").dir_name(), "x-612f62");
        assert_eq!(ImageIdentity::new("..").dir_name(), "x-2e2e");
        assert_eq!(ImageIdentity::new("x-1").dir_name(), "x-782d31");
    }

    #[test]
    fn builder_falls_back_to_defaults() {
        let config = CacheConfig::builder().memory_budget(1024).build();
        assert_eq!(config.memory_budget, 1024);
        assert_eq!(config.disk_budget, CacheConfig::default().disk_budget);
    }

    #[test]
    fn planar_round_trip() {
        let planar = PlanarBuffer::from_planes(2, 1, [vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]]).unwrap();
        let result = StageResult::from_planar(Stage::ColorConvert, &planar, 1);
        assert_eq!(result.byte_size(), 24);
        assert_eq!(result.to_planar().unwrap(), planar);
    }
}
