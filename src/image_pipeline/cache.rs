//! Intermediate result cache
//!
//! Stores the checkpoint a run produced so later runs for the same image can
//! skip the expensive early stages. Every record lives on disk (LZ4
//! compressed, with a JSON sidecar); a copy stays in memory until memory
//! pressure, idleness or the memory budget drops it.

pub mod disk;
pub mod intermediate_cache;
pub mod types;

pub use intermediate_cache::IntermediateCache;
pub use types::{
    BufferFormat, CacheConfig, CacheConfigBuilder, CacheError, CacheRecord, ImageIdentity,
    StageResult,
};
