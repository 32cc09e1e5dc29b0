//! # World Configuration
//!
//! Capacity and chunking parameters for a shard, loaded once at startup from
//! TOML. Every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! max_handles = 65535
//! storage_initial_capacity = 256
//! chunk_world_size = 1536.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecs::Handle;
use crate::error::{CoreError, CoreResult};

/// Default maximum number of live handles per world (~1M).
pub const DEFAULT_MAX_HANDLES: u32 = Handle::MAX_INDEX;

/// Default chunk edge length in world units (128 tiles * 12 units).
pub const DEFAULT_CHUNK_WORLD_SIZE: f64 = 1536.0;

/// Configuration for a [`World`](crate::World).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Maximum number of simultaneously live handles.
    ///
    /// Also bounds every storage's sparse index, so memory tracks
    /// concurrency rather than all-time spawn totals.
    pub max_handles: u32,
    /// Initial sparse/dense capacity of each component storage.
    pub storage_initial_capacity: usize,
    /// Initial handle-list capacity of each new archetype.
    pub archetype_initial_capacity: usize,
    /// Initial capacity of the chunk index reverse map.
    pub chunk_index_initial_capacity: usize,
    /// Bounded capacity of the off-tick command queue.
    pub command_queue_capacity: usize,
    /// Chunk edge length in world units.
    pub chunk_world_size: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            storage_initial_capacity: 1024,
            archetype_initial_capacity: 64,
            chunk_index_initial_capacity: 1024,
            command_queue_capacity: 1024,
            chunk_world_size: DEFAULT_CHUNK_WORLD_SIZE,
        }
    }
}

impl WorldConfig {
    /// Parses and validates a config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigParse`] for malformed TOML and
    /// [`CoreError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigRead`] if the file cannot be read, plus
    /// everything [`WorldConfig::from_toml_str`] can return.
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_handles == 0 || self.max_handles > Handle::MAX_INDEX {
            return Err(CoreError::InvalidConfig(format!(
                "max_handles must be in 1..={}, got {}",
                Handle::MAX_INDEX,
                self.max_handles
            )));
        }
        if self.storage_initial_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "storage_initial_capacity must be greater than zero".into(),
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "command_queue_capacity must be greater than zero".into(),
            ));
        }
        if !self.chunk_world_size.is_finite() || self.chunk_world_size <= 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "chunk_world_size must be positive and finite, got {}",
                self.chunk_world_size
            )));
        }
        Ok(())
    }

    /// Sparse index cap for storages: one slot per possible handle index.
    #[inline]
    #[must_use]
    pub fn sparse_cap(&self) -> usize {
        self.max_handles as usize + 1
    }
}
