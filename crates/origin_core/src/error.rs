//! # Core Error Types
//!
//! Recoverable errors surfaced by the core. Wiring mistakes (unregistered
//! components, missing mandatory resources) are not represented here: they
//! panic at the call site.

use thiserror::Error;

/// Errors that can occur while configuring or feeding a world.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// The configuration file is not valid TOML for `WorldConfig`.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The world's command queue is full.
    #[error("command queue full: capacity {capacity}")]
    CommandQueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// The world that owned the command queue has been dropped.
    #[error("world dropped, command not delivered")]
    WorldGone,
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from the fallible component registration path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Component id is above the 63 ceiling.
    #[error("component id {0} exceeds maximum (63)")]
    IdOutOfRange(u8),

    /// Another type already holds this id.
    #[error("component id {id} already taken by {existing}, cannot register {requested}")]
    IdTaken {
        /// The contested id.
        id: u8,
        /// Type currently bound to the id.
        existing: &'static str,
        /// Type that tried to claim it.
        requested: &'static str,
    },

    /// The same type was registered twice.
    #[error("component {0} registered twice")]
    AlreadyRegistered(&'static str),
}
