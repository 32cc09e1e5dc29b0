//! # ORIGIN Core Engine
//!
//! Entity storage and indexing for one simulation shard:
//! - Generational 32-bit handles with O(1) stale detection
//! - Sparse-set component storage with swap-remove deletion
//! - Archetype graph with cached (prepared) queries
//! - Chunk index mapping spatial keys to entities
//!
//! ## Architecture Rules
//!
//! 1. **No linear scans in the tick path** - every removal is a swap-remove
//! 2. **Stale handles fail closed** - a recycled index never leaks data
//! 3. **Startup wiring is fatal when wrong** - registry mistakes panic early
//!
//! ## Example
//!
//! ```rust,ignore
//! use origin_core::{Component, ComponentId, ComponentRegistry, EntityId, World};
//!
//! struct Health(u32);
//! impl Component for Health {
//!     const ID: ComponentId = ComponentId::new(1);
//! }
//!
//! let registry = ComponentRegistry::builder().register::<Health>().build();
//! let mut world = World::new(registry);
//! let h = world.spawn(EntityId(42));
//! world.add_component(h, Health(100));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;

pub use config::WorldConfig;
pub use ecs::{
    Archetype, ArchetypeGraph, ArchetypeId, ChunkCoord, ChunkIndex, ChunkKey, Command,
    CommandSender, Component, ComponentId, ComponentMask, ComponentRegistry,
    ComponentRegistryBuilder, ComponentStorage, EntityId, ErasedStorage, ExternalId, FnSystem,
    Handle, HandleAllocator, HandlePool, MaskIter, PreparedQuery, Query, Resources,
    StorageMut, System, SystemTimingStat, World,
};
pub use error::{CoreError, CoreResult, RegistryError};
