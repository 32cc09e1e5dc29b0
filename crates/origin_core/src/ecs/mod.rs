//! # Entity Component System
//!
//! Data-oriented ECS for one simulation shard.
//!
//! ## Layout
//!
//! - [`Handle`]: 32-bit generational runtime id (20-bit index, 12-bit generation)
//! - [`ComponentStorage`]: sparse set per component type, addressed by handle
//! - [`ArchetypeGraph`]: entities grouped by exact component mask
//! - [`ChunkIndex`]: spatial chunk key to entity membership
//! - [`World`]: owns all of the above plus resources, systems and commands

mod archetype;
mod chunk;
mod commands;
mod component;
mod handle;
mod query;
mod resource;
mod storage;
mod system;
mod world;

pub use archetype::{Archetype, ArchetypeGraph, ArchetypeId};
pub use chunk::{ChunkCoord, ChunkIndex, ChunkKey};
pub use commands::{Command, CommandSender};
pub use component::{
    Component, ComponentId, ComponentMask, ComponentRegistry, ComponentRegistryBuilder,
    ExternalId, MaskIter,
};
pub use handle::{EntityId, Handle, HandleAllocator, HandlePool};
pub use query::{PreparedQuery, Query};
pub use resource::Resources;
pub use storage::{ComponentStorage, ErasedStorage, StorageMut};
pub use system::{FnSystem, System, SystemTimingStat};
pub use world::World;
