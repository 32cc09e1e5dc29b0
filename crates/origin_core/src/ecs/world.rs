//! # World
//!
//! One simulation shard: handles, component storages, the archetype graph,
//! the chunk index, resources, systems and the off-tick command queue.
//!
//! All structural mutation goes through `&mut World`, so the tick thread
//! owns the world exclusively. Other threads interact via a
//! [`HandlePool`] clone (reserve handles) and a [`CommandSender`]
//! (enqueue mutations).

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::archetype::{ArchetypeGraph, ArchetypeId};
use super::chunk::{ChunkIndex, ChunkKey};
use super::commands::{CommandQueue, CommandSender};
use super::component::{Component, ComponentId, ComponentMask, ComponentRegistry, ExternalId};
use super::handle::{EntityId, Handle, HandlePool};
use super::query::Query;
use super::resource::Resources;
use super::storage::{ComponentStorage, ErasedStorage, StorageMut};
use super::system::{FnSystem, Schedule, System, SystemTimingStat};
use crate::config::WorldConfig;
use crate::error::CoreResult;

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Where a live entity sits in the archetype graph.
#[derive(Clone, Copy, Debug)]
struct EntityRecord {
    /// Full handle, generation included.
    handle: Handle,
    /// Components currently attached.
    mask: ComponentMask,
    /// Archetype whose mask equals `mask`.
    archetype: ArchetypeId,
    /// Position in the archetype's handle list.
    row: usize,
}

/// The ECS world.
pub struct World {
    /// Process-unique id, used by prepared queries to detect a world switch.
    id: u64,
    /// Validated configuration.
    config: WorldConfig,
    /// Immutable component registry shared with other worlds.
    registry: Arc<ComponentRegistry>,
    /// Handle allocator, shared with off-tick reservers.
    handles: HandlePool,
    /// Entity records indexed by handle index.
    records: Vec<Option<EntityRecord>>,
    /// Live entity count.
    alive: usize,
    /// Durable id to current handle.
    entity_ids: HashMap<EntityId, Handle>,
    /// Archetype arena keyed by mask.
    archetypes: ArchetypeGraph,
    /// One type-erased storage per component id.
    storages: Vec<Option<Box<dyn ErasedStorage>>>,
    /// Spatial chunk membership.
    chunks: ChunkIndex,
    /// Type-keyed singletons.
    resources: Resources,
    /// Registered systems. Detached while [`World::update`] runs them.
    schedule: Schedule,
    /// Number of systems in the detached schedule during an update.
    running_systems: usize,
    /// Mutations queued from other threads.
    commands: CommandQueue,
    /// Completed updates.
    tick_count: u64,
    /// Delta time of the latest update.
    delta_time: f32,
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self::build(registry, WorldConfig::default())
    }

    /// Creates a world with a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`](crate::CoreError::InvalidConfig)
    /// if `config` fails validation.
    pub fn with_config(registry: Arc<ComponentRegistry>, config: WorldConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self::build(registry, config))
    }

    fn build(registry: Arc<ComponentRegistry>, config: WorldConfig) -> Self {
        let id = NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed);
        let storages = (0..ComponentId::COUNT)
            .map(|slot| {
                registry.new_storage(slot, config.storage_initial_capacity, config.sparse_cap())
            })
            .collect();

        tracing::info!(
            world = id,
            max_handles = config.max_handles,
            components = registry.len(),
            "world created"
        );

        Self {
            id,
            handles: HandlePool::new(config.max_handles),
            records: Vec::new(),
            alive: 0,
            entity_ids: HashMap::new(),
            archetypes: ArchetypeGraph::new(config.archetype_initial_capacity),
            storages,
            chunks: ChunkIndex::with_capacity(config.chunk_index_initial_capacity),
            resources: Resources::new(),
            schedule: Schedule::default(),
            running_systems: 0,
            commands: CommandQueue::new(config.command_queue_capacity),
            tick_count: 0,
            delta_time: 0.0,
            registry,
            config,
        }
    }

    /// Process-unique identifier of this world.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Configuration the world was built with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Shared component registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Clone of the handle pool, for reserving handles off the tick thread.
    #[must_use]
    pub fn handle_pool(&self) -> HandlePool {
        self.handles.clone()
    }

    /// Resolves a registered component type to its id.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn component_id<T: Component>(&self) -> ComponentId {
        self.registry.id_of::<T>()
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Spawns an entity carrying `external` as its [`ExternalId`].
    ///
    /// Returns [`Handle::INVALID`] when the handle space is exhausted.
    pub fn spawn(&mut self, external: EntityId) -> Handle {
        let handle = self.spawn_without_external_id();
        if handle.is_valid() {
            self.add_component(handle, ExternalId(external));
        }
        handle
    }

    /// Spawns an entity and runs `setup` on it before returning.
    pub fn spawn_with(
        &mut self,
        external: EntityId,
        setup: impl FnOnce(&mut World, Handle),
    ) -> Handle {
        let handle = self.spawn(external);
        if handle.is_valid() {
            setup(self, handle);
        }
        handle
    }

    /// Spawns an entity with no components.
    ///
    /// Returns [`Handle::INVALID`] when the handle space is exhausted.
    pub fn spawn_without_external_id(&mut self) -> Handle {
        let handle = self.handles.reserve();
        if !handle.is_valid() {
            tracing::warn!(
                world = self.id,
                capacity = self.handles.capacity(),
                "handle space exhausted, spawn refused"
            );
            return Handle::INVALID;
        }
        self.place(handle);
        handle
    }

    /// Places a handle previously obtained from [`World::handle_pool`].
    ///
    /// Returns `false` if the handle is not an outstanding reservation.
    pub fn spawn_reserved(&mut self, handle: Handle, external: Option<EntityId>) -> bool {
        if !self.handles.is_alive(handle) || self.is_alive(handle) {
            return false;
        }
        self.place(handle);
        if let Some(external) = external {
            self.add_component(handle, ExternalId(external));
        }
        true
    }

    /// Returns a reserved handle that was never placed.
    ///
    /// Returns `false` if the handle is placed or not reserved.
    pub fn release_reserved(&mut self, handle: Handle) -> bool {
        if self.is_alive(handle) {
            return false;
        }
        self.handles.release(handle)
    }

    fn place(&mut self, handle: Handle) {
        let index = handle.index() as usize;
        if index >= self.records.len() {
            let len = (index + 1)
                .next_power_of_two()
                .min(self.config.sparse_cap())
                .max(index + 1);
            self.records.resize(len, None);
        }

        let archetype = self.archetypes.get_or_create(ComponentMask::EMPTY);
        let row = self.archetypes.archetype_mut(archetype).add_entity(handle);
        self.records[index] = Some(EntityRecord {
            handle,
            mask: ComponentMask::EMPTY,
            archetype,
            row,
        });
        self.alive += 1;
    }

    /// Despawns an entity, dropping all of its components.
    ///
    /// Returns `false` for stale or unknown handles.
    pub fn despawn(&mut self, handle: Handle) -> bool {
        let Some(record) = self.record(handle) else {
            return false;
        };

        self.detach_row(record);

        if record.mask.has(ExternalId::ID) {
            if let Some(&ExternalId(external)) = self.storage::<ExternalId>().get(handle) {
                self.unmap_entity_id(external, handle);
            }
        }
        for id in record.mask {
            if let Some(storage) = self.storages[id.index()].as_mut() {
                storage.remove_handle(handle);
            }
        }
        self.chunks.remove(handle);

        self.records[handle.index() as usize] = None;
        self.alive -= 1;
        self.handles.release(handle);
        true
    }

    /// Checks whether `handle` refers to a live, placed entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, handle: Handle) -> bool {
        self.record(handle).is_some()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn entity_count(&self) -> usize {
        self.alive
    }

    /// Component mask of a live entity.
    #[must_use]
    pub fn mask_of(&self, handle: Handle) -> Option<ComponentMask> {
        self.record(handle).map(|record| record.mask)
    }

    /// Archetype and row of a live entity.
    #[must_use]
    pub fn location_of(&self, handle: Handle) -> Option<(ArchetypeId, usize)> {
        self.record(handle)
            .map(|record| (record.archetype, record.row))
    }

    /// Durable id of a live entity, if it has one.
    #[must_use]
    pub fn external_id(&self, handle: Handle) -> Option<EntityId> {
        self.storage::<ExternalId>().get(handle).map(|ext| ext.0)
    }

    /// Live handle currently mapped to `id`.
    #[must_use]
    pub fn handle_by_entity_id(&self, id: EntityId) -> Option<Handle> {
        self.entity_ids
            .get(&id)
            .copied()
            .filter(|&handle| self.is_alive(handle))
    }

    #[inline]
    fn record(&self, handle: Handle) -> Option<EntityRecord> {
        self.records
            .get(handle.index() as usize)
            .copied()
            .flatten()
            .filter(|record| record.handle == handle)
    }

    /// Swap-removes the entity's archetype row and patches the moved entity.
    fn detach_row(&mut self, record: EntityRecord) {
        let moved = self
            .archetypes
            .archetype_mut(record.archetype)
            .remove_entity_at(record.row);
        if moved.is_valid() {
            if let Some(Some(moved_record)) = self.records.get_mut(moved.index() as usize) {
                moved_record.row = record.row;
            }
        }
    }

    fn move_to(&mut self, record: EntityRecord, mask: ComponentMask) {
        if record.mask == mask {
            return;
        }
        self.detach_row(record);
        let archetype = self.archetypes.get_or_create(mask);
        let row = self
            .archetypes
            .archetype_mut(archetype)
            .add_entity(record.handle);
        self.records[record.handle.index() as usize] = Some(EntityRecord {
            handle: record.handle,
            mask,
            archetype,
            row,
        });
    }

    fn map_entity_id(&mut self, id: EntityId, handle: Handle) {
        if let Some(previous) = self.entity_ids.insert(id, handle) {
            if previous != handle && self.is_alive(previous) {
                tracing::warn!(
                    entity_id = %id,
                    previous = %previous,
                    current = %handle,
                    "entity id remapped to a newer handle"
                );
            }
        }
    }

    fn unmap_entity_id(&mut self, id: EntityId, handle: Handle) {
        if self.entity_ids.get(&id) == Some(&handle) {
            self.entity_ids.remove(&id);
        }
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Typed storage for `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[track_caller]
    #[must_use]
    pub fn storage<T: Component>(&self) -> &ComponentStorage<T> {
        match self.storages[T::ID.index()]
            .as_deref()
            .and_then(|storage| storage.as_any().downcast_ref::<ComponentStorage<T>>())
        {
            Some(storage) => storage,
            None => self.registry.unregistered::<T>(),
        }
    }

    /// Mutable view of the values stored for `T`.
    ///
    /// The view cannot insert or remove values; use
    /// [`World::add_component`] and [`World::remove_component`] for that.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[track_caller]
    pub fn storage_mut<T: Component>(&mut self) -> StorageMut<'_, T> {
        StorageMut::new(self.storage_raw_mut::<T>())
    }

    #[track_caller]
    fn storage_raw_mut<T: Component>(&mut self) -> &mut ComponentStorage<T> {
        match self.storages[T::ID.index()]
            .as_deref_mut()
            .and_then(|storage| storage.as_any_mut().downcast_mut::<ComponentStorage<T>>())
        {
            Some(storage) => storage,
            None => self.registry.unregistered::<T>(),
        }
    }

    /// Sets component `T` on a live entity, replacing any previous value.
    ///
    /// Returns `false` for stale or unknown handles.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[track_caller]
    pub fn add_component<T: Component>(&mut self, handle: Handle, value: T) -> bool {
        let Some(record) = self.record(handle) else {
            // still resolve the storage so an unregistered type fails loudly
            let _ = self.storage::<T>();
            return false;
        };

        let external = if T::ID == ExternalId::ID {
            (&value as &dyn Any)
                .downcast_ref::<ExternalId>()
                .map(|ext| ext.0)
        } else {
            None
        };
        if let Some(new_id) = external {
            if let Some(old_id) = self.external_id(handle) {
                if old_id != new_id {
                    self.unmap_entity_id(old_id, handle);
                }
            }
        }

        if !self.storage_raw_mut::<T>().set(handle, value) {
            return false;
        }
        if let Some(new_id) = external {
            self.map_entity_id(new_id, handle);
        }
        self.move_to(record, record.mask.with(T::ID));
        true
    }

    /// Reads component `T` of an entity.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn get_component<T: Component>(&self, handle: Handle) -> Option<&T> {
        self.storage::<T>().get(handle)
    }

    /// Mutable access to component `T` of an entity.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[inline]
    #[track_caller]
    pub fn component_mut<T: Component>(&mut self, handle: Handle) -> Option<&mut T> {
        self.storage_raw_mut::<T>().get_mut(handle)
    }

    /// Runs `f` on component `T` of an entity.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[track_caller]
    pub fn mutate_component<T: Component, R>(
        &mut self,
        handle: Handle,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        self.storage_raw_mut::<T>().mutate(handle, f)
    }

    /// Removes and returns component `T` of an entity.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[track_caller]
    pub fn remove_component<T: Component>(&mut self, handle: Handle) -> Option<T> {
        let value = self.storage_raw_mut::<T>().remove(handle)?;
        let record = self.record(handle)?;

        if T::ID == ExternalId::ID {
            if let Some(&ExternalId(external)) = (&value as &dyn Any).downcast_ref::<ExternalId>() {
                self.unmap_entity_id(external, handle);
            }
        }
        self.move_to(record, record.mask.without(T::ID));
        Some(value)
    }

    /// Checks whether an entity has component `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[must_use]
    #[track_caller]
    pub fn has_component<T: Component>(&self, handle: Handle) -> bool {
        let id = self.component_id::<T>();
        self.record(handle).is_some_and(|record| record.mask.has(id))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Starts an ad-hoc query.
    #[must_use]
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// The archetype graph.
    #[inline]
    #[must_use]
    pub const fn archetypes(&self) -> &ArchetypeGraph {
        &self.archetypes
    }

    // =========================================================================
    // Chunk index
    // =========================================================================

    /// The chunk index.
    #[must_use]
    pub const fn chunk_index(&self) -> &ChunkIndex {
        &self.chunks
    }

    /// The chunk index, mutably.
    pub fn chunk_index_mut(&mut self) -> &mut ChunkIndex {
        &mut self.chunks
    }

    /// Moves a live entity to `key`. Returns `false` if dead or unchanged.
    pub fn update_chunk(&mut self, handle: Handle, key: ChunkKey) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        self.chunks.update_chunk(handle, key)
    }

    /// Chunk key for a world position using the configured chunk size.
    #[must_use]
    pub fn chunk_key_at(&self, region: u16, layer: u8, world_x: f64, world_y: f64) -> ChunkKey {
        ChunkKey::from_world_position(region, layer, world_x, world_y, self.config.chunk_world_size)
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Stores a resource and returns it.
    pub fn init_resource<T: Send + 'static>(&mut self, value: T) -> &mut T {
        self.resources.insert(value)
    }

    /// Stores a resource, returning the previous value.
    pub fn set_resource<T: Send + 'static>(&mut self, value: T) -> Option<T> {
        self.resources.replace(value)
    }

    /// Mandatory resource.
    ///
    /// # Panics
    ///
    /// Panics if no `T` was initialized.
    #[must_use]
    #[track_caller]
    pub fn resource<T: Send + 'static>(&self) -> &T {
        self.resources.get::<T>()
    }

    /// Mandatory resource, mutably.
    ///
    /// # Panics
    ///
    /// Panics if no `T` was initialized.
    #[track_caller]
    pub fn resource_mut<T: Send + 'static>(&mut self) -> &mut T {
        self.resources.get_mut::<T>()
    }

    /// Optional resource.
    #[must_use]
    pub fn try_resource<T: Send + 'static>(&self) -> Option<&T> {
        self.resources.try_get::<T>()
    }

    /// Optional resource, mutably.
    pub fn try_resource_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.resources.try_get_mut::<T>()
    }

    /// Checks whether a `T` resource is stored.
    #[must_use]
    pub fn has_resource<T: Send + 'static>(&self) -> bool {
        self.resources.contains::<T>()
    }

    /// Removes and returns a resource.
    pub fn remove_resource<T: Send + 'static>(&mut self) -> Option<T> {
        self.resources.remove::<T>()
    }

    // =========================================================================
    // Systems
    // =========================================================================

    /// Registers a system. Takes effect from the next update.
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.schedule.add(system);
    }

    /// Registers a closure as a system.
    pub fn add_system_fn(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        run: impl FnMut(&mut World, f32) + Send + 'static,
    ) {
        self.add_system(Box::new(FnSystem::new(name, priority, run)));
    }

    /// Number of registered systems, including those added during the
    /// current tick.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.schedule.len() + self.running_systems
    }

    /// Advances one tick: applies queued commands, then runs systems.
    pub fn update(&mut self, dt: f32) {
        let applied = self.apply_commands();
        self.tick_count += 1;
        self.delta_time = dt;

        let mut schedule = std::mem::take(&mut self.schedule);
        self.running_systems = schedule.len();
        schedule.run(self, dt, self.tick_count);
        schedule.absorb(&mut self.schedule);
        self.schedule = schedule;
        self.running_systems = 0;

        tracing::trace!(
            world = self.id,
            tick = self.tick_count,
            commands = applied,
            entities = self.alive,
            "tick complete"
        );
    }

    /// Number of completed updates.
    #[inline]
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Delta time passed to the latest update.
    #[inline]
    #[must_use]
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Returns per-system timing since the last drain and resets it.
    ///
    /// Called from inside a system, this returns only external timings
    /// recorded during the current tick. Timings of the running schedule
    /// are kept for the next drain made outside [`World::update`].
    pub fn drain_system_stats(&mut self) -> Vec<SystemTimingStat> {
        self.schedule.drain_stats()
    }

    /// Records the duration of work done outside the schedule.
    pub fn add_external_timing(&mut self, name: &str, duration: Duration) {
        self.schedule.add_external_timing(name, duration);
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Producer handle for the command queue.
    #[must_use]
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Applies commands queued so far. Commands enqueued while applying
    /// wait for the next call.
    pub fn apply_commands(&mut self) -> usize {
        let pending = self.commands.len();
        let mut applied = 0;
        while applied < pending {
            let Some(command) = self.commands.try_pop() else {
                break;
            };
            command(self);
            applied += 1;
        }
        applied
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entities", &self.alive)
            .field("archetypes", &self.archetypes.len())
            .field("chunks", &self.chunks.chunk_count())
            .field("resources", &self.resources.len())
            .field("systems", &self.schedule.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
