//! # Queries
//!
//! A query selects entities whose mask contains every required component
//! and none of the excluded ones. Ad-hoc [`Query`] values scan the
//! archetype list each time; a [`PreparedQuery`] caches the matching
//! archetype ids and rebuilds only when the graph version changes.

use super::archetype::{Archetype, ArchetypeId};
use super::component::{Component, ComponentId, ComponentMask};
use super::handle::Handle;
use super::world::World;

/// Ad-hoc query over a borrowed world.
///
/// ```rust,ignore
/// let moving = world.query().with::<Position>().with::<Velocity>().without::<Frozen>();
/// moving.for_each(|handle| { /* ... */ });
/// ```
#[derive(Clone, Copy)]
pub struct Query<'w> {
    /// World being queried.
    world: &'w World,
    /// Components every match must have.
    required: ComponentMask,
    /// Components no match may have.
    excluded: ComponentMask,
}

impl<'w> Query<'w> {
    pub(crate) fn new(world: &'w World) -> Self {
        Self {
            world,
            required: ComponentMask::EMPTY,
            excluded: ComponentMask::EMPTY,
        }
    }

    /// Requires component `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[must_use]
    #[track_caller]
    pub fn with<T: Component>(mut self) -> Self {
        self.required.set(self.world.component_id::<T>());
        self
    }

    /// Requires the component with `id`.
    #[must_use]
    pub fn with_id(mut self, id: ComponentId) -> Self {
        self.required.set(id);
        self
    }

    /// Excludes component `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    #[must_use]
    #[track_caller]
    pub fn without<T: Component>(mut self) -> Self {
        self.excluded.set(self.world.component_id::<T>());
        self
    }

    /// Excludes the component with `id`.
    #[must_use]
    pub fn without_id(mut self, id: ComponentId) -> Self {
        self.excluded.set(id);
        self
    }

    /// Required mask.
    #[must_use]
    pub const fn required(&self) -> ComponentMask {
        self.required
    }

    /// Excluded mask.
    #[must_use]
    pub const fn excluded(&self) -> ComponentMask {
        self.excluded
    }

    fn matching(&self) -> impl Iterator<Item = &'w Archetype> + 'w {
        let (required, excluded) = (self.required, self.excluded);
        self.world
            .archetypes()
            .iter()
            .filter(move |a| !a.is_empty() && a.mask().matches(required, excluded))
    }

    /// Iterates over matching handles.
    pub fn iter(&self) -> impl Iterator<Item = Handle> + 'w {
        self.matching().flat_map(|a| a.handles().iter().copied())
    }

    /// Calls `f` for every matching handle.
    pub fn for_each(&self, mut f: impl FnMut(Handle)) {
        for archetype in self.matching() {
            for &handle in archetype.handles() {
                f(handle);
            }
        }
    }

    /// Number of matching entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.matching().map(Archetype::len).sum()
    }

    /// Checks whether nothing matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matching().next().is_none()
    }

    /// Collects matching handles into a new vector.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        let mut out = Vec::with_capacity(self.count());
        self.handles_into(&mut out);
        out
    }

    /// Appends matching handles to `out`.
    pub fn handles_into(&self, out: &mut Vec<Handle>) {
        for archetype in self.matching() {
            out.extend_from_slice(archetype.handles());
        }
    }

    /// Turns this query into a cached one.
    #[must_use]
    pub fn prepare(self) -> PreparedQuery {
        let mut prepared = PreparedQuery::new(self.required, self.excluded);
        prepared.refresh(self.world);
        prepared
    }
}

/// Query with a cached list of matching archetypes.
///
/// Owns no borrow of the world: pass the world to each call. The cache is
/// rebuilt when the archetype graph version moves or when used with a
/// different world than last time.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    /// Components every match must have.
    required: ComponentMask,
    /// Components no match may have.
    excluded: ComponentMask,
    /// Matching archetypes, empty ones included.
    archetypes: Vec<ArchetypeId>,
    /// Graph version at the last rebuild.
    seen_version: u64,
    /// World the cache was built against. 0 before the first build.
    world_id: u64,
    /// Reused handle snapshot for `for_each_mut`.
    scratch: Vec<Handle>,
}

impl PreparedQuery {
    /// Creates an unbuilt query. The first use builds the cache.
    #[must_use]
    pub fn new(required: ComponentMask, excluded: ComponentMask) -> Self {
        Self {
            required,
            excluded,
            archetypes: Vec::new(),
            seen_version: 0,
            world_id: 0,
            scratch: Vec::new(),
        }
    }

    /// Rebuilds the archetype cache unconditionally.
    pub fn refresh(&mut self, world: &World) {
        let graph = world.archetypes();
        self.archetypes.clear();
        graph.query_archetypes_into(self.required, self.excluded, &mut self.archetypes);
        self.seen_version = graph.version();
        self.world_id = world.id();
        tracing::trace!(
            required = %self.required,
            excluded = %self.excluded,
            archetypes = self.archetypes.len(),
            version = self.seen_version,
            "prepared query rebuilt"
        );
    }

    #[inline]
    fn ensure_fresh(&mut self, world: &World) {
        if self.world_id != world.id() || self.seen_version != world.archetypes().version() {
            self.refresh(world);
        }
    }

    /// Iterates over matching handles.
    pub fn iter<'a>(&'a mut self, world: &'a World) -> impl Iterator<Item = Handle> + 'a {
        self.ensure_fresh(world);
        let graph = world.archetypes();
        self.archetypes
            .iter()
            .map(move |&id| graph.archetype(id))
            .filter(|a| !a.is_empty())
            .flat_map(|a| a.handles().iter().copied())
    }

    /// Calls `f` for every matching handle.
    pub fn for_each(&mut self, world: &World, mut f: impl FnMut(Handle)) {
        self.ensure_fresh(world);
        let graph = world.archetypes();
        for &id in &self.archetypes {
            for &handle in graph.archetype(id).handles() {
                f(handle);
            }
        }
    }

    /// Calls `f` with mutable world access for every matching handle.
    ///
    /// Handles are snapshotted first, so `f` may add or remove components
    /// and despawn entities. Entities despawned earlier in the same pass
    /// are skipped.
    pub fn for_each_mut(&mut self, world: &mut World, mut f: impl FnMut(&mut World, Handle)) {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        self.handles_into(world, &mut scratch);
        for &handle in &scratch {
            if world.is_alive(handle) {
                f(world, handle);
            }
        }
        scratch.clear();
        self.scratch = scratch;
    }

    /// Number of matching entities.
    pub fn count(&mut self, world: &World) -> usize {
        self.ensure_fresh(world);
        let graph = world.archetypes();
        self.archetypes
            .iter()
            .map(|&id| graph.archetype(id).len())
            .sum()
    }

    /// Appends matching handles to `out`.
    pub fn handles_into(&mut self, world: &World, out: &mut Vec<Handle>) {
        self.ensure_fresh(world);
        let graph = world.archetypes();
        for &id in &self.archetypes {
            out.extend_from_slice(graph.archetype(id).handles());
        }
    }

    /// Graph version the cache was built against.
    #[must_use]
    pub const fn seen_version(&self) -> u64 {
        self.seen_version
    }

    /// Number of cached archetypes, including currently empty ones.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Required mask.
    #[must_use]
    pub const fn required(&self) -> ComponentMask {
        self.required
    }

    /// Excluded mask.
    #[must_use]
    pub const fn excluded(&self) -> ComponentMask {
        self.excluded
    }
}
