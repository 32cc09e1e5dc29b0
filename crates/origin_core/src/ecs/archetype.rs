//! # Archetype Graph
//!
//! Entities are grouped by exact component mask. Each archetype keeps a
//! handle list; the world records every entity's row so removal is a
//! swap-remove. The graph bumps a version on each new archetype so cached
//! queries know when to rebuild.

use std::collections::HashMap;

use super::component::ComponentMask;
use super::handle::Handle;

/// Index of an archetype in its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// Returns the arena index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// All entities sharing one exact component mask.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    mask: ComponentMask,
    handles: Vec<Handle>,
}

impl Archetype {
    fn new(id: ArchetypeId, mask: ComponentMask, capacity: usize) -> Self {
        Self {
            id,
            mask,
            handles: Vec::with_capacity(capacity),
        }
    }

    /// Appends `handle` and returns its row.
    pub(crate) fn add_entity(&mut self, handle: Handle) -> usize {
        self.handles.push(handle);
        self.handles.len() - 1
    }

    /// Swap-removes the entity at `row`.
    ///
    /// Returns the handle that moved into `row`, or [`Handle::INVALID`] if
    /// the removed entity was last. Out-of-range rows are a no-op.
    pub(crate) fn remove_entity_at(&mut self, row: usize) -> Handle {
        if row >= self.handles.len() {
            return Handle::INVALID;
        }
        self.handles.swap_remove(row);
        self.handles.get(row).copied().unwrap_or(Handle::INVALID)
    }

    /// Arena id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Exact component mask shared by every member.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Member handles, in row order.
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// Member handles as raw bits.
    #[inline]
    #[must_use]
    pub fn raw_handles(&self) -> &[u32] {
        bytemuck::cast_slice(&self.handles)
    }

    /// Number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Checks whether the archetype has no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Arena of archetypes keyed by mask.
///
/// Archetypes are created on first occupancy and never destroyed; an
/// archetype that empties stays in the graph.
#[derive(Debug)]
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_mask: HashMap<ComponentMask, ArchetypeId>,
    version: u64,
    initial_capacity: usize,
}

impl ArchetypeGraph {
    /// Creates an empty graph. New archetypes reserve `initial_capacity`.
    #[must_use]
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            archetypes: Vec::new(),
            by_mask: HashMap::new(),
            version: 0,
            initial_capacity,
        }
    }

    /// Returns the archetype for `mask`, creating it if needed.
    pub fn get_or_create(&mut self, mask: ComponentMask) -> ArchetypeId {
        if let Some(&id) = self.by_mask.get(&mask) {
            return id;
        }
        // at most one archetype per mask, and masks are bounded by the
        // number of live entities
        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetypes
            .push(Archetype::new(id, mask, self.initial_capacity));
        self.by_mask.insert(mask, id);
        self.version += 1;
        tracing::debug!(
            archetype = id.0,
            mask = %mask,
            version = self.version,
            "archetype created"
        );
        id
    }

    /// Returns the archetype id for `mask` without creating it.
    #[must_use]
    pub fn get(&self, mask: ComponentMask) -> Option<ArchetypeId> {
        self.by_mask.get(&mask).copied()
    }

    /// Returns an archetype by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this graph.
    #[inline]
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.index()]
    }

    #[inline]
    pub(crate) fn archetype_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id.index()]
    }

    /// Ids of archetypes containing every component in `required`.
    #[must_use]
    pub fn query_archetypes(&self, required: ComponentMask) -> Vec<ArchetypeId> {
        let mut out = Vec::new();
        self.query_archetypes_into(required, ComponentMask::EMPTY, &mut out);
        out
    }

    /// Appends ids of archetypes matching `required` but not `excluded`.
    pub fn query_archetypes_into(
        &self,
        required: ComponentMask,
        excluded: ComponentMask,
        out: &mut Vec<ArchetypeId>,
    ) {
        out.extend(
            self.archetypes
                .iter()
                .filter(|a| a.mask.matches(required, excluded))
                .map(|a| a.id),
        );
    }

    /// Iterates over every archetype.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> + '_ {
        self.archetypes.iter()
    }

    /// Number of archetypes ever created.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Checks whether no archetype exists yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Structural version, incremented on every archetype creation.
    #[inline]
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentId;

    fn mask(ids: &[u8]) -> ComponentMask {
        ids.iter().copied().map(ComponentId::new).collect()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut graph = ArchetypeGraph::new(4);
        let a = graph.get_or_create(mask(&[1, 2]));
        let b = graph.get_or_create(mask(&[1, 2]));
        assert_eq!(a, b);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.version(), 1);
    }

    #[test]
    fn test_version_bumps_on_create_only() {
        let mut graph = ArchetypeGraph::new(4);
        assert_eq!(graph.version(), 0);
        graph.get_or_create(ComponentMask::EMPTY);
        graph.get_or_create(mask(&[3]));
        graph.get_or_create(mask(&[3]));
        assert_eq!(graph.version(), 2);
        assert_eq!(graph.get(mask(&[3])).map(ArchetypeId::index), Some(1));
        assert!(graph.get(mask(&[4])).is_none());
    }

    #[test]
    fn test_remove_entity_at_swaps() {
        let mut graph = ArchetypeGraph::new(4);
        let id = graph.get_or_create(mask(&[1]));
        let arch = graph.archetype_mut(id);
        let a = Handle::new(1, 0);
        let b = Handle::new(2, 0);
        let c = Handle::new(3, 0);
        assert_eq!(arch.add_entity(a), 0);
        assert_eq!(arch.add_entity(b), 1);
        assert_eq!(arch.add_entity(c), 2);

        assert_eq!(arch.remove_entity_at(0), c);
        assert_eq!(arch.handles(), &[c, b]);
        assert_eq!(arch.remove_entity_at(1), Handle::INVALID);
        assert_eq!(arch.handles(), &[c]);
        assert_eq!(arch.remove_entity_at(5), Handle::INVALID);
    }

    #[test]
    fn test_query_archetypes_superset_match() {
        let mut graph = ArchetypeGraph::new(4);
        let ab = graph.get_or_create(mask(&[1, 2]));
        let a = graph.get_or_create(mask(&[1]));
        let abc = graph.get_or_create(mask(&[1, 2, 3]));
        graph.get_or_create(mask(&[2]));

        let mut found = graph.query_archetypes(mask(&[1]));
        found.sort();
        assert_eq!(found, vec![ab, a, abc]);

        let mut out = Vec::new();
        graph.query_archetypes_into(mask(&[1, 2]), mask(&[3]), &mut out);
        assert_eq!(out, vec![ab]);
    }

    #[test]
    fn test_empty_archetype_retained() {
        let mut graph = ArchetypeGraph::new(4);
        let id = graph.get_or_create(mask(&[1]));
        let row = graph.archetype_mut(id).add_entity(Handle::new(1, 0));
        graph.archetype_mut(id).remove_entity_at(row);
        assert!(graph.archetype(id).is_empty());
        assert_eq!(graph.len(), 1);
    }
}
