//! # Handle Management
//!
//! Handles are compact runtime identifiers consisting of:
//! - A dense index into sparse arrays (low 20 bits)
//! - A generation counter for safe reuse (high 12 bits)
//!
//! The durable [`EntityId`] is a separate 64-bit value owned by callers
//! (persistence, replication) and attached through the `ExternalId`
//! component.

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Caller-durable identity of an entity, stable across handle recycling.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize,
    Deserialize,
)]
#[repr(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime identifier for an entity inside one world.
///
/// Layout:
/// - Lower 20 bits: index into sparse arrays (index 0 is never issued)
/// - Upper 12 bits: generation counter
///
/// The all-zero value is [`Handle::INVALID`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    /// Number of index bits.
    pub const INDEX_BITS: u32 = 20;

    /// Number of generation bits.
    pub const GENERATION_BITS: u32 = 12;

    /// Largest index a handle can carry.
    pub const MAX_INDEX: u32 = (1 << Self::INDEX_BITS) - 1;

    /// Largest generation before wrapping back to zero.
    pub const MAX_GENERATION: u16 = (1 << Self::GENERATION_BITS) - 1;

    /// The invalid handle. Never returned by an allocation.
    pub const INVALID: Self = Self(0);

    /// Packs an index and generation into a handle.
    ///
    /// Bits above the respective field widths are discarded.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u16) -> Self {
        let generation = (generation & Self::MAX_GENERATION) as u32;
        Self((generation << Self::INDEX_BITS) | (index & Self::MAX_INDEX))
    }

    /// Reinterprets raw bits (e.g. from a replication adapter) as a handle.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw packed bits.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Returns the index portion.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & Self::MAX_INDEX
    }

    /// Returns the generation portion.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u16 {
        (self.0 >> Self::INDEX_BITS) as u16
    }

    /// Returns `true` unless this is [`Handle::INVALID`].
    ///
    /// This says nothing about liveness; use the allocator or world for that.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// Set on a generation slot while its index sits on the free list.
const FREE_FLAG: u16 = 1 << 15;

/// Issues and recycles handles with generation tagging.
///
/// Generation storage grows with the highest index ever issued, never with
/// the configured capacity.
///
/// A generation wraps after 4096 recycles of one index; a handle held across
/// that many despawn/respawn cycles of the same slot can alias again.
pub struct HandleAllocator {
    /// Next never-issued index (starts at 1).
    next_index: u32,
    /// Recycled indices, reused LIFO.
    free_list: Vec<u32>,
    /// Current generation per index, with `FREE_FLAG` while free.
    generations: Vec<u16>,
    /// Capacity limit.
    max_handles: u32,
}

impl HandleAllocator {
    /// Creates an allocator that can hold `max_handles` live handles.
    ///
    /// # Panics
    ///
    /// Panics if `max_handles` is zero or exceeds [`Handle::MAX_INDEX`].
    #[must_use]
    pub fn new(max_handles: u32) -> Self {
        assert!(max_handles > 0, "max_handles must be greater than zero");
        assert!(
            max_handles <= Handle::MAX_INDEX,
            "max_handles cannot exceed {}",
            Handle::MAX_INDEX
        );

        let mut generations = Vec::with_capacity(256);
        // Index 0 is never issued.
        generations.push(FREE_FLAG);

        Self {
            next_index: 1,
            free_list: Vec::with_capacity(256),
            generations,
            max_handles,
        }
    }

    /// Allocates a handle, preferring recycled indices.
    ///
    /// Returns [`Handle::INVALID`] when capacity is exhausted.
    pub fn alloc(&mut self) -> Handle {
        let index = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.generations[index as usize];
            *slot &= !FREE_FLAG;
            index
        } else {
            if self.next_index > self.max_handles {
                return Handle::INVALID;
            }
            let index = self.next_index;
            self.next_index += 1;
            self.generations.push(0);
            index
        };

        Handle::new(index, self.generations[index as usize])
    }

    /// Returns a handle's index to the free list and bumps its generation.
    ///
    /// Returns `false` without side effects for invalid, stale or already
    /// freed handles.
    pub fn free(&mut self, handle: Handle) -> bool {
        if !self.is_alive(handle) {
            return false;
        }

        let index = handle.index();
        let slot = &mut self.generations[index as usize];
        let next = handle.generation().wrapping_add(1) & Handle::MAX_GENERATION;
        *slot = next | FREE_FLAG;
        self.free_list.push(index);
        true
    }

    /// Checks whether a handle is currently allocated. O(1).
    #[inline]
    #[must_use]
    pub fn is_alive(&self, handle: Handle) -> bool {
        if !handle.is_valid() {
            return false;
        }
        self.generations
            .get(handle.index() as usize)
            .is_some_and(|&generation| generation == handle.generation())
    }

    /// Returns the number of currently allocated handles.
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        (self.next_index - 1) as usize - self.free_list.len()
    }

    /// Returns the maximum number of live handles.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.max_handles
    }

    /// Returns the highest index ever issued.
    #[inline]
    #[must_use]
    pub const fn high_water(&self) -> u32 {
        self.next_index - 1
    }
}

/// Shared, serialized access to a world's [`HandleAllocator`].
///
/// Cloning is cheap. Off-tick code (connection handling) keeps a clone to
/// reserve handles and check liveness; the world places reserved handles
/// with [`World::spawn_reserved`](crate::World::spawn_reserved).
#[derive(Clone)]
pub struct HandlePool {
    inner: Arc<Mutex<HandleAllocator>>,
}

impl HandlePool {
    /// Creates a pool with the given capacity.
    ///
    /// # Panics
    ///
    /// Same conditions as [`HandleAllocator::new`].
    #[must_use]
    pub fn new(max_handles: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HandleAllocator::new(max_handles))),
        }
    }

    /// Reserves a handle. Returns [`Handle::INVALID`] when exhausted.
    pub fn reserve(&self) -> Handle {
        self.inner.lock().alloc()
    }

    /// Releases a handle. Only the owning world may do this.
    pub(crate) fn release(&self, handle: Handle) -> bool {
        self.inner.lock().free(handle)
    }

    /// Checks whether a handle is currently allocated.
    #[must_use]
    pub fn is_alive(&self, handle: Handle) -> bool {
        self.inner.lock().is_alive(handle)
    }

    /// Returns the number of allocated handles, including unplaced reservations.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock().active_count()
    }

    /// Returns the maximum number of live handles.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.inner.lock().capacity()
    }
}

impl fmt::Debug for HandlePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allocator = self.inner.lock();
        f.debug_struct("HandlePool")
            .field("active", &allocator.active_count())
            .field("capacity", &allocator.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_packing() {
        let h = Handle::new(12345, 678);
        assert_eq!(h.index(), 12345);
        assert_eq!(h.generation(), 678);
        assert!(h.is_valid());
        assert_eq!(Handle::from_bits(h.to_bits()), h);
    }

    #[test]
    fn test_handle_field_limits() {
        let h = Handle::new(Handle::MAX_INDEX, Handle::MAX_GENERATION);
        assert_eq!(h.index(), Handle::MAX_INDEX);
        assert_eq!(h.generation(), Handle::MAX_GENERATION);
        assert_eq!(h.to_bits(), u32::MAX);
        assert_eq!(std::mem::size_of::<Handle>(), 4);
    }

    #[test]
    fn test_invalid_handle() {
        assert!(!Handle::INVALID.is_valid());
        assert_eq!(Handle::default(), Handle::INVALID);
    }

    #[test]
    fn test_alloc_skips_index_zero() {
        let mut allocator = HandleAllocator::new(8);
        let h = allocator.alloc();
        assert_eq!(h.index(), 1);
        assert_eq!(h.generation(), 0);
        assert!(h.is_valid());
    }

    #[test]
    fn test_recycle_bumps_generation() {
        let mut allocator = HandleAllocator::new(8);
        let h1 = allocator.alloc();
        assert!(allocator.free(h1));
        let h2 = allocator.alloc();

        assert_eq!(h2.index(), h1.index());
        assert_eq!(h2.generation(), h1.generation() + 1);
        assert!(!allocator.is_alive(h1));
        assert!(allocator.is_alive(h2));
    }

    #[test]
    fn test_freed_index_not_alive_under_next_generation() {
        let mut allocator = HandleAllocator::new(8);
        let h1 = allocator.alloc();
        allocator.free(h1);

        // The index is on the free list: a forged next-generation handle must
        // not look alive before the index is actually reissued.
        let forged = Handle::new(h1.index(), h1.generation() + 1);
        assert!(!allocator.is_alive(forged));
    }

    #[test]
    fn test_double_free_rejected() {
        let mut allocator = HandleAllocator::new(8);
        let h = allocator.alloc();
        assert!(allocator.free(h));
        assert!(!allocator.free(h));
        assert_eq!(allocator.active_count(), 0);

        let a = allocator.alloc();
        let b = allocator.alloc();
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn test_exhaustion_returns_invalid() {
        let mut allocator = HandleAllocator::new(2);
        assert!(allocator.alloc().is_valid());
        assert!(allocator.alloc().is_valid());
        assert_eq!(allocator.alloc(), Handle::INVALID);
        assert_eq!(allocator.active_count(), 2);
    }

    #[test]
    fn test_generation_wraps() {
        let mut allocator = HandleAllocator::new(1);
        let mut h = allocator.alloc();
        for _ in 0..=u32::from(Handle::MAX_GENERATION) {
            allocator.free(h);
            h = allocator.alloc();
        }
        assert_eq!(h.generation(), 0);
        assert!(h.is_valid());
    }

    #[test]
    fn test_active_count_and_high_water() {
        let mut allocator = HandleAllocator::new(100);
        let handles: Vec<_> = (0..10).map(|_| allocator.alloc()).collect();
        assert_eq!(allocator.active_count(), 10);
        for h in &handles[..4] {
            allocator.free(*h);
        }
        assert_eq!(allocator.active_count(), 6);
        assert_eq!(allocator.high_water(), 10);
    }

    #[test]
    fn test_pool_shared_across_threads() {
        let pool = HandlePool::new(1000);
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || (0..100).map(|_| pool.reserve()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<Handle> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        assert_eq!(pool.active_count(), 400);

        all.sort_by_key(|h| h.index());
        all.dedup_by_key(|h| h.index());
        assert_eq!(all.len(), 400);
    }
}
