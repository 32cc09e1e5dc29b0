//! # Component Storage
//!
//! One sparse set per component type:
//! - `dense` holds values contiguously for iteration
//! - `owners[i]` is the full handle owning `dense[i]`
//! - `sparse[handle.index()]` is the dense slot, or `ABSENT`
//!
//! Removal is swap-remove: the last element fills the hole and its sparse
//! entry is patched, so every operation except sparse growth is O(1).

use std::any::{type_name, Any};
use std::fmt;

use super::component::Component;
use super::handle::Handle;

const ABSENT: u32 = u32::MAX;

/// Sparse-set storage for one component type.
pub struct ComponentStorage<T> {
    dense: Vec<T>,
    owners: Vec<Handle>,
    sparse: Vec<u32>,
    sparse_cap: usize,
}

impl<T> ComponentStorage<T> {
    /// Creates a storage.
    ///
    /// `sparse_cap` bounds the sparse index: handle indices at or above it
    /// cannot be stored.
    #[must_use]
    pub fn new(initial_capacity: usize, sparse_cap: usize) -> Self {
        let sparse_len = initial_capacity.clamp(1, sparse_cap.max(1));
        Self {
            dense: Vec::with_capacity(initial_capacity),
            owners: Vec::with_capacity(initial_capacity),
            sparse: vec![ABSENT; sparse_len],
            sparse_cap,
        }
    }

    #[inline]
    fn slot_of(&self, handle: Handle) -> Option<usize> {
        let slot = *self.sparse.get(handle.index() as usize)?;
        if slot == ABSENT {
            return None;
        }
        let slot = slot as usize;
        (self.owners[slot] == handle).then_some(slot)
    }

    /// Stores `value` for `handle`, replacing any existing value.
    ///
    /// Returns `false` without storing if the index is occupied by a
    /// different generation, or if `handle` is [`Handle::INVALID`].
    ///
    /// # Panics
    ///
    /// Panics if `handle.index()` is at or above the sparse cap.
    pub fn set(&mut self, handle: Handle, value: T) -> bool {
        if !handle.is_valid() {
            return false;
        }
        let index = handle.index() as usize;
        if index >= self.sparse.len() {
            self.grow_sparse(index);
        }

        let slot = self.sparse[index];
        if slot != ABSENT {
            let slot = slot as usize;
            if self.owners[slot] != handle {
                return false;
            }
            self.dense[slot] = value;
            return true;
        }

        // dense length is bounded by the sparse cap, itself <= 2^20
        self.sparse[index] = self.dense.len() as u32;
        self.dense.push(value);
        self.owners.push(handle);
        true
    }

    fn grow_sparse(&mut self, index: usize) {
        assert!(
            index < self.sparse_cap,
            "handle index {index} exceeds storage cap {} for {}",
            self.sparse_cap,
            type_name::<T>()
        );
        let target = (index + 1)
            .next_power_of_two()
            .max(self.sparse.len() * 2)
            .min(self.sparse_cap);
        self.sparse.resize(target, ABSENT);
    }

    /// Returns the value for `handle`, rejecting stale generations.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot_of(handle).map(|slot| &self.dense[slot])
    }

    /// Returns the value for `handle` mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slot_of(handle).map(|slot| &mut self.dense[slot])
    }

    /// Checks whether `handle` has a value here.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.slot_of(handle).is_some()
    }

    /// Runs `f` on the value for `handle` and returns its result.
    pub fn mutate<R>(&mut self, handle: Handle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.get_mut(handle).map(f)
    }

    /// Runs `f` on the value for `handle`. Returns `false` if absent.
    pub fn with_mut(&mut self, handle: Handle, f: impl FnOnce(&mut T)) -> bool {
        self.mutate(handle, f).is_some()
    }

    /// Removes and returns the value for `handle`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slot_of(handle)?;
        self.sparse[handle.index() as usize] = ABSENT;

        let last = self.dense.len() - 1;
        if slot != last {
            let moved = self.owners[last];
            self.sparse[moved.index() as usize] = slot as u32;
        }
        self.owners.swap_remove(slot);
        Some(self.dense.swap_remove(slot))
    }

    /// Iterates over `(owner, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    /// Iterates over `(owner, value)` pairs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> + '_ {
        self.owners.iter().copied().zip(self.dense.iter_mut())
    }

    /// Owners in dense order.
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &[Handle] {
        &self.owners
    }

    /// Owners as raw `u32` bits, for zero-copy export.
    #[inline]
    #[must_use]
    pub fn raw_handles(&self) -> &[u32] {
        bytemuck::cast_slice(&self.owners)
    }

    /// Values in dense order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.dense
    }

    /// Values in dense order, mutably.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.dense
    }

    /// Number of stored values.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Checks whether the storage is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Current length of the sparse index.
    #[inline]
    #[must_use]
    pub fn sparse_len(&self) -> usize {
        self.sparse.len()
    }

    /// Removes every value. The sparse index keeps its length.
    pub fn clear(&mut self) {
        self.dense.clear();
        self.owners.clear();
        self.sparse.fill(ABSENT);
    }
}

impl<T> fmt::Debug for ComponentStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStorage")
            .field("component", &type_name::<T>())
            .field("len", &self.dense.len())
            .field("sparse_len", &self.sparse.len())
            .finish()
    }
}

/// Value-only mutable view of a [`ComponentStorage`] owned by a world.
///
/// Membership (which handles hold a value) is fixed for the lifetime of the
/// view; it changes only through `World::add_component` and
/// `World::remove_component`.
pub struct StorageMut<'a, T> {
    inner: &'a mut ComponentStorage<T>,
}

impl<'a, T> StorageMut<'a, T> {
    pub(crate) fn new(inner: &'a mut ComponentStorage<T>) -> Self {
        Self { inner }
    }

    /// Returns the value for `handle`, rejecting stale generations.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.inner.get(handle)
    }

    /// Returns the value for `handle` mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.inner.get_mut(handle)
    }

    /// Checks whether `handle` has a value here.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.inner.contains(handle)
    }

    /// Runs `f` on the value for `handle` and returns its result.
    pub fn mutate<R>(&mut self, handle: Handle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.mutate(handle, f)
    }

    /// Runs `f` on the value for `handle`. Returns `false` if absent.
    pub fn with_mut(&mut self, handle: Handle, f: impl FnOnce(&mut T)) -> bool {
        self.inner.with_mut(handle, f)
    }

    /// Iterates over `(owner, value)` pairs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> + '_ {
        self.inner.iter_mut()
    }

    /// Owners in dense order.
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &[Handle] {
        self.inner.handles()
    }

    /// Values in dense order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        self.inner.values()
    }

    /// Values in dense order, mutably.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        self.inner.values_mut()
    }

    /// Number of stored values.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks whether the storage is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T> fmt::Debug for StorageMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

/// Type-erased view of a [`ComponentStorage`], used by the world for
/// whole-entity operations that do not know the concrete type.
pub trait ErasedStorage: Send {
    /// Removes the value for `handle`, if any.
    fn remove_handle(&mut self, handle: Handle) -> bool;

    /// Checks whether `handle` has a value.
    fn contains_handle(&self, handle: Handle) -> bool;

    /// Number of stored values.
    fn stored(&self) -> usize;

    /// Removes every value.
    fn clear_all(&mut self);

    /// Name of the stored component type.
    fn component_name(&self) -> &'static str;

    /// Upcast for downcasting to the concrete storage.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete storage.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStorage for ComponentStorage<T> {
    fn remove_handle(&mut self, handle: Handle) -> bool {
        self.remove(handle).is_some()
    }

    fn contains_handle(&self, handle: Handle) -> bool {
        self.contains(handle)
    }

    fn stored(&self) -> usize {
        self.len()
    }

    fn clear_all(&mut self) {
        self.clear();
    }

    fn component_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Storage factory bound into the component registry.
pub(crate) fn new_erased_storage<T: Component>(
    initial_capacity: usize,
    sparse_cap: usize,
) -> Box<dyn ErasedStorage> {
    Box::new(ComponentStorage::<T>::new(initial_capacity, sparse_cap))
}
