//! # Component System
//!
//! Components are plain data attached to entities by value. Every component
//! type carries an explicit, build-stable id (0-63) as an associated
//! constant; the registry only confirms at startup that each id is claimed
//! by exactly one type.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::handle::EntityId;
use super::storage::{new_erased_storage, ErasedStorage};
use crate::error::RegistryError;

/// Identifier of a component type, in `0..=63`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u8);

impl ComponentId {
    /// Highest allowed id.
    pub const MAX: u8 = 63;

    /// Number of id slots.
    pub const COUNT: usize = Self::MAX as usize + 1;

    /// Creates a component id.
    ///
    /// # Panics
    ///
    /// Panics if `id > 63`. In a `const` item this is a compile error.
    #[inline]
    #[must_use]
    pub const fn new(id: u8) -> Self {
        assert!(id <= Self::MAX, "component id exceeds maximum (63)");
        Self(id)
    }

    /// Creates a component id, rejecting values above 63.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IdOutOfRange`] if `id > 63`.
    pub const fn try_new(id: u8) -> Result<Self, RegistryError> {
        if id > Self::MAX {
            Err(RegistryError::IdOutOfRange(id))
        } else {
            Ok(Self(id))
        }
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the id as a table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the single-bit mask for this id.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u64 {
        1 << self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of component ids, one bit per id.
///
/// Used both as an entity's composition (archetype key) and as a query's
/// required/excluded filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct ComponentMask(u64);

impl ComponentMask {
    /// The mask with no components.
    pub const EMPTY: Self = Self(0);

    /// Creates a mask from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Creates a mask holding every id in `ids`.
    #[must_use]
    pub const fn from_ids(ids: &[ComponentId]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < ids.len() {
            bits |= ids[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns a copy with `id` added.
    #[inline]
    #[must_use]
    pub const fn with(self, id: ComponentId) -> Self {
        Self(self.0 | id.bit())
    }

    /// Returns a copy with `id` removed.
    #[inline]
    #[must_use]
    pub const fn without(self, id: ComponentId) -> Self {
        Self(self.0 & !id.bit())
    }

    /// Adds `id` to the mask.
    #[inline]
    pub fn set(&mut self, id: ComponentId) {
        self.0 |= id.bit();
    }

    /// Removes `id` from the mask.
    #[inline]
    pub fn clear(&mut self, id: ComponentId) {
        self.0 &= !id.bit();
    }

    /// Checks whether `id` is in the mask.
    #[inline]
    #[must_use]
    pub const fn has(self, id: ComponentId) -> bool {
        self.0 & id.bit() != 0
    }

    /// Checks whether every id in `other` is also in `self`.
    #[inline]
    #[must_use]
    pub const fn has_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Checks whether any id in `other` is also in `self`.
    #[inline]
    #[must_use]
    pub const fn has_any(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Query match: all of `required`, none of `excluded`.
    #[inline]
    #[must_use]
    pub const fn matches(self, required: Self, excluded: Self) -> bool {
        self.has_all(required) && !self.has_any(excluded)
    }

    /// Checks whether the mask is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the number of ids in the mask.
    #[inline]
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates over the ids in ascending order.
    #[inline]
    #[must_use]
    pub fn iter(self) -> MaskIter {
        MaskIter(self.0)
    }
}

impl FromIterator<ComponentId> for ComponentMask {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl IntoIterator for ComponentMask {
    type Item = ComponentId;
    type IntoIter = MaskIter;

    fn into_iter(self) -> MaskIter {
        self.iter()
    }
}

impl fmt::Display for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(ComponentId::get)).finish()
    }
}

/// Iterator over the ids in a [`ComponentMask`].
#[derive(Clone, Debug)]
pub struct MaskIter(u64);

impl Iterator for MaskIter {
    type Item = ComponentId;

    #[inline]
    fn next(&mut self) -> Option<ComponentId> {
        if self.0 == 0 {
            return None;
        }
        // trailing_zeros of a non-zero u64 is at most 63
        let id = self.0.trailing_zeros() as u8;
        self.0 &= self.0 - 1;
        Some(ComponentId(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for MaskIter {}

/// Marker trait for ECS components.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy)]
/// struct Velocity { x: f32, y: f32 }
///
/// impl Component for Velocity {
///     const ID: ComponentId = ComponentId::new(3);
/// }
/// ```
pub trait Component: Send + 'static {
    /// Build-stable identifier for this component type.
    const ID: ComponentId;
}

/// Durable identity of an entity, present on every entity spawned with one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExternalId(pub EntityId);

impl Component for ExternalId {
    const ID: ComponentId = ComponentId::new(0);
}

/// Creates a type-erased storage: `(initial_capacity, sparse_cap)`.
type StorageFactory = fn(usize, usize) -> Box<dyn ErasedStorage>;

#[derive(Clone, Copy)]
struct ComponentInfo {
    type_id: TypeId,
    name: &'static str,
    new_storage: StorageFactory,
}

/// Immutable table binding component ids to types.
///
/// Built once at process start and shared by every world through `Arc`.
pub struct ComponentRegistry {
    entries: [Option<ComponentInfo>; ComponentId::COUNT],
    mask: ComponentMask,
}

impl ComponentRegistry {
    /// Starts a registration phase. [`ExternalId`] is pre-registered at id 0.
    #[must_use]
    pub fn builder() -> ComponentRegistryBuilder {
        let registry = Self {
            entries: [None; ComponentId::COUNT],
            mask: ComponentMask::EMPTY,
        };
        ComponentRegistryBuilder { registry }.register::<ExternalId>()
    }

    /// Resolves the id of a registered component type.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered, or if its id is bound to a
    /// different type. Both are wiring mistakes.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn id_of<T: Component>(&self) -> ComponentId {
        if !self.is_registered::<T>() {
            self.unregistered::<T>();
        }
        T::ID
    }

    /// Checks whether `T` is registered under its id.
    #[inline]
    #[must_use]
    pub fn is_registered<T: Component>(&self) -> bool {
        self.entries[T::ID.index()].is_some_and(|info| info.type_id == TypeId::of::<T>())
    }

    /// Returns the type name bound to `id`.
    #[must_use]
    pub fn name_of(&self, id: ComponentId) -> Option<&'static str> {
        self.entries[id.index()].map(|info| info.name)
    }

    /// Returns the mask of every registered id.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Returns the number of registered types.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.mask.count() as usize
    }

    /// Always `false`: [`ExternalId`] is registered in every registry.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Creates the storage for `id`, if a type is bound to it.
    pub(crate) fn new_storage(
        &self,
        id: usize,
        initial_capacity: usize,
        sparse_cap: usize,
    ) -> Option<Box<dyn ErasedStorage>> {
        self.entries[id].map(|info| (info.new_storage)(initial_capacity, sparse_cap))
    }

    #[cold]
    #[track_caller]
    pub(crate) fn unregistered<T: Component>(&self) -> ! {
        match self.name_of(T::ID) {
            Some(bound) => panic!(
                "component {} uses id {} which is registered to {}",
                type_name::<T>(),
                T::ID,
                bound
            ),
            None => panic!(
                "component {} (id {}) is not registered",
                type_name::<T>(),
                T::ID
            ),
        }
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.mask
                    .iter()
                    .filter_map(|id| self.name_of(id).map(|name| (id.get(), name))),
            )
            .finish()
    }
}

/// Registration phase for a [`ComponentRegistry`].
pub struct ComponentRegistryBuilder {
    registry: ComponentRegistry,
}

impl ComponentRegistryBuilder {
    /// Binds `T` to `T::ID`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is already registered or its id is taken.
    #[must_use]
    #[track_caller]
    pub fn register<T: Component>(self) -> Self {
        match self.try_register::<T>() {
            Ok(builder) => builder,
            Err(err) => panic!("component registration failed: {err}"),
        }
    }

    /// Binds `T` to `T::ID`, reporting conflicts instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] or
    /// [`RegistryError::IdTaken`].
    pub fn try_register<T: Component>(mut self) -> Result<Self, RegistryError> {
        let requested = type_name::<T>();
        if let Some(existing) = self.registry.entries[T::ID.index()] {
            if existing.type_id == TypeId::of::<T>() {
                return Err(RegistryError::AlreadyRegistered(requested));
            }
            return Err(RegistryError::IdTaken {
                id: T::ID.get(),
                existing: existing.name,
                requested,
            });
        }

        self.registry.entries[T::ID.index()] = Some(ComponentInfo {
            type_id: TypeId::of::<T>(),
            name: requested,
            new_storage: new_erased_storage::<T>,
        });
        self.registry.mask.set(T::ID);
        Ok(self)
    }

    /// Finishes registration.
    #[must_use]
    pub fn build(self) -> Arc<ComponentRegistry> {
        Arc::new(self.registry)
    }
}
