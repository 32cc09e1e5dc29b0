//! # Resources
//!
//! World-scoped singletons keyed by type. Mandatory resources are fetched
//! with [`Resources::get`], which panics when missing; optional ones with
//! [`Resources::try_get`].

use std::any::{type_name, Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Type-keyed singleton map.
#[derive(Default)]
pub struct Resources {
    map: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Resources {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any existing value of the same type, and
    /// returns a reference to the stored value.
    pub fn insert<T: Send + 'static>(&mut self, value: T) -> &mut T {
        let slot = match self.map.entry(TypeId::of::<T>()) {
            Entry::Occupied(mut entry) => {
                entry.insert(Box::new(value));
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(Box::new(value)),
        };
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("resource slot keyed by TypeId holds another type"),
        }
    }

    /// Stores `value` and returns the previous value, if any.
    pub fn replace<T: Send + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Returns a mandatory resource.
    ///
    /// # Panics
    ///
    /// Panics if no `T` is stored.
    #[must_use]
    #[track_caller]
    pub fn get<T: Send + 'static>(&self) -> &T {
        match self.try_get::<T>() {
            Some(value) => value,
            None => missing::<T>(),
        }
    }

    /// Returns a mandatory resource mutably.
    ///
    /// # Panics
    ///
    /// Panics if no `T` is stored.
    #[track_caller]
    pub fn get_mut<T: Send + 'static>(&mut self) -> &mut T {
        match self.try_get_mut::<T>() {
            Some(value) => value,
            None => missing::<T>(),
        }
    }

    /// Returns an optional resource.
    #[must_use]
    pub fn try_get<T: Send + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns an optional resource mutably.
    pub fn try_get_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Checks whether a `T` is stored.
    #[must_use]
    pub fn contains<T: Send + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the stored `T`.
    pub fn remove<T: Send + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Number of stored resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Checks whether no resource is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cold]
#[track_caller]
fn missing<T>() -> ! {
    panic!("mandatory resource {} is not initialized", type_name::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TickRate(u32);

    #[derive(Debug, PartialEq)]
    struct Seed(u64);

    #[test]
    fn test_insert_and_get() {
        let mut resources = Resources::new();
        resources.insert(TickRate(20)).0 += 1;
        assert_eq!(resources.get::<TickRate>(), &TickRate(21));
        assert!(resources.contains::<TickRate>());
        assert!(!resources.contains::<Seed>());
    }

    #[test]
    fn test_insert_overwrites() {
        let mut resources = Resources::new();
        resources.insert(TickRate(20));
        resources.insert(TickRate(30));
        assert_eq!(resources.len(), 1);
        assert_eq!(resources.get::<TickRate>().0, 30);
    }

    #[test]
    fn test_replace_returns_previous() {
        let mut resources = Resources::new();
        assert_eq!(resources.replace(Seed(1)), None);
        assert_eq!(resources.replace(Seed(2)), Some(Seed(1)));
    }

    #[test]
    fn test_try_get_missing() {
        let mut resources = Resources::new();
        assert!(resources.try_get::<Seed>().is_none());
        assert!(resources.try_get_mut::<Seed>().is_none());
        assert!(resources.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut resources = Resources::new();
        resources.insert(Seed(7));
        assert_eq!(resources.remove::<Seed>().map(|s| s.0), Some(7));
        assert_eq!(resources.remove::<Seed>(), None);
    }

    #[test]
    fn test_get_mut() {
        let mut resources = Resources::new();
        resources.insert(TickRate(1));
        resources.get_mut::<TickRate>().0 = 60;
        assert_eq!(resources.get::<TickRate>().0, 60);
    }

    #[test]
    #[should_panic(expected = "is not initialized")]
    fn test_missing_mandatory_panics() {
        let resources = Resources::new();
        let _ = resources.get::<TickRate>();
    }
}
