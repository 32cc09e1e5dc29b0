//! # Chunk Index
//!
//! Maps spatial chunk keys to the entities inside them, with a reverse
//! entry per entity so moves and removals are O(1) swap-removes.
//!
//! Key layout (64 bits):
//! - bits 48..64: region
//! - bits 40..48: layer
//! - bits 20..40: chunk x (20-bit two's complement)
//! - bits 0..20: chunk y (20-bit two's complement)

use std::collections::HashMap;
use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::handle::Handle;

const COORD_BITS: u32 = 20;
const COORD_MASK: u64 = (1 << COORD_BITS) - 1;

/// Opaque 64-bit spatial chunk key.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize,
    Deserialize,
)]
#[repr(transparent)]
pub struct ChunkKey(pub u64);

/// Unpacked components of a [`ChunkKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    /// Region (shard-level partition).
    pub region: u16,
    /// Vertical layer.
    pub layer: u8,
    /// Chunk column.
    pub x: i32,
    /// Chunk row.
    pub y: i32,
}

impl ChunkKey {
    /// Packs a region, layer and chunk coordinates.
    ///
    /// Coordinates keep their low 20 bits, so the round-trip range is
    /// `-524288..=524287`.
    #[must_use]
    pub const fn pack(region: u16, layer: u8, x: i32, y: i32) -> Self {
        Self(
            ((region as u64) << 48)
                | ((layer as u64) << 40)
                | (((x as u32 as u64) & COORD_MASK) << COORD_BITS)
                | ((y as u32 as u64) & COORD_MASK),
        )
    }

    /// Chunk containing a world position, using floor division so negative
    /// positions land in negative chunks.
    #[must_use]
    pub fn from_world_position(
        region: u16,
        layer: u8,
        world_x: f64,
        world_y: f64,
        chunk_size: f64,
    ) -> Self {
        let x = (world_x / chunk_size).floor() as i32;
        let y = (world_y / chunk_size).floor() as i32;
        Self::pack(region, layer, x, y)
    }

    /// Unpacks the key.
    #[must_use]
    pub const fn unpack(self) -> ChunkCoord {
        ChunkCoord {
            region: (self.0 >> 48) as u16,
            layer: (self.0 >> 40) as u8,
            x: sign_extend(((self.0 >> COORD_BITS) & COORD_MASK) as u32),
            y: sign_extend((self.0 & COORD_MASK) as u32),
        }
    }
}

impl ChunkCoord {
    /// Packs back into a key.
    #[must_use]
    pub const fn key(self) -> ChunkKey {
        ChunkKey::pack(self.region, self.layer, self.x, self.y)
    }
}

const fn sign_extend(raw: u32) -> i32 {
    let shift = 32 - COORD_BITS;
    ((raw << shift) as i32) >> shift
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.unpack();
        write!(f, "r{}/l{}/({}, {})", c.region, c.layer, c.x, c.y)
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    key: ChunkKey,
    position: usize,
}

/// Spatial index: chunk key to entity list, plus entity to its slot.
///
/// An entity is in at most one chunk. Chunks with no entities are removed.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    chunks: HashMap<ChunkKey, Vec<Handle>>,
    slots: HashMap<Handle, Slot>,
}

impl ChunkIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index sized for `entities` members.
    #[must_use]
    pub fn with_capacity(entities: usize) -> Self {
        Self {
            chunks: HashMap::new(),
            slots: HashMap::with_capacity(entities),
        }
    }

    /// Places `handle` in `key`.
    ///
    /// No-op if it is already there; moves it if it is in another chunk.
    pub fn add(&mut self, handle: Handle, key: ChunkKey) {
        self.update_chunk(handle, key);
    }

    /// Removes `handle` from its chunk. Returns `false` if it was not indexed.
    pub fn remove(&mut self, handle: Handle) -> bool {
        let Some(slot) = self.slots.remove(&handle) else {
            return false;
        };

        let mut now_empty = false;
        if let Some(members) = self.chunks.get_mut(&slot.key) {
            members.swap_remove(slot.position);
            if let Some(&moved) = members.get(slot.position) {
                if let Some(moved_slot) = self.slots.get_mut(&moved) {
                    moved_slot.position = slot.position;
                }
            }
            now_empty = members.is_empty();
        }
        if now_empty {
            self.chunks.remove(&slot.key);
        }
        true
    }

    /// Moves `handle` to `key`, adding it if it was not indexed.
    ///
    /// Returns `false` (and does nothing) if it is already in `key`.
    pub fn update_chunk(&mut self, handle: Handle, key: ChunkKey) -> bool {
        if self.chunk_of(handle) == Some(key) {
            return false;
        }
        self.remove(handle);

        let members = self.chunks.entry(key).or_default();
        let position = members.len();
        members.push(handle);
        self.slots.insert(handle, Slot { key, position });
        true
    }

    /// Chunk currently holding `handle`.
    #[inline]
    #[must_use]
    pub fn chunk_of(&self, handle: Handle) -> Option<ChunkKey> {
        self.slots.get(&handle).map(|slot| slot.key)
    }

    /// Checks whether `handle` is indexed.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.contains_key(&handle)
    }

    /// Entities in `key`. Empty for unknown chunks.
    #[must_use]
    pub fn entities_in_chunk(&self, key: ChunkKey) -> &[Handle] {
        self.chunks.get(&key).map_or(&[], Vec::as_slice)
    }

    /// Appends the entities of every chunk in `keys` to `out`.
    pub fn entities_in_chunks_into(
        &self,
        keys: impl IntoIterator<Item = ChunkKey>,
        out: &mut Vec<Handle>,
    ) {
        for key in keys {
            out.extend_from_slice(self.entities_in_chunk(key));
        }
    }

    /// Keys of every non-empty chunk, in unspecified order.
    #[must_use]
    pub fn all_chunk_keys(&self) -> Vec<ChunkKey> {
        self.chunks.keys().copied().collect()
    }

    /// Appends the keys of every non-empty chunk to `out`.
    pub fn all_chunk_keys_into(&self, out: &mut Vec<ChunkKey>) {
        out.extend(self.chunks.keys().copied());
    }

    /// Iterates over `(key, members)` for every non-empty chunk.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkKey, &[Handle])> + '_ {
        self.chunks.iter().map(|(&key, members)| (key, members.as_slice()))
    }

    /// Number of non-empty chunks.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of indexed entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.slots.len()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(index: u32) -> Handle {
        Handle::new(index, 0)
    }

    #[test]
    fn test_pack_layout() {
        let key = ChunkKey::pack(1, 2, 3, 4);
        assert_eq!(key.0, (1 << 48) | (2 << 40) | (3 << 20) | 4);
    }

    #[test]
    fn test_unpack_negative_coords() {
        let key = ChunkKey::pack(7, 1, -1, -524_288);
        let coord = key.unpack();
        assert_eq!(coord.region, 7);
        assert_eq!(coord.layer, 1);
        assert_eq!(coord.x, -1);
        assert_eq!(coord.y, -524_288);
        assert_eq!(coord.key(), key);
    }

    #[test]
    fn test_from_world_position_floors() {
        let size = 1536.0;
        let cases = [
            (0.0, 0, 0),
            (1535.9, 0, 0),
            (1536.0, 1, 1),
            (-1.0, -1, -1),
            (-1536.0, -1, -1),
            (-1537.0, -2, -2),
        ];
        for (pos, cx, cy) in cases {
            let coord = ChunkKey::from_world_position(0, 0, pos, pos, size).unpack();
            assert_eq!((coord.x, coord.y), (cx, cy), "position {pos}");
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let mut index = ChunkIndex::new();
        let k = ChunkKey::pack(0, 0, 1, 1);
        index.add(h(1), k);
        index.add(h(2), k);
        assert_eq!(index.entities_in_chunk(k), &[h(1), h(2)]);
        assert_eq!(index.chunk_of(h(1)), Some(k));
        assert_eq!(index.entity_count(), 2);
        assert_eq!(index.chunk_count(), 1);
    }

    #[test]
    fn test_add_same_chunk_no_duplicate() {
        let mut index = ChunkIndex::new();
        let k = ChunkKey::pack(0, 0, 1, 1);
        index.add(h(1), k);
        index.add(h(1), k);
        assert_eq!(index.entities_in_chunk(k), &[h(1)]);
    }

    #[test]
    fn test_move_between_chunks() {
        let mut index = ChunkIndex::new();
        let a = ChunkKey::pack(0, 0, 0, 0);
        let b = ChunkKey::pack(0, 0, 0, 1);
        index.add(h(1), a);
        assert!(index.update_chunk(h(1), b));
        assert!(!index.update_chunk(h(1), b));

        assert!(index.entities_in_chunk(a).is_empty());
        assert_eq!(index.entities_in_chunk(b), &[h(1)]);
        assert_eq!(index.chunk_count(), 1);
    }

    #[test]
    fn test_remove_patches_moved_member() {
        let mut index = ChunkIndex::new();
        let k = ChunkKey::pack(0, 0, 2, 2);
        index.add(h(1), k);
        index.add(h(2), k);
        index.add(h(3), k);

        assert!(index.remove(h(1)));
        assert_eq!(index.entities_in_chunk(k), &[h(3), h(2)]);

        // h(3) now sits at position 0; removing it must patch h(2)
        assert!(index.remove(h(3)));
        assert_eq!(index.entities_in_chunk(k), &[h(2)]);
        assert!(index.remove(h(2)));
        assert_eq!(index.chunk_count(), 0);
        assert!(!index.remove(h(2)));
    }

    #[test]
    fn test_stale_handle_is_distinct() {
        let mut index = ChunkIndex::new();
        let k = ChunkKey::pack(0, 0, 0, 0);
        index.add(Handle::new(5, 0), k);
        assert!(!index.contains(Handle::new(5, 1)));
        assert!(!index.remove(Handle::new(5, 1)));
    }

    #[test]
    fn test_multi_chunk_gather() {
        let mut index = ChunkIndex::with_capacity(8);
        let a = ChunkKey::pack(0, 0, 0, 0);
        let b = ChunkKey::pack(0, 0, 1, 0);
        let c = ChunkKey::pack(0, 0, 2, 0);
        index.add(h(1), a);
        index.add(h(2), b);
        index.add(h(3), c);

        let mut out = vec![h(99)];
        index.entities_in_chunks_into([a, c, ChunkKey::pack(9, 9, 9, 9)], &mut out);
        assert_eq!(out, vec![h(99), h(1), h(3)]);

        let mut keys = index.all_chunk_keys();
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
        assert_eq!(index.iter().count(), 3);
    }

    #[test]
    fn test_clear() {
        let mut index = ChunkIndex::new();
        index.add(h(1), ChunkKey::pack(0, 0, 0, 0));
        index.clear();
        assert_eq!(index.entity_count(), 0);
        assert_eq!(index.chunk_count(), 0);
        let mut keys = Vec::new();
        index.all_chunk_keys_into(&mut keys);
        assert!(keys.is_empty());
    }
}
