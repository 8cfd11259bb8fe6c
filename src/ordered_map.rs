//! The ordered-map contract shared by every engine.
//!
//! [`OrderedMap`] is the abstract operation set: point lookup,
//! insert-or-overwrite, delete, length and a bidirectional [`MapCursor`].
//! The engines differ in balancing strategy and concurrency model but are
//! interchangeable behind these traits.
//!
//! # Examples
//!
//! ```rust
//! use ordered_maps::prelude::*;
//!
//! fn keys_from<M: OrderedMap<i32, &'static str>>(map: &M, start: i32) -> Vec<i32> {
//!     let mut cursor = map.cursor();
//!     let mut keys = Vec::new();
//!     let mut positioned = cursor.seek(&start);
//!     while positioned {
//!         keys.extend(cursor.key().copied());
//!         positioned = cursor.next();
//!     }
//!     keys
//! }
//!
//! let mut map = AvlTreeMap::new();
//! map.set(3, "three");
//! map.set(1, "one");
//! map.set(2, "two");
//! assert_eq!(keys_from(&map, 2), vec![2, 3]);
//! ```

/// A bidirectional cursor over the entries of an ordered map.
///
/// A freshly created cursor is not positioned. Every movement returns
/// whether the cursor is positioned afterwards; moving past either end
/// leaves it unpositioned. `next` on an unpositioned cursor behaves like
/// `first`, and `prev` like `last`.
pub trait MapCursor<K, V> {
    /// Moves to the smallest entry.
    fn first(&mut self) -> bool;

    /// Moves to the largest entry.
    fn last(&mut self) -> bool;

    /// Moves to the next larger entry.
    fn next(&mut self) -> bool;

    /// Moves to the next smaller entry.
    fn prev(&mut self) -> bool;

    /// Moves to the smallest entry whose key is not less than `key`.
    fn seek(&mut self, key: &K) -> bool;

    /// Moves to the largest entry whose key is not greater than `key`.
    fn seek_prev(&mut self, key: &K) -> bool;

    /// Returns the current key, or `None` if the cursor is not positioned.
    fn key(&self) -> Option<&K>;

    /// Returns the current value, or `None` if the cursor is not positioned.
    fn value(&self) -> Option<&V>;

    /// Returns `true` if the cursor currently points at an entry.
    fn is_positioned(&self) -> bool {
        self.key().is_some()
    }
}

/// An ordered associative container over a caller-supplied order.
///
/// `set` and `delete` take `&mut self` here even for engines that accept
/// writes through a shared reference, so that generic code reads the same
/// against every engine.
pub trait OrderedMap<K, V> {
    /// The cursor type returned by [`OrderedMap::cursor`].
    type Cursor<'a>: MapCursor<K, V>
    where
        Self: 'a;

    /// Returns a copy of the value stored under `key`.
    fn get(&self, key: &K) -> Option<V>
    where
        V: Clone;

    /// Returns `true` if an entry equivalent to `key` is present.
    fn contains_key(&self, key: &K) -> bool;

    /// Inserts `value` under `key`, returning the value it replaced.
    fn set(&mut self, key: K, value: V) -> Option<V>;

    /// Removes the entry under `key`, returning its value.
    ///
    /// Deleting an absent key is a no-op and returns `None`.
    fn delete(&mut self, key: &K) -> Option<V>;

    /// Returns the number of distinct keys.
    fn len(&self) -> usize;

    /// Returns `true` if the map has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an unpositioned cursor over the map.
    fn cursor(&self) -> Self::Cursor<'_>;
}
