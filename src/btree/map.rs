//! Mutable B-tree map.
//!
//! [`BTreeMap`] owns its nodes exclusively and updates them in place. Each
//! node holds up to [`MAX_ENTRIES`](super::MAX_ENTRIES) sorted entries, so
//! a lookup touches few nodes and scans contiguous memory.
//!
//! - O(log N) get, set and delete
//! - O(1) len
//! - O(1) amortized cursor steps
//!
//! # Examples
//!
//! ```rust
//! use ordered_maps::btree::BTreeMap;
//!
//! let mut map = BTreeMap::new();
//! map.set(3, "three");
//! map.set(1, "one");
//! map.set(2, "two");
//!
//! assert_eq!(map.get(&2), Some(&"two"));
//! let keys: Vec<i32> = map.iter().map(|(key, _)| *key).collect();
//! assert_eq!(keys, vec![1, 2, 3]);
//! ```

use std::fmt;
use std::iter::FusedIterator;

use super::cursor::{RawCursor, RawIter, RawRange};
use super::node::{self, Node, Owned};
use crate::comparator::{Comparator, NaturalOrder};
use crate::ordered_map::{MapCursor, OrderedMap};

// =============================================================================
// BTreeMap Definition
// =============================================================================

/// An ordered map backed by a mutable B-tree.
///
/// Keys are ordered by the comparator `C`, which defaults to the natural
/// order of `K`.
///
/// # Examples
///
/// ```rust
/// use ordered_maps::btree::BTreeMap;
///
/// let mut map = BTreeMap::with_comparator(|left: &i32, right: &i32| right < left);
/// map.extend([(1, 'a'), (2, 'b'), (3, 'c')]);
///
/// assert_eq!(map.first_key_value(), Some((&3, &'c')));
/// assert_eq!(map.delete(&2), Some('b'));
/// assert_eq!(map.len(), 2);
/// ```
pub struct BTreeMap<K, V, C = NaturalOrder> {
    root: Option<Box<Node<K, V, Owned>>>,
    length: usize,
    comparator: C,
}

impl<K: Ord, V> BTreeMap<K, V> {
    /// Creates an empty map ordered by `K`'s natural order.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self::with_comparator(NaturalOrder)
    }
}

impl<K, V, C> BTreeMap<K, V, C> {
    /// Creates an empty map ordered by `comparator`.
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self {
            root: None,
            length: 0,
            comparator,
        }
    }

    /// Returns the comparator ordering this map.
    #[inline]
    #[must_use]
    pub const fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.root = None;
        self.length = 0;
    }

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let entry = self.root.as_deref()?.first_entry()?;
        Some((&entry.key, &entry.value))
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let entry = self.root.as_deref()?.last_entry()?;
        Some((&entry.key, &entry.value))
    }

    /// Returns an iterator over the entries in ascending key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ordered_maps::btree::BTreeMap;
    ///
    /// let map: BTreeMap<i32, i32> = (0..5).map(|key| (key, key * key)).collect();
    /// let squares: Vec<i32> = map.iter().rev().map(|(_, value)| *value).collect();
    /// assert_eq!(squares, vec![16, 9, 4, 1, 0]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: RawIter::new(self.root.as_deref(), self.length),
        }
    }
}

impl<K, V, C: Comparator<K>> BTreeMap<K, V, C> {
    /// Returns a reference to the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let entry = self.root.as_deref()?.lookup(key, &self.comparator)?;
        Some(&entry.value)
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let mut node = self.root.as_deref_mut()?;
        loop {
            let (index, found) = node.search(key, &self.comparator);
            if found {
                return Some(&mut node.entries[index].value);
            }
            node = node.children.get_mut(index)?;
        }
    }

    /// Returns `true` if the map contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    ///
    /// An equivalent key already present keeps its original key object.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        let replaced = node::insert::<K, V, Owned, C>(&mut self.root, key, value, &self.comparator);
        if replaced.is_none() {
            self.length += 1;
        }
        replaced
    }

    /// Removes the entry under `key`, returning its value.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let removed = node::remove::<K, V, Owned, C>(&mut self.root, key, &self.comparator)?;
        self.length -= 1;
        Some(removed.value)
    }

    /// Returns an unpositioned cursor over the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ordered_maps::btree::BTreeMap;
    /// use ordered_maps::ordered_map::MapCursor;
    ///
    /// let map: BTreeMap<i32, ()> = [10, 20, 30].into_iter().map(|key| (key, ())).collect();
    /// let mut cursor = map.cursor();
    /// assert!(cursor.seek_prev(&25));
    /// assert_eq!(cursor.key(), Some(&20));
    /// assert!(cursor.next());
    /// assert_eq!(cursor.key(), Some(&30));
    /// assert!(!cursor.next());
    /// ```
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_, K, V, C> {
        Cursor {
            raw: RawCursor::new(self.root.as_deref()),
            comparator: &self.comparator,
        }
    }

    /// Returns an iterator over the entries whose keys are not less than
    /// `key`, in ascending order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ordered_maps::btree::BTreeMap;
    ///
    /// let map: BTreeMap<i32, ()> = (0..10).map(|key| (key * 10, ())).collect();
    /// let keys: Vec<i32> = map.range_from(&65).map(|(key, _)| *key).collect();
    /// assert_eq!(keys, vec![70, 80, 90]);
    /// ```
    #[must_use]
    pub fn range_from(&self, key: &K) -> Range<'_, K, V> {
        Range {
            raw: RawRange::from_key(self.root.as_deref(), key, &self.comparator),
        }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A bidirectional cursor borrowing a [`BTreeMap`].
pub struct Cursor<'a, K, V, C> {
    raw: RawCursor<&'a Node<K, V, Owned>>,
    comparator: &'a C,
}

impl<K, V, C> Clone for Cursor<'_, K, V, C> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            comparator: self.comparator,
        }
    }
}

impl<K, V, C: Comparator<K>> MapCursor<K, V> for Cursor<'_, K, V, C> {
    fn first(&mut self) -> bool {
        self.raw.first()
    }

    fn last(&mut self) -> bool {
        self.raw.last()
    }

    fn next(&mut self) -> bool {
        self.raw.next()
    }

    fn prev(&mut self) -> bool {
        self.raw.prev()
    }

    fn seek(&mut self, key: &K) -> bool {
        self.raw.seek(key, self.comparator)
    }

    fn seek_prev(&mut self, key: &K) -> bool {
        self.raw.seek_prev(key, self.comparator)
    }

    fn key(&self) -> Option<&K> {
        self.raw.entry().map(|entry| &entry.key)
    }

    fn value(&self) -> Option<&V> {
        self.raw.entry().map(|entry| &entry.value)
    }

    fn is_positioned(&self) -> bool {
        self.raw.is_positioned()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for Cursor<'_, K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Cursor")
            .field("current", &self.raw.entry().map(|entry| (&entry.key, &entry.value)))
            .finish()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Double-ended iterator over the entries of a [`BTreeMap`].
pub struct Iter<'a, K, V> {
    raw: RawIter<'a, K, V, Owned>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.len(), Some(self.raw.len()))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.raw.next_back()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.raw.len()
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

/// Iterator over the entries of a [`BTreeMap`] from a starting key onwards.
pub struct Range<'a, K, V> {
    raw: RawRange<'a, K, V, Owned>,
}

impl<'a, K, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next()
    }
}

impl<K, V> FusedIterator for Range<'_, K, V> {}

// =============================================================================
// OrderedMap Implementation
// =============================================================================

impl<K, V, C: Comparator<K>> OrderedMap<K, V> for BTreeMap<K, V, C> {
    type Cursor<'a>
        = Cursor<'a, K, V, C>
    where
        Self: 'a;

    fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        Self::get(self, key).cloned()
    }

    fn contains_key(&self, key: &K) -> bool {
        Self::contains_key(self, key)
    }

    fn set(&mut self, key: K, value: V) -> Option<V> {
        Self::set(self, key, value)
    }

    fn delete(&mut self, key: &K) -> Option<V> {
        Self::delete(self, key)
    }

    fn len(&self) -> usize {
        self.length
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        Self::cursor(self)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V, C: Default> Default for BTreeMap<K, V, C> {
    #[inline]
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<K: Clone, V: Clone, C: Clone> Clone for BTreeMap<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.as_deref().map(|root| Box::new(root.deep_clone())),
            length: self.length,
            comparator: self.comparator.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for BTreeMap<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, C: Comparator<K>> Extend<(K, V)> for BTreeMap<K, V, C> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<K, V, C: Comparator<K> + Default> FromIterator<(K, V)> for BTreeMap<K, V, C> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, C> IntoIterator for &'a BTreeMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V: PartialEq, C: Comparator<K>> PartialEq for BTreeMap<K, V, C> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && self.iter().zip(other.iter()).all(|((key, value), (other_key, other_value))| {
                self.comparator.equivalent(key, other_key) && value == other_value
            })
    }
}

impl<K, V: Eq, C: Comparator<K>> Eq for BTreeMap<K, V, C> {}
