//! Persistent, concurrently readable B-tree map.
//!
//! [`PersistentBTreeMap`] runs the same B-tree algorithms as
//! [`BTreeMap`](super::BTreeMap), but its nodes are reference-counted and
//! never modified once published. A writer copies every node on its path
//! from the root to the change, builds a new root and publishes it with one
//! atomic swap. Readers load whichever root is current and never block.
//!
//! - Any number of readers, lock-free.
//! - One writer at a time per map handle.
//! - O(1) `clone`: both handles share every node until one of them writes.
//!
//! # Examples
//!
//! ```rust
//! use ordered_maps::btree::PersistentBTreeMap;
//!
//! let map = PersistentBTreeMap::new();
//! for key in 0..100 {
//!     map.set(key, key * 10);
//! }
//!
//! let before = map.snapshot();
//! let fork = map.clone();
//! map.set(5, -1);
//!
//! assert_eq!(map.get(&5), Some(-1));
//! assert_eq!(fork.get(&5), Some(50));
//! assert_eq!(before.get(&5), Some(&50));
//! ```

use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use super::cursor::{RawCursor, RawRange};
use super::node::{self, Node, Shared};
use crate::comparator::{Comparator, NaturalOrder};
use crate::ordered_map::{MapCursor, OrderedMap};

type SharedNode<K, V> = Node<K, V, Shared>;

// =============================================================================
// PersistentBTreeMap Definition
// =============================================================================

/// A copy-on-write B-tree map safe to read from many threads at once.
///
/// Writes take `&self` and serialize on an internal lock; reads never
/// lock. Keys and values must be `Clone` to be written, since a node shared
/// with a snapshot is copied before it is changed.
///
/// `len` is kept next to the root rather than inside it, so while a write
/// is in flight a reader may briefly see the new length with the old root.
pub struct PersistentBTreeMap<K, V, C = NaturalOrder> {
    root: ArcSwapOption<SharedNode<K, V>>,
    length: AtomicUsize,
    writer: Mutex<()>,
    comparator: Arc<C>,
}

static_assertions::assert_impl_all!(PersistentBTreeMap<i32, String>: Send, Sync);
static_assertions::assert_impl_all!(Snapshot<i32, String>: Send, Sync);
static_assertions::assert_impl_all!(SnapshotCursor<i32, String>: Send, Sync);

impl<K: Ord, V> PersistentBTreeMap<K, V> {
    /// Creates an empty map ordered by `K`'s natural order.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(NaturalOrder)
    }
}

impl<K, V, C> PersistentBTreeMap<K, V, C> {
    /// Creates an empty map ordered by `comparator`.
    #[must_use]
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            root: ArcSwapOption::empty(),
            length: AtomicUsize::new(0),
            writer: Mutex::new(()),
            comparator: Arc::new(comparator),
        }
    }

    /// Returns the comparator ordering this map.
    #[inline]
    #[must_use]
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.length.load(Ordering::Acquire)
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pins the current root as an immutable view.
    ///
    /// The snapshot is unaffected by any later write to this map.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<K, V, C> {
        Snapshot {
            root: self.root.load_full(),
            comparator: Arc::clone(&self.comparator),
        }
    }

    /// Returns an unpositioned cursor over a snapshot of the current state.
    #[must_use]
    pub fn cursor(&self) -> SnapshotCursor<K, V, C> {
        self.snapshot().into_cursor()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let _guard = self.writer.lock();
        self.length.store(0, Ordering::Release);
        self.root.store(None);
    }

    fn publish(&self, root: Option<Arc<SharedNode<K, V>>>) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            length = self.length.load(Ordering::Relaxed),
            "persistent b-tree root published"
        );
        self.root.store(root);
    }
}

impl<K: Clone, V: Clone, C> PersistentBTreeMap<K, V, C> {
    /// Returns an iterator over a snapshot of the current entries.
    ///
    /// Entries are yielded as owned copies.
    #[must_use]
    pub fn iter(&self) -> Entries<K, V> {
        Entries {
            cursor: RawCursor::new(self.root.load_full()),
            started: false,
        }
    }

    /// Returns a copy of the entry with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(K, V)> {
        let root = self.root.load();
        let entry = root.as_deref()?.first_entry()?;
        Some((entry.key.clone(), entry.value.clone()))
    }

    /// Returns a copy of the entry with the largest key.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(K, V)> {
        let root = self.root.load();
        let entry = root.as_deref()?.last_entry()?;
        Some((entry.key.clone(), entry.value.clone()))
    }
}

impl<K, V, C: Comparator<K>> PersistentBTreeMap<K, V, C> {
    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let root = self.root.load();
        let entry = root.as_deref()?.lookup(key, &*self.comparator)?;
        Some(entry.value.clone())
    }

    /// Returns `true` if the map contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        let root = self.root.load();
        root.as_deref()
            .and_then(|node| node.lookup(key, &*self.comparator))
            .is_some()
    }
}

impl<K: Clone, V: Clone, C: Comparator<K>> PersistentBTreeMap<K, V, C> {
    /// Inserts `value` under `key`, returning the value it replaced.
    ///
    /// The new root is published only after the whole update succeeded; a
    /// panicking comparator leaves the map unchanged.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let _guard = self.writer.lock();
        let mut root = self.root.load_full();
        let replaced = node::insert::<K, V, Shared, C>(&mut root, key, value, &*self.comparator);
        if replaced.is_none() {
            self.length.fetch_add(1, Ordering::AcqRel);
        }
        self.publish(root);
        replaced
    }

    /// Removes the entry under `key`, returning its value.
    ///
    /// Nothing is copied or published when `key` is absent.
    pub fn delete(&self, key: &K) -> Option<V> {
        let _guard = self.writer.lock();
        let mut root = self.root.load_full();
        root.as_deref()?.lookup(key, &*self.comparator)?;
        let removed = node::remove::<K, V, Shared, C>(&mut root, key, &*self.comparator)?;
        self.length.fetch_sub(1, Ordering::AcqRel);
        self.publish(root);
        Some(removed.value)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable view of a [`PersistentBTreeMap`] at one point in time.
///
/// Snapshots are cheap to take and to clone, and can be sent to other
/// threads. They keep the nodes they reference alive.
pub struct Snapshot<K, V, C = NaturalOrder> {
    root: Option<Arc<SharedNode<K, V>>>,
    comparator: Arc<C>,
}

impl<K, V, C> Snapshot<K, V, C> {
    /// Returns `true` if the snapshot contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
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
    #[must_use]
    pub fn iter(&self) -> SnapshotIter<'_, K, V> {
        SnapshotIter {
            raw: RawRange::from_first(self.root.as_deref()),
        }
    }

    /// Returns an unpositioned cursor over this snapshot.
    #[must_use]
    pub fn cursor(&self) -> SnapshotCursor<K, V, C> {
        self.clone().into_cursor()
    }

    /// Turns this snapshot into an unpositioned cursor.
    #[must_use]
    pub fn into_cursor(self) -> SnapshotCursor<K, V, C> {
        SnapshotCursor {
            raw: RawCursor::new(self.root),
            comparator: self.comparator,
        }
    }
}

impl<K, V, C: Comparator<K>> Snapshot<K, V, C> {
    /// Returns a reference to the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let entry = self.root.as_deref()?.lookup(key, &*self.comparator)?;
        Some(&entry.value)
    }

    /// Returns `true` if the snapshot contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K, V, C> Clone for Snapshot<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            comparator: Arc::clone(&self.comparator),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for Snapshot<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, C> IntoIterator for &'a Snapshot<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = SnapshotIter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A bidirectional cursor that owns the snapshot it walks.
///
/// The cursor stays valid however the map changes afterwards.
pub struct SnapshotCursor<K, V, C = NaturalOrder> {
    raw: RawCursor<Arc<SharedNode<K, V>>>,
    comparator: Arc<C>,
}

impl<K, V, C> Clone for SnapshotCursor<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            comparator: Arc::clone(&self.comparator),
        }
    }
}

impl<K, V, C: Comparator<K>> MapCursor<K, V> for SnapshotCursor<K, V, C> {
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
        self.raw.seek(key, &*self.comparator)
    }

    fn seek_prev(&mut self, key: &K) -> bool {
        self.raw.seek_prev(key, &*self.comparator)
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

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for SnapshotCursor<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SnapshotCursor")
            .field("current", &self.raw.entry().map(|entry| (&entry.key, &entry.value)))
            .finish()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Iterator over the entries of a [`Snapshot`], in ascending key order.
pub struct SnapshotIter<'a, K, V> {
    raw: RawRange<'a, K, V, Shared>,
}

impl<'a, K, V> Iterator for SnapshotIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next()
    }
}

impl<K, V> FusedIterator for SnapshotIter<'_, K, V> {}

/// Owning iterator over a pinned state of a [`PersistentBTreeMap`].
pub struct Entries<K, V> {
    cursor: RawCursor<Arc<SharedNode<K, V>>>,
    started: bool,
}

impl<K: Clone, V: Clone> Iterator for Entries<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.started {
            if !self.cursor.is_positioned() {
                return None;
            }
            self.cursor.next();
        } else {
            self.started = true;
            self.cursor.first();
        }
        self.cursor
            .entry()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
    }
}

impl<K: Clone, V: Clone> FusedIterator for Entries<K, V> {}

// =============================================================================
// OrderedMap Implementation
// =============================================================================

impl<K: Clone, V: Clone, C: Comparator<K>> OrderedMap<K, V> for PersistentBTreeMap<K, V, C> {
    type Cursor<'a>
        = SnapshotCursor<K, V, C>
    where
        Self: 'a;

    fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        Self::get(self, key)
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
        Self::len(self)
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        Self::cursor(self)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

/// Returns a second handle sharing every node with this one.
///
/// The handles have independent roots and writer locks: a write to one is
/// never visible through the other.
impl<K, V, C> Clone for PersistentBTreeMap<K, V, C> {
    fn clone(&self) -> Self {
        let _guard = self.writer.lock();
        let length = self.length.load(Ordering::Acquire);
        #[cfg(feature = "tracing")]
        tracing::debug!(length, "persistent b-tree cloned");
        Self {
            root: ArcSwapOption::new(self.root.load_full()),
            length: AtomicUsize::new(length),
            writer: Mutex::new(()),
            comparator: Arc::clone(&self.comparator),
        }
    }
}

impl<K, V, C: Default> Default for PersistentBTreeMap<K, V, C> {
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for PersistentBTreeMap<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.snapshot(), formatter)
    }
}

impl<K: Clone, V: Clone, C: Comparator<K>> Extend<(K, V)> for PersistentBTreeMap<K, V, C> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<K: Clone, V: Clone, C: Comparator<K> + Default> FromIterator<(K, V)>
    for PersistentBTreeMap<K, V, C>
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::assert_invariants;
    use rstest::rstest;
    use std::panic::{self, AssertUnwindSafe};

    fn filled(count: i32) -> PersistentBTreeMap<i32, i32> {
        (0..count).map(|key| (key, key)).collect()
    }

    #[rstest]
    fn test_clone_diverges_without_affecting_original() {
        let map = filled(1000);
        let fork = map.clone();
        for key in 0..100 {
            assert_eq!(map.set(key, key + 1000), Some(key));
        }
        for key in 0..100 {
            assert_eq!(map.get(&key), Some(key + 1000));
            assert_eq!(fork.get(&key), Some(key));
        }
        assert_eq!(map.len(), 1000);
        assert_eq!(fork.len(), 1000);
    }

    #[rstest]
    fn test_snapshot_is_stable_across_writes() {
        let map = filled(500);
        let snapshot = map.snapshot();
        for key in 0..500 {
            map.delete(&key);
        }
        map.set(10_000, 1);
        assert!(map.get(&0).is_none());
        assert_eq!(snapshot.get(&0), Some(&0));
        assert!(!snapshot.contains_key(&10_000));
        assert_eq!(snapshot.iter().count(), 500);
        assert_eq!(assert_invariants(snapshot.root.as_deref(), &NaturalOrder), 500);
    }

    #[rstest]
    fn test_cursor_pins_state_at_creation() {
        let map = filled(200);
        let mut cursor = map.cursor();
        map.clear();
        assert!(map.is_empty());
        assert!(cursor.last());
        assert_eq!(cursor.key(), Some(&199));
        assert!(cursor.seek(&150));
        assert_eq!(cursor.value(), Some(&150));
    }

    #[rstest]
    fn test_delete_absent_key_publishes_nothing() {
        let map = filled(100);
        let before = map.root.load_full();
        assert_eq!(map.delete(&1000), None);
        let after = map.root.load_full();
        assert!(matches!(
            (before, after),
            (Some(before), Some(after)) if Arc::ptr_eq(&before, &after)
        ));
        assert_eq!(map.len(), 100);
    }

    fn same_root<K, V>(left: &Option<Arc<SharedNode<K, V>>>, right: &Option<Arc<SharedNode<K, V>>>) -> bool {
        match (left, right) {
            (Some(left), Some(right)) => Arc::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        }
    }

    /// A map whose comparator panics once `fuse` counts down to zero.
    fn fused(count: i32) -> (PersistentBTreeMap<i32, i32, impl Comparator<i32>>, Arc<AtomicUsize>) {
        let fuse = Arc::new(AtomicUsize::new(usize::MAX));
        let countdown = Arc::clone(&fuse);
        let map = PersistentBTreeMap::with_comparator(move |left: &i32, right: &i32| {
            if countdown.fetch_sub(1, Ordering::SeqCst) == 1 {
                panic!("comparator failed");
            }
            left < right
        });
        for key in 0..count {
            map.set(key * 2, key);
        }
        (map, fuse)
    }

    #[rstest]
    #[case::new_key(1001, None)]
    #[case::existing_key(500, Some(250))]
    #[case::new_maximum(5000, None)]
    fn test_panicking_comparator_in_set_publishes_nothing(#[case] key: i32, #[case] previous: Option<i32>) {
        let (map, fuse) = fused(1000);
        let rehearsal = map.clone();
        fuse.store(usize::MAX, Ordering::SeqCst);
        assert_eq!(rehearsal.set(key, -1), previous);
        let comparisons = usize::MAX - fuse.load(Ordering::SeqCst);
        assert!(comparisons > 1);

        let snapshot = map.snapshot();
        let contents: Vec<(i32, i32)> = snapshot.iter().map(|(key, value)| (*key, *value)).collect();
        for budget in 1..=comparisons {
            let root = map.root.load_full();
            fuse.store(budget, Ordering::SeqCst);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| map.set(key, -1)));
            fuse.store(usize::MAX, Ordering::SeqCst);

            assert!(outcome.is_err(), "comparison {budget} should panic");
            assert!(same_root(&root, &map.root.load_full()));
            assert_eq!(map.len(), 1000);
            assert_eq!(map.get(&key), previous);
        }
        let after: Vec<(i32, i32)> = snapshot.iter().map(|(key, value)| (*key, *value)).collect();
        assert_eq!(after, contents);
        assert_eq!(map.iter().collect::<Vec<_>>(), contents);

        assert_eq!(map.set(key, -1), previous);
        assert_eq!(map.get(&key), Some(-1));
    }

    #[rstest]
    fn test_panicking_comparator_in_delete_publishes_nothing() {
        let (map, fuse) = fused(1000);
        let rehearsal = map.clone();
        fuse.store(usize::MAX, Ordering::SeqCst);
        assert_eq!(rehearsal.delete(&500), Some(250));
        let comparisons = usize::MAX - fuse.load(Ordering::SeqCst);

        let snapshot = map.snapshot();
        for budget in 1..=comparisons {
            let root = map.root.load_full();
            fuse.store(budget, Ordering::SeqCst);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| map.delete(&500)));
            fuse.store(usize::MAX, Ordering::SeqCst);

            assert!(outcome.is_err(), "comparison {budget} should panic");
            assert!(same_root(&root, &map.root.load_full()));
            assert_eq!(map.len(), 1000);
        }
        assert_eq!(snapshot.get(&500), Some(&250));
        assert_eq!(snapshot.iter().count(), 1000);

        assert_eq!(map.delete(&500), Some(250));
        assert_eq!(map.len(), 999);
        assert_eq!(snapshot.get(&500), Some(&250));
    }

    #[rstest]
    fn test_published_roots_stay_valid_b_trees() {
        let map = PersistentBTreeMap::new();
        let mut snapshots = Vec::new();
        for step in 0..5000_i32 {
            let key = (step * 131) % 1009;
            if step % 4 == 0 {
                map.delete(&key);
            } else {
                map.set(key, step);
            }
            if step % 500 == 0 {
                snapshots.push((map.snapshot(), map.len()));
            }
        }
        for (snapshot, length) in &snapshots {
            assert_eq!(assert_invariants(snapshot.root.as_deref(), &NaturalOrder), *length);
        }
    }

    #[rstest]
    fn test_entries_iterates_owned_copies() {
        let map = filled(5);
        let entries: Vec<(i32, i32)> = map.iter().collect();
        assert_eq!(entries, vec![(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
        assert_eq!(map.first_key_value(), Some((0, 0)));
        assert_eq!(map.last_key_value(), Some((4, 4)));
    }

    #[rstest]
    fn test_empty_map_views() {
        let map: PersistentBTreeMap<i32, i32> = PersistentBTreeMap::new();
        let snapshot = map.snapshot();
        assert!(snapshot.is_empty());
        assert!(snapshot.iter().next().is_none());
        assert!(map.iter().next().is_none());
        assert!(!map.cursor().first());
        assert_eq!(format!("{map:?}"), "{}");
    }
}
