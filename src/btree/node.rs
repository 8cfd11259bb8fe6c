//! B-tree nodes and the algorithms shared by both B-tree engines.
//!
//! A node stores up to [`MAX_ENTRIES`] sorted entries and, when internal,
//! one more child than entries. The algorithms here (search, pre-emptive
//! split on insert, predecessor replacement, merge and rotation on delete)
//! are written once over a [`NodeStore`], which decides how children are
//! held:
//!
//! - [`Owned`] keeps children in `Box`es and mutates in place.
//! - [`Shared`] keeps children in `Arc`s. Writes go through
//!   [`Arc::make_mut`], so a node reachable from another snapshot is cloned
//!   before it is touched and published snapshots are never modified.
//!
//! # Invariants
//!
//! - Leaf ⇔ no children; an internal node has `entries.len() + 1` children.
//! - Keys in `children[i]` < `entries[i]` < keys in `children[i + 1]`.
//! - Every non-root node holds at least [`MIN_ENTRIES`] entries.
//! - An empty tree has no root node; a present root holds at least one entry.
//! - All leaves sit at the same depth.

use std::mem;
use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::comparator::Comparator;

// =============================================================================
// Constants
// =============================================================================

/// Minimum degree of the tree.
pub const DEGREE: usize = 32;

/// Maximum number of entries in one node.
pub const MAX_ENTRIES: usize = DEGREE * 2 - 1;

/// Minimum number of entries in a non-root node.
pub const MIN_ENTRIES: usize = MAX_ENTRIES / 2;

const MAX_CHILDREN: usize = MAX_ENTRIES + 1;

/// Index of the entry promoted to the parent when a full node splits.
const MEDIAN: usize = MAX_ENTRIES / 2;

// =============================================================================
// Node Storage
// =============================================================================

/// A key-value pair stored in a node.
#[derive(Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

/// How a node holds its children.
pub(crate) trait NodeStore<K, V>: Sized {
    /// Pointer from a parent to a child node.
    type Pointer;

    fn allocate(node: Node<K, V, Self>) -> Self::Pointer;

    fn get(pointer: &Self::Pointer) -> &Node<K, V, Self>;
}

/// Write access to nodes, possibly by copying them first.
pub(crate) trait NodeStoreMut<K, V>: NodeStore<K, V> {
    fn get_mut(pointer: &mut Self::Pointer) -> &mut Node<K, V, Self>;

    fn into_node(pointer: Self::Pointer) -> Node<K, V, Self>;
}

/// Exclusively owned nodes, mutated in place.
pub(crate) enum Owned {}

/// Reference-counted nodes, copied on write when shared.
pub(crate) enum Shared {}

impl<K, V> NodeStore<K, V> for Owned {
    type Pointer = Box<Node<K, V, Self>>;

    #[inline]
    fn allocate(node: Node<K, V, Self>) -> Self::Pointer {
        Box::new(node)
    }

    #[inline]
    fn get(pointer: &Self::Pointer) -> &Node<K, V, Self> {
        pointer
    }
}

impl<K, V> NodeStoreMut<K, V> for Owned {
    #[inline]
    fn get_mut(pointer: &mut Self::Pointer) -> &mut Node<K, V, Self> {
        pointer
    }

    #[inline]
    fn into_node(pointer: Self::Pointer) -> Node<K, V, Self> {
        *pointer
    }
}

impl<K, V> NodeStore<K, V> for Shared {
    type Pointer = Arc<Node<K, V, Self>>;

    #[inline]
    fn allocate(node: Node<K, V, Self>) -> Self::Pointer {
        Arc::new(node)
    }

    #[inline]
    fn get(pointer: &Self::Pointer) -> &Node<K, V, Self> {
        pointer
    }
}

impl<K: Clone, V: Clone> NodeStoreMut<K, V> for Shared {
    #[inline]
    fn get_mut(pointer: &mut Self::Pointer) -> &mut Node<K, V, Self> {
        Arc::make_mut(pointer)
    }

    #[inline]
    fn into_node(pointer: Self::Pointer) -> Node<K, V, Self> {
        Arc::unwrap_or_clone(pointer)
    }
}

// =============================================================================
// Node Definition
// =============================================================================

pub(crate) struct Node<K, V, S: NodeStore<K, V>> {
    pub(crate) entries: ArrayVec<Entry<K, V>, MAX_ENTRIES>,
    pub(crate) children: ArrayVec<S::Pointer, MAX_CHILDREN>,
}

/// Shallow copy: children are shared with the original.
impl<K: Clone, V: Clone> Clone for Node<K, V, Shared> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            children: self.children.clone(),
        }
    }
}

impl<K: Clone, V: Clone> Node<K, V, Owned> {
    /// Copies the whole subtree.
    pub(crate) fn deep_clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            children: self
                .children
                .iter()
                .map(|child| Box::new(child.deep_clone()))
                .collect(),
        }
    }
}

impl<K, V, S: NodeStore<K, V>> Node<K, V, S> {
    fn new() -> Self {
        Self {
            entries: ArrayVec::new(),
            children: ArrayVec::new(),
        }
    }

    fn leaf(entry: Entry<K, V>) -> Self {
        let mut node = Self::new();
        node.entries.push(entry);
        node
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Binary search using only `less`.
    ///
    /// Returns the index of the equivalent entry and `true`, or the
    /// insertion index (and child to descend into) and `false`.
    pub(crate) fn search<C: Comparator<K>>(&self, key: &K, comparator: &C) -> (usize, bool) {
        let mut low = 0;
        let mut high = self.entries.len();
        while low < high {
            let middle = low + (high - low) / 2;
            if comparator.less(key, &self.entries[middle].key) {
                high = middle;
            } else {
                low = middle + 1;
            }
        }
        if low > 0 && !comparator.less(&self.entries[low - 1].key, key) {
            (low - 1, true)
        } else {
            (low, false)
        }
    }

    /// Looks `key` up in the subtree rooted at this node.
    pub(crate) fn lookup<C: Comparator<K>>(&self, key: &K, comparator: &C) -> Option<&Entry<K, V>> {
        let mut node = self;
        loop {
            let (index, found) = node.search(key, comparator);
            if found {
                return Some(&node.entries[index]);
            }
            node = S::get(node.children.get(index)?);
        }
    }

    /// Returns the smallest entry of the subtree.
    pub(crate) fn first_entry(&self) -> Option<&Entry<K, V>> {
        let mut node = self;
        while let Some(child) = node.children.first() {
            node = S::get(child);
        }
        node.entries.first()
    }

    /// Returns the largest entry of the subtree.
    pub(crate) fn last_entry(&self) -> Option<&Entry<K, V>> {
        let mut node = self;
        while let Some(child) = node.children.last() {
            node = S::get(child);
        }
        node.entries.last()
    }

    /// Splits a full node around its median.
    ///
    /// This node keeps the lower half; the median and a new right sibling
    /// holding the upper half are returned.
    fn split(&mut self) -> (Entry<K, V>, S::Pointer) {
        let mut right = Self::new();
        right.entries.extend(self.entries.drain(MEDIAN + 1..));
        if !self.is_leaf() {
            right.children.extend(self.children.drain(MEDIAN + 1..));
        }
        let median = self.entries.remove(MEDIAN);
        (median, S::allocate(right))
    }
}

impl<K, V, S: NodeStoreMut<K, V>> Node<K, V, S> {
    /// Restores the occupancy of `children[index]` after it fell below
    /// [`MIN_ENTRIES`], by merging it with a sibling or borrowing one entry.
    fn rebalance_child(&mut self, index: usize) {
        let index = index.min(self.entries.len() - 1);
        let left_length = S::get(&self.children[index]).entries.len();
        let right_length = S::get(&self.children[index + 1]).entries.len();
        if left_length + right_length < MAX_ENTRIES {
            self.merge_children(index);
        } else if left_length > right_length {
            self.rotate_right(index);
        } else {
            self.rotate_left(index);
        }
    }

    /// Folds `children[index + 1]` and the separator into `children[index]`.
    fn merge_children(&mut self, index: usize) {
        let separator = self.entries.remove(index);
        let right = S::into_node(self.children.remove(index + 1));
        let left = S::get_mut(&mut self.children[index]);
        left.entries.push(separator);
        left.entries.extend(right.entries);
        left.children.extend(right.children);
    }

    /// Moves the last entry of `children[index]` up through the parent into
    /// `children[index + 1]`.
    fn rotate_right(&mut self, index: usize) {
        let left = S::get_mut(&mut self.children[index]);
        let (Some(entry), child) = (left.entries.pop(), left.children.pop()) else {
            return;
        };
        let separator = mem::replace(&mut self.entries[index], entry);
        let right = S::get_mut(&mut self.children[index + 1]);
        right.entries.insert(0, separator);
        if let Some(child) = child {
            right.children.insert(0, child);
        }
    }

    /// Moves the first entry of `children[index + 1]` up through the parent
    /// into `children[index]`.
    fn rotate_left(&mut self, index: usize) {
        let right = S::get_mut(&mut self.children[index + 1]);
        let Some(entry) = right.entries.pop_at(0) else {
            return;
        };
        let child = right.children.pop_at(0);
        let separator = mem::replace(&mut self.entries[index], entry);
        let left = S::get_mut(&mut self.children[index]);
        left.entries.push(separator);
        if let Some(child) = child {
            left.children.push(child);
        }
    }
}

// =============================================================================
// Tree Operations
// =============================================================================

/// Inserts `key`, or overwrites the entry equivalent to it.
///
/// Returns the replaced value. A full root is split first, growing the tree
/// by one level.
pub(crate) fn insert<K, V, S, C>(
    root: &mut Option<S::Pointer>,
    key: K,
    value: V,
    comparator: &C,
) -> Option<V>
where
    S: NodeStoreMut<K, V>,
    C: Comparator<K>,
{
    let entry = Entry { key, value };
    let Some(pointer) = root.as_mut() else {
        *root = Some(S::allocate(Node::leaf(entry)));
        return None;
    };
    if S::get(pointer).is_full() {
        let mut left = mem::replace(pointer, S::allocate(Node::new()));
        let (median, right) = S::get_mut(&mut left).split();
        let grown = S::get_mut(pointer);
        grown.entries.push(median);
        grown.children.push(left);
        grown.children.push(right);
        #[cfg(feature = "tracing")]
        tracing::trace!("b-tree root split, height grows by one");
    }
    insert_non_full::<K, V, S, C>(pointer, entry, comparator)
}

/// Inserts into a subtree whose root is known not to be full, splitting
/// full children before descending into them.
fn insert_non_full<K, V, S, C>(
    pointer: &mut S::Pointer,
    entry: Entry<K, V>,
    comparator: &C,
) -> Option<V>
where
    S: NodeStoreMut<K, V>,
    C: Comparator<K>,
{
    let node = S::get_mut(pointer);
    let (mut index, found) = node.search(&entry.key, comparator);
    if found {
        return Some(mem::replace(&mut node.entries[index].value, entry.value));
    }
    if node.is_leaf() {
        node.entries.insert(index, entry);
        return None;
    }
    if S::get(&node.children[index]).is_full() {
        let (median, right) = S::get_mut(&mut node.children[index]).split();
        node.entries.insert(index, median);
        node.children.insert(index + 1, right);
        let separator = &node.entries[index].key;
        if comparator.less(separator, &entry.key) {
            index += 1;
        } else if !comparator.less(&entry.key, separator) {
            return Some(mem::replace(&mut node.entries[index].value, entry.value));
        }
    }
    insert_non_full::<K, V, S, C>(&mut node.children[index], entry, comparator)
}

/// Removes the entry equivalent to `key`, returning it.
///
/// An emptied root is replaced by its only child, or by nothing when it was
/// a leaf.
pub(crate) fn remove<K, V, S, C>(
    root: &mut Option<S::Pointer>,
    key: &K,
    comparator: &C,
) -> Option<Entry<K, V>>
where
    S: NodeStoreMut<K, V>,
    C: Comparator<K>,
{
    let pointer = root.as_mut()?;
    let removed = remove_from::<K, V, S, C>(pointer, key, comparator)?;
    let node = S::get_mut(pointer);
    if node.entries.is_empty() {
        *root = node.children.pop();
        #[cfg(feature = "tracing")]
        tracing::trace!(
            empty = root.is_none(),
            "b-tree root collapsed, height shrinks by one"
        );
    }
    Some(removed)
}

fn remove_from<K, V, S, C>(
    pointer: &mut S::Pointer,
    key: &K,
    comparator: &C,
) -> Option<Entry<K, V>>
where
    S: NodeStoreMut<K, V>,
    C: Comparator<K>,
{
    let node = S::get_mut(pointer);
    let (index, found) = node.search(key, comparator);
    if node.is_leaf() {
        return found.then(|| node.entries.remove(index));
    }
    let removed = if found {
        let predecessor = remove_max::<K, V, S>(&mut node.children[index])?;
        mem::replace(&mut node.entries[index], predecessor)
    } else {
        remove_from::<K, V, S, C>(&mut node.children[index], key, comparator)?
    };
    if S::get(&node.children[index]).entries.len() < MIN_ENTRIES {
        node.rebalance_child(index);
    }
    Some(removed)
}

/// Removes the largest entry of a subtree, rebalancing along the right spine.
fn remove_max<K, V, S>(pointer: &mut S::Pointer) -> Option<Entry<K, V>>
where
    S: NodeStoreMut<K, V>,
{
    let node = S::get_mut(pointer);
    if node.is_leaf() {
        return node.entries.pop();
    }
    let last = node.children.len() - 1;
    let entry = remove_max::<K, V, S>(&mut node.children[last])?;
    if S::get(&node.children[last]).entries.len() < MIN_ENTRIES {
        node.rebalance_child(last);
    }
    Some(entry)
}

// =============================================================================
// Invariant Checks
// =============================================================================

/// Walks the whole tree asserting every structural invariant.
///
/// Returns the number of entries.
#[cfg(test)]
pub(crate) fn assert_invariants<K, V, S, C>(root: Option<&Node<K, V, S>>, comparator: &C) -> usize
where
    S: NodeStore<K, V>,
    C: Comparator<K>,
{
    fn walk<K, V, S: NodeStore<K, V>, C: Comparator<K>>(
        node: &Node<K, V, S>,
        is_root: bool,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        comparator: &C,
    ) -> usize {
        assert!(!node.entries.is_empty(), "node without entries");
        if !is_root {
            assert!(node.entries.len() >= MIN_ENTRIES, "underfull node");
        }
        for pair in node.entries.windows(2) {
            assert!(comparator.less(&pair[0].key, &pair[1].key), "unsorted node");
        }
        if node.is_leaf() {
            match *leaf_depth {
                Some(expected) => assert_eq!(expected, depth, "leaves at different depths"),
                None => *leaf_depth = Some(depth),
            }
            return node.entries.len();
        }
        assert_eq!(node.children.len(), node.entries.len() + 1);
        let mut count = node.entries.len();
        for (index, pointer) in node.children.iter().enumerate() {
            let child = S::get(pointer);
            if let (Some(separator), Some(last)) = (node.entries.get(index), child.last_entry()) {
                assert!(comparator.less(&last.key, &separator.key), "child above separator");
            }
            if let (Some(separator), Some(first)) = (
                index.checked_sub(1).and_then(|previous| node.entries.get(previous)),
                child.first_entry(),
            ) {
                assert!(comparator.less(&separator.key, &first.key), "child below separator");
            }
            count += walk(child, false, depth + 1, leaf_depth, comparator);
        }
        count
    }

    root.map_or(0, |node| walk(node, true, 0, &mut None, comparator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::NaturalOrder;
    use rstest::rstest;

    fn build<S: NodeStoreMut<i32, i32>>(keys: impl IntoIterator<Item = i32>) -> Option<S::Pointer> {
        let mut root = None;
        for key in keys {
            insert::<i32, i32, S, _>(&mut root, key, key * 10, &NaturalOrder);
        }
        root
    }

    #[rstest]
    fn test_constants() {
        assert_eq!(MAX_ENTRIES, 63);
        assert_eq!(MIN_ENTRIES, 31);
        assert_eq!(MEDIAN, 31);
    }

    #[rstest]
    fn test_search_found_and_insertion_point() {
        let root = build::<Owned>([10, 20, 30]);
        let node = root.as_deref().unwrap();
        assert_eq!(node.search(&20, &NaturalOrder), (1, true));
        assert_eq!(node.search(&25, &NaturalOrder), (2, false));
        assert_eq!(node.search(&5, &NaturalOrder), (0, false));
        assert_eq!(node.search(&35, &NaturalOrder), (3, false));
    }

    #[rstest]
    fn test_root_split_at_capacity() {
        let root = build::<Owned>(0..=MAX_ENTRIES as i32);
        let node = root.as_deref().unwrap();
        assert_eq!(node.entries.len(), 1);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.entries[0].key, MEDIAN as i32);
        assert_eq!(assert_invariants(Some(node), &NaturalOrder), MAX_ENTRIES + 1);
    }

    #[rstest]
    fn test_overwrite_returns_previous_value() {
        let mut root = build::<Owned>(0..200);
        assert_eq!(insert::<_, _, Owned, _>(&mut root, 150, 0, &NaturalOrder), Some(1500));
        let node = root.as_deref().unwrap();
        assert_eq!(node.lookup(&150, &NaturalOrder).map(|entry| entry.value), Some(0));
        assert_eq!(assert_invariants(Some(node), &NaturalOrder), 200);
    }

    #[rstest]
    #[case::ascending((0..3000).collect())]
    #[case::descending((0..3000).rev().collect())]
    #[case::interleaved((0..3000).map(|key| (key * 7919) % 3000).collect())]
    fn test_invariants_hold_through_inserts_and_removes(#[case] keys: Vec<i32>) {
        let mut root = None;
        for (count, &key) in keys.iter().enumerate() {
            insert::<_, _, Owned, _>(&mut root, key, key, &NaturalOrder);
            if count % 97 == 0 {
                assert_eq!(assert_invariants(root.as_deref(), &NaturalOrder), count + 1);
            }
        }
        for (count, key) in keys.iter().enumerate() {
            let removed = remove::<_, _, Owned, _>(&mut root, key, &NaturalOrder);
            assert_eq!(removed.map(|entry| entry.key), Some(*key));
            if count % 97 == 0 {
                assert_eq!(
                    assert_invariants(root.as_deref(), &NaturalOrder),
                    keys.len() - count - 1
                );
            }
        }
        assert!(root.is_none());
    }

    #[rstest]
    fn test_remove_absent_key() {
        let mut root = build::<Owned>(0..100);
        assert!(remove::<_, _, Owned, _>(&mut root, &1000, &NaturalOrder).is_none());
        assert_eq!(assert_invariants(root.as_deref(), &NaturalOrder), 100);
    }

    #[rstest]
    fn test_remove_from_internal_node_uses_predecessor() {
        let mut root = build::<Owned>(0..=MAX_ENTRIES as i32);
        let removed = remove::<_, _, Owned, _>(&mut root, &(MEDIAN as i32), &NaturalOrder);
        assert_eq!(removed.map(|entry| entry.key), Some(MEDIAN as i32));
        let node = root.as_deref().unwrap();
        assert_eq!(assert_invariants(Some(node), &NaturalOrder), MAX_ENTRIES);
        assert!(node.lookup(&(MEDIAN as i32), &NaturalOrder).is_none());
    }

    #[rstest]
    fn test_shared_writes_leave_previous_root_untouched() {
        let original = build::<Shared>(0..2000);
        let mut updated = original.clone();
        for key in 0..1000 {
            remove::<_, _, Shared, _>(&mut updated, &key, &NaturalOrder);
        }
        insert::<_, _, Shared, _>(&mut updated, 5000, 1, &NaturalOrder);

        assert_eq!(assert_invariants(original.as_deref(), &NaturalOrder), 2000);
        assert_eq!(assert_invariants(updated.as_deref(), &NaturalOrder), 1001);
        let original_node = original.as_deref().unwrap();
        assert_eq!(original_node.lookup(&10, &NaturalOrder).map(|entry| entry.value), Some(100));
        assert!(original_node.lookup(&5000, &NaturalOrder).is_none());
    }

    #[rstest]
    fn test_shared_untouched_subtrees_are_shared() {
        let original = build::<Shared>(0..2000);
        let mut updated = original.clone();
        insert::<_, _, Shared, _>(&mut updated, 0, -1, &NaturalOrder);
        let before = original.as_deref().unwrap();
        let after = updated.as_deref().unwrap();
        assert!(!Arc::ptr_eq(original.as_ref().unwrap(), updated.as_ref().unwrap()));
        assert!(Arc::ptr_eq(before.children.last().unwrap(), after.children.last().unwrap()));
        assert!(!Arc::ptr_eq(&before.children[0], &after.children[0]));
    }
}
