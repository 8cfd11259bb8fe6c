//! AVL tree map with stable node handles.
//!
//! [`AvlTreeMap`] is a height-balanced binary search tree. Nodes live in an
//! arena and link to their parent by index, so stepping to the next or
//! previous entry is a short pointer chase rather than a search from the
//! root.
//!
//! Besides the [`OrderedMap`] operations the map exposes its nodes through
//! [`NodeRef`] handles: [`insert`](AvlTreeMap::insert) returns one, the
//! bound queries return them, and [`erase`](AvlTreeMap::erase) removes the
//! node a handle names in O(log N) without searching for its key.
//!
//! # Balance
//!
//! For every node the heights of its two subtrees differ by at most one,
//! with `height(empty) = 0`. Heights are stored in a `u8`; a tree tall
//! enough to overflow it would need more than 2^170 nodes.
//!
//! # Examples
//!
//! ```rust
//! use ordered_maps::avl::AvlTreeMap;
//!
//! let mut map = AvlTreeMap::new();
//! let seven = map.insert(7, "seven");
//! map.insert(3, "three");
//! map.insert(9, "nine");
//!
//! let next = map.next_node(seven).and_then(|node| map.entry(node));
//! assert_eq!(next, Some((&9, &"nine")));
//!
//! assert_eq!(map.erase(seven), (7, "seven"));
//! assert_eq!(map.len(), 2);
//! ```

use std::cmp::max;
use std::fmt;
use std::iter::FusedIterator;
use std::mem;

use crate::arena::{Arena, NodeIndex, NodeRef};
use crate::comparator::{Comparator, NaturalOrder};
use crate::error::NodeError;
use crate::ordered_map::{MapCursor, OrderedMap};

// =============================================================================
// Node Definition
// =============================================================================

#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    height: u8,
    left: Option<NodeIndex>,
    right: Option<NodeIndex>,
    parent: Option<NodeIndex>,
}

type Nodes<K, V> = Arena<Node<K, V>>;

fn leftmost<K, V>(nodes: &Nodes<K, V>, mut index: NodeIndex) -> NodeIndex {
    while let Some(left) = nodes[index].left {
        index = left;
    }
    index
}

fn rightmost<K, V>(nodes: &Nodes<K, V>, mut index: NodeIndex) -> NodeIndex {
    while let Some(right) = nodes[index].right {
        index = right;
    }
    index
}

fn successor<K, V>(nodes: &Nodes<K, V>, index: NodeIndex) -> Option<NodeIndex> {
    if let Some(right) = nodes[index].right {
        return Some(leftmost(nodes, right));
    }
    let mut child = index;
    let mut parent = nodes[index].parent;
    while let Some(current) = parent {
        if nodes[current].left == Some(child) {
            return Some(current);
        }
        child = current;
        parent = nodes[current].parent;
    }
    None
}

fn predecessor<K, V>(nodes: &Nodes<K, V>, index: NodeIndex) -> Option<NodeIndex> {
    if let Some(left) = nodes[index].left {
        return Some(rightmost(nodes, left));
    }
    let mut child = index;
    let mut parent = nodes[index].parent;
    while let Some(current) = parent {
        if nodes[current].right == Some(child) {
            return Some(current);
        }
        child = current;
        parent = nodes[current].parent;
    }
    None
}

// =============================================================================
// AvlTreeMap Definition
// =============================================================================

/// An ordered map backed by an AVL tree.
///
/// # Examples
///
/// ```rust
/// use ordered_maps::avl::AvlTreeMap;
///
/// let mut map: AvlTreeMap<i32, char> = (0..26).zip('a'..='z').collect();
///
/// let node = map.upper_bound(&12).and_then(|node| map.entry(node));
/// assert_eq!(node, Some((&12, &'m')));
/// assert!(map.height() <= 6);
/// ```
pub struct AvlTreeMap<K, V, C = NaturalOrder> {
    nodes: Nodes<K, V>,
    root: Option<NodeIndex>,
    comparator: C,
}

impl<K: Ord, V> AvlTreeMap<K, V> {
    /// Creates an empty map ordered by `K`'s natural order.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(NaturalOrder)
    }
}

impl<K, V, C> AvlTreeMap<K, V, C> {
    /// Creates an empty map ordered by `comparator`.
    #[must_use]
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            nodes: Arena::new(),
            root: None,
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
        self.nodes.len()
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the height of the tree; zero when empty.
    #[must_use]
    pub fn height(&self) -> usize {
        usize::from(self.height_of(self.root))
    }

    /// Removes every entry.
    ///
    /// Every handle issued before the call becomes invalid.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    /// Returns the node with the smallest key.
    #[must_use]
    pub fn front(&self) -> Option<NodeRef> {
        let index = leftmost(&self.nodes, self.root?);
        Some(self.nodes.handle(index))
    }

    /// Returns the node with the largest key.
    #[must_use]
    pub fn back(&self) -> Option<NodeRef> {
        let index = rightmost(&self.nodes, self.root?);
        Some(self.nodes.handle(index))
    }

    /// Returns the node following `node` in key order.
    ///
    /// Returns `None` at the end, or when `node` is not a live node of this
    /// map.
    #[must_use]
    pub fn next_node(&self, node: NodeRef) -> Option<NodeRef> {
        let index = self.nodes.resolve(node).ok()?;
        successor(&self.nodes, index).map(|next| self.nodes.handle(next))
    }

    /// Returns the node preceding `node` in key order.
    ///
    /// Returns `None` at the start, or when `node` is not a live node of
    /// this map.
    #[must_use]
    pub fn prev_node(&self, node: NodeRef) -> Option<NodeRef> {
        let index = self.nodes.resolve(node).ok()?;
        predecessor(&self.nodes, index).map(|previous| self.nodes.handle(previous))
    }

    /// Returns the key and value of `node`.
    #[must_use]
    pub fn entry(&self, node: NodeRef) -> Option<(&K, &V)> {
        let index = self.nodes.resolve(node).ok()?;
        let node = &self.nodes[index];
        Some((&node.key, &node.value))
    }

    /// Returns a mutable reference to the value of `node`.
    pub fn value_mut(&mut self, node: NodeRef) -> Option<&mut V> {
        let index = self.nodes.resolve(node).ok()?;
        Some(&mut self.nodes[index].value)
    }

    /// Removes `node` from the map and returns its entry.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ForeignNode`] if `node` was issued by another
    /// map, and [`NodeError::StaleNode`] if it was already erased. The map
    /// is left untouched in both cases.
    pub fn try_erase(&mut self, node: NodeRef) -> Result<(K, V), NodeError> {
        let index = self.nodes.resolve(node)?;
        debug_assert!(self.is_rooted(index), "node is not reachable from the root");
        let removed = self.unlink(index).ok_or(NodeError::StaleNode)?;
        Ok((removed.key, removed.value))
    }

    /// Removes `node` from the map and returns its entry.
    ///
    /// # Panics
    ///
    /// Panics if `node` was issued by another map or was already erased.
    /// Use [`try_erase`](Self::try_erase) to handle that case instead.
    pub fn erase(&mut self, node: NodeRef) -> (K, V) {
        match self.try_erase(node) {
            Ok(entry) => entry,
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(%error, "avl erase rejected a node handle");
                panic!("{error}")
            }
        }
    }

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let node = &self.nodes[leftmost(&self.nodes, self.root?)];
        Some((&node.key, &node.value))
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let node = &self.nodes[rightmost(&self.nodes, self.root?)];
        Some((&node.key, &node.value))
    }

    /// Returns an iterator over the entries in ascending key order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            front: self.root.map(|root| leftmost(&self.nodes, root)),
            back: self.root.map(|root| rightmost(&self.nodes, root)),
            remaining: self.len(),
        }
    }

    fn height_of(&self, index: Option<NodeIndex>) -> u8 {
        index.map_or(0, |index| self.nodes[index].height)
    }

    fn balance_of(&self, index: NodeIndex) -> i16 {
        let node = &self.nodes[index];
        i16::from(self.height_of(node.left)) - i16::from(self.height_of(node.right))
    }

    fn update_height(&mut self, index: NodeIndex) {
        let node = &self.nodes[index];
        let height = 1 + max(self.height_of(node.left), self.height_of(node.right));
        self.nodes[index].height = height;
    }

    fn is_rooted(&self, mut index: NodeIndex) -> bool {
        while let Some(parent) = self.nodes[index].parent {
            index = parent;
        }
        self.root == Some(index)
    }

    /// Points `parent`'s link to `old` at `new`, or makes `new` the root.
    fn replace_child(&mut self, parent: Option<NodeIndex>, old: NodeIndex, new: Option<NodeIndex>) {
        match parent {
            None => self.root = new,
            Some(parent) => {
                let node = &mut self.nodes[parent];
                if node.left == Some(old) {
                    node.left = new;
                } else {
                    node.right = new;
                }
            }
        }
    }

    /// Lifts the right child of `index` into its place. Returns the new
    /// subtree root.
    fn rotate_left(&mut self, index: NodeIndex) -> NodeIndex {
        let Some(pivot) = self.nodes[index].right else {
            return index;
        };
        let parent = self.nodes[index].parent;
        let middle = self.nodes[pivot].left;

        self.nodes[index].right = middle;
        if let Some(middle) = middle {
            self.nodes[middle].parent = Some(index);
        }
        self.nodes[pivot].left = Some(index);
        self.nodes[index].parent = Some(pivot);
        self.nodes[pivot].parent = parent;
        self.replace_child(parent, index, Some(pivot));

        self.update_height(index);
        self.update_height(pivot);
        pivot
    }

    /// Lifts the left child of `index` into its place. Returns the new
    /// subtree root.
    fn rotate_right(&mut self, index: NodeIndex) -> NodeIndex {
        let Some(pivot) = self.nodes[index].left else {
            return index;
        };
        let parent = self.nodes[index].parent;
        let middle = self.nodes[pivot].right;

        self.nodes[index].left = middle;
        if let Some(middle) = middle {
            self.nodes[middle].parent = Some(index);
        }
        self.nodes[pivot].right = Some(index);
        self.nodes[index].parent = Some(pivot);
        self.nodes[pivot].parent = parent;
        self.replace_child(parent, index, Some(pivot));

        self.update_height(index);
        self.update_height(pivot);
        pivot
    }

    /// Recomputes heights from `start` up to the root, rotating wherever a
    /// balance factor leaves `[-1, 1]`.
    fn rebalance_from(&mut self, start: Option<NodeIndex>) {
        let mut current = start;
        while let Some(index) = current {
            self.update_height(index);
            let balance = self.balance_of(index);
            let subtree = if balance > 1 {
                if let Some(left) = self.nodes[index].left
                    && self.balance_of(left) < 0
                {
                    self.rotate_left(left);
                }
                self.rotate_right(index)
            } else if balance < -1 {
                if let Some(right) = self.nodes[index].right
                    && self.balance_of(right) > 0
                {
                    self.rotate_right(right);
                }
                self.rotate_left(index)
            } else {
                index
            };
            current = self.nodes[subtree].parent;
        }
    }

    /// Detaches the node at `index` and frees its slot.
    ///
    /// A node with two children is replaced by its in-order successor node
    /// itself, moved into its position, so handles to the successor remain
    /// valid.
    fn unlink(&mut self, index: NodeIndex) -> Option<Node<K, V>> {
        let Node {
            left,
            right,
            parent,
            height,
            ..
        } = self.nodes[index];
        let rebalance_start = match (left, right) {
            (Some(left), Some(right)) => {
                let replacement = leftmost(&self.nodes, right);
                let start = if replacement == right {
                    Some(replacement)
                } else {
                    let replacement_parent = self.nodes[replacement].parent;
                    let replacement_right = self.nodes[replacement].right;
                    if let Some(replacement_parent) = replacement_parent {
                        self.nodes[replacement_parent].left = replacement_right;
                    }
                    if let Some(replacement_right) = replacement_right {
                        self.nodes[replacement_right].parent = replacement_parent;
                    }
                    self.nodes[replacement].right = Some(right);
                    self.nodes[right].parent = Some(replacement);
                    replacement_parent
                };
                self.nodes[replacement].left = Some(left);
                self.nodes[left].parent = Some(replacement);
                self.nodes[replacement].parent = parent;
                self.nodes[replacement].height = height;
                self.replace_child(parent, index, Some(replacement));
                start
            }
            (child, None) | (None, child) => {
                if let Some(child) = child {
                    self.nodes[child].parent = parent;
                }
                self.replace_child(parent, index, child);
                parent
            }
        };
        let removed = self.nodes.remove(index);
        self.rebalance_from(rebalance_start);
        removed
    }
}

impl<K, V, C: Comparator<K>> AvlTreeMap<K, V, C> {
    /// Inserts `value` under `key` and returns the handle of its node.
    ///
    /// An equivalent key already present keeps its node and original key;
    /// only the value is overwritten.
    pub fn insert(&mut self, key: K, value: V) -> NodeRef {
        let (index, _) = self.insert_entry(key, value);
        self.nodes.handle(index)
    }

    /// Returns the node holding `key`.
    #[must_use]
    pub fn find(&self, key: &K) -> Option<NodeRef> {
        self.find_index(key).map(|index| self.nodes.handle(index))
    }

    /// Returns the node with the smallest key not less than `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &K) -> Option<NodeRef> {
        self.lower_bound_index(key).map(|index| self.nodes.handle(index))
    }

    /// Returns the node with the largest key not greater than `key`.
    #[must_use]
    pub fn upper_bound(&self, key: &K) -> Option<NodeRef> {
        self.upper_bound_index(key).map(|index| self.nodes.handle(index))
    }

    /// Returns a reference to the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find_index(key).map(|index| &self.nodes[index].value)
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.find_index(key)?;
        Some(&mut self.nodes[index].value)
    }

    /// Returns `true` if the map contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find_index(key).is_some()
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        self.insert_entry(key, value).1
    }

    /// Removes the entry under `key`, returning its value.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let index = self.find_index(key)?;
        self.unlink(index).map(|node| node.value)
    }

    /// Returns an unpositioned cursor over the map.
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_, K, V, C> {
        Cursor {
            map: self,
            current: None,
        }
    }

    fn insert_entry(&mut self, key: K, value: V) -> (NodeIndex, Option<V>) {
        let mut parent = None;
        let mut attach_left = false;
        let mut current = self.root;
        while let Some(index) = current {
            let node = &self.nodes[index];
            parent = Some(index);
            if self.comparator.less(&key, &node.key) {
                attach_left = true;
                current = node.left;
            } else if self.comparator.less(&node.key, &key) {
                attach_left = false;
                current = node.right;
            } else {
                let replaced = mem::replace(&mut self.nodes[index].value, value);
                return (index, Some(replaced));
            }
        }

        let index = self.nodes.insert(Node {
            key,
            value,
            height: 1,
            left: None,
            right: None,
            parent,
        });
        match parent {
            None => self.root = Some(index),
            Some(parent) if attach_left => self.nodes[parent].left = Some(index),
            Some(parent) => self.nodes[parent].right = Some(index),
        }
        self.rebalance_from(parent);
        (index, None)
    }

    fn find_index(&self, key: &K) -> Option<NodeIndex> {
        let mut current = self.root;
        while let Some(index) = current {
            let node = &self.nodes[index];
            if self.comparator.less(key, &node.key) {
                current = node.left;
            } else if self.comparator.less(&node.key, key) {
                current = node.right;
            } else {
                return Some(index);
            }
        }
        None
    }

    fn lower_bound_index(&self, key: &K) -> Option<NodeIndex> {
        let mut bound = None;
        let mut current = self.root;
        while let Some(index) = current {
            let node = &self.nodes[index];
            if self.comparator.less(&node.key, key) {
                current = node.right;
            } else {
                bound = Some(index);
                current = node.left;
            }
        }
        bound
    }

    fn upper_bound_index(&self, key: &K) -> Option<NodeIndex> {
        let mut bound = None;
        let mut current = self.root;
        while let Some(index) = current {
            let node = &self.nodes[index];
            if self.comparator.less(key, &node.key) {
                current = node.left;
            } else {
                bound = Some(index);
                current = node.right;
            }
        }
        bound
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A bidirectional cursor borrowing an [`AvlTreeMap`].
pub struct Cursor<'a, K, V, C> {
    map: &'a AvlTreeMap<K, V, C>,
    current: Option<NodeIndex>,
}

impl<K, V, C> Clone for Cursor<'_, K, V, C> {
    fn clone(&self) -> Self {
        Self {
            map: self.map,
            current: self.current,
        }
    }
}

impl<K, V, C> Cursor<'_, K, V, C> {
    /// Returns the handle of the node under the cursor.
    #[must_use]
    pub fn node(&self) -> Option<NodeRef> {
        self.current.map(|index| self.map.nodes.handle(index))
    }

    fn moved_to(&mut self, index: Option<NodeIndex>) -> bool {
        self.current = index;
        index.is_some()
    }
}

impl<K, V, C: Comparator<K>> MapCursor<K, V> for Cursor<'_, K, V, C> {
    fn first(&mut self) -> bool {
        let index = self.map.root.map(|root| leftmost(&self.map.nodes, root));
        self.moved_to(index)
    }

    fn last(&mut self) -> bool {
        let index = self.map.root.map(|root| rightmost(&self.map.nodes, root));
        self.moved_to(index)
    }

    fn next(&mut self) -> bool {
        match self.current {
            Some(index) => self.moved_to(successor(&self.map.nodes, index)),
            None => self.first(),
        }
    }

    fn prev(&mut self) -> bool {
        match self.current {
            Some(index) => self.moved_to(predecessor(&self.map.nodes, index)),
            None => self.last(),
        }
    }

    fn seek(&mut self, key: &K) -> bool {
        self.moved_to(self.map.lower_bound_index(key))
    }

    fn seek_prev(&mut self, key: &K) -> bool {
        self.moved_to(self.map.upper_bound_index(key))
    }

    fn key(&self) -> Option<&K> {
        self.current.map(|index| &self.map.nodes[index].key)
    }

    fn value(&self) -> Option<&V> {
        self.current.map(|index| &self.map.nodes[index].value)
    }

    fn is_positioned(&self) -> bool {
        self.current.is_some()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Double-ended iterator over the entries of an [`AvlTreeMap`].
pub struct Iter<'a, K, V> {
    nodes: &'a Nodes<K, V>,
    front: Option<NodeIndex>,
    back: Option<NodeIndex>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.front?;
        self.remaining -= 1;
        self.front = successor(self.nodes, index);
        let node = &self.nodes[index];
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.back?;
        self.remaining -= 1;
        self.back = predecessor(self.nodes, index);
        let node = &self.nodes[index];
        Some((&node.key, &node.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

// =============================================================================
// OrderedMap Implementation
// =============================================================================

impl<K, V, C: Comparator<K>> OrderedMap<K, V> for AvlTreeMap<K, V, C> {
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
        Self::len(self)
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        Self::cursor(self)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V, C: Default> Default for AvlTreeMap<K, V, C> {
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

/// Copies every node. Handles issued by the original are rejected by the
/// copy.
impl<K: Clone, V: Clone, C: Clone> Clone for AvlTreeMap<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            root: self.root,
            comparator: self.comparator.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for AvlTreeMap<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, C: Comparator<K>> Extend<(K, V)> for AvlTreeMap<K, V, C> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<K, V, C: Comparator<K> + Default> FromIterator<(K, V)> for AvlTreeMap<K, V, C> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, C> IntoIterator for &'a AvlTreeMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
