//! Splay tree map.
//!
//! [`SplayTreeMap`] keeps no balance information. Every lookup that finds
//! a node rotates it to the root, so recently used keys stay cheap to reach
//! and any sequence of operations costs O(log N) amortized per operation.
//!
//! Because reads restructure the tree, the links between nodes live in
//! [`Cell`]s and lookups take `&self`. The map can be sent to another
//! thread but not shared between threads.
//!
//! The map offers the same [`NodeRef`] handle API as
//! [`AvlTreeMap`](crate::avl::AvlTreeMap). Handles survive splaying: a
//! rotation moves links, never nodes.
//!
//! # Examples
//!
//! ```rust
//! use ordered_maps::splay::SplayTreeMap;
//!
//! let mut map = SplayTreeMap::new();
//! for key in 0..100 {
//!     map.set(key, key * key);
//! }
//!
//! assert_eq!(map.get(&12), Some(&144));
//! let root = map.root().and_then(|node| map.entry(node));
//! assert_eq!(root, Some((&12, &144)));
//! ```

use std::cell::Cell;
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

type Link = Cell<Option<NodeIndex>>;

#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    left: Link,
    right: Link,
    parent: Link,
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            left: Cell::new(None),
            right: Cell::new(None),
            parent: Cell::new(None),
        }
    }
}

type Nodes<K, V> = Arena<Node<K, V>>;

fn leftmost<K, V>(nodes: &Nodes<K, V>, mut index: NodeIndex) -> NodeIndex {
    while let Some(left) = nodes[index].left.get() {
        index = left;
    }
    index
}

fn rightmost<K, V>(nodes: &Nodes<K, V>, mut index: NodeIndex) -> NodeIndex {
    while let Some(right) = nodes[index].right.get() {
        index = right;
    }
    index
}

fn successor<K, V>(nodes: &Nodes<K, V>, index: NodeIndex) -> Option<NodeIndex> {
    if let Some(right) = nodes[index].right.get() {
        return Some(leftmost(nodes, right));
    }
    let mut child = index;
    let mut parent = nodes[index].parent.get();
    while let Some(current) = parent {
        if nodes[current].left.get() == Some(child) {
            return Some(current);
        }
        child = current;
        parent = nodes[current].parent.get();
    }
    None
}

fn predecessor<K, V>(nodes: &Nodes<K, V>, index: NodeIndex) -> Option<NodeIndex> {
    if let Some(left) = nodes[index].left.get() {
        return Some(rightmost(nodes, left));
    }
    let mut child = index;
    let mut parent = nodes[index].parent.get();
    while let Some(current) = parent {
        if nodes[current].right.get() == Some(child) {
            return Some(current);
        }
        child = current;
        parent = nodes[current].parent.get();
    }
    None
}

// =============================================================================
// SplayTreeMap Definition
// =============================================================================

/// An ordered map backed by a self-adjusting splay tree.
pub struct SplayTreeMap<K, V, C = NaturalOrder> {
    nodes: Nodes<K, V>,
    root: Link,
    comparator: C,
}

static_assertions::assert_impl_all!(SplayTreeMap<i32, String>: Send);
static_assertions::assert_not_impl_any!(SplayTreeMap<i32, String>: Sync);

impl<K: Ord, V> SplayTreeMap<K, V> {
    /// Creates an empty map ordered by `K`'s natural order.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(NaturalOrder)
    }
}

impl<K, V, C> SplayTreeMap<K, V, C> {
    /// Creates an empty map ordered by `comparator`.
    #[must_use]
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            nodes: Arena::new(),
            root: Cell::new(None),
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
        self.nodes.len() == 0
    }

    /// Removes every entry.
    ///
    /// Every handle issued before the call becomes invalid.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root.set(None);
    }

    /// Returns the node currently at the root: the most recently splayed.
    #[must_use]
    pub fn root(&self) -> Option<NodeRef> {
        self.root.get().map(|index| self.nodes.handle(index))
    }

    /// Returns the node with the smallest key.
    #[must_use]
    pub fn front(&self) -> Option<NodeRef> {
        let index = leftmost(&self.nodes, self.root.get()?);
        Some(self.nodes.handle(index))
    }

    /// Returns the node with the largest key.
    #[must_use]
    pub fn back(&self) -> Option<NodeRef> {
        let index = rightmost(&self.nodes, self.root.get()?);
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
    /// map, and [`NodeError::StaleNode`] if it was already erased.
    pub fn try_erase(&mut self, node: NodeRef) -> Result<(K, V), NodeError> {
        let index = self.nodes.resolve(node)?;
        let removed = self.unlink(index).ok_or(NodeError::StaleNode)?;
        Ok((removed.key, removed.value))
    }

    /// Removes `node` from the map and returns its entry.
    ///
    /// # Panics
    ///
    /// Panics if `node` was issued by another map or was already erased.
    pub fn erase(&mut self, node: NodeRef) -> (K, V) {
        match self.try_erase(node) {
            Ok(entry) => entry,
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(%error, "splay erase rejected a node handle");
                panic!("{error}")
            }
        }
    }

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let node = &self.nodes[leftmost(&self.nodes, self.root.get()?)];
        Some((&node.key, &node.value))
    }

    /// Returns the entry with the largest key.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let node = &self.nodes[rightmost(&self.nodes, self.root.get()?)];
        Some((&node.key, &node.value))
    }

    /// Returns an iterator over the entries in ascending key order.
    ///
    /// Iteration does not splay.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        let root = self.root.get();
        Iter {
            nodes: &self.nodes,
            front: root.map(|root| leftmost(&self.nodes, root)),
            back: root.map(|root| rightmost(&self.nodes, root)),
            remaining: self.len(),
        }
    }

    fn left(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.nodes[index].left.get()
    }

    fn right(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.nodes[index].right.get()
    }

    fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.nodes[index].parent.get()
    }

    fn set_parent(&self, child: Option<NodeIndex>, parent: Option<NodeIndex>) {
        if let Some(child) = child {
            self.nodes[child].parent.set(parent);
        }
    }

    /// Rotates `index` above its parent.
    fn rotate(&self, index: NodeIndex) {
        let Some(parent) = self.parent(index) else {
            return;
        };
        let grandparent = self.parent(parent);
        if self.left(parent) == Some(index) {
            let middle = self.right(index);
            self.nodes[parent].left.set(middle);
            self.set_parent(middle, Some(parent));
            self.nodes[index].right.set(Some(parent));
        } else {
            let middle = self.left(index);
            self.nodes[parent].right.set(middle);
            self.set_parent(middle, Some(parent));
            self.nodes[index].left.set(Some(parent));
        }
        self.nodes[parent].parent.set(Some(index));
        self.nodes[index].parent.set(grandparent);
        match grandparent {
            None => self.root.set(Some(index)),
            Some(grandparent) if self.left(grandparent) == Some(parent) => {
                self.nodes[grandparent].left.set(Some(index));
            }
            Some(grandparent) => self.nodes[grandparent].right.set(Some(index)),
        }
    }

    /// Moves `index` to the root with zig, zig-zig and zig-zag steps.
    fn splay(&self, index: NodeIndex) {
        while let Some(parent) = self.parent(index) {
            if let Some(grandparent) = self.parent(parent) {
                let same_side =
                    (self.left(grandparent) == Some(parent)) == (self.left(parent) == Some(index));
                if same_side {
                    self.rotate(parent);
                } else {
                    self.rotate(index);
                }
            }
            self.rotate(index);
        }
    }

    /// Splays `index` to the root, then replaces it with the join of its
    /// subtrees.
    fn unlink(&mut self, index: NodeIndex) -> Option<Node<K, V>> {
        self.splay(index);
        let left = self.left(index);
        let right = self.right(index);
        self.set_parent(left, None);
        self.set_parent(right, None);
        match right {
            None => self.root.set(left),
            Some(right) => {
                self.root.set(Some(right));
                let minimum = leftmost(&self.nodes, right);
                self.splay(minimum);
                self.nodes[minimum].left.set(left);
                self.set_parent(left, Some(minimum));
            }
        }
        self.nodes.remove(index)
    }
}

impl<K, V, C: Comparator<K>> SplayTreeMap<K, V, C> {
    /// Inserts `value` under `key` and returns the handle of its node.
    ///
    /// An equivalent key already present keeps its node and original key;
    /// only the value is overwritten. The node ends up at the root.
    pub fn insert(&mut self, key: K, value: V) -> NodeRef {
        let (index, _) = self.insert_entry(key, value);
        self.nodes.handle(index)
    }

    /// Returns the node holding `key`, splaying it to the root.
    #[must_use]
    pub fn find(&self, key: &K) -> Option<NodeRef> {
        self.find_index(key).map(|index| self.nodes.handle(index))
    }

    /// Returns the node with the smallest key not less than `key`,
    /// splaying it to the root.
    #[must_use]
    pub fn lower_bound(&self, key: &K) -> Option<NodeRef> {
        self.lower_bound_index(key).map(|index| self.nodes.handle(index))
    }

    /// Returns the node with the largest key not greater than `key`,
    /// splaying it to the root.
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
    ///
    /// Seeking splays; stepping does not.
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_, K, V, C> {
        Cursor {
            map: self,
            current: None,
        }
    }

    /// Splits at the lower bound of `key` and relinks around a new root.
    fn insert_entry(&mut self, key: K, value: V) -> (NodeIndex, Option<V>) {
        let Some(root) = self.root.get() else {
            let index = self.nodes.insert(Node::new(key, value));
            self.root.set(Some(index));
            return (index, None);
        };
        let bound = self.lower_bound_index(&key);
        if let Some(bound) = bound
            && !self.comparator.less(&key, &self.nodes[bound].key)
        {
            let replaced = mem::replace(&mut self.nodes[bound].value, value);
            return (bound, Some(replaced));
        }

        let index = self.nodes.insert(Node::new(key, value));
        match bound {
            Some(bound) => {
                let smaller = self.left(bound);
                self.nodes[bound].left.set(None);
                self.nodes[index].left.set(smaller);
                self.nodes[index].right.set(Some(bound));
                self.set_parent(smaller, Some(index));
                self.set_parent(Some(bound), Some(index));
            }
            None => {
                let largest = self.root.get().unwrap_or(root);
                self.nodes[index].left.set(Some(largest));
                self.set_parent(Some(largest), Some(index));
            }
        }
        self.root.set(Some(index));
        (index, None)
    }

    /// Splays the node found, or the last node visited when the search
    /// falls off the tree.
    fn find_index(&self, key: &K) -> Option<NodeIndex> {
        let mut last = None;
        let mut current = self.root.get();
        while let Some(index) = current {
            last = Some(index);
            let node = &self.nodes[index];
            if self.comparator.less(key, &node.key) {
                current = node.left.get();
            } else if self.comparator.less(&node.key, key) {
                current = node.right.get();
            } else {
                self.splay(index);
                return Some(index);
            }
        }
        if let Some(last) = last {
            self.splay(last);
        }
        None
    }

    fn lower_bound_index(&self, key: &K) -> Option<NodeIndex> {
        let mut bound = None;
        let mut last = None;
        let mut current = self.root.get();
        while let Some(index) = current {
            last = Some(index);
            let node = &self.nodes[index];
            if self.comparator.less(&node.key, key) {
                current = node.right.get();
            } else {
                bound = Some(index);
                current = node.left.get();
            }
        }
        if let Some(target) = bound.or(last) {
            self.splay(target);
        }
        bound
    }

    fn upper_bound_index(&self, key: &K) -> Option<NodeIndex> {
        let mut bound = None;
        let mut last = None;
        let mut current = self.root.get();
        while let Some(index) = current {
            last = Some(index);
            let node = &self.nodes[index];
            if self.comparator.less(key, &node.key) {
                current = node.left.get();
            } else {
                bound = Some(index);
                current = node.right.get();
            }
        }
        if let Some(target) = bound.or(last) {
            self.splay(target);
        }
        bound
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A bidirectional cursor borrowing a [`SplayTreeMap`].
pub struct Cursor<'a, K, V, C> {
    map: &'a SplayTreeMap<K, V, C>,
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
        let index = self.map.root.get().map(|root| leftmost(&self.map.nodes, root));
        self.moved_to(index)
    }

    fn last(&mut self) -> bool {
        let index = self.map.root.get().map(|root| rightmost(&self.map.nodes, root));
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

/// Double-ended iterator over the entries of a [`SplayTreeMap`].
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

// =============================================================================
// OrderedMap Implementation
// =============================================================================

impl<K, V, C: Comparator<K>> OrderedMap<K, V> for SplayTreeMap<K, V, C> {
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

impl<K, V, C: Default> Default for SplayTreeMap<K, V, C> {
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

/// Copies every node, shape included. Handles issued by the original are
/// rejected by the copy.
impl<K: Clone, V: Clone, C: Clone> Clone for SplayTreeMap<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            root: self.root.clone(),
            comparator: self.comparator.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for SplayTreeMap<K, V, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, C: Comparator<K>> Extend<(K, V)> for SplayTreeMap<K, V, C> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<K, V, C: Comparator<K> + Default> FromIterator<(K, V)> for SplayTreeMap<K, V, C> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, C> IntoIterator for &'a SplayTreeMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
