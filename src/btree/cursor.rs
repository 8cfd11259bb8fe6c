//! Stack-based cursor over B-tree nodes.
//!
//! The cursor keeps one `(node, index)` frame per level from the root down
//! to the current entry. The top frame points at the current entry; every
//! frame below it records which child was descended into.
//!
//! [`RawCursor`] is generic over a [`NodeHandle`]: a plain reference for
//! borrowing cursors, or an `Arc` for cursors that own their snapshot.

use std::sync::Arc;

use smallvec::SmallVec;

use super::node::{Entry, Node, NodeStore, Shared};
use crate::comparator::Comparator;

/// Frames kept inline before the stack spills to the heap. With 63 entries
/// per node, eight levels cover far more entries than fit in memory.
const INLINE_FRAMES: usize = 8;

/// Something that can reach a node and its children.
pub(crate) trait NodeHandle: Clone {
    type Key;
    type Value;
    type Store: NodeStore<Self::Key, Self::Value>;

    fn node(&self) -> &Node<Self::Key, Self::Value, Self::Store>;

    fn child(&self, index: usize) -> Self;
}

impl<'a, K, V, S: NodeStore<K, V>> NodeHandle for &'a Node<K, V, S> {
    type Key = K;
    type Value = V;
    type Store = S;

    #[inline]
    fn node(&self) -> &Node<K, V, S> {
        self
    }

    #[inline]
    fn child(&self, index: usize) -> Self {
        let node: &'a Node<K, V, S> = *self;
        S::get(&node.children[index])
    }
}

impl<K, V> NodeHandle for Arc<Node<K, V, Shared>> {
    type Key = K;
    type Value = V;
    type Store = Shared;

    #[inline]
    fn node(&self) -> &Node<K, V, Shared> {
        self
    }

    #[inline]
    fn child(&self, index: usize) -> Self {
        Self::clone(&self.children[index])
    }
}

#[derive(Clone)]
pub(crate) struct Frame<H> {
    node: H,
    index: usize,
}

/// Position state machine shared by every B-tree cursor and iterator.
#[derive(Clone)]
pub(crate) struct RawCursor<H> {
    root: Option<H>,
    stack: SmallVec<[Frame<H>; INLINE_FRAMES]>,
}

impl<H: NodeHandle> RawCursor<H> {
    pub(crate) fn new(root: Option<H>) -> Self {
        Self {
            root,
            stack: SmallVec::new(),
        }
    }

    #[inline]
    pub(crate) fn is_positioned(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Returns the entry under the cursor.
    pub(crate) fn entry(&self) -> Option<&Entry<H::Key, H::Value>> {
        let frame = self.stack.last()?;
        frame.node.node().entries.get(frame.index)
    }

    pub(crate) fn first(&mut self) -> bool {
        self.stack.clear();
        let Some(root) = self.root.clone() else {
            return false;
        };
        self.descend_first(root);
        true
    }

    pub(crate) fn last(&mut self) -> bool {
        self.stack.clear();
        let Some(root) = self.root.clone() else {
            return false;
        };
        self.descend_last(root);
        true
    }

    pub(crate) fn next(&mut self) -> bool {
        let Some(top) = self.stack.last_mut() else {
            return self.first();
        };
        top.index += 1;
        if top.node.node().is_leaf() {
            self.climb_forward()
        } else {
            let child = top.node.child(top.index);
            self.descend_first(child);
            true
        }
    }

    pub(crate) fn prev(&mut self) -> bool {
        let Some(top) = self.stack.last() else {
            return self.last();
        };
        if top.node.node().is_leaf() {
            self.climb_backward()
        } else {
            let child = top.node.child(top.index);
            self.descend_last(child);
            true
        }
    }

    /// Positions at the smallest entry not less than `key`.
    pub(crate) fn seek<C: Comparator<H::Key>>(&mut self, key: &H::Key, comparator: &C) -> bool {
        if self.descend_to(key, comparator) {
            return true;
        }
        self.climb_forward()
    }

    /// Positions at the largest entry not greater than `key`.
    pub(crate) fn seek_prev<C: Comparator<H::Key>>(
        &mut self,
        key: &H::Key,
        comparator: &C,
    ) -> bool {
        if self.descend_to(key, comparator) {
            return true;
        }
        self.climb_backward()
    }

    fn descend_first(&mut self, mut node: H) {
        loop {
            let child = (!node.node().is_leaf()).then(|| node.child(0));
            self.stack.push(Frame { node, index: 0 });
            match child {
                Some(child) => node = child,
                None => return,
            }
        }
    }

    fn descend_last(&mut self, mut node: H) {
        loop {
            let length = node.node().entries.len();
            if node.node().is_leaf() {
                self.stack.push(Frame {
                    node,
                    index: length.saturating_sub(1),
                });
                return;
            }
            let child = node.child(length);
            self.stack.push(Frame {
                node,
                index: length,
            });
            node = child;
        }
    }

    /// Walks from the root towards `key`, leaving a frame per level.
    ///
    /// Returns `true` on an exact match, with the top frame on it. Otherwise
    /// the top frame holds the leaf insertion index for `key`.
    fn descend_to<C: Comparator<H::Key>>(&mut self, key: &H::Key, comparator: &C) -> bool {
        self.stack.clear();
        let Some(mut node) = self.root.clone() else {
            return false;
        };
        loop {
            let (index, found) = node.node().search(key, comparator);
            let child = (!found && !node.node().is_leaf()).then(|| node.child(index));
            self.stack.push(Frame { node, index });
            if found {
                return true;
            }
            match child {
                Some(child) => node = child,
                None => return false,
            }
        }
    }

    /// Pops exhausted frames until one has an entry at its index.
    fn climb_forward(&mut self) -> bool {
        while let Some(frame) = self.stack.last() {
            if frame.index < frame.node.node().entries.len() {
                return true;
            }
            self.stack.pop();
        }
        false
    }

    /// Pops frames until one has an entry before its index, and steps onto it.
    fn climb_backward(&mut self) -> bool {
        while let Some(frame) = self.stack.last_mut() {
            if frame.index > 0 {
                frame.index -= 1;
                return true;
            }
            self.stack.pop();
        }
        false
    }
}

impl<'a, K, V, S: NodeStore<K, V>> RawCursor<&'a Node<K, V, S>> {
    /// Returns the current entry for the full lifetime of the tree borrow.
    pub(crate) fn current(&self) -> Option<&'a Entry<K, V>> {
        let frame = self.stack.last()?;
        let node: &'a Node<K, V, S> = frame.node;
        node.entries.get(frame.index)
    }
}

/// Double-ended iteration over a borrowed tree, driven by two cursors.
///
/// `remaining` keeps the cursors from crossing.
pub(crate) struct RawIter<'a, K, V, S: NodeStore<K, V>> {
    front: RawCursor<&'a Node<K, V, S>>,
    back: RawCursor<&'a Node<K, V, S>>,
    remaining: usize,
}

impl<'a, K, V, S: NodeStore<K, V>> RawIter<'a, K, V, S> {
    pub(crate) fn new(root: Option<&'a Node<K, V, S>>, length: usize) -> Self {
        Self {
            front: RawCursor::new(root),
            back: RawCursor::new(root),
            remaining: length,
        }
    }

    pub(crate) fn next(&mut self) -> Option<(&'a K, &'a V)> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.front.next();
        self.front.current().map(|entry| (&entry.key, &entry.value))
    }

    pub(crate) fn next_back(&mut self) -> Option<(&'a K, &'a V)> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.back.prev();
        self.back.current().map(|entry| (&entry.key, &entry.value))
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V, S: NodeStore<K, V>> Clone for RawIter<'_, K, V, S> {
    fn clone(&self) -> Self {
        Self {
            front: self.front.clone(),
            back: self.back.clone(),
            remaining: self.remaining,
        }
    }
}

/// Forward iteration from a start position to the end of a borrowed tree.
pub(crate) struct RawRange<'a, K, V, S: NodeStore<K, V>> {
    cursor: RawCursor<&'a Node<K, V, S>>,
    started: bool,
}

impl<'a, K, V, S: NodeStore<K, V>> RawRange<'a, K, V, S> {
    #[cfg(feature = "persistent")]
    pub(crate) fn from_first(root: Option<&'a Node<K, V, S>>) -> Self {
        let mut cursor = RawCursor::new(root);
        cursor.first();
        Self {
            cursor,
            started: false,
        }
    }

    pub(crate) fn from_key<C: Comparator<K>>(
        root: Option<&'a Node<K, V, S>>,
        key: &K,
        comparator: &C,
    ) -> Self {
        let mut cursor = RawCursor::new(root);
        cursor.seek(key, comparator);
        Self {
            cursor,
            started: false,
        }
    }

    pub(crate) fn next(&mut self) -> Option<(&'a K, &'a V)> {
        if self.started {
            if !self.cursor.is_positioned() {
                return None;
            }
            self.cursor.next();
        }
        self.started = true;
        self.cursor.current().map(|entry| (&entry.key, &entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::{Owned, insert};
    use crate::comparator::NaturalOrder;
    use rstest::rstest;

    fn tree(keys: impl IntoIterator<Item = i32>) -> Option<Box<Node<i32, i32, Owned>>> {
        let mut root = None;
        for key in keys {
            insert::<_, _, Owned, _>(&mut root, key, key, &NaturalOrder);
        }
        root
    }

    fn key_of(cursor: &RawCursor<&Node<i32, i32, Owned>>) -> Option<i32> {
        cursor.entry().map(|entry| entry.key)
    }

    #[rstest]
    fn test_empty_tree_is_never_positioned() {
        let mut cursor: RawCursor<&Node<i32, i32, Owned>> = RawCursor::new(None);
        assert!(!cursor.first());
        assert!(!cursor.last());
        assert!(!cursor.next());
        assert!(!cursor.prev());
        assert!(!cursor.seek(&1, &NaturalOrder));
        assert!(!cursor.seek_prev(&1, &NaturalOrder));
        assert!(cursor.entry().is_none());
    }

    #[rstest]
    fn test_forward_and_backward_walks_cover_every_key() {
        let root = tree((0..5000).rev());
        let mut cursor = RawCursor::new(root.as_deref());

        let mut forward = Vec::new();
        let mut positioned = cursor.first();
        while positioned {
            forward.extend(key_of(&cursor));
            positioned = cursor.next();
        }
        assert_eq!(forward, (0..5000).collect::<Vec<_>>());

        let mut backward = Vec::new();
        let mut positioned = cursor.last();
        while positioned {
            backward.extend(key_of(&cursor));
            positioned = cursor.prev();
        }
        assert_eq!(backward, (0..5000).rev().collect::<Vec<_>>());
    }

    #[rstest]
    fn test_direction_changes_mid_walk() {
        let root = tree(0..1000);
        let mut cursor = RawCursor::new(root.as_deref());
        assert!(cursor.seek(&500, &NaturalOrder));
        for expected in 501..700 {
            assert!(cursor.next());
            assert_eq!(key_of(&cursor), Some(expected));
        }
        for expected in (100..699).rev() {
            assert!(cursor.prev());
            assert_eq!(key_of(&cursor), Some(expected));
        }
    }

    #[rstest]
    #[case::exact(40, Some(40), Some(40))]
    #[case::between(41, Some(42), Some(40))]
    #[case::before_all(-5, Some(0), None)]
    #[case::after_all(20_000, None, Some(19_998))]
    fn test_seek_on_even_keys(
        #[case] key: i32,
        #[case] expected_seek: Option<i32>,
        #[case] expected_seek_prev: Option<i32>,
    ) {
        let root = tree((0..10_000).map(|key| key * 2));
        let mut cursor = RawCursor::new(root.as_deref());
        assert_eq!(cursor.seek(&key, &NaturalOrder), expected_seek.is_some());
        assert_eq!(key_of(&cursor), expected_seek);
        assert_eq!(cursor.seek_prev(&key, &NaturalOrder), expected_seek_prev.is_some());
        assert_eq!(key_of(&cursor), expected_seek_prev);
    }

    #[rstest]
    fn test_seek_lands_on_every_separator_neighbour() {
        let root = tree((0..4000).map(|key| key * 2));
        let mut cursor = RawCursor::new(root.as_deref());
        for key in (1..8000).step_by(2) {
            let expected_next = if key < 7999 { Some(key + 1) } else { None };
            assert_eq!(cursor.seek(&key, &NaturalOrder), expected_next.is_some());
            assert_eq!(key_of(&cursor), expected_next);
            assert!(cursor.seek_prev(&key, &NaturalOrder));
            assert_eq!(key_of(&cursor), Some(key - 1));
        }
    }

    #[rstest]
    fn test_next_after_end_restarts_from_first() {
        let root = tree(0..3);
        let mut cursor = RawCursor::new(root.as_deref());
        assert!(cursor.last());
        assert!(!cursor.next());
        assert!(cursor.next());
        assert_eq!(key_of(&cursor), Some(0));
    }

    #[rstest]
    fn test_raw_iter_meets_in_the_middle() {
        let root = tree(0..10);
        let mut iter = RawIter::new(root.as_deref(), 10);
        assert_eq!(iter.next().map(|(key, _)| *key), Some(0));
        assert_eq!(iter.next_back().map(|(key, _)| *key), Some(9));
        let mut rest = Vec::new();
        while let Some((key, _)) = iter.next() {
            rest.push(*key);
        }
        assert_eq!(rest, (1..9).collect::<Vec<_>>());
        assert!(iter.next_back().is_none());
    }

    #[rstest]
    fn test_raw_range_from_key() {
        let root = tree(0..100);
        let mut range = RawRange::from_key(root.as_deref(), &95, &NaturalOrder);
        let mut keys = Vec::new();
        while let Some((key, _)) = range.next() {
            keys.push(*key);
        }
        assert_eq!(keys, vec![95, 96, 97, 98, 99]);
        assert!(range.next().is_none());

        let mut empty = RawRange::from_key(root.as_deref(), &100, &NaturalOrder);
        assert!(empty.next().is_none());
        assert!(empty.next().is_none());
    }
}
