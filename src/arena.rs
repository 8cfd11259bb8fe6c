//! Slot arena backing the binary-tree engines.
//!
//! The AVL and splay maps keep their nodes in an [`Arena`] and link them by
//! [`NodeIndex`] instead of pointers, so parent back-references never imply
//! ownership. Freed slots are recycled; each slot carries a generation that
//! is bumped on removal, which lets a [`NodeRef`] detect that its node is
//! gone even after the slot has been reused.
//!
//! Every arena carries a process-unique [`TreeId`]. Cloning an arena gives
//! the copy a fresh identity, so handles issued by the original are rejected
//! by the clone.

use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::NodeError;

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one map instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TreeId(u64);

impl TreeId {
    fn fresh() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Position of a node inside its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeIndex(usize);

/// A stable handle to a node of an AVL or splay map.
///
/// Handles are cheap to copy and stay valid while the node remains in the
/// map that issued them, regardless of rotations, splays or erasure of other
/// nodes. They are checked on every use: a handle from another map or to an
/// erased node is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    tree: TreeId,
    index: NodeIndex,
    generation: u32,
}

#[derive(Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A generational slot arena.
pub(crate) struct Arena<T> {
    id: TreeId,
    slots: Vec<Slot<T>>,
    free: Vec<NodeIndex>,
    length: usize,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            id: TreeId::fresh(),
            slots: Vec::new(),
            free: Vec::new(),
            length: 0,
        }
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.length
    }

    /// Stores `value` in a free slot, reusing vacated slots first.
    pub(crate) fn insert(&mut self, value: T) -> NodeIndex {
        self.length += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index.0].value = Some(value);
            return index;
        }
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        NodeIndex(self.slots.len() - 1)
    }

    /// Vacates the slot at `index`, returning its value.
    pub(crate) fn remove(&mut self, index: NodeIndex) -> Option<T> {
        let slot = self.slots.get_mut(index.0)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.length -= 1;
        Some(value)
    }

    /// Drops every value and forgets every slot.
    ///
    /// Generations restart, so the arena takes a fresh identity to keep
    /// old handles from matching new nodes.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.length = 0;
        self.id = TreeId::fresh();
    }

    /// Issues a handle for the occupied slot at `index`.
    pub(crate) fn handle(&self, index: NodeIndex) -> NodeRef {
        NodeRef {
            tree: self.id,
            index,
            generation: self.slots[index.0].generation,
        }
    }

    /// Checks that `handle` was issued by this arena and is still live.
    pub(crate) fn resolve(&self, handle: NodeRef) -> Result<NodeIndex, NodeError> {
        if handle.tree != self.id {
            return Err(NodeError::ForeignNode);
        }
        match self.slots.get(handle.index.0) {
            Some(slot) if slot.generation == handle.generation && slot.value.is_some() => {
                Ok(handle.index)
            }
            _ => Err(NodeError::StaleNode),
        }
    }
}

impl<T: Clone> Clone for Arena<T> {
    fn clone(&self) -> Self {
        Self {
            id: TreeId::fresh(),
            slots: self.slots.clone(),
            free: self.free.clone(),
            length: self.length,
        }
    }
}

impl<T> Index<NodeIndex> for Arena<T> {
    type Output = T;

    fn index(&self, index: NodeIndex) -> &T {
        match self.slots[index.0].value.as_ref() {
            Some(value) => value,
            None => panic!("arena slot {} is vacant", index.0),
        }
    }
}

impl<T> IndexMut<NodeIndex> for Arena<T> {
    fn index_mut(&mut self, index: NodeIndex) -> &mut T {
        match self.slots[index.0].value.as_mut() {
            Some(value) => value,
            None => panic!("arena slot {} is vacant", index.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_insert_and_index() {
        let mut arena = Arena::new();
        let first = arena.insert("first");
        let second = arena.insert("second");
        assert_eq!(arena[first], "first");
        assert_eq!(arena[second], "second");
        assert_eq!(arena.len(), 2);
    }

    #[rstest]
    fn test_remove_recycles_slot() {
        let mut arena = Arena::new();
        let first = arena.insert(1);
        assert_eq!(arena.remove(first), Some(1));
        assert_eq!(arena.remove(first), None);
        let reused = arena.insert(2);
        assert_eq!(reused, first);
        assert_eq!(arena.len(), 1);
    }

    #[rstest]
    fn test_stale_handle_after_slot_reuse() {
        let mut arena = Arena::new();
        let index = arena.insert(1);
        let handle = arena.handle(index);
        arena.remove(index);
        let reused = arena.insert(2);
        assert_eq!(reused, index);
        assert_eq!(arena.resolve(handle), Err(NodeError::StaleNode));
        assert_eq!(arena.resolve(arena.handle(reused)), Ok(reused));
    }

    #[rstest]
    fn test_clone_rejects_original_handles() {
        let mut arena = Arena::new();
        let index = arena.insert(1);
        let handle = arena.handle(index);
        let copy = arena.clone();
        assert_eq!(copy[index], 1);
        assert_eq!(copy.resolve(handle), Err(NodeError::ForeignNode));
        assert_eq!(arena.resolve(handle), Ok(index));
    }

    #[rstest]
    fn test_clear_rejects_old_handles() {
        let mut arena = Arena::new();
        let index = arena.insert(1);
        let handle = arena.handle(index);
        arena.clear();
        assert_eq!(arena.len(), 0);
        assert_eq!(arena.resolve(handle), Err(NodeError::ForeignNode));
    }
}
