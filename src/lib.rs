//! # ordered-maps
//!
//! Ordered associative containers over a caller-supplied key order.
//!
//! ## Overview
//!
//! Four engines implement one contract, [`OrderedMap`](ordered_map::OrderedMap):
//! point lookup, insert-or-overwrite, delete, length and a bidirectional
//! [`MapCursor`](ordered_map::MapCursor) with `seek` and `seek_prev`.
//!
//! - **B-tree**: [`btree::BTreeMap`], wide nodes mutated in place.
//! - **Persistent B-tree**: [`btree::PersistentBTreeMap`], copy-on-write
//!   nodes, lock-free readers, O(1) clone.
//! - **AVL**: [`avl::AvlTreeMap`], height-balanced, with stable node handles.
//! - **Splay**: [`splay::SplayTreeMap`], self-adjusting, with stable node
//!   handles.
//!
//! Keys are ordered by a [`Comparator`](comparator::Comparator): any
//! `Fn(&K, &K) -> bool` strict "less than", or [`NaturalOrder`](comparator::NaturalOrder)
//! for `K: Ord`.
//!
//! ## Feature Flags
//!
//! - `btree`: the mutable B-tree map
//! - `persistent`: the persistent B-tree map (implies `btree`)
//! - `avl`: the AVL tree map
//! - `splay`: the splay tree map
//! - `tracing`: structured events at structural milestones
//!
//! ## Example
//!
//! ```rust
//! use ordered_maps::prelude::*;
//!
//! let mut map = BTreeMap::new();
//! map.set("b", 2);
//! map.set("a", 1);
//!
//! let mut cursor = map.cursor();
//! assert!(cursor.first());
//! assert_eq!(cursor.key(), Some(&"a"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports the contract traits, the comparators and every enabled
/// engine.
///
/// # Usage
///
/// ```rust
/// use ordered_maps::prelude::*;
/// ```
pub mod prelude {
    pub use crate::comparator::{Comparator, NaturalOrder, ReverseOrder};
    pub use crate::error::NodeError;
    pub use crate::ordered_map::{MapCursor, OrderedMap};

    #[cfg(any(feature = "avl", feature = "splay"))]
    pub use crate::arena::NodeRef;

    #[cfg(feature = "btree")]
    pub use crate::btree::BTreeMap;

    #[cfg(feature = "persistent")]
    pub use crate::btree::{PersistentBTreeMap, Snapshot};

    #[cfg(feature = "avl")]
    pub use crate::avl::AvlTreeMap;

    #[cfg(feature = "splay")]
    pub use crate::splay::SplayTreeMap;
}

pub mod comparator;
pub mod error;
pub mod ordered_map;

#[cfg(any(feature = "avl", feature = "splay"))]
pub mod arena;

#[cfg(feature = "btree")]
pub mod btree;

#[cfg(feature = "avl")]
pub mod avl;

#[cfg(feature = "splay")]
pub mod splay;
