//! B-tree engines.
//!
//! Two maps share one implementation of the B-tree algorithms:
//!
//! - [`BTreeMap`]: single-owner, mutated in place.
//! - [`PersistentBTreeMap`]: copy-on-write nodes behind an atomically
//!   published root, readable from many threads while one writer works.
//!
//! Both keep between [`MIN_ENTRIES`] and [`MAX_ENTRIES`] entries in every
//! non-root node.

mod cursor;
mod map;
mod node;
#[cfg(feature = "persistent")]
mod persistent;

pub use map::{BTreeMap, Cursor, Iter, Range};
pub use node::{DEGREE, MAX_ENTRIES, MIN_ENTRIES};
#[cfg(feature = "persistent")]
pub use persistent::{Entries, PersistentBTreeMap, Snapshot, SnapshotCursor, SnapshotIter};
