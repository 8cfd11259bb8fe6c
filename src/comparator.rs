//! Caller-supplied key orderings.
//!
//! Every map in this crate orders its keys through a [`Comparator`], which
//! answers a single question: is `left` strictly less than `right`?
//! Equivalence is derived from it as `!less(a, b) && !less(b, a)`; no
//! separate equality is ever consulted.
//!
//! The order must be a strict weak ordering (irreflexive, asymmetric,
//! transitive, and transitive on equivalence). Violating this leaves the
//! tree shape and query results unspecified, but never unsafe.
//!
//! # Examples
//!
//! ```rust
//! use ordered_maps::comparator::{Comparator, NaturalOrder, ReverseOrder};
//!
//! assert!(NaturalOrder.less(&1, &2));
//! assert!(ReverseOrder.less(&2, &1));
//!
//! let by_length = |left: &&str, right: &&str| left.len() < right.len();
//! assert!(by_length.less(&"ab", &"abc"));
//! assert!(by_length.equivalent(&"ab", &"xy"));
//! ```

/// A strict weak ordering over `K`.
///
/// Implemented for every `Fn(&K, &K) -> bool` closure, so any `less`
/// function can be passed directly to `with_comparator`.
pub trait Comparator<K: ?Sized> {
    /// Returns `true` if `left` orders strictly before `right`.
    fn less(&self, left: &K, right: &K) -> bool;

    /// Returns `true` if neither key orders before the other.
    #[inline]
    fn equivalent(&self, left: &K, right: &K) -> bool {
        !self.less(left, right) && !self.less(right, left)
    }
}

impl<K: ?Sized, F> Comparator<K> for F
where
    F: Fn(&K, &K) -> bool,
{
    #[inline]
    fn less(&self, left: &K, right: &K) -> bool {
        self(left, right)
    }
}

/// Ascending order given by [`Ord`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NaturalOrder;

impl<K: Ord + ?Sized> Comparator<K> for NaturalOrder {
    #[inline]
    fn less(&self, left: &K, right: &K) -> bool {
        left < right
    }
}

/// Descending order given by [`Ord`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReverseOrder;

impl<K: Ord + ?Sized> Comparator<K> for ReverseOrder {
    #[inline]
    fn less(&self, left: &K, right: &K) -> bool {
        right < left
    }
}
