//! Error types for node-handle operations.
//!
//! The AVL and splay maps hand out [`NodeRef`](crate::arena::NodeRef)
//! handles. Using a handle with the wrong map, or after its node was
//! erased, is a programmer error: `erase` panics with the message below,
//! while `try_erase` returns the [`NodeError`] instead.

use std::fmt;

/// Represents a rejected node handle.
///
/// # Examples
///
/// ```rust
/// use ordered_maps::error::NodeError;
///
/// assert_eq!(
///     format!("{}", NodeError::ForeignNode),
///     "node handle belongs to a different map"
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeError {
    /// The handle was issued by another map instance.
    ForeignNode,
    /// The handle's node has already been erased from this map.
    StaleNode,
}

impl fmt::Display for NodeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignNode => write!(formatter, "node handle belongs to a different map"),
            Self::StaleNode => write!(formatter, "node handle refers to an erased node"),
        }
    }
}

impl std::error::Error for NodeError {}
