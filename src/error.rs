//! The [`Violation`][crate::Violation] error.

use thiserror::Error;

/// A broken structural invariant, as found by `validate`.
///
/// Positions are indices in the in-order walk of the tree (the smallest key is at 0).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum Violation {
    /// The key at the position is not greater than the one before it.
    #[error("Key at in-order position {position} breaks the ordering")]
    Order { position: usize },
    /// The node at the position doesn't point back to the node it hangs from.
    #[error("Node at in-order position {position} has a wrong parent reference")]
    Parent { position: usize },
    /// The root claims to have a parent.
    #[error("The root has a parent")]
    RootParent,
    /// The recorded size disagrees with the number of reachable nodes.
    #[error("Size is {recorded}, but {counted} nodes are reachable")]
    Size { recorded: usize, counted: usize },
}
