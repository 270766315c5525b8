//! Inspection of a quiescent tree.
//!
//! Checking the structure and printing its shape, mostly for tests of the engine.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use lock_api::{ArcMutexGuard, RawMutex};

use super::node::{Dir, Locked};
use super::Raw;
use crate::error::Violation;

/// Checks the back-reference of a freshly locked child.
fn points_to<K, V, R: RawMutex>(child: &Locked<K, V, R>, parent: &Locked<K, V, R>) -> bool {
    child.parent.as_ptr() == Arc::as_ptr(ArcMutexGuard::mutex(parent))
}

/// Pushes the node and the whole chain of its left descendants.
///
/// Each entry carries whether the node points back to its parent correctly.
fn push_left<K, V, R: RawMutex>(
    stack: &mut Vec<(Locked<K, V, R>, bool)>,
    mut node: Locked<K, V, R>,
    mut linked: bool,
) {
    loop {
        match node.lock_child(Dir::Left) {
            None => {
                stack.push((node, linked));
                return;
            }
            Some(left) => {
                let left_linked = points_to(&left, &node);
                stack.push((node, linked));
                node = left;
                linked = left_linked;
            }
        }
    }
}

impl<K, V, R> Raw<K, V, R>
where
    K: Ord,
    R: RawMutex,
{
    // The &mut rules out any operation in flight, so the walk may hold a whole path of locks.
    /// Checks the structural invariants of the tree.
    ///
    /// * An in-order walk yields strictly increasing keys.
    /// * Every child points back to its parent and the root has none.
    /// * The size equals the number of reachable nodes.
    pub fn validate(&mut self) -> Result<(), Violation> {
        let mut stack = Vec::new();
        if let Some(root) = self.root.get_mut() {
            let root = root.lock_arc();
            if root.parent.upgrade().is_some() {
                return Err(Violation::RootParent);
            }
            push_left(&mut stack, root, true);
        }

        let mut prev: Option<Locked<K, V, R>> = None;
        let mut counted = 0;
        while let Some((node, linked)) = stack.pop() {
            if !linked {
                return Err(Violation::Parent { position: counted });
            }
            if let Some(prev) = &prev {
                if prev.key >= node.key {
                    return Err(Violation::Order { position: counted });
                }
            }
            if let Some(right) = node.lock_child(Dir::Right) {
                let right_linked = points_to(&right, &node);
                push_left(&mut stack, right, right_linked);
            }
            prev = Some(node);
            counted += 1;
        }
        drop(prev);

        let recorded = self.len();
        if recorded == counted {
            Ok(())
        } else {
            Err(Violation::Size { recorded, counted })
        }
    }
}

/// A pending piece of the printed shape.
enum Print<K, V, R: RawMutex> {
    Subtree(Option<Locked<K, V, R>>),
    /// The left subtree is done, the key and the right subtree follow.
    Key(Locked<K, V, R>),
    Close,
}

/// A pretty-printing wrapper around the raw tree.
///
/// Every node is printed as `(left key right)` and an empty subtree as `()`. The walk uses its own
/// stack, so even a tree degraded into a long list prints fine.
///
/// It borrows the tree mutably, for the same reason as [`validate`][Raw::validate]: the walk keeps
/// a whole path of nodes locked.
pub struct PrintShape<'a, K, V, R: RawMutex>(pub &'a mut Raw<K, V, R>);

impl<K, V, R> Display for PrintShape<'_, K, V, R>
where
    K: Debug,
    R: RawMutex,
{
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let root = self.0.root.lock().as_ref().map(|root| root.lock_arc());
        let mut pending = vec![Print::Subtree(root)];
        while let Some(step) = pending.pop() {
            match step {
                Print::Subtree(None) => write!(fmt, "()")?,
                Print::Subtree(Some(node)) => {
                    write!(fmt, "(")?;
                    let left = node.lock_child(Dir::Left);
                    pending.push(Print::Key(node));
                    pending.push(Print::Subtree(left));
                }
                Print::Key(node) => {
                    write!(fmt, " {:?} ", node.key)?;
                    let right = node.lock_child(Dir::Right);
                    drop(node);
                    pending.push(Print::Close);
                    pending.push(Print::Subtree(right));
                }
                Print::Close => write!(fmt, ")")?,
            }
        }
        Ok(())
    }
}
