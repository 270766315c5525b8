//! The lockable vertex of the tree and the single coupling step.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use lock_api::{ArcMutexGuard, Mutex, RawMutex};

/// An owning link to a node.
pub(crate) type Link<K, V, R> = Arc<Mutex<R, Node<K, V, R>>>;

/// A locked node handle.
///
/// The guard owns a strong reference to the node it locks, so a handle stays valid even after the
/// node is unlinked from the tree. Dropping it releases the lock.
pub(crate) type Locked<K, V, R> = ArcMutexGuard<R, Node<K, V, R>>;

/// A child slot of a node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Dir {
    Left,
    Right,
}

bitflags! {
    /// Which child slots of a node are occupied.
    pub(crate) struct Children: u8 {
        const LEFT = 0b01;
        const RIGHT = 0b10;
    }
}

/// A vertex of the concurrent tree.
///
/// All the fields are protected by the mutex that wraps the node. The `parent` is a back-reference
/// only; nodes are owned by the links pointing down to them.
pub(crate) struct Node<K, V, R> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: Option<Link<K, V, R>>,
    pub(crate) right: Option<Link<K, V, R>>,
    pub(crate) parent: Weak<Mutex<R, Node<K, V, R>>>,
}

impl<K, V, R: RawMutex> Node<K, V, R> {
    /// Creates a fresh, unlinked node.
    ///
    /// Nobody else can see it yet, so its fields are written without taking its lock.
    pub(crate) fn new_link(key: K, value: V, parent: Weak<Mutex<R, Self>>) -> Link<K, V, R> {
        Arc::new(Mutex::new(Node {
            key,
            value,
            left: None,
            right: None,
            parent,
        }))
    }

    /// Compares the key with this node's key.
    ///
    /// Returns `None` if they are equal, otherwise the side the key lives on.
    pub(crate) fn dir_to<Q>(&self, key: &Q) -> Option<Dir>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match key.cmp(self.key.borrow()) {
            Ordering::Less => Some(Dir::Left),
            Ordering::Equal => None,
            Ordering::Greater => Some(Dir::Right),
        }
    }

    pub(crate) fn child(&self, dir: Dir) -> Option<&Link<K, V, R>> {
        match dir {
            Dir::Left => self.left.as_ref(),
            Dir::Right => self.right.as_ref(),
        }
    }

    pub(crate) fn child_mut(&mut self, dir: Dir) -> &mut Option<Link<K, V, R>> {
        match dir {
            Dir::Left => &mut self.left,
            Dir::Right => &mut self.right,
        }
    }

    pub(crate) fn children(&self) -> Children {
        let mut children = Children::empty();
        children.set(Children::LEFT, self.left.is_some());
        children.set(Children::RIGHT, self.right.is_some());
        children
    }

    /// Finds which slot of this node holds the given child.
    pub(crate) fn side_of(&self, child: &Link<K, V, R>) -> Dir {
        match &self.left {
            Some(left) if Arc::ptr_eq(left, child) => Dir::Left,
            _ => {
                debug_assert!(
                    self.right.as_ref().map_or(false, |r| Arc::ptr_eq(r, child)),
                    "Node is not a child of its supposed parent"
                );
                Dir::Right
            }
        }
    }

    /// The coupling step.
    ///
    /// Locks the child in `dir` while the caller still holds this node. The caller releases this
    /// node (by dropping its handle) only once it has the child, so the link between them is
    /// never unprotected.
    pub(crate) fn lock_child(&self, dir: Dir) -> Option<Locked<K, V, R>> {
        self.child(dir).map(|child| child.lock_arc())
    }
}

/// Makes `child` point back to the node behind `parent`.
///
/// The child gets locked for the write. Callers hold `parent` and nothing below it, so this is
/// always a top-down acquisition.
pub(crate) fn adopt<K, V, R: RawMutex>(parent: &Locked<K, V, R>, child: &Link<K, V, R>) {
    child.lock_arc().parent = Arc::downgrade(ArcMutexGuard::mutex(parent));
}
