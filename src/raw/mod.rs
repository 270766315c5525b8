//! The core implementation of the concurrent tree.
//!
//! This module contains the [`Raw`][crate::raw::Raw] type, the engine behind
//! [`ConTree`][crate::ConTree]. It implements the locking protocol:
//!
//! * The root pointer lives inside the tree lock. The root *node* may be locked only while holding
//!   the tree lock, and the tree lock is released right after that. Nobody ever waits for the tree
//!   lock while holding a node lock, so replacing the root can't deadlock with a traversal.
//! * Below the root, locks are taken strictly top-down, hand over hand: a child is locked before
//!   its parent is released.
//! * At most two node locks are held while walking and at most three while restructuring.

use std::borrow::Borrow;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use lock_api::{ArcMutexGuard, Mutex, MutexGuard, RawMutex};
use smallvec::SmallVec;
use tracing::{debug, trace};

pub mod debug;
pub(crate) mod node;

use self::node::{adopt, Dir, Link, Locked, Node};

/// Where a descent ended.
enum Seek<K, V, R: RawMutex> {
    /// The key is in `node`. The `parent` is locked too, unless `node` is the root.
    Found {
        parent: Option<Locked<K, V, R>>,
        node: Locked<K, V, R>,
    },
    /// The key is not present. It would go into the empty `dir` slot of `node`.
    Vacant { node: Locked<K, V, R>, dir: Dir },
}

/// Lock-coupling descent from an already locked root.
///
/// The grandparent is released before the next child is locked, therefore no more than two node
/// locks are held at any moment.
fn seek<K, V, R, Q>(mut node: Locked<K, V, R>, key: &Q) -> Seek<K, V, R>
where
    R: RawMutex,
    K: Borrow<Q>,
    Q: ?Sized + Ord,
{
    let mut parent = None;
    loop {
        let dir = match node.dir_to(key) {
            None => return Seek::Found { parent, node },
            Some(dir) => dir,
        };
        drop(parent.take());
        match node.lock_child(dir) {
            None => return Seek::Vacant { node, dir },
            Some(child) => {
                parent = Some(node);
                node = child;
            }
        }
    }
}

/// The engine of the concurrent tree.
///
/// The `R` parameter selects the raw mutex used both for the tree lock and for every node.
pub struct Raw<K, V, R: RawMutex = parking_lot::RawMutex> {
    root: Mutex<R, Option<Link<K, V, R>>>,
    size: AtomicUsize,
}

impl<K, V> Raw<K, V> {
    pub fn new() -> Self {
        Self::with_mutex()
    }
}

impl<K, V, R: RawMutex> Raw<K, V, R> {
    /// Creates an empty tree locked by a custom mutex.
    pub fn with_mutex() -> Self {
        Self {
            root: Mutex::new(None),
            size: AtomicUsize::new(0),
        }
    }

    /// Number of keys in the tree.
    ///
    /// This is a single atomic load; it never blocks.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the tree lock, then the root node if there's one.
    fn lock_root(&self) -> (MutexGuard<'_, R, Option<Link<K, V, R>>>, Option<Locked<K, V, R>>) {
        let tree = self.root.lock();
        let root = tree.as_ref().map(|root| root.lock_arc());
        (tree, root)
    }

    /// Locks the root node and lets go of the tree lock.
    fn enter(&self) -> Option<Locked<K, V, R>> {
        let (_tree, root) = self.lock_root();
        root
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        V: Clone,
    {
        match seek(self.enter()?, key) {
            Seek::Found { node, .. } => Some(node.value.clone()),
            Seek::Vacant { .. } => None,
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.enter() {
            Some(root) => matches!(seek(root, key), Seek::Found { .. }),
            None => false,
        }
    }

    /// Inserts or overwrites the value under the key.
    ///
    /// Returns the previous value, if there was one.
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        K: Ord,
    {
        let root = {
            let mut tree = self.root.lock();
            match tree.as_ref() {
                Some(root) => root.lock_arc(),
                None => {
                    // Unreachable to anyone else until the tree lock is released.
                    *tree = Some(Node::new_link(key, value, Weak::new()));
                    let size = self.size.fetch_add(1, Ordering::AcqRel) + 1;
                    debug!(size, "Planted a new root");
                    return None;
                }
            }
        };

        match seek(root, &key) {
            Seek::Found { mut node, .. } => Some(mem::replace(&mut node.value, value)),
            Seek::Vacant { mut node, dir } => {
                let parent = Arc::downgrade(ArcMutexGuard::mutex(&node));
                *node.child_mut(dir) = Some(Node::new_link(key, value, parent));
                let size = self.size.fetch_add(1, Ordering::AcqRel) + 1;
                trace!(size, ?dir, "Linked a new node");
                None
            }
        }
    }

    pub fn set(&self, key: K, value: V)
    where
        K: Ord,
    {
        self.insert(key, value);
    }

    /// Removes the key.
    ///
    /// Returns if it was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let root = {
            let (mut tree, root) = self.lock_root();
            let mut root = match root {
                Some(root) => root,
                None => return false,
            };
            if root.dir_to(key).is_none() && !root.children().is_all() {
                // The root pointer changes, which is allowed only under the tree lock.
                let orphan = root.left.take().or_else(|| root.right.take());
                if let Some(orphan) = &orphan {
                    orphan.lock_arc().parent = Weak::new();
                }
                *tree = orphan;
                let size = self.size.fetch_sub(1, Ordering::AcqRel) - 1;
                debug!(size, "Replaced the root");
                return true;
            }
            root
        };

        match seek(root, key) {
            Seek::Vacant { .. } => false,
            Seek::Found { parent, node } => {
                if node.children().is_all() {
                    drop(parent);
                    self.promote_successor(node);
                } else {
                    // A root with less than two children was handled under the tree lock and we
                    // held its lock ever since.
                    let parent = parent.expect("Single-child root reached the splice path");
                    self.splice(parent, node);
                }
                true
            }
        }
    }

    /// Unlinks a node with at most one child, putting the child into its place.
    fn splice(&self, mut parent: Locked<K, V, R>, mut node: Locked<K, V, R>) {
        let dir = parent.side_of(ArcMutexGuard::mutex(&node));
        let orphan = node.left.take().or_else(|| node.right.take());
        *parent.child_mut(dir) = orphan.clone();
        let size = self.size.fetch_sub(1, Ordering::AcqRel) - 1;
        // Nobody can reach it any more, the parent no longer points there.
        drop(node);
        if let Some(orphan) = &orphan {
            adopt(&parent, orphan);
        }
        trace!(size, ?dir, orphaned = orphan.is_some(), "Spliced out a node");
    }

    /// Removes the payload of a node with two children.
    ///
    /// The in-order successor (the leftmost node of the right subtree) donates its payload and is
    /// unlinked instead. The node itself stays in place, so nothing above it changes.
    fn promote_successor(&self, mut node: Locked<K, V, R>) {
        let mut heir = node
            .lock_child(Dir::Right)
            .expect("Node with two children has no right child");
        let mut heir_parent: Option<Locked<K, V, R>> = None;
        let mut hops = 0;
        while heir.left.is_some() {
            drop(heir_parent.take());
            let next = heir
                .lock_child(Dir::Left)
                .expect("Left child disappeared under lock");
            heir_parent = Some(heir);
            heir = next;
            hops += 1;
        }

        mem::swap(&mut node.key, &mut heir.key);
        mem::swap(&mut node.value, &mut heir.value);

        let orphan = heir.right.take();
        let (adopter, dir) = match &mut heir_parent {
            Some(heir_parent) => (heir_parent, Dir::Left),
            None => (&mut node, Dir::Right),
        };
        *adopter.child_mut(dir) = orphan.clone();
        let size = self.size.fetch_sub(1, Ordering::AcqRel) - 1;
        // Unlinked, carrying the removed payload away with it.
        drop(heir);
        if let Some(orphan) = &orphan {
            adopt(adopter, orphan);
        }
        trace!(size, hops, "Promoted a successor");
    }
}

impl<K, V, R: RawMutex> Default for Raw<K, V, R> {
    fn default() -> Self {
        Self::with_mutex()
    }
}

impl<K, V, R: RawMutex> Drop for Raw<K, V, R> {
    fn drop(&mut self) {
        // Iteratively, a tree shaped like a list would overflow the stack with the recursive drop.
        // We are &mut, so the links here are the only strong references left.
        let mut pending: SmallVec<[Link<K, V, R>; 16]> = SmallVec::new();
        pending.extend(self.root.get_mut().take());
        while let Some(link) = pending.pop() {
            if let Ok(node) = Arc::try_unwrap(link) {
                let node = node.into_inner();
                pending.extend(node.left);
                pending.extend(node.right);
            }
        }
    }
}
