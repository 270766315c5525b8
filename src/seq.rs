//! The [`SeqTree`][crate::SeqTree], a plain single-threaded binary search tree.
//!
//! It serves as the sequential reference for the [`ConTree`][crate::ConTree]: it runs the same
//! algorithm, just without any locking. The nodes live in an arena and link to each other by
//! index, which gives cheap parent references without shared ownership.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::mem;

use crate::error::Violation;

type Index = usize;

struct SeqNode<K, V> {
    key: K,
    value: V,
    left: Option<Index>,
    right: Option<Index>,
    parent: Option<Index>,
}

/// A single-threaded, unbalanced binary search tree.
///
/// ```rust
/// use contree::SeqTree;
///
/// let mut tree = SeqTree::new();
/// tree.set(2, "two");
/// tree.set(1, "one");
/// assert_eq!(Some(&"one"), tree.get(&1));
/// assert!(tree.remove(&2));
/// assert!(!tree.remove(&2));
/// assert_eq!(1, tree.len());
/// ```
pub struct SeqTree<K, V> {
    slots: Vec<Option<SeqNode<K, V>>>,
    free: Vec<Index>,
    root: Option<Index>,
    len: usize,
}

impl<K, V> SeqTree<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, idx: Index) -> &SeqNode<K, V> {
        self.slots[idx].as_ref().expect("Link to a freed slot")
    }

    fn node_mut(&mut self, idx: Index) -> &mut SeqNode<K, V> {
        self.slots[idx].as_mut().expect("Link to a freed slot")
    }

    fn alloc(&mut self, node: SeqNode<K, V>) -> Index {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, idx: Index) -> SeqNode<K, V> {
        let node = self.slots[idx].take().expect("Double free of a slot");
        self.free.push(idx);
        node
    }

    fn find<Q>(&self, key: &Q) -> Option<Index>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut cur = self.root;
        while let Some(idx) = cur {
            let node = self.node(idx);
            cur = match key.cmp(node.key.borrow()) {
                Ordering::Less => node.left,
                Ordering::Equal => return Some(idx),
                Ordering::Greater => node.right,
            };
        }
        None
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.find(key).map(|idx| &self.node(idx).value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.find(key).is_some()
    }

    /// Inserts or overwrites the value under the key.
    ///
    /// Returns the previous value, if there was one.
    pub fn insert(&mut self, key: K, value: V) -> Option<V>
    where
        K: Ord,
    {
        let mut parent = None;
        let mut cur = self.root;
        let mut ordering = Ordering::Equal;
        while let Some(idx) = cur {
            let node = self.node(idx);
            ordering = key.cmp(&node.key);
            parent = cur;
            cur = match ordering {
                Ordering::Less => node.left,
                Ordering::Equal => break,
                Ordering::Greater => node.right,
            };
        }

        if let Some(idx) = cur {
            return Some(mem::replace(&mut self.node_mut(idx).value, value));
        }

        let idx = self.alloc(SeqNode {
            key,
            value,
            left: None,
            right: None,
            parent,
        });
        match parent {
            None => self.root = Some(idx),
            Some(parent) if ordering == Ordering::Less => self.node_mut(parent).left = Some(idx),
            Some(parent) => self.node_mut(parent).right = Some(idx),
        }
        self.len += 1;
        None
    }

    pub fn set(&mut self, key: K, value: V)
    where
        K: Ord,
    {
        self.insert(key, value);
    }

    /// Removes the key.
    ///
    /// Returns if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let idx = match self.find(key) {
            Some(idx) => idx,
            None => return false,
        };

        let node = self.node(idx);
        if let (Some(_), Some(right)) = (node.left, node.right) {
            // Move the successor's payload up and drop the old one together with its slot.
            let successor = self.min_in(right);
            let mut donor = self.detach(successor);
            let node = self.node_mut(idx);
            mem::swap(&mut node.key, &mut donor.key);
            mem::swap(&mut node.value, &mut donor.value);
        } else {
            self.detach(idx);
        }
        self.len -= 1;
        true
    }

    fn min_in(&self, mut idx: Index) -> Index {
        while let Some(left) = self.node(idx).left {
            idx = left;
        }
        idx
    }

    /// Unlinks a node with at most one child and frees its slot.
    fn detach(&mut self, idx: Index) -> SeqNode<K, V> {
        let node = self.release(idx);
        debug_assert!(node.left.is_none() || node.right.is_none());
        let orphan = node.left.or(node.right);
        if let Some(orphan) = orphan {
            self.node_mut(orphan).parent = node.parent;
        }
        match node.parent {
            None => self.root = orphan,
            Some(parent) => {
                let parent = self.node_mut(parent);
                if parent.left == Some(idx) {
                    parent.left = orphan;
                } else {
                    parent.right = orphan;
                }
            }
        }
        node
    }

    /// Checks the structural invariants, the same ones as
    /// [`ConTree::validate`][crate::ConTree::validate].
    pub fn validate(&self) -> Result<(), Violation>
    where
        K: Ord,
    {
        if let Some(root) = self.root {
            if self.node(root).parent.is_some() {
                return Err(Violation::RootParent);
            }
        }

        // Each entry remembers if the node points back to where we came from.
        let mut stack = Vec::new();
        let mut prev: Option<Index> = None;
        let mut counted = 0;
        let mut cur = self.root.map(|idx| (idx, None));
        loop {
            while let Some((idx, parent)) = cur {
                let node = self.node(idx);
                stack.push((idx, node.parent == parent));
                cur = node.left.map(|left| (left, Some(idx)));
            }
            let (idx, linked) = match stack.pop() {
                Some(entry) => entry,
                None => break,
            };
            if !linked {
                return Err(Violation::Parent { position: counted });
            }
            let node = self.node(idx);
            if let Some(prev) = prev {
                if self.node(prev).key >= node.key {
                    return Err(Violation::Order { position: counted });
                }
            }
            prev = Some(idx);
            counted += 1;
            cur = node.right.map(|right| (right, Some(idx)));
        }

        if counted == self.len {
            Ok(())
        } else {
            Err(Violation::Size {
                recorded: self.len,
                counted,
            })
        }
    }
}

#[cfg(test)]
impl<K: std::fmt::Debug, V> SeqTree<K, V> {
    /// The same format as [`PrintShape`][crate::raw::debug::PrintShape].
    pub(crate) fn shape(&self) -> String {
        fn print<K, V>(tree: &SeqTree<K, V>, idx: Option<Index>, out: &mut String)
        where
            K: std::fmt::Debug,
        {
            match idx {
                None => out.push_str("()"),
                Some(idx) => {
                    let node = tree.node(idx);
                    out.push('(');
                    print(tree, node.left, out);
                    out.push_str(&format!(" {:?} ", node.key));
                    print(tree, node.right, out);
                    out.push(')');
                }
            }
        }
        let mut out = String::new();
        print(self, self.root, &mut out);
        out
    }
}

impl<K, V> Default for SeqTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
