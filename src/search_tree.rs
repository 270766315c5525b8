//! The [`SearchTree`][crate::SearchTree] trait.

use crate::map::ConTree;
use crate::seq::SeqTree;

/// The operations shared by both trees.
///
/// This exists so the same sequence of operations can be driven through either tree and the
/// results compared, with the [`SeqTree`] acting as the reference for the [`ConTree`].
///
/// ```rust
/// use contree::{ConTree, SearchTree, SeqTree};
///
/// fn fill<T: SearchTree<u32, u32>>(tree: &mut T) {
///     for i in 0..10 {
///         tree.set(i, i * 2);
///     }
///     tree.remove(&4);
/// }
///
/// let mut seq = SeqTree::new();
/// let mut con = ConTree::new();
/// fill(&mut seq);
/// fill(&mut con);
/// for i in 0..10 {
///     assert_eq!(SearchTree::get(&seq, &i), SearchTree::get(&con, &i));
/// }
/// ```
pub trait SearchTree<K, V> {
    /// Inserts the value, overwriting any previous one under the same key.
    fn set(&mut self, key: K, value: V);

    /// Looks up the value under the key.
    fn get(&self, key: &K) -> Option<V>;

    /// Removes the key, returning if it was present.
    fn remove(&mut self, key: &K) -> bool;
}

impl<K: Ord, V: Clone> SearchTree<K, V> for SeqTree<K, V> {
    fn set(&mut self, key: K, value: V) {
        SeqTree::set(self, key, value)
    }

    fn get(&self, key: &K) -> Option<V> {
        SeqTree::get(self, key).cloned()
    }

    fn remove(&mut self, key: &K) -> bool {
        SeqTree::remove(self, key)
    }
}

impl<K, V, R> SearchTree<K, V> for ConTree<K, V, R>
where
    K: Ord,
    V: Clone,
    R: lock_api::RawMutex,
{
    fn set(&mut self, key: K, value: V) {
        ConTree::set(self, key, value)
    }

    fn get(&self, key: &K) -> Option<V> {
        ConTree::get(self, key)
    }

    fn remove(&mut self, key: &K) -> bool {
        ConTree::remove(self, key)
    }
}
