//! The [`ConTree`][crate::ConTree] type and its trait implementations.

use std::borrow::Borrow;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::iter::FromIterator;

use lock_api::RawMutex;
#[cfg(feature = "rayon")]
use rayon::iter::{FromParallelIterator, IntoParallelIterator, ParallelExtend, ParallelIterator};

use crate::error::Violation;
use crate::raw::Raw;

/// A concurrent ordered map, as a binary search tree with a lock in every node.
///
/// Readers and writers walk down the tree hand over hand, so operations in different parts of the
/// tree don't block each other. Every operation is linearizable.
///
/// Looking up returns a clone of the value, therefore the map is more suitable for values that
/// are cheap to copy. More expensive values can be wrapped in an `Arc`.
///
/// The tree is not balanced. Inserting keys in sorted order turns it into a list.
///
/// The `R` type parameter chooses the mutex used for the tree and its nodes.
///
/// The [`FromIterator`] and [`Extend`] traits accept tuples as arguments. The [`Extend`] is also
/// implemented for shared references, to allow extending the same tree concurrently from multiple
/// threads.
///
/// # Examples
///
/// ```rust
/// use contree::ConTree;
/// use crossbeam_utils::thread;
///
/// let tree = ConTree::new();
///
/// thread::scope(|s| {
///     s.spawn(|_| {
///         tree.set("hello", 1);
///     });
///     s.spawn(|_| {
///         tree.set("world", 2);
///     });
/// }).unwrap();
///
/// assert_eq!(Some(1), tree.get("hello"));
/// assert_eq!(Some(2), tree.get("world"));
/// assert!(tree.remove("world"));
/// assert_eq!(None, tree.get("world"));
/// assert_eq!(1, tree.len());
/// ```
pub struct ConTree<K, V, R: RawMutex = parking_lot::RawMutex> {
    raw: Raw<K, V, R>,
}

impl<K, V> ConTree<K, V> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::with_mutex()
    }
}

impl<K, V, R: RawMutex> ConTree<K, V, R> {
    /// Creates an empty tree using a different mutex.
    ///
    /// ```rust
    /// use contree::ConTree;
    ///
    /// let tree: ConTree<u32, &str, parking_lot::RawFairMutex> = ConTree::with_mutex();
    /// tree.set(1, "one");
    /// assert_eq!(Some("one"), tree.get(&1));
    /// ```
    pub fn with_mutex() -> Self {
        Self {
            raw: Raw::with_mutex(),
        }
    }

    /// Number of keys in the tree.
    ///
    /// Doesn't lock anything.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Looks up the value under the key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        V: Clone,
    {
        self.raw.get(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.contains_key(key)
    }

    /// Inserts a value, returning the one previously stored under the key.
    ///
    /// An existing key keeps its place in the tree and only the value is replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        K: Ord,
    {
        self.raw.insert(key, value)
    }

    /// Inserts a value, forgetting the previous one.
    pub fn set(&self, key: K, value: V)
    where
        K: Ord,
    {
        self.raw.set(key, value)
    }

    /// Removes the key.
    ///
    /// Returns `true` if the key was present. When multiple threads remove the same key at once,
    /// exactly one of them gets `true`.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key)
    }

    /// Checks the structural invariants of the tree.
    ///
    /// This requires exclusive access, so there's no modification in progress. A correctly
    /// working tree always passes.
    pub fn validate(&mut self) -> Result<(), Violation>
    where
        K: Ord,
    {
        self.raw.validate()
    }

    /// Access to the underlying engine.
    pub fn raw(&self) -> &Raw<K, V, R> {
        &self.raw
    }

    /// Exclusive access to the underlying engine, as needed by
    /// [`PrintShape`][crate::raw::debug::PrintShape].
    pub fn raw_mut(&mut self) -> &mut Raw<K, V, R> {
        &mut self.raw
    }
}

impl<K, V, R: RawMutex> Default for ConTree<K, V, R> {
    fn default() -> Self {
        Self::with_mutex()
    }
}

impl<K, V, R: RawMutex> Debug for ConTree<K, V, R> {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("ConTree")
            .field("len", &self.len())
            .finish()
    }
}

impl<'a, K, V, R> Extend<(K, V)> for &'a ConTree<K, V, R>
where
    K: Ord,
    R: RawMutex,
{
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl<K, V, R> Extend<(K, V)> for ConTree<K, V, R>
where
    K: Ord,
    R: RawMutex,
{
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = (K, V)>,
    {
        let mut me: &ConTree<_, _, _> = self;
        me.extend(iter);
    }
}

impl<K, V, R> FromIterator<(K, V)> for ConTree<K, V, R>
where
    K: Ord,
    R: RawMutex,
{
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (K, V)>,
    {
        let mut me = ConTree::with_mutex();
        me.extend(iter);
        me
    }
}

#[cfg(feature = "rayon")]
impl<K, V, R> ParallelExtend<(K, V)> for ConTree<K, V, R>
where
    K: Ord + Send + Sync,
    V: Send + Sync,
    R: RawMutex + Send + Sync,
{
    fn par_extend<T>(&mut self, par_iter: T)
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        let mut me: &ConTree<_, _, _> = self;
        me.par_extend(par_iter);
    }
}

#[cfg(feature = "rayon")]
impl<'a, K, V, R> ParallelExtend<(K, V)> for &'a ConTree<K, V, R>
where
    K: Ord + Send + Sync,
    V: Send + Sync,
    R: RawMutex + Send + Sync,
{
    fn par_extend<T>(&mut self, par_iter: T)
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        let me: &ConTree<_, _, _> = self;
        par_iter.into_par_iter().for_each(|(k, v)| {
            me.set(k, v);
        });
    }
}

#[cfg(feature = "rayon")]
impl<K, V, R> FromParallelIterator<(K, V)> for ConTree<K, V, R>
where
    K: Ord + Send + Sync,
    V: Send + Sync,
    R: RawMutex + Send + Sync,
{
    fn from_par_iter<T>(par_iter: T) -> Self
    where
        T: IntoParallelIterator<Item = (K, V)>,
    {
        let mut me = ConTree::with_mutex();
        me.par_extend(par_iter);
        me
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use crossbeam_utils::thread;
    use lock_api::GuardSend;
    #[cfg(feature = "rayon")]
    use rayon::prelude::*;

    use super::*;

    const TEST_THREADS: usize = 100;
    const TEST_BATCH_SMALL: usize = 100;

    // A hang means a deadlock; fail instead of waiting forever.
    fn within_deadline<F: FnOnce() + Send + 'static>(f: F) {
        let (sender, receiver) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            f();
            let _ = sender.send(());
        });
        match receiver.recv_timeout(Duration::from_secs(60)) {
            Ok(()) => handle.join().unwrap(),
            // Dropped without sending, the closure panicked. Report its panic, not a timeout.
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                panic!("Operations didn't finish in time, deadlocked?")
            }
        }
    }

    struct RawSpinlock(AtomicBool);

    unsafe impl RawMutex for RawSpinlock {
        #[allow(clippy::declare_interior_mutable_const)]
        const INIT: RawSpinlock = RawSpinlock(AtomicBool::new(false));

        type GuardMarker = GuardSend;

        fn lock(&self) {
            while !self.try_lock() {
                std::hint::spin_loop();
            }
        }

        fn try_lock(&self) -> bool {
            self.0
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        }

        unsafe fn unlock(&self) {
            self.0.store(false, Ordering::Release);
        }
    }

    #[test]
    fn create_destroy() {
        let tree: ConTree<String, usize> = ConTree::new();
        drop(tree);
    }

    #[test]
    fn lookup_empty() {
        let tree: ConTree<String, usize> = ConTree::new();
        assert!(tree.get("hello").is_none());
        assert!(!tree.contains_key("hello"));
        assert!(tree.is_empty());
    }

    #[test]
    fn insert_lookup() {
        let tree = ConTree::new();
        assert!(tree.insert("hello", "world").is_none());
        assert!(tree.get("world").is_none());
        assert_eq!(Some("world"), tree.get("hello"));
        assert!(tree.contains_key("hello"));
    }

    #[test]
    fn insert_overwrite_lookup() {
        let tree = ConTree::new();
        assert!(tree.insert("hello", "world").is_none());
        assert_eq!(Some("world"), tree.insert("hello", "universe"));
        assert_eq!(Some("universe"), tree.get("hello"));
        assert_eq!(1, tree.len());
    }

    #[test]
    fn simple_remove() {
        let tree = ConTree::new();
        assert!(!tree.remove(&42));
        assert!(tree.insert(42, "hello").is_none());
        assert_eq!(Some("hello"), tree.get(&42));
        assert!(tree.remove(&42));
        assert!(tree.get(&42).is_none());
        assert!(tree.is_empty());
        assert!(!tree.remove(&42));
        assert!(tree.is_empty());
    }

    #[test]
    #[should_panic(expected = "broken on purpose")]
    fn deadline_reports_panic() {
        within_deadline(|| panic!("broken on purpose"));
    }

    #[test]
    fn root_contention() {
        within_deadline(|| {
            let tree = ConTree::new();
            thread::scope(|s| {
                for _ in 0..TEST_THREADS {
                    s.spawn(|_| {
                        tree.set(0, 0);
                        tree.remove(&0);
                    });
                }
            })
            .unwrap();
            // Whoever was last, it removed the key.
            assert!(tree.is_empty());
        });
    }

    #[test]
    fn root_overwrite_race() {
        within_deadline(|| {
            let mut tree = ConTree::new();
            thread::scope(|s| {
                for i in 0..TEST_THREADS {
                    let tree = &tree;
                    s.spawn(move |_| tree.set(0, i));
                }
            })
            .unwrap();
            assert_eq!(1, tree.len());
            assert!(tree.get(&0).unwrap() < TEST_THREADS);
            tree.validate().unwrap();
        });
    }

    #[test]
    fn custom_mutex() {
        let mut tree: ConTree<usize, usize, RawSpinlock> = ConTree::with_mutex();
        thread::scope(|s| {
            for t in 0..4 {
                let tree = &tree;
                s.spawn(move |_| {
                    for i in 0..TEST_BATCH_SMALL {
                        tree.set(i * 4 + t, t);
                    }
                    for i in 0..TEST_BATCH_SMALL / 2 {
                        assert!(tree.remove(&(i * 4 + t)));
                    }
                });
            }
        })
        .unwrap();
        tree.validate().unwrap();
        assert_eq!(2 * TEST_BATCH_SMALL, tree.len());
    }

    #[test]
    fn extend_shared() {
        let mut tree = ConTree::new();
        thread::scope(|s| {
            for t in 0..4 {
                let mut tree = &tree;
                s.spawn(move |_| {
                    tree.extend((0..TEST_BATCH_SMALL).map(|i| (i * 4 + t, t)));
                });
            }
        })
        .unwrap();
        tree.validate().unwrap();
        assert_eq!(4 * TEST_BATCH_SMALL, tree.len());
        for i in 0..4 * TEST_BATCH_SMALL {
            assert_eq!(Some(i % 4), tree.get(&i));
        }
    }

    #[test]
    fn from_iter() {
        let mut tree: ConTree<_, _> = vec![(3, "c"), (1, "a"), (2, "b"), (1, "x")]
            .into_iter()
            .collect();
        assert_eq!(3, tree.len());
        assert_eq!(Some("x"), tree.get(&1));
        tree.validate().unwrap();
    }

    #[test]
    fn debug_shows_len() {
        let tree: ConTree<u8, u8> = (0..3).map(|i| (i, i)).collect();
        assert_eq!("ConTree { len: 3 }", format!("{:?}", tree));
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn rayon_extend() {
        let mut tree = ConTree::new();
        tree.par_extend((0..TEST_BATCH_SMALL).into_par_iter().map(|i| (i, i)));
        tree.validate().unwrap();
        for i in 0..TEST_BATCH_SMALL {
            assert_eq!(Some(i), tree.get(&i));
        }
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn rayon_from_par_iter() {
        let mut tree: ConTree<_, _> =
            ConTree::from_par_iter((0..TEST_BATCH_SMALL).into_par_iter().map(|i| (i, i)));
        tree.validate().unwrap();
        assert_eq!(TEST_BATCH_SMALL, tree.len());
    }
}
