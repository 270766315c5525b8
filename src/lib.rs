#![doc(html_root_url = "https://docs.rs/contree/0.1.0")]

//! A concurrent binary search tree with fine-grained locking.
//!
//! The [`ConTree`] is an ordered map where many threads can look up, insert and remove at the same
//! time. Instead of one lock for the whole tree, every node carries its own lock and operations
//! walk down the tree *hand over hand* (also called lock coupling): the lock of the next node is
//! acquired before the lock of the current one is released, so no other thread can slip in and
//! change the link between them.
//!
//! # The locking protocol
//!
//! * The pointer to the root is guarded by a tree-wide lock. The root node itself may be locked
//!   only while holding the tree lock, which is released as soon as the root node is locked. A
//!   thread never waits for the tree lock while holding any node lock, so a thread replacing the
//!   root can't deadlock with one that's in the middle of the tree.
//! * All the other locks are taken top-down, parent before child. Together with the above this
//!   rules out any circular wait.
//! * At most two node locks are held during a walk and at most three while unlinking a node.
//! * Removing a key from a node with two children moves the in-order successor's key and value up
//!   into that node and unlinks the successor instead. The node that stays in place is never
//!   replaced, so nothing above it needs to be touched.
//!
//! Every operation is linearizable: it behaves as if it happened atomically at some instant
//! between its call and return.
//!
//! # Limitations
//!
//! * The tree is not balanced. Keys inserted in sorted order make it a linked list and every
//!   operation becomes linear.
//! * There's no iteration and there are no range queries.
//! * Values are cloned on lookup.
//!
//! # The sequential tree
//!
//! The [`SeqTree`] is the same algorithm without any locking. Both implement the [`SearchTree`]
//! trait, so a single sequence of operations can be checked against both of them.
//!
//! # Features
//!
//! The `rayon` feature adds `ParallelExtend` and `FromParallelIterator` implementations for the
//! [`ConTree`].
//!
//! # Examples
//!
//! ```rust
//! use contree::ConTree;
//! use crossbeam_utils::thread;
//!
//! let tree = ConTree::new();
//!
//! thread::scope(|s| {
//!     for t in 0..4 {
//!         let tree = &tree;
//!         s.spawn(move |_| {
//!             for i in 0..100 {
//!                 tree.set(i * 4 + t, t);
//!             }
//!         });
//!     }
//! }).unwrap();
//!
//! assert_eq!(400, tree.len());
//! assert_eq!(Some(3), tree.get(&7));
//! ```

mod error;
mod map;
pub mod raw;
mod search_tree;
mod seq;

pub use self::error::Violation;
pub use self::map::ConTree;
pub use self::search_tree::SearchTree;
pub use self::seq::SeqTree;
