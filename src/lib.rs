//! An ordered key-value map implemented with an AVL tree.
//!
//! Every node links to its parent as well as to its children. Rebalancing uses
//! the parent links to walk back up after a mutation, and in-order traversal
//! ([`AvlTree::first_node`], [`AvlTree::next_node`]) needs neither a stack nor
//! recursion.
//!
//! ```
//! use linked_avl::AvlTree;
//!
//! let mut tree = AvlTree::new();
//! for key in [5, 3, 8, 1, 4, 7, 9] {
//!     tree.put(key, key * 10);
//! }
//! assert_eq!(tree.get(&4), Some(&40));
//! assert!(tree.delete(&3));
//! assert!(!tree.contains_key(&3));
//! assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 4, 5, 7, 8, 9]);
//! ```
//!
//! Key order is configurable through a [`Comparator`]:
//!
//! ```
//! use linked_avl::{AvlTree, Reverse};
//!
//! let mut tree = AvlTree::with_comparator(Reverse);
//! tree.put(1, "one");
//! tree.put(2, "two");
//! assert_eq!(tree.first_node().map(|node| *node.key()), Some(2));
//! ```

mod compare;
mod error;
mod iter;
mod node;
mod tree;

pub use compare::{Comparator, Natural, Reverse};
pub use error::{Error, Result};
pub use iter::{Iter, IterMut, Keys, Values, ValuesMut};
pub use node::NodeRef;
pub use tree::AvlTree;
