use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::error::{Error, Result};

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) parent: Link<K, V>,
    pub(crate) left: Link<K, V>,
    pub(crate) right: Link<K, V>,
    pub(crate) height: usize,
}

pub(crate) type NodePtr<K, V> = NonNull<Node<K, V>>;
pub(crate) type Link<K, V> = Option<NodePtr<K, V>>;

impl<K, V> Node<K, V> {
    /// Allocates a detached leaf node.
    pub(crate) fn create(parent: Link<K, V>, key: K, value: V) -> Result<NodePtr<K, V>> {
        let layout = Layout::new::<Node<K, V>>();
        // A node always holds three links and a height, so the layout is never zero-sized.
        let raw = unsafe { alloc::alloc(layout) } as *mut Node<K, V>;
        match NonNull::new(raw) {
            Some(node_ptr) => {
                unsafe {
                    node_ptr.as_ptr().write(Node {
                        key,
                        value,
                        parent,
                        left: None,
                        right: None,
                        height: 1,
                    })
                };
                Ok(node_ptr)
            }
            None => {
                log::debug!(
                    "node allocation failed (size {}, align {})",
                    layout.size(),
                    layout.align()
                );
                Err(Error::alloc(layout))
            }
        }
    }

    /// Releases the node memory and hands its key and value back to the caller.
    ///
    /// # Safety
    ///
    /// `node_ptr` must come from [`Node::create`], must not be reachable from any
    /// tree anymore and must not be used afterwards.
    pub(crate) unsafe fn destroy(node_ptr: NodePtr<K, V>) -> (K, V) {
        let node = node_ptr.as_ptr().read();
        alloc::dealloc(node_ptr.as_ptr() as *mut u8, Layout::new::<Node<K, V>>());
        (node.key, node.value)
    }
}

/// Height of an optional subtree, absent subtrees count as 0.
#[inline]
pub(crate) fn height<K, V>(link: Link<K, V>) -> usize {
    match link {
        None => 0,
        Some(node_ptr) => unsafe { node_ptr.as_ref().height },
    }
}

pub(crate) fn leftmost<K, V>(mut node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
    while let Some(left_ptr) = unsafe { node_ptr.as_ref().left } {
        node_ptr = left_ptr;
    }
    node_ptr
}

pub(crate) fn rightmost<K, V>(mut node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
    while let Some(right_ptr) = unsafe { node_ptr.as_ref().right } {
        node_ptr = right_ptr;
    }
    node_ptr
}

/// In-order successor, found through child and parent links only.
pub(crate) fn successor<K, V>(mut node_ptr: NodePtr<K, V>) -> Link<K, V> {
    unsafe {
        if let Some(right_ptr) = node_ptr.as_ref().right {
            return Some(leftmost(right_ptr));
        }
        // Climb while coming up from a right child
        while let Some(parent_ptr) = node_ptr.as_ref().parent {
            if parent_ptr.as_ref().left == Some(node_ptr) {
                return Some(parent_ptr);
            }
            node_ptr = parent_ptr;
        }
        None
    }
}

/// In-order predecessor, mirror of [`successor`].
pub(crate) fn predecessor<K, V>(mut node_ptr: NodePtr<K, V>) -> Link<K, V> {
    unsafe {
        if let Some(left_ptr) = node_ptr.as_ref().left {
            return Some(rightmost(left_ptr));
        }
        while let Some(parent_ptr) = node_ptr.as_ref().parent {
            if parent_ptr.as_ref().right == Some(node_ptr) {
                return Some(parent_ptr);
            }
            node_ptr = parent_ptr;
        }
        None
    }
}

/// A shared handle to a node stored in an [`AvlTree`](crate::AvlTree).
///
/// Handles are returned by lookups and traversal and borrow the tree, so the
/// tree cannot be mutated while a handle is alive.
pub struct NodeRef<'a, K, V> {
    node_ptr: NodePtr<K, V>,
    marker: PhantomData<&'a Node<K, V>>,
}

impl<'a, K, V> NodeRef<'a, K, V> {
    pub(crate) fn new(node_ptr: NodePtr<K, V>) -> Self {
        Self {
            node_ptr,
            marker: PhantomData,
        }
    }

    pub(crate) fn from_link(link: Link<K, V>) -> Option<Self> {
        link.map(Self::new)
    }

    fn node(&self) -> &'a Node<K, V> {
        unsafe { &*self.node_ptr.as_ptr() }
    }

    pub fn key(&self) -> &'a K {
        &self.node().key
    }

    pub fn value(&self) -> &'a V {
        &self.node().value
    }

    pub fn key_value(&self) -> (&'a K, &'a V) {
        let node = self.node();
        (&node.key, &node.value)
    }

    /// Height of the subtree rooted at this node, a leaf has height 1.
    pub fn height(&self) -> usize {
        self.node().height
    }

    pub fn parent(&self) -> Option<Self> {
        Self::from_link(self.node().parent)
    }

    pub fn left(&self) -> Option<Self> {
        Self::from_link(self.node().left)
    }

    pub fn right(&self) -> Option<Self> {
        Self::from_link(self.node().right)
    }

    /// Returns the node with the next larger key.
    pub fn next(&self) -> Option<Self> {
        Self::from_link(successor(self.node_ptr))
    }

    /// Returns the node with the next smaller key.
    pub fn prev(&self) -> Option<Self> {
        Self::from_link(predecessor(self.node_ptr))
    }

    /// Returns true if both handles refer to the same node.
    pub fn ptr_eq(lhs: &Self, rhs: &Self) -> bool {
        lhs.node_ptr == rhs.node_ptr
    }
}

impl<K, V> Clone for NodeRef<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodeRef<'_, K, V> {}

// A handle is a shared borrow of one node.
unsafe impl<K: Sync, V: Sync> Send for NodeRef<'_, K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for NodeRef<'_, K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for NodeRef<'_, K, V> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("NodeRef")
            .field("key", self.key())
            .field("value", self.value())
            .field("height", &self.height())
            .finish()
    }
}
