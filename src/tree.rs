use std::alloc::{self, Layout};
use std::cmp::{self, Ordering};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use crate::compare::{Comparator, Natural};
use crate::error::{Error, Result};
use crate::iter::{Iter, IterMut, Keys, Values, ValuesMut};
use crate::node::{self, Link, Node, NodePtr, NodeRef};

/// An ordered map implemented with an AVL tree whose nodes keep a link to their parent.
///
/// Parent links make in-order traversal stackless: [`first_node`] and
/// [`next_node`] walk the tree through the nodes' own pointers only.
///
/// ```
/// use linked_avl::AvlTree;
/// let mut tree = AvlTree::new();
/// tree.put(2, "two");
/// tree.put(1, "one");
/// tree.put(3, "three");
/// assert_eq!(tree.get(&1), Some(&"one"));
///
/// let mut keys = Vec::new();
/// let mut node = tree.first_node();
/// while let Some(n) = node {
///     keys.push(*n.key());
///     node = tree.next_node(n);
/// }
/// assert_eq!(keys, [1, 2, 3]);
/// ```
///
/// [`first_node`]: AvlTree::first_node
/// [`next_node`]: AvlTree::next_node
pub struct AvlTree<K, V, C = Natural> {
    root: Link<K, V>,
    num_nodes: usize,
    comparator: C,
    marker: PhantomData<Box<Node<K, V>>>,
}

/// Position found by the insertion descent.
enum InsertPos<K, V> {
    Occupied(NodePtr<K, V>),
    Vacant(Link<K, V>, LinkPtr<K, V>),
}

type LinkPtr<K, V> = NonNull<Link<K, V>>;

impl<K: Ord, V> AvlTree<K, V> {
    /// Creates an empty tree ordered by the keys' [`Ord`] implementation.
    /// No memory is allocated until the first item is inserted.
    pub fn new() -> Self {
        Self::with_comparator(Natural)
    }
}

impl<K, V, C> AvlTree<K, V, C> {
    /// Creates an empty tree ordered by the given comparator.
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            root: None,
            num_nodes: 0,
            comparator,
            marker: PhantomData,
        }
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Returns true if the tree contains no elements.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of elements in the tree.
    pub fn len(&self) -> usize {
        self.num_nodes
    }

    /// Returns the height of the tree, 0 if empty and 1 for a single node.
    pub fn height(&self) -> usize {
        node::height(self.root)
    }

    /// Clears the tree, deallocating all nodes.
    pub fn clear(&mut self) {
        if self.num_nodes > 0 {
            log::debug!("releasing {} nodes", self.num_nodes);
        }
        self.postorder(|node_ptr| drop(unsafe { Node::destroy(node_ptr) }));
        self.root = None;
        self.num_nodes = 0;
    }

    /// Returns the root node, if any.
    pub fn root(&self) -> Option<NodeRef<'_, K, V>> {
        NodeRef::from_link(self.root)
    }

    /// Returns the node with the smallest key.
    pub fn first_node(&self) -> Option<NodeRef<'_, K, V>> {
        NodeRef::from_link(self.root.map(node::leftmost))
    }

    /// Returns the node with the largest key.
    pub fn last_node(&self) -> Option<NodeRef<'_, K, V>> {
        NodeRef::from_link(self.root.map(node::rightmost))
    }

    /// Returns the in-order successor of `node`, or `None` at the end of the sequence.
    pub fn next_node<'a>(&'a self, node: NodeRef<'a, K, V>) -> Option<NodeRef<'a, K, V>> {
        node.next()
    }

    /// Returns the in-order predecessor of `node`, or `None` at the start of the sequence.
    pub fn prev_node<'a>(&'a self, node: NodeRef<'a, K, V>) -> Option<NodeRef<'a, K, V>> {
        node.prev()
    }

    /// Gets an iterator over the entries of the tree in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(
            self.root.map(node::leftmost),
            self.root.map(node::rightmost),
            self.num_nodes,
        )
    }

    /// Gets a mutable iterator over the entries of the tree in ascending key order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::new(
            self.root.map(node::leftmost),
            self.root.map(node::rightmost),
            self.num_nodes,
        )
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.iter())
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.iter())
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut::new(self.iter_mut())
    }

    fn postorder<F: FnMut(NodePtr<K, V>)>(&self, f: F) {
        self.traverse(|_| {}, f);
    }

    fn traverse<Pre, Post>(&self, mut preorder: Pre, mut postorder: Post)
    where
        Pre: FnMut(NodePtr<K, V>),
        Post: FnMut(NodePtr<K, V>),
    {
        if let Some(mut node_ptr) = self.root {
            let mut dir = Direction::FromParent;
            loop {
                match dir {
                    Direction::FromParent => {
                        preorder(node_ptr);
                        if let Some(left_ptr) = unsafe { node_ptr.as_ref().left } {
                            node_ptr = left_ptr;
                        } else {
                            dir = Direction::FromLeft;
                        }
                    }
                    Direction::FromLeft => {
                        if let Some(right_ptr) = unsafe { node_ptr.as_ref().right } {
                            node_ptr = right_ptr;
                            dir = Direction::FromParent;
                        } else {
                            dir = Direction::FromRight;
                        }
                    }
                    Direction::FromRight => {
                        // Post order traversal is used for node deletion,
                        // so make sure not to use node pointer after postorder call.
                        if let Some(parent_ptr) = unsafe { node_ptr.as_ref().parent } {
                            if Some(node_ptr) == unsafe { parent_ptr.as_ref().left } {
                                dir = Direction::FromLeft;
                            } else {
                                dir = Direction::FromRight;
                            }
                            postorder(node_ptr);
                            node_ptr = parent_ptr;
                        } else {
                            postorder(node_ptr);
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl<K, V, C: Comparator<K>> AvlTree<K, V, C> {
    /// Returns a handle to the node stored under `key`.
    pub fn find(&self, key: &K) -> Option<NodeRef<'_, K, V>> {
        NodeRef::from_link(self.find_node(key))
    }

    /// Returns true if the tree contains a value for the key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find_node(key).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|node| node.value())
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find_node(key)
            .map(|node_ptr| unsafe { &mut (*node_ptr.as_ptr()).value })
    }

    /// Returns references to the key-value pair corresponding to the key.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.find(key).map(|node| node.key_value())
    }

    /// Inserts a key-value pair into the tree, or replaces the value of an existing key.
    ///
    /// Returns the previous value if the key was present. Replacing a value leaves
    /// the tree structure untouched. If the new node cannot be allocated the tree
    /// is left unchanged and [`Error::Alloc`] is returned.
    pub fn try_put(&mut self, key: K, value: V) -> Result<Option<V>> {
        match self.find_insert_pos(&key) {
            InsertPos::Occupied(mut node_ptr) => {
                let old_value = mem::replace(unsafe { &mut node_ptr.as_mut().value }, value);
                Ok(Some(old_value))
            }
            InsertPos::Vacant(parent, mut link_ptr) => {
                let node_ptr = Node::create(parent, key, value)?;
                unsafe {
                    *link_ptr.as_mut() = Some(node_ptr);
                }
                self.num_nodes += 1;
                self.rebalance_once(parent);
                Ok(None)
            }
        }
    }

    /// Inserts a key-value pair into the tree, or replaces the value of an existing key.
    ///
    /// Returns the previous value if the key was present.
    /// Allocation failure is reported through [`std::alloc::handle_alloc_error`].
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        match self.try_put(key, value) {
            Ok(old_value) => old_value,
            Err(Error::Alloc { .. }) => alloc::handle_alloc_error(Layout::new::<Node<K, V>>()),
        }
    }

    /// Removes a key from the tree.
    /// Returns whether the key was previously in the tree.
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Removes a key from the tree.
    /// Returns the value at the key if the key was previously in the tree.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes a key from the tree.
    /// Returns the stored key and value if the key was previously in the tree.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let node_ptr = self.find_node(key)?;
        debug_assert!(self.num_nodes >= 1);
        self.unlink_node(node_ptr);
        self.num_nodes -= 1;
        Some(unsafe { Node::destroy(node_ptr) })
    }

    /// Asserts that the internal tree structure is consistent.
    #[cfg(any(test, feature = "consistency_check"))]
    pub fn check_consistency(&self) {
        unsafe {
            // Check root link
            if let Some(root_ptr) = self.root {
                assert!(root_ptr.as_ref().parent.is_none());
            }

            // Check tree nodes
            let mut num_nodes = 0;
            self.traverse(
                |node_ptr| {
                    let left_height = node::height(node_ptr.as_ref().left);
                    let right_height = node::height(node_ptr.as_ref().right);

                    // Check link for left child node
                    if let Some(left_ptr) = node_ptr.as_ref().left {
                        assert!(left_ptr.as_ref().parent == Some(node_ptr));
                        assert!(
                            self.comparator
                                .compare(&left_ptr.as_ref().key, &node_ptr.as_ref().key)
                                == Ordering::Less
                        );
                    }

                    // Check link for right child node
                    if let Some(right_ptr) = node_ptr.as_ref().right {
                        assert!(right_ptr.as_ref().parent == Some(node_ptr));
                        assert!(
                            self.comparator
                                .compare(&right_ptr.as_ref().key, &node_ptr.as_ref().key)
                                == Ordering::Greater
                        );
                    }

                    // Check height
                    assert_eq!(
                        node_ptr.as_ref().height,
                        cmp::max(left_height, right_height) + 1
                    );

                    // Check AVL condition (nearly balance)
                    assert!(left_height <= right_height + 1);
                    assert!(right_height <= left_height + 1);

                    num_nodes += 1;
                },
                |_| {},
            );
            assert_eq!(num_nodes, self.num_nodes);

            // Check global order along the parent-linked in-order walk
            let mut num_visited = 0;
            let mut current = self.root.map(node::leftmost);
            while let Some(node_ptr) = current {
                let next = node::successor(node_ptr);
                if let Some(next_ptr) = next {
                    assert!(
                        self.comparator
                            .compare(&node_ptr.as_ref().key, &next_ptr.as_ref().key)
                            == Ordering::Less
                    );
                }
                num_visited += 1;
                current = next;
            }
            assert_eq!(num_visited, self.num_nodes);
        }
    }

    fn find_node(&self, key: &K) -> Link<K, V> {
        let mut current = self.root;
        while let Some(node_ptr) = current {
            current = unsafe {
                match self.comparator.compare(key, &node_ptr.as_ref().key) {
                    Ordering::Equal => break,
                    Ordering::Less => node_ptr.as_ref().left,
                    Ordering::Greater => node_ptr.as_ref().right,
                }
            }
        }
        current
    }

    fn find_insert_pos(&mut self, key: &K) -> InsertPos<K, V> {
        let mut parent: Link<K, V> = None;
        let mut link_ptr: LinkPtr<K, V> = NonNull::from(&mut self.root);
        unsafe {
            while let Some(mut node_ptr) = *link_ptr.as_ref() {
                parent = Some(node_ptr);
                link_ptr = match self.comparator.compare(key, &node_ptr.as_ref().key) {
                    Ordering::Equal => return InsertPos::Occupied(node_ptr),
                    Ordering::Less => NonNull::from(&mut node_ptr.as_mut().left),
                    Ordering::Greater => NonNull::from(&mut node_ptr.as_mut().right),
                };
            }
        }
        InsertPos::Vacant(parent, link_ptr)
    }
}

impl<K, V, C> AvlTree<K, V, C> {
    /// Splices the node out of the tree and restores balance up to the root.
    /// The node itself is left for the caller to destroy.
    fn unlink_node(&mut self, node_ptr: NodePtr<K, V>) {
        unsafe {
            let parent = node_ptr.as_ref().parent;
            let left = node_ptr.as_ref().left;
            match node_ptr.as_ref().right {
                None => {
                    // No right subtree, left subtree (if any) takes the node's place
                    self.replace_child(parent, node_ptr, left);
                    self.rebalance(parent);
                }
                Some(right_ptr) if right_ptr.as_ref().left.is_none() => {
                    // Right child is the successor, it takes the node's place
                    Self::set_left(right_ptr, left);
                    self.replace_child(parent, node_ptr, Some(right_ptr));
                    self.rebalance(Some(right_ptr));
                }
                Some(right_ptr) => {
                    // Successor is the leftmost node of the right subtree,
                    // detach it and move it into the node's place
                    let min_ptr = node::leftmost(right_ptr);
                    let Some(min_parent_ptr) = min_ptr.as_ref().parent else {
                        unreachable!("successor below the right child has a parent");
                    };
                    Self::set_left(min_parent_ptr, min_ptr.as_ref().right);

                    Self::set_left(min_ptr, left);
                    Self::set_right(min_ptr, Some(right_ptr));
                    self.replace_child(parent, node_ptr, Some(min_ptr));

                    // Former parent of the successor might be out of balance now
                    self.rebalance(Some(min_parent_ptr));
                }
            }
        }
    }

    fn set_left(mut parent_ptr: NodePtr<K, V>, child: Link<K, V>) {
        unsafe {
            parent_ptr.as_mut().left = child;
            if let Some(mut child_ptr) = child {
                child_ptr.as_mut().parent = Some(parent_ptr);
            }
        }
    }

    fn set_right(mut parent_ptr: NodePtr<K, V>, child: Link<K, V>) {
        unsafe {
            parent_ptr.as_mut().right = child;
            if let Some(mut child_ptr) = child {
                child_ptr.as_mut().parent = Some(parent_ptr);
            }
        }
    }

    /// Makes `new` take the structural position of `old` below `parent`.
    fn replace_child(&mut self, parent: Link<K, V>, old: NodePtr<K, V>, new: Link<K, V>) {
        unsafe {
            if let Some(mut new_ptr) = new {
                new_ptr.as_mut().parent = parent;
            }
            match parent {
                None => self.root = new,
                Some(mut parent_ptr) => {
                    if parent_ptr.as_ref().left == Some(old) {
                        parent_ptr.as_mut().left = new;
                    } else {
                        debug_assert!(parent_ptr.as_ref().right == Some(old));
                        parent_ptr.as_mut().right = new;
                    }
                }
            }
        }
    }

    fn adjust_height(mut node_ptr: NodePtr<K, V>) {
        unsafe {
            node_ptr.as_mut().height = cmp::max(
                node::height(node_ptr.as_ref().left),
                node::height(node_ptr.as_ref().right),
            ) + 1;
        }
    }

    //     A                  C
    //   B   C      --->    A   E
    //      D E            B D
    fn rotate_left(&mut self, mut node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
        unsafe {
            let Some(mut right_ptr) = node_ptr.as_ref().right else {
                unreachable!("rotate_left requires a right child");
            };
            let parent = node_ptr.as_ref().parent;

            Self::set_right(node_ptr, right_ptr.as_ref().left);
            self.replace_child(parent, node_ptr, Some(right_ptr));
            right_ptr.as_mut().left = Some(node_ptr);
            node_ptr.as_mut().parent = Some(right_ptr);

            Self::adjust_height(node_ptr);
            Self::adjust_height(right_ptr);
            right_ptr
        }
    }

    //       A              B
    //     B   C   --->   D   A
    //    D E                E C
    fn rotate_right(&mut self, mut node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
        unsafe {
            let Some(mut left_ptr) = node_ptr.as_ref().left else {
                unreachable!("rotate_right requires a left child");
            };
            let parent = node_ptr.as_ref().parent;

            Self::set_left(node_ptr, left_ptr.as_ref().right);
            self.replace_child(parent, node_ptr, Some(left_ptr));
            left_ptr.as_mut().right = Some(node_ptr);
            node_ptr.as_mut().parent = Some(left_ptr);

            Self::adjust_height(node_ptr);
            Self::adjust_height(left_ptr);
            left_ptr
        }
    }

    /// Rebalances nodes starting from given position up to the root node.
    /// Deletion may need a rotation on every level.
    fn rebalance(&mut self, start_from: Link<K, V>) {
        let mut current = start_from;
        while let Some(node_ptr) = current {
            let parent = unsafe { node_ptr.as_ref().parent };
            self.rebalance_node(node_ptr);
            current = parent;
        }
    }

    /// Rebalances nodes starting from given position up to the root node.
    /// Stops after the first (single or double) rotation,
    /// which is enough to restore balance after a single insert operation.
    fn rebalance_once(&mut self, start_from: Link<K, V>) {
        let mut current = start_from;
        while let Some(node_ptr) = current {
            let parent = unsafe { node_ptr.as_ref().parent };
            if self.rebalance_node(node_ptr).is_some() {
                break;
            }
            current = parent;
        }
    }

    /// Restores AVL condition (balance) at given node if necessary and adjusts height.
    /// Initial height difference must not exceed 2, which always holds after a single update.
    /// Returns the new subtree root if a rotation was necessary.
    ///
    /// A double rotation is only used if the heavy child leans strictly inwards;
    /// equal grandchild heights take the single rotation.
    fn rebalance_node(&mut self, node_ptr: NodePtr<K, V>) -> Link<K, V> {
        unsafe {
            let left_height = node::height(node_ptr.as_ref().left);
            let right_height = node::height(node_ptr.as_ref().right);
            debug_assert!(left_height <= right_height + 2);
            debug_assert!(right_height <= left_height + 2);
            if left_height > right_height + 1 {
                // Left heavy, rotate right
                let Some(left_ptr) = node_ptr.as_ref().left else {
                    unreachable!("left heavy node has a left child");
                };
                let double = node::height(left_ptr.as_ref().right)
                    > node::height(left_ptr.as_ref().left);
                if double {
                    self.rotate_left(left_ptr);
                }
                log::trace!(
                    "rotate right at height {} (double: {})",
                    left_height + 1,
                    double
                );
                Some(self.rotate_right(node_ptr))
            } else if right_height > left_height + 1 {
                // Right heavy, rotate left
                let Some(right_ptr) = node_ptr.as_ref().right else {
                    unreachable!("right heavy node has a right child");
                };
                let double = node::height(right_ptr.as_ref().left)
                    > node::height(right_ptr.as_ref().right);
                if double {
                    self.rotate_right(right_ptr);
                }
                log::trace!(
                    "rotate left at height {} (double: {})",
                    right_height + 1,
                    double
                );
                Some(self.rotate_left(node_ptr))
            } else {
                Self::adjust_height(node_ptr);
                None
            }
        }
    }
}

impl<K, V, C> Drop for AvlTree<K, V, C> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: Ord, V> Default for AvlTree<K, V> {
    /// Creates an empty tree.
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone, C: Clone> Clone for AvlTree<K, V, C> {
    /// Copies the tree node by node, keeping its exact shape.
    fn clone(&self) -> Self {
        let mut other = Self::with_comparator(self.comparator.clone());
        other.root = Self::clone_subtree(self.root, None);
        other.num_nodes = self.num_nodes;
        other
    }
}

impl<K: Clone, V: Clone, C> AvlTree<K, V, C> {
    fn clone_subtree(link: Link<K, V>, parent: Link<K, V>) -> Link<K, V> {
        let src_ptr = link?;
        unsafe {
            let src = src_ptr.as_ref();
            let mut node_ptr = match Node::create(parent, src.key.clone(), src.value.clone()) {
                Ok(node_ptr) => node_ptr,
                Err(Error::Alloc { .. }) => {
                    alloc::handle_alloc_error(Layout::new::<Node<K, V>>())
                }
            };
            node_ptr.as_mut().height = src.height;
            node_ptr.as_mut().left = Self::clone_subtree(src.left, Some(node_ptr));
            node_ptr.as_mut().right = Self::clone_subtree(src.right, Some(node_ptr));
            Some(node_ptr)
        }
    }
}

impl<K: PartialEq, V: PartialEq, C> PartialEq for AvlTree<K, V, C> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, C> Eq for AvlTree<K, V, C> {}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for AvlTree<K, V, C> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for AvlTree<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

impl<K, V, C: Comparator<K>> Extend<(K, V)> for AvlTree<K, V, C> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.put(key, value);
        }
    }
}

impl<'a, K, V, C> IntoIterator for &'a AvlTree<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, C> IntoIterator for &'a mut AvlTree<K, V, C> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

// The tree owns its nodes exclusively, shared access only reads.
unsafe impl<K: Send, V: Send, C: Send> Send for AvlTree<K, V, C> {}
unsafe impl<K: Sync, V: Sync, C: Sync> Sync for AvlTree<K, V, C> {}

#[allow(clippy::enum_variant_names)]
enum Direction {
    FromParent,
    FromLeft,
    FromRight,
}
