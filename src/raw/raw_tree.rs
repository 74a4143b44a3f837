use smallvec::SmallVec;
use tracing::trace;

use super::arena::{Arena, Handle};
use super::node::{InternalNode, LeafNode, Node, SearchResult};
use crate::events::{MutationEvent, MutationKind, MutationSink, NodeSnapshot};

/// The core B+ tree implementation backing `BPlusTree`.
///
/// All nodes live in a slot arena and reference each other by handle; upward
/// propagation of splits and merges uses the explicit root-to-leaf path built
/// during descent, so nodes carry no parent links.
pub(crate) struct RawBPlusTree<K> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K>>,
    /// Handle to the root node. The tree always has a root; a fresh tree is a
    /// single empty leaf, and delete can shrink it back to exactly that.
    root: Handle,
    /// Maximum fanout `m`: at most `m` children per internal node and `m - 1`
    /// keys per node.
    order: usize,
    /// Total number of keys in the tree.
    len: usize,
}

/// Path element for tracking traversal during mutations.
struct PathElement {
    /// Handle to the internal node at this level.
    node: Handle,
    /// Index of the child we descended into.
    child_index: usize,
}

/// Type alias for a path through the tree (stack of path elements).
type Path = SmallVec<[PathElement; 16]>;

impl<K> RawBPlusTree<K> {
    pub(crate) fn new(order: usize) -> Self
    where
        K: Ord,
    {
        debug_assert!(order >= 3);
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::Leaf(LeafNode::new()));
        Self {
            nodes,
            root,
            order,
            len: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn order(&self) -> usize {
        self.order
    }

    pub(crate) fn root(&self) -> Handle {
        self.root
    }

    /// Returns a reference to a node by handle.
    pub(crate) fn node(&self, handle: Handle) -> &Node<K> {
        self.nodes.get(handle)
    }
}

impl<K: Ord + Clone> RawBPlusTree<K> {
    /// Descends from the root to the leaf that owns `key`.
    ///
    /// At each internal node we take the child `i` with
    /// `keys[i - 1] <= key < keys[i]`. Deterministic, `O(height)`
    /// comparisons, no side effects.
    pub(crate) fn find_leaf(&self, key: &K) -> Handle {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.search_child(key)),
                Node::Leaf(_) => return current,
            }
        }
    }

    /// Like [`find_leaf`](Self::find_leaf), but records the internal nodes
    /// visited so a mutation can propagate back up.
    fn find_leaf_with_path(&self, key: &K) -> (Handle, Path) {
        let mut path = Path::new();
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let child_index = internal.search_child(key);
                    path.push(PathElement {
                        node: current,
                        child_index,
                    });
                    current = internal.child(child_index);
                }
                Node::Leaf(_) => return (current, path),
            }
        }
    }

    /// Returns the leftmost leaf, the head of the leaf chain.
    pub(crate) fn leftmost_leaf(&self) -> Handle {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(0),
                Node::Leaf(_) => return current,
            }
        }
    }

    /// Returns true if the tree contains `key`.
    pub(crate) fn search(&self, key: &K) -> bool {
        let leaf = self.find_leaf(key);
        matches!(self.nodes.get(leaf).as_leaf().search(key), SearchResult::Found(_))
    }

    /// Inserts `key`, returning false if it was already present (duplicates
    /// are rejected; the tree is left untouched).
    pub(crate) fn insert(&mut self, key: K, sink: &mut dyn MutationSink<K>) -> bool {
        let order = self.order;
        let (leaf_handle, mut path) = self.find_leaf_with_path(&key);

        let idx = match self.nodes.get(leaf_handle).as_leaf().search(&key) {
            SearchResult::Found(_) => return false,
            SearchResult::NotFound(idx) => idx,
        };

        let before = sink.enabled().then(|| self.snapshot(leaf_handle));
        self.nodes.get_mut(leaf_handle).as_leaf_mut().insert(idx, key);
        self.len += 1;

        if self.nodes.get(leaf_handle).is_overflowing(order) {
            self.split_leaf_and_propagate(leaf_handle, &mut path, before, sink);
        } else {
            self.emit_updated(leaf_handle, before, sink);
        }
        true
    }

    /// Splits an overflowing leaf at `mid = order / 2` and propagates the
    /// promoted separator upward.
    fn split_leaf_and_propagate(
        &mut self,
        leaf_handle: Handle,
        path: &mut Path,
        before: Option<NodeSnapshot<K>>,
        sink: &mut dyn MutationSink<K>,
    ) {
        let mid = self.order / 2;

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let (separator, mut right_leaf) = leaf.split(mid);

        // Splice the new right sibling into the leaf chain.
        right_leaf.set_next(leaf.next());
        let right_handle = self.nodes.alloc(Node::Leaf(right_leaf));
        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(right_handle));

        trace!(
            left = leaf_handle.to_index(),
            right = right_handle.to_index(),
            "leaf split"
        );
        self.emit_updated(leaf_handle, before, sink);
        self.emit_created(right_handle, sink);

        self.propagate_split(path, separator, right_handle, sink);
    }

    /// Propagates a split up the tree, splitting ancestors as needed and
    /// growing a new root if the split reaches the top.
    fn propagate_split(
        &mut self,
        path: &mut Path,
        mut separator: K,
        mut new_child: Handle,
        sink: &mut dyn MutationSink<K>,
    ) {
        let order = self.order;

        while let Some(elem) = path.pop() {
            let before = sink.enabled().then(|| self.snapshot(elem.node));

            let parent = self.nodes.get_mut(elem.node).as_internal_mut();
            parent.insert_child(elem.child_index, separator, new_child);

            if !self.nodes.get(elem.node).is_overflowing(order) {
                self.emit_updated(elem.node, before, sink);
                return;
            }

            // Internal split: the middle key moves up, leaving both halves.
            let parent = self.nodes.get_mut(elem.node).as_internal_mut();
            let (promoted, right_internal) = parent.split();
            let right_handle = self.nodes.alloc(Node::Internal(right_internal));

            trace!(
                left = elem.node.to_index(),
                right = right_handle.to_index(),
                "internal split"
            );
            self.emit_updated(elem.node, before, sink);
            self.emit_created(right_handle, sink);

            separator = promoted;
            new_child = right_handle;
        }

        // The split reached the old root: grow the tree by one level.
        let new_root = InternalNode::from_split(separator, self.root, new_child);
        let new_root_handle = self.nodes.alloc(Node::Internal(new_root));
        self.root = new_root_handle;

        trace!(root = new_root_handle.to_index(), "tree height increased");
        self.emit_created(new_root_handle, sink);
    }

    /// Removes `key`, returning true if it was present. An absent key is a
    /// normal false result and leaves the tree untouched.
    pub(crate) fn delete(&mut self, key: &K, sink: &mut dyn MutationSink<K>) -> bool {
        let order = self.order;
        let (leaf_handle, mut path) = self.find_leaf_with_path(key);

        let idx = match self.nodes.get(leaf_handle).as_leaf().search(key) {
            SearchResult::Found(idx) => idx,
            SearchResult::NotFound(_) => return false,
        };

        let before = sink.enabled().then(|| self.snapshot(leaf_handle));
        let removed_first = idx == 0;
        self.nodes.get_mut(leaf_handle).as_leaf_mut().remove(idx);
        self.len -= 1;
        self.emit_updated(leaf_handle, before, sink);

        // The root leaf is exempt from minimum occupancy.
        if !path.is_empty() && self.nodes.get(leaf_handle).is_underflowing(order) {
            self.rebalance_leaf(leaf_handle, &mut path, sink);
        }

        // If the leaf's first key was removed, the separator that mirrored it
        // (at whichever ancestor holds it, if it survived rebalancing) must be
        // refreshed to the subtree's new smallest key.
        if removed_first {
            self.repair_separator(key);
        }
        true
    }

    /// Finds the separator equal to a just-removed key and replaces it with
    /// the smallest key now reachable in its right subtree.
    ///
    /// At most one separator can equal the removed key; a stale separator
    /// still routes correctly (all surviving keys of its subtree compare
    /// greater), so descending by the removed key lands exactly on it.
    fn repair_separator(&mut self, removed: &K) {
        let mut current = self.root;
        loop {
            let (idx, stale, next) = match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let idx = internal.search_child(removed);
                    let stale = idx > 0 && internal.key(idx - 1) == removed;
                    (idx, stale, internal.child(idx))
                }
                Node::Leaf(_) => return,
            };
            if stale {
                let min = self.subtree_min(next).clone();
                self.nodes.get_mut(current).as_internal_mut().set_key(idx - 1, min);
                return;
            }
            current = next;
        }
    }

    /// Smallest key reachable in the given subtree.
    fn subtree_min(&self, mut current: Handle) -> &K {
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(0),
                Node::Leaf(leaf) => {
                    return leaf.first_key().expect("non-root node cannot be empty");
                }
            }
        }
    }

    /// Rebalances a leaf that underflowed: borrow from the left sibling,
    /// else the right, else merge (preferring the left sibling).
    fn rebalance_leaf(&mut self, leaf_handle: Handle, path: &mut Path, sink: &mut dyn MutationSink<K>) {
        let order = self.order;
        let elem = path.last().unwrap();
        let (parent_handle, child_idx) = (elem.node, elem.child_index);

        let (left, right) = {
            let parent = self.nodes.get(parent_handle).as_internal();
            let left = (child_idx > 0).then(|| parent.child(child_idx - 1));
            let right = (child_idx + 1 < parent.child_count()).then(|| parent.child(child_idx + 1));
            (left, right)
        };

        if let Some(left) = left
            && self.nodes.get(left).can_lend(order)
        {
            self.borrow_from_left_leaf(leaf_handle, left, parent_handle, child_idx, sink);
            return;
        }
        if let Some(right) = right
            && self.nodes.get(right).can_lend(order)
        {
            self.borrow_from_right_leaf(leaf_handle, right, parent_handle, child_idx, sink);
            return;
        }

        if let Some(left) = left {
            self.merge_leaves(left, leaf_handle, path, child_idx - 1, sink);
        } else {
            self.merge_leaves(leaf_handle, right.unwrap(), path, child_idx, sink);
        }
    }

    /// Shifts the left sibling's last key across the separator.
    fn borrow_from_left_leaf(
        &mut self,
        leaf_handle: Handle,
        left_handle: Handle,
        parent_handle: Handle,
        child_idx: usize,
        sink: &mut dyn MutationSink<K>,
    ) {
        let before_left = sink.enabled().then(|| self.snapshot(left_handle));
        let before_leaf = sink.enabled().then(|| self.snapshot(leaf_handle));
        let before_parent = sink.enabled().then(|| self.snapshot(parent_handle));

        let key = self.nodes.get_mut(left_handle).as_leaf_mut().pop().unwrap();
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        leaf.push_front(key);
        let new_first = leaf.first_key().unwrap().clone();

        // The separator before the leaf mirrors its new first key.
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx - 1, new_first);

        trace!(
            leaf = leaf_handle.to_index(),
            sibling = left_handle.to_index(),
            "borrowed key from left leaf sibling"
        );
        self.emit_updated(left_handle, before_left, sink);
        self.emit_updated(leaf_handle, before_leaf, sink);
        self.emit_updated(parent_handle, before_parent, sink);
    }

    /// Shifts the right sibling's first key across the separator.
    fn borrow_from_right_leaf(
        &mut self,
        leaf_handle: Handle,
        right_handle: Handle,
        parent_handle: Handle,
        child_idx: usize,
        sink: &mut dyn MutationSink<K>,
    ) {
        let before_right = sink.enabled().then(|| self.snapshot(right_handle));
        let before_leaf = sink.enabled().then(|| self.snapshot(leaf_handle));
        let before_parent = sink.enabled().then(|| self.snapshot(parent_handle));

        let right = self.nodes.get_mut(right_handle).as_leaf_mut();
        let key = right.pop_front().unwrap();
        let right_new_first = right.first_key().unwrap().clone();

        self.nodes.get_mut(leaf_handle).as_leaf_mut().push(key);

        // The separator before the right sibling mirrors its new first key.
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx, right_new_first);

        trace!(
            leaf = leaf_handle.to_index(),
            sibling = right_handle.to_index(),
            "borrowed key from right leaf sibling"
        );
        self.emit_updated(right_handle, before_right, sink);
        self.emit_updated(leaf_handle, before_leaf, sink);
        self.emit_updated(parent_handle, before_parent, sink);
    }

    /// Folds the right leaf into the left one and removes the consumed
    /// separator from the parent.
    fn merge_leaves(
        &mut self,
        left_handle: Handle,
        right_handle: Handle,
        path: &mut Path,
        separator_idx: usize,
        sink: &mut dyn MutationSink<K>,
    ) {
        let before_left = sink.enabled().then(|| self.snapshot(left_handle));

        let right = match self.nodes.take(right_handle) {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf"),
        };
        self.nodes.get_mut(left_handle).as_leaf_mut().merge_with_right(right);

        trace!(
            left = left_handle.to_index(),
            right = right_handle.to_index(),
            "merged leaves"
        );
        self.emit_updated(left_handle, before_left, sink);

        self.remove_from_parent_and_propagate(path, separator_idx, sink);
    }

    /// Removes a consumed separator and child slot from the parent after a
    /// merge, recursing the underflow check upward. An empty or single-child
    /// root internal node collapses into its surviving child.
    fn remove_from_parent_and_propagate(
        &mut self,
        path: &mut Path,
        separator_idx: usize,
        sink: &mut dyn MutationSink<K>,
    ) {
        let order = self.order;
        let elem = path.pop().unwrap();
        let parent_handle = elem.node;

        let before = sink.enabled().then(|| self.snapshot(parent_handle));
        self.nodes.get_mut(parent_handle).as_internal_mut().remove_child(separator_idx);
        self.emit_updated(parent_handle, before, sink);

        if path.is_empty() {
            // The parent is the root; collapse it once only one child remains.
            let parent = self.nodes.get(parent_handle).as_internal();
            if parent.child_count() == 1 {
                let new_root = parent.child(0);
                self.nodes.free(parent_handle);
                self.root = new_root;
                trace!(root = new_root.to_index(), "tree height decreased");
            }
            return;
        }

        if self.nodes.get(parent_handle).is_underflowing(order) {
            self.rebalance_internal(parent_handle, path, sink);
        }
    }

    /// Rebalances an internal node that underflowed after losing a child.
    /// Same sibling selection as leaves: borrow left, borrow right, merge
    /// (preferring left).
    fn rebalance_internal(&mut self, node_handle: Handle, path: &mut Path, sink: &mut dyn MutationSink<K>) {
        let order = self.order;
        let elem = path.last().unwrap();
        let (parent_handle, child_idx) = (elem.node, elem.child_index);

        let (left, right) = {
            let parent = self.nodes.get(parent_handle).as_internal();
            let left = (child_idx > 0).then(|| parent.child(child_idx - 1));
            let right = (child_idx + 1 < parent.child_count()).then(|| parent.child(child_idx + 1));
            (left, right)
        };

        if let Some(left) = left
            && self.nodes.get(left).can_lend(order)
        {
            self.borrow_from_left_internal(node_handle, left, parent_handle, child_idx, sink);
            return;
        }
        if let Some(right) = right
            && self.nodes.get(right).can_lend(order)
        {
            self.borrow_from_right_internal(node_handle, right, parent_handle, child_idx, sink);
            return;
        }

        if let Some(left) = left {
            self.merge_internals(left, node_handle, path, child_idx - 1, sink);
        } else {
            self.merge_internals(node_handle, right.unwrap(), path, child_idx, sink);
        }
    }

    /// Rotates one key and child from the left internal sibling through the
    /// parent separator.
    fn borrow_from_left_internal(
        &mut self,
        node_handle: Handle,
        left_handle: Handle,
        parent_handle: Handle,
        child_idx: usize,
        sink: &mut dyn MutationSink<K>,
    ) {
        let before_left = sink.enabled().then(|| self.snapshot(left_handle));
        let before_node = sink.enabled().then(|| self.snapshot(node_handle));
        let before_parent = sink.enabled().then(|| self.snapshot(parent_handle));

        // The parent separator comes down in front of the node's keys, and
        // the left sibling's last key goes up to replace it.
        let separator = self.nodes.get(parent_handle).as_internal().key(child_idx - 1).clone();
        let (left_key, left_child) = self.nodes.get_mut(left_handle).as_internal_mut().pop_child().unwrap();
        self.nodes.get_mut(node_handle).as_internal_mut().push_child_front(separator, left_child);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx - 1, left_key);

        trace!(
            node = node_handle.to_index(),
            sibling = left_handle.to_index(),
            "borrowed child from left internal sibling"
        );
        self.emit_updated(left_handle, before_left, sink);
        self.emit_updated(node_handle, before_node, sink);
        self.emit_updated(parent_handle, before_parent, sink);
    }

    /// Rotates one key and child from the right internal sibling through the
    /// parent separator.
    fn borrow_from_right_internal(
        &mut self,
        node_handle: Handle,
        right_handle: Handle,
        parent_handle: Handle,
        child_idx: usize,
        sink: &mut dyn MutationSink<K>,
    ) {
        let before_right = sink.enabled().then(|| self.snapshot(right_handle));
        let before_node = sink.enabled().then(|| self.snapshot(node_handle));
        let before_parent = sink.enabled().then(|| self.snapshot(parent_handle));

        // The parent separator comes down at the end of the node's keys, and
        // the right sibling's first key goes up to replace it.
        let separator = self.nodes.get(parent_handle).as_internal().key(child_idx).clone();
        let (right_key, right_child) = self.nodes.get_mut(right_handle).as_internal_mut().pop_child_front().unwrap();
        self.nodes.get_mut(node_handle).as_internal_mut().push_child(separator, right_child);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx, right_key);

        trace!(
            node = node_handle.to_index(),
            sibling = right_handle.to_index(),
            "borrowed child from right internal sibling"
        );
        self.emit_updated(right_handle, before_right, sink);
        self.emit_updated(node_handle, before_node, sink);
        self.emit_updated(parent_handle, before_parent, sink);
    }

    /// Folds the right internal node into the left one, bringing the shared
    /// separator down, then removes the consumed slot from the parent.
    fn merge_internals(
        &mut self,
        left_handle: Handle,
        right_handle: Handle,
        path: &mut Path,
        separator_idx: usize,
        sink: &mut dyn MutationSink<K>,
    ) {
        let parent_handle = path.last().unwrap().node;
        let before_left = sink.enabled().then(|| self.snapshot(left_handle));

        let separator = self.nodes.get(parent_handle).as_internal().key(separator_idx).clone();
        let right = match self.nodes.take(right_handle) {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal"),
        };
        self.nodes.get_mut(left_handle).as_internal_mut().merge_with_right(separator, right);

        trace!(
            left = left_handle.to_index(),
            right = right_handle.to_index(),
            "merged internal nodes"
        );
        self.emit_updated(left_handle, before_left, sink);

        self.remove_from_parent_and_propagate(path, separator_idx, sink);
    }

    fn snapshot(&self, handle: Handle) -> NodeSnapshot<K> {
        match self.nodes.get(handle) {
            Node::Leaf(leaf) => NodeSnapshot {
                is_leaf: true,
                keys: leaf.keys().to_vec(),
            },
            Node::Internal(internal) => NodeSnapshot {
                is_leaf: false,
                keys: internal.keys().to_vec(),
            },
        }
    }

    fn emit_updated(&self, handle: Handle, before: Option<NodeSnapshot<K>>, sink: &mut dyn MutationSink<K>) {
        if sink.enabled() {
            sink.record(MutationEvent {
                kind: MutationKind::Updated,
                before,
                after: self.snapshot(handle),
            });
        }
    }

    fn emit_created(&self, handle: Handle, sink: &mut dyn MutationSink<K>) {
        if sink.enabled() {
            sink.record(MutationEvent {
                kind: MutationKind::Created,
                before: None,
                after: self.snapshot(handle),
            });
        }
    }
}
