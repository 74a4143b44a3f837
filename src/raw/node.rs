use smallvec::SmallVec;

use super::arena::Handle;

/// Inline key capacity; orders above 9 spill the key vectors to the heap.
const INLINE_KEYS: usize = 8;

pub(crate) type Keys<K> = SmallVec<[K; INLINE_KEYS]>;
pub(crate) type Children = SmallVec<[Handle; INLINE_KEYS + 1]>;

/// Minimum number of keys in a non-root node: `⌈order/2⌉ - 1`.
#[inline]
pub(crate) const fn min_keys(order: usize) -> usize {
    order.div_ceil(2) - 1
}

#[allow(clippy::large_enum_variant)]
pub(crate) enum Node<K> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K>),
}

/// Internal nodes hold separator keys and one more child handle than keys.
/// Separator `keys[i]` equals the smallest key in the subtree `children[i + 1]`.
pub(crate) struct InternalNode<K> {
    keys: Keys<K>,
    children: Children,
}

/// Leaf nodes hold the stored keys plus a forward link to the next leaf in
/// ascending key order (the leaf chain range scans walk).
pub(crate) struct LeafNode<K> {
    keys: Keys<K>,
    next: Option<Handle>,
}

/// Result of searching for a key in a leaf.
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

impl<K: Ord> Node<K> {
    /// Returns true if this is a leaf node.
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Returns the leaf node, panicking if this is not a leaf.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the leaf node mutably, panicking if this is not a leaf.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the internal node, panicking if this is not internal.
    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Returns the internal node mutably, panicking if this is not internal.
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Returns the number of keys in this node.
    pub(crate) fn key_count(&self) -> usize {
        match self {
            Node::Internal(internal) => internal.key_count(),
            Node::Leaf(leaf) => leaf.key_count(),
        }
    }

    /// True iff the node holds more than `order - 1` keys. Overflow is
    /// checked after a tentative insert, never before.
    pub(crate) fn is_overflowing(&self, order: usize) -> bool {
        self.key_count() > order - 1
    }

    /// True iff a non-root node has fallen below `⌈order/2⌉ - 1` keys.
    pub(crate) fn is_underflowing(&self, order: usize) -> bool {
        self.key_count() < min_keys(order)
    }

    /// True iff the node can give one key to a sibling and stay at minimum.
    pub(crate) fn can_lend(&self, order: usize) -> bool {
        self.key_count() > min_keys(order)
    }
}

impl<K: Ord> InternalNode<K> {
    pub(crate) fn new() -> Self {
        Self {
            keys: SmallVec::new(),
            children: SmallVec::new(),
        }
    }

    /// Builds the new root above a split pair: one promoted separator and the
    /// two halves as children.
    pub(crate) fn from_split(separator: K, left: Handle, right: Handle) -> Self {
        let mut root = Self::new();
        root.children.push(left);
        root.push_child(separator, right);
        root
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Replaces the separator key at the given index.
    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Returns the index of the child to descend into for `key`.
    ///
    /// Separators route equal keys to the right: we descend into child `i`
    /// such that `keys[i - 1] <= key < keys[i]`.
    #[inline]
    pub(crate) fn search_child(&self, key: &K) -> usize {
        match self.keys.binary_search(key) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Inserts a separator and the child to its right at the given key position.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the separator at `index` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Appends a separator and child (rightmost position).
    pub(crate) fn push_child(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Prepends a separator and child (leftmost position).
    pub(crate) fn push_child_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Removes and returns the last separator and child.
    pub(crate) fn pop_child(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop().unwrap();
        Some((key, child))
    }

    /// Removes and returns the first separator and child.
    pub(crate) fn pop_child_front(&mut self) -> Option<(K, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys.remove(0);
        let child = self.children.remove(0);
        Some((key, child))
    }

    /// Splits an overflowing node at the middle key (`keys.len() / 2`).
    ///
    /// The middle key is promoted: removed from both halves, unlike a leaf
    /// split. Returns `(promoted_key, right_half)`.
    pub(crate) fn split(&mut self) -> (K, InternalNode<K>) {
        let mid = self.keys.len() / 2;

        let mut right = InternalNode::new();
        right.keys = self.keys.drain(mid + 1..).collect();
        right.children = self.children.drain(mid + 1..).collect();

        let promoted = self.keys.pop().unwrap();
        (promoted, right)
    }

    /// Folds a right sibling into this node, bringing the shared parent
    /// separator down between the two key runs.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<K: Ord> LeafNode<K> {
    pub(crate) fn new() -> Self {
        Self {
            keys: SmallVec::new(),
            next: None,
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    pub(crate) fn first_key(&self) -> Option<&K> {
        self.keys.first()
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    /// Searches for a key in this leaf.
    #[inline]
    pub(crate) fn search(&self, key: &K) -> SearchResult {
        match self.keys.binary_search(key) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    /// Inserts a key at the given (sorted) position.
    pub(crate) fn insert(&mut self, index: usize, key: K) {
        self.keys.insert(index, key);
    }

    /// Removes and returns the key at the given position.
    pub(crate) fn remove(&mut self, index: usize) -> K {
        self.keys.remove(index)
    }

    /// Removes and returns the last key.
    pub(crate) fn pop(&mut self) -> Option<K> {
        self.keys.pop()
    }

    /// Removes and returns the first key.
    pub(crate) fn pop_front(&mut self) -> Option<K> {
        if self.keys.is_empty() {
            return None;
        }
        Some(self.keys.remove(0))
    }

    /// Appends a key (must be greater than every key present).
    pub(crate) fn push(&mut self, key: K) {
        debug_assert!(self.keys.last().is_none_or(|last| *last < key));
        self.keys.push(key);
    }

    /// Prepends a key (must be smaller than every key present).
    pub(crate) fn push_front(&mut self, key: K) {
        debug_assert!(self.keys.first().is_none_or(|first| key < *first));
        self.keys.insert(0, key);
    }

    /// Splits an overflowing leaf at `mid`, keeping `keys[..mid]` here and
    /// moving `keys[mid..]` to a new right sibling.
    ///
    /// The promoted separator is a copy of the right half's first key; the
    /// key itself stays in the leaf (leaves hold all real keys, separators
    /// are routing-only).
    pub(crate) fn split(&mut self, mid: usize) -> (K, LeafNode<K>)
    where
        K: Clone,
    {
        let mut right = LeafNode::new();
        right.keys = self.keys.drain(mid..).collect();

        let promoted = right.keys.first().unwrap().clone();
        (promoted, right)
    }

    /// Folds a right sibling into this leaf: keys are concatenated and the
    /// chain link skips over the consumed sibling.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K>) {
        self.keys.append(&mut right.keys);
        self.next = right.next;
    }
}
