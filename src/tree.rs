use std::iter::FusedIterator;

use crate::events::{MutationSink, NoopSink};
use crate::raw::{Handle, Node, RawBPlusTree, SearchResult};

/// An in-memory B+ tree index over ordered keys.
///
/// All keys live in the leaves, which are chained left to right for range
/// scans; internal nodes hold routing separators only. Inserting past a
/// node's capacity splits it and propagates upward; deleting below minimum
/// occupancy borrows from or merges with a sibling, shrinking the tree when
/// the root empties out. Duplicate keys are rejected: inserting a key that is
/// already present leaves the tree untouched.
///
/// # Example
///
/// ```
/// use bptree::BPlusTree;
///
/// let mut index = BPlusTree::new(4);
/// for key in [10, 20, 30, 40, 50] {
///     index.insert(key);
/// }
///
/// assert!(index.search(&30));
/// assert!(index.delete(&30));
/// assert!(!index.search(&30));
///
/// let hits: Vec<i32> = index.range_search(&20, &45).copied().collect();
/// assert_eq!(hits, vec![20, 40]);
/// ```
pub struct BPlusTree<K> {
    raw: RawBPlusTree<K>,
    sink: Option<Box<dyn MutationSink<K>>>,
}

impl<K: Ord + Clone> BPlusTree<K> {
    /// Creates an empty tree of the given order (maximum fanout).
    ///
    /// # Panics
    ///
    /// Panics if `order < 3`: below that a node cannot satisfy the
    /// split/merge occupancy bounds.
    pub fn new(order: usize) -> Self {
        assert!(order >= 3, "`BPlusTree::new()` - `order` must be at least 3, got {order}");
        Self {
            raw: RawBPlusTree::new(order),
            sink: None,
        }
    }

    /// The order `m` this tree was created with.
    pub fn order(&self) -> usize {
        self.raw.order()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Inserts `key` at its sorted position, splitting as needed.
    ///
    /// Inserting a key that is already present is a no-op.
    pub fn insert(&mut self, key: K) {
        match &mut self.sink {
            Some(sink) => self.raw.insert(key, sink.as_mut()),
            None => self.raw.insert(key, &mut NoopSink),
        };
    }

    /// Removes `key`, rebalancing as needed.
    ///
    /// Returns true if the key was removed; false if it was absent, in which
    /// case the tree is untouched.
    pub fn delete(&mut self, key: &K) -> bool {
        match &mut self.sink {
            Some(sink) => self.raw.delete(key, sink.as_mut()),
            None => self.raw.delete(key, &mut NoopSink),
        }
    }

    /// Returns true if `key` is present.
    pub fn search(&self, key: &K) -> bool {
        self.raw.search(key)
    }

    /// Scans all keys in `[start, end]` (inclusive bounds) in ascending
    /// order, lazily, by walking the leaf chain.
    ///
    /// An inverted range (`start > end`) yields an empty iterator. The scan
    /// is recomputed fresh on each call and never mutates the tree.
    pub fn range_search(&self, start: &K, end: &K) -> RangeScan<'_, K> {
        if start > end {
            return RangeScan {
                raw: &self.raw,
                leaf: None,
                index: 0,
                end: end.clone(),
            };
        }

        let leaf = self.raw.find_leaf(start);
        let index = match self.raw.node(leaf).as_leaf().search(start) {
            SearchResult::Found(idx) | SearchResult::NotFound(idx) => idx,
        };
        RangeScan {
            raw: &self.raw,
            leaf: Some(leaf),
            index,
            end: end.clone(),
        }
    }

    /// Subscribes a sink that will receive before/after node snapshots for
    /// every node touched by subsequent operations.
    ///
    /// Purely observational: the sink cannot alter tree state. Replaces any
    /// previously subscribed sink.
    pub fn subscribe_mutations(&mut self, sink: Box<dyn MutationSink<K>>) {
        self.sink = Some(sink);
    }

    /// Renders the tree level by level, one line per level.
    ///
    /// A debugging convenience, not a stable format.
    pub fn dump(&self) -> String
    where
        K: std::fmt::Debug,
    {
        use std::fmt::Write;

        let mut out = String::new();
        let mut level = vec![self.raw.root()];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for (i, &handle) in level.iter().enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                match self.raw.node(handle) {
                    Node::Leaf(leaf) => {
                        let _ = write!(out, "{:?}", leaf.keys());
                    }
                    Node::Internal(internal) => {
                        let _ = write!(out, "{:?}", internal.keys());
                        next_level.extend_from_slice(internal.children());
                    }
                }
            }
            out.push('\n');
            level = next_level;
        }
        out
    }
}

/// Lazy iterator over the keys in an inclusive range, produced by
/// [`BPlusTree::range_search`].
///
/// Walks the leaf chain forward and stops at the first key past the upper
/// bound (valid because leaves are globally sorted).
pub struct RangeScan<'a, K> {
    raw: &'a RawBPlusTree<K>,
    leaf: Option<Handle>,
    index: usize,
    end: K,
}

impl<'a, K: Ord + Clone> Iterator for RangeScan<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        loop {
            let handle = self.leaf?;
            let leaf = self.raw.node(handle).as_leaf();
            if self.index < leaf.key_count() {
                let key = leaf.key(self.index);
                if *key > self.end {
                    self.leaf = None;
                    return None;
                }
                self.index += 1;
                return Some(key);
            }
            self.leaf = leaf.next();
            self.index = 0;
        }
    }
}

impl<K: Ord + Clone> FusedIterator for RangeScan<'_, K> {}
