//! In-memory B+ tree index.
//!
//! This crate provides [`BPlusTree`], an ordered index supporting point
//! lookup, inclusive range scans, insertion, and deletion with automatic
//! rebalancing:
//!
//! - [`insert`](BPlusTree::insert) - sorted insert with split propagation
//! - [`delete`](BPlusTree::delete) - removal with borrow/merge rebalancing
//! - [`search`](BPlusTree::search) - O(height) point lookup
//! - [`range_search`](BPlusTree::range_search) - lazy scan along the leaf chain
//!
//! # Example
//!
//! ```
//! use bptree::BPlusTree;
//!
//! let mut index = BPlusTree::new(4);
//! for key in [10, 20, 30, 40, 50] {
//!     index.insert(key);
//! }
//!
//! // Point lookups.
//! assert!(index.search(&40));
//! assert!(!index.search(&35));
//!
//! // Inclusive range scan.
//! let hits: Vec<i32> = index.range_search(&20, &35).copied().collect();
//! assert_eq!(hits, vec![20, 30]);
//!
//! // Deletion rebalances and eventually shrinks the tree.
//! for key in [10, 20, 30, 40, 50] {
//!     assert!(index.delete(&key));
//! }
//! assert!(index.is_empty());
//! ```
//!
//! # Observing mutations
//!
//! A [`MutationSink`] can be subscribed to receive before/after snapshots of
//! every node touched by an operation, e.g. for demo or report tooling:
//!
//! ```
//! use bptree::{BPlusTree, EventLog, MutationKind};
//!
//! let mut index = BPlusTree::new(3);
//! let log = EventLog::new();
//! index.subscribe_mutations(Box::new(log.clone()));
//!
//! index.insert(10);
//! index.insert(20);
//! index.insert(30); // splits the root leaf
//!
//! assert!(log.events().iter().any(|e| e.kind == MutationKind::Created));
//! ```
//!
//! # Implementation
//!
//! All nodes live in a slot arena owned by the tree and reference each other
//! by stable integer handles, so the leaf chain and child links never form
//! ownership cycles. Split and merge propagation is an iterative loop over
//! the explicit root-to-leaf path recorded during descent. Structural changes
//! (splits, borrows, merges, height changes) emit `tracing` events at trace
//! level.

#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]

mod events;
mod raw;
mod tree;

pub use events::{EventLog, MutationEvent, MutationKind, MutationSink, NodeSnapshot};
pub use tree::{BPlusTree, RangeScan};
