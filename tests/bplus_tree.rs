use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use bptree::{BPlusTree, EventLog, MutationKind};

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 2_000;

/// Generates keys in a range narrow enough to force collisions, duplicate
/// inserts, and deletes of present keys.
fn key_strategy() -> impl Strategy<Value = i64> {
    -2_000i64..2_000i64
}

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Insert(i64),
    Delete(i64),
    Search(i64),
    Range(i64, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => key_strategy().prop_map(Op::Insert),
        3 => key_strategy().prop_map(Op::Delete),
        2 => key_strategy().prop_map(Op::Search),
        1 => (key_strategy(), key_strategy()).prop_map(|(a, b)| Op::Range(a, b)),
    ]
}

fn contents(tree: &BPlusTree<i64>) -> Vec<i64> {
    tree.range_search(&i64::MIN, &i64::MAX).copied().collect()
}

// ─── Randomized model-based tests ────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Replays a random sequence of operations on both BPlusTree and BTreeSet
    /// and asserts identical results at every step.
    #[test]
    fn ops_match_btreeset(
        order in 3usize..10,
        ops in proptest::collection::vec(op_strategy(), TEST_SIZE),
    ) {
        let mut tree: BPlusTree<i64> = BPlusTree::new(order);
        let mut model: BTreeSet<i64> = BTreeSet::new();

        for op in &ops {
            match op {
                Op::Insert(k) => {
                    tree.insert(*k);
                    model.insert(*k);
                }
                Op::Delete(k) => {
                    prop_assert_eq!(tree.delete(k), model.remove(k), "delete({})", k);
                }
                Op::Search(k) => {
                    prop_assert_eq!(tree.search(k), model.contains(k), "search({})", k);
                }
                Op::Range(a, b) => {
                    let got: Vec<i64> = tree.range_search(a, b).copied().collect();
                    let want: Vec<i64> = if a <= b {
                        model.range(a..=b).copied().collect()
                    } else {
                        Vec::new()
                    };
                    prop_assert_eq!(got, want, "range_search({}, {})", a, b);
                }
            }
            prop_assert_eq!(tree.len(), model.len());
        }

        // A full scan yields the model's contents, strictly sorted.
        let want: Vec<i64> = model.iter().copied().collect();
        prop_assert_eq!(contents(&tree), want);
    }

    /// Inserting a key set then deleting every key returns the tree to empty,
    /// regardless of order of operations or tree order.
    #[test]
    fn round_trip_to_empty(
        order in 3usize..16,
        keys in proptest::collection::btree_set(key_strategy(), 1..500),
    ) {
        let mut tree: BPlusTree<i64> = BPlusTree::new(order);
        for &key in &keys {
            tree.insert(key);
        }
        prop_assert_eq!(tree.len(), keys.len());

        for &key in keys.iter().rev() {
            prop_assert!(tree.delete(&key));
        }
        prop_assert!(tree.is_empty());
        prop_assert_eq!(contents(&tree), Vec::<i64>::new());
    }
}

// ─── Directed scenarios ──────────────────────────────────────────────────────

#[test]
fn order_four_split_shape() {
    // At order 4 (capacity 3) the fourth insert forces the first split and
    // the fifth lands in the right leaf without another one.
    let mut tree: BPlusTree<i64> = BPlusTree::new(4);
    for key in [10, 20, 30, 40] {
        tree.insert(key);
    }
    assert_eq!(tree.dump(), "[30]\n[10, 20]  [30, 40]\n");

    tree.insert(50);
    assert_eq!(tree.dump(), "[30]\n[10, 20]  [30, 40, 50]\n");
}

#[test]
fn order_three_root_collapse() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(3);
    for key in [10, 20, 30, 40] {
        tree.insert(key);
    }

    assert!(tree.delete(&40));
    assert!(tree.delete(&30));

    assert_eq!(contents(&tree), vec![10, 20]);
    assert!(tree.search(&10));
    assert!(tree.search(&20));
    assert!(!tree.search(&30));
}

#[test]
fn range_search_inclusive_bounds() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(4);
    for key in [10, 20, 30, 40, 50] {
        tree.insert(key);
    }

    let hits: Vec<i64> = tree.range_search(&20, &35).copied().collect();
    assert_eq!(hits, vec![20, 30]);

    let all: Vec<i64> = tree.range_search(&10, &50).copied().collect();
    assert_eq!(all, vec![10, 20, 30, 40, 50]);

    let exact: Vec<i64> = tree.range_search(&30, &30).copied().collect();
    assert_eq!(exact, vec![30]);
}

#[test]
fn inverted_range_is_empty() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(4);
    for key in [10, 20, 30] {
        tree.insert(key);
    }
    assert_eq!(tree.range_search(&30, &10).count(), 0);
}

#[test]
fn range_search_is_restartable() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(4);
    for key in 0..100 {
        tree.insert(key);
    }

    let first: Vec<i64> = tree.range_search(&25, &75).copied().collect();
    let second: Vec<i64> = tree.range_search(&25, &75).copied().collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 51);
}

#[test]
fn delete_absent_leaves_tree_unchanged() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(4);
    for key in [10, 20, 30, 40, 50] {
        tree.insert(key);
    }

    let before = tree.dump();
    assert!(!tree.delete(&35));
    assert_eq!(tree.dump(), before);
    assert_eq!(tree.len(), 5);
}

#[test]
fn duplicate_insert_is_a_noop() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(4);
    tree.insert(10);
    tree.insert(10);
    assert_eq!(tree.len(), 1);
    assert_eq!(contents(&tree), vec![10]);
}

#[test]
#[should_panic(expected = "`order` must be at least 3")]
fn order_below_three_is_rejected() {
    let _: BPlusTree<i64> = BPlusTree::new(2);
}

#[test]
fn large_orders_match_model() {
    // Wide fanouts exercise multi-key borrows within one node.
    for order in [13, 24] {
        let mut tree: BPlusTree<i64> = BPlusTree::new(order);
        let mut model: BTreeSet<i64> = BTreeSet::new();

        // Deterministic LCG keys so the shape is reproducible.
        let mut x: u64 = 12345;
        for _ in 0..5_000 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            let key = ((x >> 33) % 10_000) as i64;
            tree.insert(key);
            model.insert(key);
        }
        for _ in 0..2_500 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            let key = ((x >> 33) % 10_000) as i64;
            assert_eq!(tree.delete(&key), model.remove(&key));
        }

        let want: Vec<i64> = model.iter().copied().collect();
        assert_eq!(contents(&tree), want, "order {order}");
    }
}

// ─── Mutation log ────────────────────────────────────────────────────────────

#[test]
fn mutation_log_sees_leaf_updates_and_splits() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(3);
    let log: EventLog<i64> = EventLog::new();
    tree.subscribe_mutations(Box::new(log.clone()));

    tree.insert(10);
    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, MutationKind::Updated);
    assert_eq!(events[0].before.as_ref().unwrap().keys, Vec::<i64>::new());
    assert_eq!(events[0].after.keys, vec![10]);

    log.clear();
    tree.insert(20);
    tree.insert(30); // capacity 2: this one splits the root leaf

    let events = log.events();
    let created: Vec<_> = events.iter().filter(|e| e.kind == MutationKind::Created).collect();
    // A new right leaf and a new root.
    assert_eq!(created.len(), 2);
    assert!(created.iter().any(|e| e.after.is_leaf && e.after.keys == vec![20, 30]));
    assert!(created.iter().any(|e| !e.after.is_leaf && e.after.keys == vec![20]));
}

#[test]
fn mutation_log_does_not_affect_tree_state() {
    let mut observed: BPlusTree<i64> = BPlusTree::new(4);
    let mut silent: BPlusTree<i64> = BPlusTree::new(4);
    let log: EventLog<i64> = EventLog::new();
    observed.subscribe_mutations(Box::new(log.clone()));

    let mut x: u64 = 99;
    for _ in 0..500 {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
        let key = ((x >> 33) % 300) as i64;
        if x % 3 == 0 {
            assert_eq!(observed.delete(&key), silent.delete(&key));
        } else {
            observed.insert(key);
            silent.insert(key);
        }
    }

    assert!(!log.is_empty());
    assert_eq!(contents(&observed), contents(&silent));
}

#[test]
fn absent_key_operations_record_no_events() {
    let mut tree: BPlusTree<i64> = BPlusTree::new(4);
    tree.insert(10);

    let log: EventLog<i64> = EventLog::new();
    tree.subscribe_mutations(Box::new(log.clone()));

    assert!(!tree.delete(&99)); // not found: no mutation, no event
    tree.insert(10); // duplicate: rejected, no event
    assert!(log.is_empty());
}
