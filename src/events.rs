//! Mutation log: passive observation of node changes.
//!
//! A [`MutationSink`] subscribed to a tree receives one [`MutationEvent`] per
//! node touched during a public operation, carrying before/after snapshots of
//! that node's keys. The log is purely observational: events never influence
//! tree state, and the tree is fully usable with no sink attached.

use std::cell::RefCell;
use std::rc::Rc;

/// What happened to the node described by an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationKind {
    /// The node was allocated during the operation (split halves, new roots).
    Created,
    /// An existing node's keys or links changed.
    Updated,
}

/// Point-in-time copy of one node's externally relevant state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeSnapshot<K> {
    pub is_leaf: bool,
    pub keys: Vec<K>,
}

/// One node mutation observed during a public operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MutationEvent<K> {
    pub kind: MutationKind,
    /// Snapshot before the change; `None` for [`MutationKind::Created`].
    pub before: Option<NodeSnapshot<K>>,
    /// Snapshot after the change.
    pub after: NodeSnapshot<K>,
}

/// Receiver for mutation events.
pub trait MutationSink<K> {
    /// Called once per touched node, in the order the mutations happened.
    fn record(&mut self, event: MutationEvent<K>);

    /// Whether the tree should bother producing snapshots at all.
    fn enabled(&self) -> bool {
        true
    }
}

/// Sink used when nothing is subscribed; suppresses snapshot clones entirely.
pub(crate) struct NoopSink;

impl<K> MutationSink<K> for NoopSink {
    fn record(&mut self, _event: MutationEvent<K>) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// A shared, in-memory event collector.
///
/// Clones share the same buffer, so one clone can be subscribed to a tree
/// while another is kept around to read the recorded events back.
#[derive(Clone)]
pub struct EventLog<K> {
    events: Rc<RefCell<Vec<MutationEvent<K>>>>,
}

impl<K> EventLog<K> {
    pub fn new() -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Returns the events recorded so far, in order.
    pub fn events(&self) -> Vec<MutationEvent<K>>
    where
        K: Clone,
    {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Discards all recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl<K> Default for EventLog<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> MutationSink<K> for EventLog<K> {
    fn record(&mut self, event: MutationEvent<K>) {
        self.events.borrow_mut().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_clones_share_a_buffer() {
        let log: EventLog<i64> = EventLog::new();
        let mut subscribed = log.clone();

        subscribed.record(MutationEvent {
            kind: MutationKind::Updated,
            before: Some(NodeSnapshot { is_leaf: true, keys: vec![10] }),
            after: NodeSnapshot { is_leaf: true, keys: vec![10, 20] },
        });

        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].after.keys, vec![10, 20]);

        log.clear();
        assert!(subscribed.is_empty());
    }

    #[test]
    fn noop_sink_is_disabled() {
        assert!(!MutationSink::<i64>::enabled(&NoopSink));
    }
}
