//! Append-only event ledger: content-addressed storage, tip tracking, and
//! the set-level Merkle digest.
//!
//! The ledger checks linkage only. Validation (version, signature,
//! timestamp) is a separate layer so that a node can keep unvalidated
//! events out of the ledger without the ledger knowing why.

use std::collections::{HashMap, HashSet};

use crate::event::{Event, EventId, ZERO_HASH};
use crate::Hash;

/// Outcome of a linkage attempt.
///
/// `Duplicate` and `MissingParent` are expected control flow under gossip,
/// not errors: the admission path treats the former as a no-op and parks
/// the latter in the pending-parent pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Event inserted; tips updated.
    Linked(EventId),
    /// The exact event (same digest) is already present; no mutation.
    Duplicate,
    /// `prev_hash` is non-zero and unknown; no mutation.
    MissingParent,
}

/// The append-only event store.
#[derive(Debug, Default)]
pub struct Ledger {
    /// All events indexed by digest.
    events: HashMap<EventId, Event>,
    /// Digests with no linked child yet.
    tips: HashSet<EventId>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Attempt to link an event into the ledger.
    ///
    /// Linkage requires the parent to be present (or genesis); the event is
    /// stored under its digest, the parent leaves the tip set, and the new
    /// event enters it.
    pub fn link(&mut self, event: Event) -> LinkOutcome {
        let id = event.id();
        if self.events.contains_key(&id) {
            return LinkOutcome::Duplicate;
        }
        let parent = EventId(event.prev_hash);
        if !event.is_genesis() && !self.events.contains_key(&parent) {
            return LinkOutcome::MissingParent;
        }

        if !event.is_genesis() {
            self.tips.remove(&parent);
        }
        self.tips.insert(id);
        self.events.insert(id, event);
        LinkOutcome::Linked(id)
    }

    /// Look up an event by digest.
    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.get(id)
    }

    /// Whether a digest is present.
    pub fn contains(&self, id: &EventId) -> bool {
        self.events.contains_key(id)
    }

    /// Current tips (events with no linked child).
    pub fn tips(&self) -> &HashSet<EventId> {
        &self.tips
    }

    /// Tips in canonical (lexicographic) order for deterministic iteration.
    pub fn tips_sorted(&self) -> Vec<EventId> {
        let mut out: Vec<EventId> = self.tips.iter().copied().collect();
        out.sort();
        out
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All stored digests in canonical order.
    pub fn ids_sorted(&self) -> Vec<EventId> {
        let mut out: Vec<EventId> = self.events.keys().copied().collect();
        out.sort();
        out
    }

    /// Merkle root over the set of stored digests.
    ///
    /// Digests are sorted lexicographically, then folded pairwise with
    /// BLAKE3, duplicating the last node on odd levels. The root is a pure
    /// function of the digest set, so peers with equal ledgers agree on it
    /// regardless of insertion order. Returns `None` on an empty ledger.
    pub fn merkle_root(&self) -> Option<Hash> {
        if self.events.is_empty() {
            return None;
        }
        let mut level: Vec<Hash> = self.ids_sorted().into_iter().map(|id| id.0).collect();
        while level.len() > 1 {
            let mut next: Vec<Hash> = Vec::with_capacity(level.len().div_ceil(2));
            let mut i = 0;
            while i < level.len() {
                let a = level[i];
                let b = if i + 1 < level.len() {
                    level[i + 1]
                } else {
                    level[i]
                };
                let mut hasher = blake3::Hasher::new();
                hasher.update(&a);
                hasher.update(&b);
                next.push(*hasher.finalize().as_bytes());
                i += 2;
            }
            level = next;
        }
        level.first().copied()
    }

    /// First tip in canonical order, or the zero hash when empty.
    ///
    /// Producers use this as the parent for their next event.
    pub fn first_tip_or_zero(&self) -> Hash {
        self.tips_sorted().first().map(|id| id.0).unwrap_or(ZERO_HASH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ZERO_HASH;

    fn make_event(prev: Hash, author_tag: u8, ts: u64) -> Event {
        Event::new(prev, [author_tag; 32], ts, [ts as u8; 32], [author_tag; 64])
    }

    #[test]
    fn link_genesis_and_child() {
        let mut ledger = Ledger::new();
        let genesis = make_event(ZERO_HASH, 1, 1);
        let gid = match ledger.link(genesis) {
            LinkOutcome::Linked(id) => id,
            other => panic!("expected Linked, got {:?}", other),
        };
        assert_eq!(ledger.len(), 1);
        assert!(ledger.tips().contains(&gid));

        let child = make_event(gid.0, 2, 2);
        let cid = match ledger.link(child) {
            LinkOutcome::Linked(id) => id,
            other => panic!("expected Linked, got {:?}", other),
        };
        assert_eq!(ledger.len(), 2);
        assert!(ledger.tips().contains(&cid));
        assert!(!ledger.tips().contains(&gid));
    }

    #[test]
    fn duplicate_is_a_no_op() {
        let mut ledger = Ledger::new();
        let ev = make_event(ZERO_HASH, 1, 1);
        assert!(matches!(ledger.link(ev.clone()), LinkOutcome::Linked(_)));

        let tips_before = ledger.tips_sorted();
        let root_before = ledger.merkle_root();
        assert_eq!(ledger.link(ev), LinkOutcome::Duplicate);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.tips_sorted(), tips_before);
        assert_eq!(ledger.merkle_root(), root_before);
    }

    #[test]
    fn missing_parent_rejected_without_mutation() {
        let mut ledger = Ledger::new();
        let orphan = make_event([0xEE; 32], 1, 1);
        assert_eq!(ledger.link(orphan), LinkOutcome::MissingParent);
        assert!(ledger.is_empty());
        assert!(ledger.tips().is_empty());
    }

    #[test]
    fn fork_keeps_both_tips() {
        let mut ledger = Ledger::new();
        let genesis = make_event(ZERO_HASH, 1, 1);
        let gid = match ledger.link(genesis) {
            LinkOutcome::Linked(id) => id,
            other => panic!("unexpected {:?}", other),
        };
        let a = make_event(gid.0, 2, 2);
        let b = make_event(gid.0, 3, 2);
        assert!(matches!(ledger.link(a), LinkOutcome::Linked(_)));
        assert!(matches!(ledger.link(b), LinkOutcome::Linked(_)));
        assert_eq!(ledger.tips().len(), 2);
        assert!(!ledger.tips().contains(&gid));
    }

    #[test]
    fn merkle_root_is_order_independent() {
        let genesis = make_event(ZERO_HASH, 1, 1);
        let gid = genesis.id();
        let a = make_event(gid.0, 2, 2);
        let aid = a.id();
        let b = make_event(aid.0, 3, 3);

        let mut forward = Ledger::new();
        forward.link(genesis.clone());
        forward.link(a.clone());
        forward.link(b.clone());

        // Same set, different arrival story (b must wait for a either way,
        // so replay the same topological order into a second ledger).
        let mut replay = Ledger::new();
        replay.link(genesis);
        replay.link(a);
        replay.link(b);

        assert_eq!(forward.merkle_root(), replay.merkle_root());
        assert!(forward.merkle_root().is_some());
    }

    #[test]
    fn merkle_root_empty_and_single() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.merkle_root(), None);

        let ev = make_event(ZERO_HASH, 1, 1);
        let id = ev.id();
        ledger.link(ev);
        // A single leaf is its own root.
        assert_eq!(ledger.merkle_root(), Some(id.0));
    }

    #[test]
    fn first_tip_or_zero_on_empty() {
        let ledger = Ledger::new();
        assert_eq!(ledger.first_tip_or_zero(), ZERO_HASH);
    }
}
