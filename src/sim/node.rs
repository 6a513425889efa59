//! Node runtime: inbox processing, the pending-parent reassembly pool, and
//! the admission path tying validation, linkage, overlay, and tracing
//! together.
//!
//! Gossip over an adversarial bus routinely delivers children before their
//! parents. Rejecting them would destroy eventual convergence, so linkage
//! failures with a missing parent park the message in a bounded pool keyed
//! by the awaited digest, and every successful link drains its waiters.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::DvelConfig;
use crate::crypto::AuthorKeypair;
use crate::event::{Event, EventId, PublicKey};
use crate::ledger::{Ledger, LinkOutcome};
use crate::selector::{select_preferred_tip, PreferredTip};
use crate::sim::bus::Message;
use crate::sybil::SybilOverlay;
use crate::trace::{TraceRecorder, TraceRow};
use crate::validation::{validate_event, ValidationContext};
use crate::Hash;

/// Counters for one admission pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub accepted: u64,
    pub rejected: u64,
    pub pending_added: u64,
    pub pending_drained: u64,
    pub pending_dropped: u64,
}

impl NodeStats {
    pub fn merge(&mut self, other: NodeStats) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.pending_added += other.pending_added;
        self.pending_drained += other.pending_drained;
        self.pending_dropped += other.pending_dropped;
    }

    pub fn any(&self) -> bool {
        self.accepted != 0
            || self.rejected != 0
            || self.pending_added != 0
            || self.pending_drained != 0
            || self.pending_dropped != 0
    }
}

/// A simulated node: one author identity plus its exclusively owned ledger,
/// validation contexts, sybil overlay, trace recorder, inbox, and
/// pending-parent pool.
pub struct SimNode {
    id: u32,
    keypair: AuthorKeypair,
    config: DvelConfig,
    ledger: Ledger,
    overlay: SybilOverlay,
    trace: TraceRecorder,
    contexts: HashMap<PublicKey, ValidationContext>,
    /// Recently seen digests; cleared wholesale at capacity. Re-processing
    /// after a clear is idempotent because linkage reports `Duplicate`.
    seen: HashSet<EventId>,
    inbox: VecDeque<Message>,
    /// Events waiting for a parent, keyed by the awaited digest.
    pending: HashMap<Hash, VecDeque<Message>>,
    pending_total: usize,
}

impl SimNode {
    pub fn new(id: u32, keypair: AuthorKeypair, config: DvelConfig) -> Self {
        let overlay = SybilOverlay::new(config.sybil.clone());
        SimNode {
            id,
            keypair,
            config,
            ledger: Ledger::new(),
            overlay,
            trace: TraceRecorder::new(),
            contexts: HashMap::new(),
            seen: HashSet::new(),
            inbox: VecDeque::new(),
            pending: HashMap::new(),
            pending_total: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The node's author public key.
    pub fn author(&self) -> PublicKey {
        self.keypair.public()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn overlay(&self) -> &SybilOverlay {
        &self.overlay
    }

    pub fn trace(&self) -> &TraceRecorder {
        &self.trace
    }

    /// Events currently parked in the pending-parent pool.
    pub fn pending_len(&self) -> usize {
        self.pending_total
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Build and sign an event authored by this node.
    pub fn make_event(&self, timestamp: u64, prev: Hash, payload_tag: u8) -> Message {
        let payload_hash = crate::hash_domain("dvel.sim.payload", &[payload_tag]);
        let mut event = Event::new(prev, self.keypair.public(), timestamp, payload_hash, [0u8; 64]);
        event.signature = self.keypair.sign_event(&event);
        Message {
            from: self.id,
            to: self.id,
            event,
        }
    }

    /// First tip in canonical order, or the zero hash; producers use this
    /// as the parent for their next event.
    pub fn current_tip_or_zero(&self) -> Hash {
        self.ledger.first_tip_or_zero()
    }

    /// The node's preferred tip under sybil-aware weighting, with the
    /// ancestor walk bounded by the overlay's `max_link_walk`.
    pub fn preferred_tip(&self, tick: u64) -> Option<PreferredTip> {
        select_preferred_tip(
            &self.ledger,
            &self.overlay,
            tick,
            self.config.sybil.max_link_walk,
        )
    }

    /// Admit a locally produced event without going through the bus.
    pub fn local_append(&mut self, msg: &Message, now: u64) -> NodeStats {
        let mut stats = NodeStats::default();
        self.accept_or_queue(msg.clone(), now, &mut stats);
        stats
    }

    pub fn inbox_push(&mut self, msg: Message) {
        self.inbox.push_back(msg);
    }

    /// Drain the inbox to completion, FIFO.
    pub fn process_inbox(&mut self, now: u64) -> NodeStats {
        self.process_inbox_inner(now, false)
    }

    /// Drain the inbox in reverse order (reorder-attack victim path).
    pub fn process_inbox_reversed(&mut self, now: u64) -> NodeStats {
        self.process_inbox_inner(now, true)
    }

    fn process_inbox_inner(&mut self, now: u64, reverse: bool) -> NodeStats {
        if reverse {
            self.inbox.make_contiguous().reverse();
        }
        let mut stats = NodeStats::default();
        while let Some(msg) = self.inbox.pop_front() {
            self.accept_or_queue(msg, now, &mut stats);
        }
        stats
    }

    /// Core admission path: dedup, validate, link; then observe and drain
    /// waiters on success, or park the message on a missing parent.
    fn accept_or_queue(&mut self, msg: Message, now: u64, stats: &mut NodeStats) {
        let event_id = msg.event.id();
        if self.seen.contains(&event_id) {
            return;
        }

        let ctx = self.contexts.entry(msg.event.author).or_default();
        if let Err(err) = validate_event(&msg.event, ctx, &self.config.validation) {
            stats.rejected += 1;
            tracing::debug!(node = self.id, from = msg.from, %err, "validation reject");
            return;
        }

        match self.ledger.link(msg.event.clone()) {
            LinkOutcome::Linked(id) => {
                stats.accepted += 1;
                self.observe_accepted(id, now);
                self.remember(id);
                self.drain_pending_for(id, now, stats);
            }
            LinkOutcome::Duplicate => {
                // Already in the ledger; not a reject.
            }
            LinkOutcome::MissingParent => {
                self.queue_pending(msg, stats);
            }
        }
    }

    /// Feed an accepted event into the overlay and record a trace row.
    fn observe_accepted(&mut self, id: EventId, now: u64) {
        let Some(observation) = self.overlay.observe(&self.ledger, now, id) else {
            return;
        };
        let event = self
            .ledger
            .get(&id)
            .expect("accepted event is in the ledger");
        let mut row = TraceRow::from_event(self.id, event);
        row.parent_present = observation.parent_present;
        row.ancestor_check = !observation.equivocation;
        row.quarantined_until_before = observation.quarantined_until_before;
        row.quarantined_until_after = observation.quarantined_until_after;
        row.author_weight_fp = self.overlay.author_weight_fp(now, &observation.author);
        self.trace.record(row);
    }

    fn remember(&mut self, id: EventId) {
        self.seen.insert(id);
        if self.seen.len() > self.config.node.max_seen {
            self.seen.clear();
        }
    }

    fn queue_pending(&mut self, msg: Message, stats: &mut NodeStats) {
        if self.pending_total >= self.config.node.max_pending_total {
            stats.pending_dropped += 1;
            tracing::debug!(
                node = self.id,
                from = msg.from,
                awaiting = %hex::encode(&msg.event.prev_hash[..4]),
                "pending pool full, dropping newest"
            );
            return;
        }
        self.pending
            .entry(msg.event.prev_hash)
            .or_default()
            .push_back(msg);
        self.pending_total += 1;
        stats.pending_added += 1;
    }

    /// Drain every waiter transitively unblocked by a newly linked event.
    ///
    /// Iterative worklist over newly available parents, bounded by
    /// `max_drain_steps` per admission pass; leftovers re-enter the pool in
    /// FIFO order so a later link resumes exactly where this one stopped.
    fn drain_pending_for(&mut self, linked: EventId, now: u64, stats: &mut NodeStats) {
        let mut parents: VecDeque<Hash> = VecDeque::from([linked.0]);
        let mut steps = 0usize;

        while let Some(parent) = parents.pop_front() {
            let Some(mut bucket) = self.pending.remove(&parent) else {
                continue;
            };
            self.pending_total = self.pending_total.saturating_sub(bucket.len());

            while let Some(child) = bucket.pop_front() {
                if steps >= self.config.node.max_drain_steps {
                    // Bound hit: everything unprocessed goes back through
                    // the capped insert path.
                    self.queue_pending(child, stats);
                    while let Some(rest) = bucket.pop_front() {
                        self.queue_pending(rest, stats);
                    }
                    return;
                }
                steps += 1;

                let ctx = self.contexts.entry(child.event.author).or_default();
                if let Err(err) = validate_event(&child.event, ctx, &self.config.validation) {
                    stats.rejected += 1;
                    tracing::debug!(node = self.id, from = child.from, %err, "pending child reject");
                    continue;
                }

                match self.ledger.link(child.event.clone()) {
                    LinkOutcome::Linked(id) => {
                        stats.accepted += 1;
                        stats.pending_drained += 1;
                        self.observe_accepted(id, now);
                        self.remember(id);
                        parents.push_back(id.0);
                    }
                    LinkOutcome::Duplicate => {}
                    LinkOutcome::MissingParent => {
                        // Still blocked on a grandparent.
                        self.queue_pending(child, stats);
                    }
                }
            }
        }
    }
}
