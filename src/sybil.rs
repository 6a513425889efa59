//! Sybil mitigation overlay: per-author state with equivocation quarantine,
//! warmup, and an integer fixed-point weight function.
//!
//! The overlay observes events only after the ledger accepted them. Authors
//! are keyed by their full 32-byte public key. All weight arithmetic is
//! integer fixed-point with a single truncating division so every peer
//! computes bit-identical weights.

use std::collections::HashMap;

use crate::config::SybilConfig;
use crate::constants::{DECAY_WINDOW, RATE_WINDOW};
use crate::event::{EventId, PublicKey, ZERO_HASH};
use crate::ledger::Ledger;
use crate::Hash;

/// Per-author overlay state, created lazily on first observation.
#[derive(Clone, Debug)]
pub struct AuthorState {
    /// Tick of the author's first observed event.
    pub first_seen: u64,
    /// Timestamp of the author's most recent observed event.
    pub last_timestamp: u64,
    /// Gap between the author's two most recent timestamps (0 until the
    /// second event); feeds the rate factor.
    pub last_delta: u64,
    /// Digest of the most recent observed event.
    pub last_event: Option<EventId>,
    /// Parent referenced by the most recent observed event.
    pub last_prev: Hash,
    /// The author's latest tip (same as `last_event` once set).
    pub latest_tip: Option<EventId>,
    /// Tick at which the author becomes weight-bearing again.
    pub quarantined_until: u64,
    /// Siblings of the latest tip observed before it (fork depth).
    pub fork_depth: u64,
}

impl AuthorState {
    fn first_seen_at(tick: u64) -> Self {
        AuthorState {
            first_seen: tick,
            last_timestamp: 0,
            last_delta: 0,
            last_event: None,
            last_prev: ZERO_HASH,
            latest_tip: None,
            quarantined_until: 0,
            fork_depth: 0,
        }
    }
}

/// What a single observation did to the overlay; consumed by the trace
/// recorder.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    pub author: PublicKey,
    /// Whether the event's parent was present in the ledger (true for
    /// genesis events).
    pub parent_present: bool,
    /// True when this observation detected an equivocation.
    pub equivocation: bool,
    pub quarantined_until_before: u64,
    pub quarantined_until_after: u64,
}

/// The per-node sybil overlay.
#[derive(Debug)]
pub struct SybilOverlay {
    config: SybilConfig,
    authors: HashMap<PublicKey, AuthorState>,
    /// Observed accepted children per parent digest (fork depth source).
    child_counts: HashMap<Hash, u64>,
}

impl SybilOverlay {
    pub fn new(config: SybilConfig) -> Self {
        SybilOverlay {
            config,
            authors: HashMap::new(),
            child_counts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SybilConfig {
        &self.config
    }

    /// Observe an event the ledger has accepted.
    ///
    /// Looks the event up by digest; an unknown digest is a no-op (`None`).
    /// Equivocation is two distinct events from one author on the same
    /// parent; it extends the author's quarantine to at least
    /// `tick + quarantine_ticks`. The author's state then advances to the
    /// new event, and the parent's child counter grows by one.
    pub fn observe(&mut self, ledger: &Ledger, tick: u64, event_id: EventId) -> Option<Observation> {
        let event = ledger.get(&event_id)?;
        let author = event.author;
        let prev_hash = event.prev_hash;
        let timestamp = event.timestamp;
        let parent_present =
            event.is_genesis() || ledger.contains(&EventId(prev_hash));

        let state = self
            .authors
            .entry(author)
            .or_insert_with(|| AuthorState::first_seen_at(tick));
        let quarantined_until_before = state.quarantined_until;

        let mut equivocation = false;
        if let Some(last_event) = state.last_event {
            if state.last_prev == prev_hash && last_event != event_id {
                equivocation = true;
                state.quarantined_until = state
                    .quarantined_until
                    .max(tick + self.config.quarantine_ticks);
                tracing::debug!(
                    author = %hex::encode(&author[..4]),
                    until = state.quarantined_until,
                    "equivocation detected, author quarantined"
                );
            }
        }

        state.last_delta = if state.last_event.is_some() {
            timestamp.saturating_sub(state.last_timestamp)
        } else {
            0
        };
        state.last_prev = prev_hash;
        state.last_event = Some(event_id);
        state.last_timestamp = timestamp;
        state.latest_tip = Some(event_id);

        let children = self.child_counts.entry(prev_hash).or_insert(0);
        state.fork_depth = *children;
        *children += 1;

        Some(Observation {
            author,
            parent_present,
            equivocation,
            quarantined_until_before,
            quarantined_until_after: state.quarantined_until,
        })
    }

    /// Fixed-point author weight at `tick`, in units of
    /// `1 / fixed_point_scale`.
    ///
    /// Zero for unknown authors, during warmup, and during quarantine.
    /// Otherwise the product of three dampening factors, evaluated as one
    /// integer expression with a single truncating division:
    /// rate `min(Δt, RATE_WINDOW) / RATE_WINDOW`, fork `1 / (1 + depth)`,
    /// decay `DECAY_WINDOW / (DECAY_WINDOW + age)`.
    pub fn author_weight_fp(&self, tick: u64, author: &PublicKey) -> u64 {
        let Some(state) = self.authors.get(author) else {
            return 0;
        };
        if tick < state.first_seen + self.config.warmup_ticks {
            return 0;
        }
        if tick < state.quarantined_until {
            return 0;
        }

        let rate_delta = state.last_delta.min(RATE_WINDOW);
        let age = tick.saturating_sub(state.last_timestamp);
        let numerator = self.config.fixed_point_scale as u128
            * rate_delta as u128
            * DECAY_WINDOW as u128;
        let denominator = RATE_WINDOW as u128
            * (1 + state.fork_depth as u128)
            * (DECAY_WINDOW as u128 + age as u128);
        (numerator / denominator) as u64
    }

    /// The author's overlay state, if the author has been observed.
    pub fn author_state(&self, author: &PublicKey) -> Option<&AuthorState> {
        self.authors.get(author)
    }

    /// Tick at which the author re-becomes weight-bearing (0 when never
    /// quarantined or unknown).
    pub fn quarantined_until(&self, author: &PublicKey) -> u64 {
        self.authors
            .get(author)
            .map(|s| s.quarantined_until)
            .unwrap_or(0)
    }

    /// Observed accepted children of a parent digest.
    pub fn child_count(&self, parent: &Hash) -> u64 {
        self.child_counts.get(parent).copied().unwrap_or(0)
    }

    /// Number of distinct authors observed.
    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_FIXED_POINT_SCALE, DEFAULT_QUARANTINE_TICKS};
    use crate::event::Event;
    use crate::ledger::LinkOutcome;

    fn overlay() -> SybilOverlay {
        SybilOverlay::new(SybilConfig::default())
    }

    fn link(ledger: &mut Ledger, prev: Hash, author_tag: u8, ts: u64, payload: u8) -> EventId {
        let ev = Event::new(prev, [author_tag; 32], ts, [payload; 32], [author_tag; 64]);
        match ledger.link(ev) {
            LinkOutcome::Linked(id) => id,
            other => panic!("expected Linked, got {:?}", other),
        }
    }

    #[test]
    fn unknown_digest_is_a_no_op() {
        let ledger = Ledger::new();
        let mut overlay = overlay();
        assert!(overlay
            .observe(&ledger, 1, EventId([0xAA; 32]))
            .is_none());
        assert_eq!(overlay.author_count(), 0);
    }

    #[test]
    fn warmup_suppresses_weight() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();
        let author = [1u8; 32];

        let e1 = link(&mut ledger, ZERO_HASH, 1, 1, 0x10);
        overlay.observe(&ledger, 1, e1);
        let e2 = link(&mut ledger, e1.0, 1, 7, 0x11);
        overlay.observe(&ledger, 7, e2);

        // first_seen = 1, warmup = 4: zero weight strictly before tick 5.
        for tick in 1..5 {
            assert_eq!(overlay.author_weight_fp(tick, &author), 0, "tick {}", tick);
        }
        assert!(overlay.author_weight_fp(7, &author) > 0);
    }

    #[test]
    fn first_event_carries_no_rate() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();
        let author = [1u8; 32];

        let e1 = link(&mut ledger, ZERO_HASH, 1, 1, 0x10);
        overlay.observe(&ledger, 1, e1);
        // Past warmup but Δt is still 0: the rate factor zeroes the weight.
        assert_eq!(overlay.author_weight_fp(20, &author), 0);
    }

    #[test]
    fn weight_reaches_full_scale_for_slow_fresh_author() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();
        let author = [1u8; 32];

        let e1 = link(&mut ledger, ZERO_HASH, 1, 1, 0x10);
        overlay.observe(&ledger, 1, e1);
        // Second event RATE_WINDOW later: rate factor 1.
        let e2 = link(&mut ledger, e1.0, 1, 1 + RATE_WINDOW, 0x11);
        overlay.observe(&ledger, 1 + RATE_WINDOW, e2);

        // Queried right at the event's own timestamp: age 0, no fork.
        assert_eq!(
            overlay.author_weight_fp(1 + RATE_WINDOW, &author),
            DEFAULT_FIXED_POINT_SCALE
        );
    }

    #[test]
    fn rate_factor_dampens_fast_authors() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();
        let author = [1u8; 32];

        let e1 = link(&mut ledger, ZERO_HASH, 1, 10, 0x10);
        overlay.observe(&ledger, 1, e1);
        let e2 = link(&mut ledger, e1.0, 1, 11, 0x11);
        overlay.observe(&ledger, 11, e2);

        // Δt = 1 out of RATE_WINDOW = 5: a fifth of the scale.
        assert_eq!(
            overlay.author_weight_fp(11, &author),
            DEFAULT_FIXED_POINT_SCALE / RATE_WINDOW
        );
    }

    #[test]
    fn decay_factor_halves_at_decay_window() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();
        let author = [1u8; 32];

        let e1 = link(&mut ledger, ZERO_HASH, 1, 1, 0x10);
        overlay.observe(&ledger, 1, e1);
        let e2 = link(&mut ledger, e1.0, 1, 1 + RATE_WINDOW, 0x11);
        overlay.observe(&ledger, 1 + RATE_WINDOW, e2);

        let fresh = overlay.author_weight_fp(1 + RATE_WINDOW, &author);
        let aged = overlay.author_weight_fp(1 + RATE_WINDOW + DECAY_WINDOW, &author);
        assert_eq!(fresh, DEFAULT_FIXED_POINT_SCALE);
        assert_eq!(aged, DEFAULT_FIXED_POINT_SCALE / 2);
    }

    #[test]
    fn fork_depth_dampens_siblings() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();

        let g = link(&mut ledger, ZERO_HASH, 1, 1, 0x10);
        overlay.observe(&ledger, 1, g);

        // Three siblings on the same parent, different authors.
        for (tag, payload) in [(2u8, 0x20u8), (3, 0x21), (4, 0x22)] {
            let id = link(&mut ledger, g.0, tag, 10, payload);
            overlay.observe(&ledger, 10, id);
        }

        let s2 = overlay.author_state(&[2u8; 32]).unwrap();
        let s3 = overlay.author_state(&[3u8; 32]).unwrap();
        let s4 = overlay.author_state(&[4u8; 32]).unwrap();
        assert_eq!(s2.fork_depth, 0);
        assert_eq!(s3.fork_depth, 1);
        assert_eq!(s4.fork_depth, 2);
    }

    #[test]
    fn equivocation_quarantines_for_the_configured_window() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();
        let author = [1u8; 32];

        // Two genesis-parent events from one author, differing in payload.
        let e_x = link(&mut ledger, ZERO_HASH, 1, 3, 0x01);
        let e_y = link(&mut ledger, ZERO_HASH, 1, 3, 0x02);
        overlay.observe(&ledger, 3, e_x);
        let obs = overlay.observe(&ledger, 3, e_y).unwrap();

        assert!(obs.equivocation);
        assert_eq!(obs.quarantined_until_before, 0);
        assert_eq!(obs.quarantined_until_after, 3 + DEFAULT_QUARANTINE_TICKS);

        for tick in 3..(3 + DEFAULT_QUARANTINE_TICKS) {
            assert_eq!(overlay.author_weight_fp(tick, &author), 0, "tick {}", tick);
        }
    }

    #[test]
    fn repeat_equivocation_extends_quarantine() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();

        let e_x = link(&mut ledger, ZERO_HASH, 1, 3, 0x01);
        let e_y = link(&mut ledger, ZERO_HASH, 1, 3, 0x02);
        let e_z = link(&mut ledger, ZERO_HASH, 1, 4, 0x03);
        overlay.observe(&ledger, 3, e_x);
        overlay.observe(&ledger, 3, e_y);
        assert_eq!(
            overlay.quarantined_until(&[1u8; 32]),
            3 + DEFAULT_QUARANTINE_TICKS
        );
        overlay.observe(&ledger, 8, e_z);
        assert_eq!(
            overlay.quarantined_until(&[1u8; 32]),
            8 + DEFAULT_QUARANTINE_TICKS
        );
    }

    #[test]
    fn honest_chain_extension_is_not_equivocation() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();

        let e1 = link(&mut ledger, ZERO_HASH, 1, 1, 0x10);
        overlay.observe(&ledger, 1, e1);
        let e2 = link(&mut ledger, e1.0, 1, 2, 0x11);
        let obs = overlay.observe(&ledger, 2, e2).unwrap();
        assert!(!obs.equivocation);
        assert_eq!(overlay.quarantined_until(&[1u8; 32]), 0);
    }

    #[test]
    fn re_observing_same_event_is_not_equivocation() {
        let mut ledger = Ledger::new();
        let mut overlay = overlay();

        let e1 = link(&mut ledger, ZERO_HASH, 1, 1, 0x10);
        overlay.observe(&ledger, 1, e1);
        let obs = overlay.observe(&ledger, 2, e1).unwrap();
        assert!(!obs.equivocation);
    }

    #[test]
    fn authors_with_shared_key_prefix_stay_distinct() {
        // Keys differing only past the first byte must not collide.
        let mut ledger = Ledger::new();
        let mut overlay = overlay();

        let mut key_a = [0x42u8; 32];
        let mut key_b = [0x42u8; 32];
        key_a[31] = 1;
        key_b[31] = 2;

        let ev_a = Event::new(ZERO_HASH, key_a, 1, [0x01; 32], [1u8; 64]);
        let ev_b = Event::new(ZERO_HASH, key_b, 9, [0x02; 32], [2u8; 64]);
        let id_a = match ledger.link(ev_a) {
            LinkOutcome::Linked(id) => id,
            other => panic!("unexpected {:?}", other),
        };
        let id_b = match ledger.link(ev_b) {
            LinkOutcome::Linked(id) => id,
            other => panic!("unexpected {:?}", other),
        };
        overlay.observe(&ledger, 1, id_a);
        overlay.observe(&ledger, 9, id_b);

        assert_eq!(overlay.author_count(), 2);
        assert_eq!(overlay.author_state(&key_a).unwrap().last_timestamp, 1);
        assert_eq!(overlay.author_state(&key_b).unwrap().last_timestamp, 9);
    }
}
