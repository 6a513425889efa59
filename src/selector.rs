//! Preferred-tip selection: sybil-weighted, bounded ancestor-walk scoring.
//!
//! Two peers with identical ledger and overlay state must pick the same
//! tip, so tips are visited in canonical digest order and ties go to the
//! lexicographically smaller digest.

use crate::event::{Event, EventId};
use crate::ledger::Ledger;
use crate::sybil::SybilOverlay;

/// A selected tip and its accumulated score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreferredTip {
    pub tip: EventId,
    pub score: u64,
}

/// Sum a weight over the ancestors of `start` (inclusive), walking
/// `prev_hash` links for at most `max_steps` events or until genesis.
fn walk_score<F>(ledger: &Ledger, start: EventId, max_steps: usize, mut weight_of: F) -> u64
where
    F: FnMut(&Event) -> u64,
{
    let mut score: u64 = 0;
    let mut current = Some(start);
    let mut steps = 0usize;
    while let Some(id) = current {
        if steps >= max_steps {
            break;
        }
        let Some(event) = ledger.get(&id) else {
            break;
        };
        score = score.saturating_add(weight_of(event));
        steps += 1;
        current = if event.is_genesis() {
            None
        } else {
            Some(EventId(event.prev_hash))
        };
    }
    score
}

fn select_with<F>(ledger: &Ledger, max_steps: usize, mut weight_of: F) -> Option<PreferredTip>
where
    F: FnMut(&Event) -> u64,
{
    let mut best: Option<PreferredTip> = None;
    // Ascending digest order + strictly-greater replacement resolves ties
    // toward the smaller digest.
    for tip in ledger.tips_sorted() {
        let score = walk_score(ledger, tip, max_steps, &mut weight_of);
        if best.map_or(true, |b| score > b.score) {
            best = Some(PreferredTip { tip, score });
        }
    }
    best
}

/// Select the preferred tip under sybil-aware weighting.
///
/// Each tip's score is the sum of `author_weight_fp(tick, ancestor.author)`
/// over its walked ancestry. Returns `None` on an empty ledger.
pub fn select_preferred_tip(
    ledger: &Ledger,
    overlay: &SybilOverlay,
    tick: u64,
    max_steps: usize,
) -> Option<PreferredTip> {
    select_with(ledger, max_steps, |event| {
        overlay.author_weight_fp(tick, &event.author)
    })
}

/// Control baseline: every walked ancestor contributes weight 1, so a tip's
/// score is its bounded chain length.
pub fn select_preferred_tip_unit(ledger: &Ledger, max_steps: usize) -> Option<PreferredTip> {
    select_with(ledger, max_steps, |_| 1)
}
