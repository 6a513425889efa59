//! Adversarial delivery scheduling: delay, starvation, and reordering
//! policies applied at the bus pop point.

use crate::sim::bus::Envelope;

/// Decides delivery vs deferral for each due envelope.
///
/// Returning `false` keeps the envelope queued; the bus retries it on a
/// later tick with its original `(deliver_tick, seq)` stamp, so lifting a
/// policy releases the backlog in the original order.
pub trait DeliveryPolicy {
    fn allow_delivery(&self, envelope: &Envelope, now: u64) -> bool;

    /// Whether the consumer should drain this node's inbox in reverse.
    /// Only the reorder policy answers true for its victim.
    fn reverses(&self, _node: u32) -> bool {
        false
    }
}

/// Deliver everything on time.
pub struct Honest;

impl DeliveryPolicy for Honest {
    fn allow_delivery(&self, _envelope: &Envelope, _now: u64) -> bool {
        true
    }
}

/// Hold messages addressed to the victim for `extra` ticks past their
/// scheduled delivery.
pub struct FixedDelay {
    pub victim: u32,
    pub extra: u64,
}

impl DeliveryPolicy for FixedDelay {
    fn allow_delivery(&self, envelope: &Envelope, now: u64) -> bool {
        if envelope.msg.to == self.victim {
            return now >= envelope.deliver_tick + self.extra;
        }
        true
    }
}

/// Never deliver to the victim.
pub struct Starvation {
    pub victim: u32,
}

impl DeliveryPolicy for Starvation {
    fn allow_delivery(&self, envelope: &Envelope, _now: u64) -> bool {
        envelope.msg.to != self.victim
    }
}

/// Deliver everything, but flag the victim's inbox for reverse drain.
pub struct Reorder {
    pub victim: u32,
}

impl DeliveryPolicy for Reorder {
    fn allow_delivery(&self, _envelope: &Envelope, _now: u64) -> bool {
        true
    }

    fn reverses(&self, node: u32) -> bool {
        node == self.victim
    }
}
