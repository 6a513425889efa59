//! Deterministic message bus: tick-indexed delivery with stable
//! `(deliver_tick, seq)` ordering.
//!
//! Every send is stamped with a monotone sequence number, so same-tick
//! deliveries drain in send order and two runs of the same scenario see
//! identical message streams.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::event::Event;
use crate::sim::schedule::DeliveryPolicy;

/// A gossip message addressed to one node.
#[derive(Clone, Debug)]
pub struct Message {
    pub from: u32,
    pub to: u32,
    pub event: Event,
}

/// A message scheduled for delivery at a tick.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub deliver_tick: u64,
    pub seq: u64,
    pub msg: Message,
}

// Heap ordering over (deliver_tick, seq) only; seq is unique per bus so the
// order is total without comparing message bodies.
impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.deliver_tick == other.deliver_tick && self.seq == other.seq
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deliver_tick, self.seq).cmp(&(other.deliver_tick, other.seq))
    }
}

/// Tick-scheduled message queue shared by all nodes in a simulation.
pub struct MessageBus {
    default_delay: u64,
    seq_counter: u64,
    queue: BinaryHeap<Reverse<Envelope>>,
}

impl MessageBus {
    pub fn new(default_delay: u64) -> Self {
        MessageBus {
            default_delay,
            seq_counter: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Schedule a message. A `delay` of 0 means the bus default.
    pub fn send(&mut self, from: u32, to: u32, mut msg: Message, now: u64, delay: u64) {
        msg.from = from;
        msg.to = to;
        let delay = if delay == 0 { self.default_delay } else { delay };
        let envelope = Envelope {
            deliver_tick: now + delay,
            seq: self.seq_counter,
            msg,
        };
        self.seq_counter += 1;
        self.queue.push(Reverse(envelope));
    }

    /// Deliver every message due at or before `now`, in
    /// `(deliver_tick, seq)` order.
    pub fn deliver<F>(&mut self, now: u64, mut push_into_inbox: F)
    where
        F: FnMut(u32, Message),
    {
        while let Some(Reverse(head)) = self.queue.peek() {
            if head.deliver_tick > now {
                break;
            }
            let Reverse(envelope) = self.queue.pop().expect("peeked element exists");
            push_into_inbox(envelope.msg.to, envelope.msg);
        }
    }

    /// Deliver through an adversarial policy. Messages the policy rejects
    /// are reinserted unchanged and retried on a later tick.
    pub fn deliver_with_policy<F>(
        &mut self,
        now: u64,
        policy: &dyn DeliveryPolicy,
        mut push_into_inbox: F,
    ) where
        F: FnMut(u32, Message),
    {
        let mut deferred: Vec<Envelope> = Vec::new();
        while let Some(Reverse(head)) = self.queue.peek() {
            if head.deliver_tick > now {
                break;
            }
            let Reverse(envelope) = self.queue.pop().expect("peeked element exists");
            if policy.allow_delivery(&envelope, now) {
                push_into_inbox(envelope.msg.to, envelope.msg);
            } else {
                deferred.push(envelope);
            }
        }
        for envelope in deferred {
            self.queue.push(Reverse(envelope));
        }
    }

    /// Messages still scheduled.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
