//! Gossip policies: how a producer's event fans out over the bus.
//!
//! Local append and broadcast topology are separate concerns; a policy only
//! decides who receives a copy and with what delay.

use crate::sim::bus::{Message, MessageBus};

/// Deterministic broadcast hook invoked by the simulation after a node
/// produces an event.
pub trait GossipPolicy {
    fn broadcast_event(
        &self,
        bus: &mut MessageBus,
        now: u64,
        from: u32,
        msg: &Message,
        peers: &[u32],
    );
}

/// Broadcast to every peer except self with a fixed delay.
pub struct BroadcastAll {
    pub delay: u64,
}

impl GossipPolicy for BroadcastAll {
    fn broadcast_event(
        &self,
        bus: &mut MessageBus,
        now: u64,
        from: u32,
        msg: &Message,
        peers: &[u32],
    ) {
        for &to in peers {
            if to == from {
                continue;
            }
            bus.send(from, to, msg.clone(), now, self.delay);
        }
    }
}

/// Eclipse topology: send only to an allowlist, regardless of the peer set.
pub struct AllowlistOnly {
    allowlist: Vec<u32>,
    delay: u64,
}

impl AllowlistOnly {
    pub fn new(mut allowlist: Vec<u32>, delay: u64) -> Self {
        allowlist.sort_unstable();
        AllowlistOnly { allowlist, delay }
    }
}

impl GossipPolicy for AllowlistOnly {
    fn broadcast_event(
        &self,
        bus: &mut MessageBus,
        now: u64,
        from: u32,
        msg: &Message,
        _peers: &[u32],
    ) {
        for &to in &self.allowlist {
            if to == from {
                continue;
            }
            bus.send(from, to, msg.clone(), now, self.delay);
        }
    }
}
