//! Deterministic network simulation: nodes, bus, policies, and the
//! cooperative tick loop.
//!
//! Within a tick: scheduled producers emit and gossip, the bus delivers
//! every due message through the delivery policy, then each node drains its
//! inbox to completion. Nothing suspends and nothing is shared between
//! nodes except the bus, so two runs of the same scenario are identical.

pub mod bus;
pub mod gossip;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod schedule;

use std::collections::HashMap;

use crate::config::DvelConfig;
use crate::crypto::AuthorKeypair;
use crate::sim::bus::MessageBus;
use crate::sim::gossip::{AllowlistOnly, BroadcastAll, GossipPolicy};
use crate::sim::metrics::{Metrics, TickSnapshot};
use crate::sim::node::SimNode;
use crate::sim::scenario::Scenario;
use crate::sim::schedule::{DeliveryPolicy, Honest};

/// Deterministic 32-byte seed for a node id, mirroring one identity per
/// node across runs.
pub fn node_seed(id: u32) -> [u8; 32] {
    let mut seed = [0u8; 32];
    for (i, byte) in seed.iter_mut().enumerate() {
        *byte = (id as u8).wrapping_add(i as u8);
    }
    seed
}

/// A scenario wired to nodes, a bus, and policies, stepped one tick at a
/// time.
pub struct Simulation {
    nodes: Vec<SimNode>,
    bus: MessageBus,
    metrics: Metrics,
    delivery: Box<dyn DeliveryPolicy>,
    default_gossip: Box<dyn GossipPolicy>,
    gossip_overrides: HashMap<u32, Box<dyn GossipPolicy>>,
    peers: Vec<u32>,
    scenario: Scenario,
}

impl Simulation {
    /// Build a simulation from a scenario with honest delivery and
    /// broadcast-all gossip; the scenario's eclipse overlay, when present,
    /// restricts the victim's gossip to its allowlist.
    pub fn from_scenario(scenario: Scenario, config: DvelConfig) -> Self {
        let nodes: Vec<SimNode> = (0..scenario.node_count)
            .map(|id| SimNode::new(id, AuthorKeypair::from_seed(node_seed(id)), config.clone()))
            .collect();
        let peers: Vec<u32> = (0..scenario.node_count).collect();
        let metrics = Metrics::new(scenario.node_count as usize);

        let mut gossip_overrides: HashMap<u32, Box<dyn GossipPolicy>> = HashMap::new();
        if let Some((victim, allowlist)) = scenario.eclipse_victim.clone() {
            gossip_overrides.insert(
                victim,
                Box::new(AllowlistOnly::new(allowlist, crate::constants::DEFAULT_BUS_DELAY)),
            );
        }

        Simulation {
            nodes,
            bus: MessageBus::new(crate::constants::DEFAULT_BUS_DELAY),
            metrics,
            delivery: Box::new(Honest),
            default_gossip: Box::new(BroadcastAll {
                delay: crate::constants::DEFAULT_BUS_DELAY,
            }),
            gossip_overrides,
            peers,
            scenario,
        }
    }

    /// Replace the delivery policy (delay, starvation, reorder attacks).
    pub fn set_delivery_policy(&mut self, policy: Box<dyn DeliveryPolicy>) {
        self.delivery = policy;
    }

    /// Override the gossip policy for one node.
    pub fn set_gossip_for_node(&mut self, node_id: u32, policy: Box<dyn GossipPolicy>) {
        self.gossip_overrides.insert(node_id, policy);
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn node(&self, id: u32) -> &SimNode {
        &self.nodes[id as usize]
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn bus_pending(&self) -> usize {
        self.bus.pending()
    }

    /// Advance one tick: produce, gossip, deliver, drain, snapshot.
    pub fn step(&mut self, tick: u64) -> TickSnapshot {
        // 1. Planned producers emit and gossip.
        let planned: Vec<_> = self
            .scenario
            .plan
            .iter()
            .filter(|p| p.tick == tick)
            .copied()
            .collect();
        for planned_event in planned {
            let node = &mut self.nodes[planned_event.node_id as usize];
            // Producers extend their preferred tip, falling back to the
            // genesis marker on an empty ledger.
            let prev = node
                .preferred_tip(tick)
                .map(|p| p.tip.0)
                .unwrap_or(crate::event::ZERO_HASH);
            let msg = node.make_event(tick, prev, planned_event.payload_tag);
            let stats = node.local_append(&msg, tick);
            self.metrics.on_local_append(planned_event.node_id, stats);

            let gossip = self
                .gossip_overrides
                .get(&planned_event.node_id)
                .unwrap_or(&self.default_gossip);
            gossip.broadcast_event(&mut self.bus, tick, planned_event.node_id, &msg, &self.peers);
        }

        // 2. Deliver everything due through the delivery policy.
        let nodes = &mut self.nodes;
        self.bus
            .deliver_with_policy(tick, self.delivery.as_ref(), |to, msg| {
                nodes[to as usize].inbox_push(msg);
            });

        // 3. Every node drains its inbox to completion.
        for node in self.nodes.iter_mut() {
            let id = node.id();
            let stats = if self.delivery.reverses(id) {
                node.process_inbox_reversed(tick)
            } else {
                node.process_inbox(tick)
            };
            self.metrics.on_inbox_processed(id, stats);
        }

        // 4. Snapshot preferred tips.
        self.metrics.observe_tick(tick, &self.nodes)
    }

    /// Run from tick 0 through `horizon` inclusive, returning every
    /// snapshot.
    pub fn run(&mut self, horizon: u64) -> Vec<TickSnapshot> {
        (0..=horizon).map(|tick| self.step(tick)).collect()
    }
}
