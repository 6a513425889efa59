//! Deterministic scenario plans: who produces when, and which adversarial
//! topology applies.

/// A planned event emission.
#[derive(Clone, Copy, Debug)]
pub struct PlannedEvent {
    pub tick: u64,
    pub node_id: u32,
    pub payload_tag: u8,
}

/// A complete deterministic scenario. Nodes exist with ids `0..node_count`.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: &'static str,
    pub node_count: u32,
    pub plan: Vec<PlannedEvent>,
    /// Eclipse overlay: the victim gossips only with the allowlist.
    pub eclipse_victim: Option<(u32, Vec<u32>)>,
    /// Node ids considered sybils (for reporting only).
    pub sybil_nodes: Vec<u32>,
}

impl Scenario {
    /// Honest baseline: three nodes extending each other's chain in turn.
    pub fn honest_3nodes() -> Self {
        Scenario {
            name: "honest_3nodes",
            node_count: 3,
            plan: vec![
                PlannedEvent { tick: 1, node_id: 0, payload_tag: 0x10 },
                PlannedEvent { tick: 3, node_id: 1, payload_tag: 0x11 },
                PlannedEvent { tick: 5, node_id: 2, payload_tag: 0x12 },
                PlannedEvent { tick: 7, node_id: 0, payload_tag: 0x13 },
                PlannedEvent { tick: 9, node_id: 1, payload_tag: 0x14 },
            ],
            eclipse_victim: None,
            sybil_nodes: vec![],
        }
    }

    /// Sybil swarm: node 0 is honest and produces just outside the swarm
    /// window; nodes `1..total` emit round-robin, exactly one per tick in
    /// `[start_tick, end_tick]`.
    pub fn sybil_swarm(total_nodes: u32, start_tick: u64, end_tick: u64) -> Self {
        let sybil_nodes: Vec<u32> = (1..total_nodes).collect();
        let mut plan = Vec::new();

        // Honest emissions bracket the swarm so remote timestamps never
        // collide with sybil ones.
        plan.push(PlannedEvent {
            tick: start_tick.saturating_sub(1),
            node_id: 0,
            payload_tag: 0x40,
        });
        plan.push(PlannedEvent {
            tick: end_tick + 2,
            node_id: 0,
            payload_tag: 0x41,
        });

        let sybil_count = total_nodes.saturating_sub(1) as u64;
        let mut tag: u8 = 0x50;
        if sybil_count > 0 {
            for tick in start_tick..=end_tick {
                let idx = ((tick - start_tick) % sybil_count) as u32;
                plan.push(PlannedEvent {
                    tick,
                    node_id: 1 + idx,
                    payload_tag: tag,
                });
                tag = tag.wrapping_add(1);
            }
        }

        plan.sort_by_key(|p| p.tick);
        Scenario {
            name: "sybil_swarm",
            node_count: total_nodes,
            plan,
            eclipse_victim: None,
            sybil_nodes,
        }
    }

    /// Overlay an eclipse on an existing scenario: the victim's gossip is
    /// restricted to the allowlist.
    pub fn with_eclipse(mut self, victim: u32, allowlist: Vec<u32>) -> Self {
        self.name = "eclipse_victim";
        self.eclipse_victim = Some((victim, allowlist));
        self
    }

    /// Last planned tick, plus slack for deliveries to settle.
    pub fn horizon(&self, slack: u64) -> u64 {
        self.plan.iter().map(|p| p.tick).max().unwrap_or(0) + slack
    }
}
