//! Deterministic run metrics: per-node counters and per-tick snapshots of
//! preferred tips.

use crate::selector::PreferredTip;
use crate::sim::node::{NodeStats, SimNode};

/// Cumulative counters for one node.
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeMetrics {
    pub local_appended: u64,
    pub remote_accepted: u64,
    pub rejected: u64,
    pub pending_added: u64,
    pub pending_drained: u64,
    pub pending_dropped: u64,
    pub last_preferred: Option<PreferredTip>,
}

/// Preferred-tip agreement across nodes at one tick.
#[derive(Clone, Debug, Default)]
pub struct TickSnapshot {
    pub tick: u64,
    pub preferred: Vec<Option<PreferredTip>>,
    /// Distinct preferred tips present; 1 means full agreement.
    pub unique_preferred_tips: u64,
}

/// Run-wide metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    per_node: Vec<NodeMetrics>,
}

impl Metrics {
    pub fn new(node_count: usize) -> Self {
        Metrics {
            per_node: vec![NodeMetrics::default(); node_count],
        }
    }

    pub fn on_local_append(&mut self, node_id: u32, stats: NodeStats) {
        let m = &mut self.per_node[node_id as usize];
        m.local_appended += stats.accepted;
        m.rejected += stats.rejected;
        m.pending_added += stats.pending_added;
        m.pending_drained += stats.pending_drained;
        m.pending_dropped += stats.pending_dropped;
    }

    pub fn on_inbox_processed(&mut self, node_id: u32, stats: NodeStats) {
        let m = &mut self.per_node[node_id as usize];
        m.remote_accepted += stats.accepted;
        m.rejected += stats.rejected;
        m.pending_added += stats.pending_added;
        m.pending_drained += stats.pending_drained;
        m.pending_dropped += stats.pending_dropped;
    }

    /// Collect every node's preferred tip and count the distinct ones.
    pub fn observe_tick(&mut self, tick: u64, nodes: &[SimNode]) -> TickSnapshot {
        let mut snapshot = TickSnapshot {
            tick,
            ..TickSnapshot::default()
        };
        let mut tips_present = Vec::with_capacity(nodes.len());
        for node in nodes {
            let pref = node.preferred_tip(tick);
            self.per_node[node.id() as usize].last_preferred = pref;
            if let Some(p) = pref {
                tips_present.push(p.tip);
            }
            snapshot.preferred.push(pref);
        }
        tips_present.sort();
        tips_present.dedup();
        snapshot.unique_preferred_tips = tips_present.len() as u64;
        snapshot
    }

    pub fn node(&self, node_id: u32) -> &NodeMetrics {
        &self.per_node[node_id as usize]
    }

    pub fn per_node(&self) -> &[NodeMetrics] {
        &self.per_node
    }
}
