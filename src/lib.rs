//! # Dvel
//!
//! A deterministic, append-only event ledger for multi-party transparency
//! logs:
//! - **Content-addressed events** — every event is identified by the BLAKE3
//!   digest of its canonical bytes; a single-bit change is a different event
//! - **Single-parent linkage** — events form a DAG through `prev_hash`;
//!   forks are legal and resolved locally, never globally
//! - **Sybil-resistant tip preference** — a per-author overlay dampens
//!   high-rate and equivocating authors with integer fixed-point weights,
//!   so every honest observer converges on the same preferred tip
//! - **Deterministic simulation** — a tick-driven message bus with
//!   adversarial gossip and scheduling policies exercises the ledger under
//!   reordering, eclipse, and sybil-flood conditions
//!
//! There is no finality gadget and no wall clock: ticks are the only time,
//! and a balanced partition stays split until traffic heals it.

pub mod config;
pub mod crypto;
pub mod event;
pub mod ledger;
pub mod selector;
pub mod sim;
pub mod storage;
pub mod sybil;
pub mod trace;
pub mod validation;

/// Protocol constants
pub mod constants {
    /// Only accepted event version.
    pub const PROTOCOL_VERSION: u8 = 1;
    /// Rate-dampening window for the author weight (ticks between events).
    pub const RATE_WINDOW: u64 = 5;
    /// Temporal decay window for the author weight.
    pub const DECAY_WINDOW: u64 = 10;
    /// Default maximum backward timestamp skew accepted per author.
    pub const DEFAULT_MAX_BACKWARD_SKEW: u64 = 1;
    /// Default grace period before a newly seen author carries weight.
    pub const DEFAULT_WARMUP_TICKS: u64 = 4;
    /// Default quarantine length applied on equivocation.
    pub const DEFAULT_QUARANTINE_TICKS: u64 = 12;
    /// Default fixed-point denominator for author weights.
    pub const DEFAULT_FIXED_POINT_SCALE: u64 = 1000;
    /// Default ancestor-walk cap for preferred-tip selection.
    pub const DEFAULT_MAX_LINK_WALK: usize = 4096;
    /// Dedup cache capacity per node (cleared wholesale when exceeded).
    pub const MAX_SEEN: usize = 8192;
    /// Hard cap on queued events across all pending-parent buckets.
    pub const MAX_PENDING_TOTAL: usize = 16384;
    /// Safety bound on pending-pool drain steps per inbox pass.
    pub const MAX_DRAIN_STEPS: usize = 16384;
    /// Default bus delivery delay in ticks.
    pub const DEFAULT_BUS_DELAY: u64 = 1;
}

/// 32-byte digest used throughout the protocol.
pub type Hash = [u8; 32];

/// Compute the BLAKE3 hash of a byte string.
pub fn hash_bytes(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated BLAKE3 hash.
///
/// Used for synthetic payload digests in scenarios and tests; the event
/// digest itself is the plain hash of the canonical bytes so that any
/// conforming peer reproduces it from the wire layout alone.
pub fn hash_domain(domain: &str, data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(domain);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
