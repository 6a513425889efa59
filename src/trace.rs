//! Append-only trace recording for external auditing, plus a deterministic
//! replay checker for merged trace documents.
//!
//! Rows capture what a node observed at the moment it accepted an event:
//! the event fields, parent presence, quarantine movement, and the author's
//! fixed-point weight. The JSON dump is byte-exact across peers given
//! identical inputs (fixed field order, hex-encoded byte arrays, `null`
//! for absent options).

use serde::{Deserialize, Serialize};

use crate::config::SybilConfig;
use crate::event::{Event, EventId, PublicKey, Signature, ZERO_HASH};
use crate::ledger::{Ledger, LinkOutcome};
use crate::sybil::SybilOverlay;
use crate::validation::{validate_event, ValidationContext};
use crate::Hash;

/// One observation row.
#[derive(Clone, Debug)]
pub struct TraceRow {
    pub node_id: u32,
    pub prev_hash: Hash,
    pub author: PublicKey,
    pub timestamp: u64,
    pub payload_hash: Hash,
    pub signature: Signature,
    /// Whether the parent was present in the observer's ledger.
    pub parent_present: bool,
    /// False when the observation detected an equivocation.
    pub ancestor_check: bool,
    pub quarantined_until_before: u64,
    pub quarantined_until_after: u64,
    /// Ledger Merkle root after the observation, when computed.
    pub merkle_root: Option<Hash>,
    /// Preferred tip at observation time, when computed.
    pub preferred_tip: Option<Hash>,
    /// The author's fixed-point weight after the observation.
    pub author_weight_fp: u64,
}

impl TraceRow {
    /// Populate a row from an accepted event.
    pub fn from_event(node_id: u32, event: &Event) -> Self {
        TraceRow {
            node_id,
            prev_hash: event.prev_hash,
            author: event.author,
            timestamp: event.timestamp,
            payload_hash: event.payload_hash,
            signature: event.signature,
            parent_present: false,
            ancestor_check: true,
            quarantined_until_before: 0,
            quarantined_until_after: 0,
            merkle_root: None,
            preferred_tip: None,
            author_weight_fp: 0,
        }
    }
}

/// Append-only recorder owned by a node.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    rows: Vec<TraceRow>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        TraceRecorder::default()
    }

    pub fn record(&mut self, row: TraceRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&TraceRow> {
        self.rows.get(idx)
    }

    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Serialize all rows to a JSON array, hex-encoding byte arrays and
    /// preserving field order. Byte-exact for identical inputs.
    pub fn to_json(&self) -> Result<String, TraceError> {
        let rows: Vec<TraceRowSerde> = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| TraceRowSerde::from_row(idx, row))
            .collect();
        serde_json::to_string(&rows).map_err(|e| TraceError::Serialize(e.to_string()))
    }
}

/// Errors from trace serialization and checking.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace serialization failed: {0}")]
    Serialize(String),
    #[error("trace deserialization failed: {0}")]
    Deserialize(String),
    #[error("row {row}: malformed field encoding")]
    Parse { row: usize },
    #[error("row {row}: parent_present flag contradicts the replayed ledger")]
    ParentFlagMismatch { row: usize },
    #[error("row {row}: validation failed: {source}")]
    Validation {
        row: usize,
        source: crate::validation::ValidationError,
    },
    #[error("row {row}: linkage failed ({outcome})")]
    Link { row: usize, outcome: &'static str },
    #[error("row {row}: quarantine window shrank on an equivocation")]
    QuarantineRegressed { row: usize },
    #[error("row {row}: author weight exceeds the fixed-point scale")]
    WeightOutOfBounds { row: usize },
    #[error("row {row}: weight nonzero during quarantine")]
    WeightDuringQuarantine { row: usize },
    #[error("row {row}: merkle root mismatch")]
    MerkleMismatch { row: usize },
    #[error("final merkle root does not match the replayed ledger")]
    FinalRootMismatch,
}

/// Wire form of a row: hex strings for byte arrays, field order fixed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceRowSerde {
    pub node_id: u32,
    pub row_index: usize,
    pub prev_hash: String,
    pub author: String,
    pub timestamp: u64,
    pub payload_hash: String,
    pub signature: String,
    pub parent_present: bool,
    pub ancestor_check: bool,
    pub quarantined_until_before: u64,
    pub quarantined_until_after: u64,
    pub merkle_root: Option<String>,
    pub preferred_tip: Option<String>,
    pub author_weight_fp: u64,
}

impl TraceRowSerde {
    fn from_row(row_index: usize, row: &TraceRow) -> Self {
        TraceRowSerde {
            node_id: row.node_id,
            row_index,
            prev_hash: hex::encode(row.prev_hash),
            author: hex::encode(row.author),
            timestamp: row.timestamp,
            payload_hash: hex::encode(row.payload_hash),
            signature: hex::encode(row.signature),
            parent_present: row.parent_present,
            ancestor_check: row.ancestor_check,
            quarantined_until_before: row.quarantined_until_before,
            quarantined_until_after: row.quarantined_until_after,
            merkle_root: row.merkle_root.map(hex::encode),
            preferred_tip: row.preferred_tip.map(hex::encode),
            author_weight_fp: row.author_weight_fp,
        }
    }
}

/// Header of a merged trace document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceHeader {
    pub protocol_version: u8,
    pub max_backward_skew: u64,
    pub max_pending_total: u64,
    pub max_drain_steps: u64,
    pub sybil_config: SybilConfig,
    pub final_merkle_root: Option<String>,
    pub sources: Vec<String>,
}

/// A merged trace document from one or more nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceDoc {
    pub header: TraceHeader,
    pub rows: Vec<TraceRowSerde>,
}

impl TraceDoc {
    /// Wrap one node's recorder into a checkable document. Rows keep their
    /// acceptance order, so the replay links every parent before its
    /// children.
    pub fn from_recorder(header: TraceHeader, recorder: &TraceRecorder) -> Self {
        let rows = recorder
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, row)| TraceRowSerde::from_row(idx, row))
            .collect();
        TraceDoc { header, rows }
    }

    /// Byte-exact JSON encoding (fixed field order, hex byte arrays).
    pub fn to_json(&self) -> Result<String, TraceError> {
        serde_json::to_string(self).map_err(|e| TraceError::Serialize(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        serde_json::from_str(json).map_err(|e| TraceError::Deserialize(e.to_string()))
    }
}

fn hex32(s: &str) -> Option<Hash> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

fn hex64(s: &str) -> Option<Signature> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

fn parse_row(row: &TraceRowSerde) -> Option<Event> {
    Some(Event::from_raw(
        crate::constants::PROTOCOL_VERSION,
        hex32(&row.prev_hash)?,
        hex32(&row.author)?,
        row.timestamp,
        hex32(&row.payload_hash)?,
        hex64(&row.signature)?,
    ))
}

/// Replay a merged trace deterministically and verify its invariants.
///
/// The rows are fed through a fresh ledger, validation context map, and
/// overlay in order. Checked per row: the recorded parent-present flag
/// against the replayed ledger, validation, linkage, quarantine-window
/// growth on equivocations, weight bounds, and any recorded Merkle root.
/// Finally the header's `final_merkle_root` must match the replayed
/// ledger's.
pub fn check_trace(doc: &TraceDoc) -> Result<(), TraceError> {
    let cfg = doc.header.sybil_config.clone();
    let validation_cfg = crate::config::ValidationConfig {
        max_backward_skew: doc.header.max_backward_skew,
    };
    let mut overlay = SybilOverlay::new(cfg.clone());
    let mut ledger = Ledger::new();
    let mut contexts: std::collections::HashMap<PublicKey, ValidationContext> =
        std::collections::HashMap::new();

    let mut last_root: Option<Hash> = None;

    for (idx, row) in doc.rows.iter().enumerate() {
        let event = parse_row(row).ok_or(TraceError::Parse { row: idx })?;

        let parent_is_zero = event.prev_hash == ZERO_HASH;
        let parent_known = ledger.contains(&EventId(event.prev_hash));
        if !parent_is_zero && !parent_known && row.parent_present {
            return Err(TraceError::ParentFlagMismatch { row: idx });
        }
        if !parent_is_zero && parent_known && !row.parent_present {
            return Err(TraceError::ParentFlagMismatch { row: idx });
        }

        let ctx = contexts.entry(event.author).or_default();
        validate_event(&event, ctx, &validation_cfg)
            .map_err(|source| TraceError::Validation { row: idx, source })?;

        let id = match ledger.link(event) {
            LinkOutcome::Linked(id) => id,
            LinkOutcome::Duplicate => {
                return Err(TraceError::Link {
                    row: idx,
                    outcome: "duplicate",
                })
            }
            LinkOutcome::MissingParent => {
                return Err(TraceError::Link {
                    row: idx,
                    outcome: "missing parent",
                })
            }
        };

        overlay.observe(&ledger, row.timestamp, id);

        // An equivocation must have grown the quarantine window by at
        // least the configured length.
        if !row.ancestor_check
            && row.quarantined_until_after < row.quarantined_until_before + cfg.quarantine_ticks
        {
            return Err(TraceError::QuarantineRegressed { row: idx });
        }

        if row.author_weight_fp > cfg.fixed_point_scale {
            return Err(TraceError::WeightOutOfBounds { row: idx });
        }
        if row.timestamp < row.quarantined_until_after && row.author_weight_fp != 0 {
            return Err(TraceError::WeightDuringQuarantine { row: idx });
        }

        if let Some(root) = ledger.merkle_root() {
            last_root = Some(root);
            if let Some(recorded) = row.merkle_root.as_deref().and_then(hex32) {
                if recorded != root {
                    return Err(TraceError::MerkleMismatch { row: idx });
                }
            }
        }
    }

    if let (Some(header_root), Some(last)) = (doc.header.final_merkle_root.as_deref(), last_root) {
        if let Some(expected) = hex32(header_root) {
            if expected != last {
                return Err(TraceError::FinalRootMismatch);
            }
        }
    }

    Ok(())
}
