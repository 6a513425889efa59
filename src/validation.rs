//! Stateful per-author event validation.
//!
//! Each author gets its own [`ValidationContext`], created lazily on first
//! contact, so out-of-order arrival across authors never causes spurious
//! timestamp rejects. The backward-skew bound is configuration, threaded in
//! by the caller rather than read from process state.

use crate::config::ValidationConfig;
use crate::constants::PROTOCOL_VERSION;
use crate::event::Event;

/// Reasons an event fails validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported event version")]
    InvalidVersion,
    #[error("signature does not verify against the author key")]
    InvalidSignature,
    #[error("timestamp regressed beyond the allowed backward skew")]
    TimestampNonMonotonic,
}

/// Per-author validation state: the highest accepted timestamp.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationContext {
    pub last_timestamp: u64,
}

impl ValidationContext {
    pub fn new() -> Self {
        ValidationContext::default()
    }
}

/// Validate an event against its author's context.
///
/// Checks run in a fixed order: version, signature, then timestamp
/// monotonicity with a bounded backward skew. The context advances only on
/// success; a rejected event leaves it untouched. An event regresses too
/// far iff `timestamp + max_backward_skew < ctx.last_timestamp`.
pub fn validate_event(
    event: &Event,
    ctx: &mut ValidationContext,
    config: &ValidationConfig,
) -> Result<(), ValidationError> {
    if event.version != PROTOCOL_VERSION {
        return Err(ValidationError::InvalidVersion);
    }
    if !crate::crypto::verify_event(event) {
        return Err(ValidationError::InvalidSignature);
    }
    if event.timestamp.saturating_add(config.max_backward_skew) < ctx.last_timestamp {
        return Err(ValidationError::TimestampNonMonotonic);
    }
    ctx.last_timestamp = ctx.last_timestamp.max(event.timestamp);
    Ok(())
}
