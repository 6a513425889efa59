//! Event record and canonical byte encoding.
//!
//! An event is the sole unit of ledger content. Its identity is the BLAKE3
//! digest of the canonical bytes of all six fields (signature included), so
//! a malleated signature yields a different event rather than a second body
//! under the same identity.

use serde::{Deserialize, Serialize};

use crate::constants::PROTOCOL_VERSION;
use crate::Hash;

/// 32-byte Ed25519 public key identifying an author.
pub type PublicKey = [u8; 32];
/// 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// Genesis marker: an all-zero `prev_hash` means "no parent".
pub const ZERO_HASH: Hash = [0u8; 32];

/// Unique identifier of an event (digest of its canonical bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub Hash);

impl EventId {
    /// Short hex prefix for logs and reports.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl std::fmt::Debug for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventId({})", self.short())
    }
}

/// A signed ledger event referencing a single parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Protocol version; only [`PROTOCOL_VERSION`] is accepted.
    pub version: u8,
    /// Digest of the parent event, or [`ZERO_HASH`] for genesis.
    pub prev_hash: Hash,
    /// Author's Ed25519 public key.
    pub author: PublicKey,
    /// Logical tick at which the author produced the event.
    pub timestamp: u64,
    /// Opaque payload digest; the core never inspects payload content.
    pub payload_hash: Hash,
    /// Ed25519 signature over [`Event::signing_bytes`].
    #[serde(with = "serde_sig")]
    pub signature: Signature,
}

impl Event {
    /// Construct a current-version event from trusted local inputs.
    /// Validity remains a separate check.
    pub fn new(
        prev_hash: Hash,
        author: PublicKey,
        timestamp: u64,
        payload_hash: Hash,
        signature: Signature,
    ) -> Self {
        Event {
            version: PROTOCOL_VERSION,
            prev_hash,
            author,
            timestamp,
            payload_hash,
            signature,
        }
    }

    /// Construct from raw fields (network or replay); no validation performed.
    pub fn from_raw(
        version: u8,
        prev_hash: Hash,
        author: PublicKey,
        timestamp: u64,
        payload_hash: Hash,
        signature: Signature,
    ) -> Self {
        Event {
            version,
            prev_hash,
            author,
            timestamp,
            payload_hash,
            signature,
        }
    }

    /// Signing input: `version (1) ‖ prev_hash (32) ‖ author (32) ‖
    /// timestamp (8 LE) ‖ payload_hash (32)`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32 + 32 + 8 + 32);
        out.push(self.version);
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&self.author);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.payload_hash);
        out
    }

    /// Identity material: signing bytes concatenated with the signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = self.signing_bytes();
        out.extend_from_slice(&self.signature);
        out
    }

    /// Compute the event's identity digest.
    pub fn id(&self) -> EventId {
        EventId(crate::hash_bytes(&self.canonical_bytes()))
    }

    /// Whether this event's parent slot is the genesis marker.
    pub fn is_genesis(&self) -> bool {
        self.prev_hash == ZERO_HASH
    }
}

/// Serde adapter for the 64-byte signature array.
mod serde_sig {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(sig: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(sig)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(d)?;
        if bytes.len() != 64 {
            return Err(D::Error::custom(format!(
                "invalid signature length: expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 64];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}
