//! Author key management: seed-derived Ed25519 keypairs and event signing.
//!
//! Secrets are 32-byte Ed25519 seeds. Deriving a keypair from a fixed seed
//! is deterministic, which the simulator relies on to give every node a
//! reproducible identity.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::event::{Event, PublicKey, Signature};

/// An author's Ed25519 signing keypair.
pub struct AuthorKeypair {
    signing_key: SigningKey,
    public: PublicKey,
}

impl AuthorKeypair {
    /// Derive a keypair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        let signing_key = SigningKey::from_bytes(&seed);
        let public = signing_key.verifying_key().to_bytes();
        AuthorKeypair {
            signing_key,
            public,
        }
    }

    /// Generate a keypair from the system RNG.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        let public = signing_key.verifying_key().to_bytes();
        AuthorKeypair {
            signing_key,
            public,
        }
    }

    /// The author's public key.
    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// Sign an event's signing bytes, returning the detached signature.
    pub fn sign_event(&self, event: &Event) -> Signature {
        self.signing_key.sign(&event.signing_bytes()).to_bytes()
    }
}

/// Derive the public key for a 32-byte seed without keeping the keypair.
pub fn derive_public(seed: [u8; 32]) -> PublicKey {
    AuthorKeypair::from_seed(seed).public()
}

/// Verify an event's signature against its embedded author key.
///
/// Returns false for malformed keys or signatures as well as for honest
/// verification failures; the validation layer does not distinguish them.
pub fn verify_event(event: &Event) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(&event.author) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&event.signature);
    key.verify_strict(&event.signing_bytes(), &sig).is_ok()
}
