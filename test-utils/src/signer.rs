//! A deterministic mock signature backend.
//!
//! "Signatures" are keyed hashes over `(pubkey, message)`; anyone can forge
//! them, which is exactly what tests want.

use sqlchain_txcore::verify::SignatureBackend;

pub struct MockSigner;

impl SignatureBackend for MockSigner {
    fn verify(&self, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool {
        sign(pubkey, message).as_slice() == signature
    }
}

/// A deterministic "public key" derived from a seed string.
pub fn keypair(seed: &str) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"sqlchain-mock-key");
    hasher.update(seed.as_bytes());
    hasher.finalize().as_bytes().to_vec()
}

/// The one signature [`MockSigner`] accepts for `(pubkey, message)`.
pub fn sign(pubkey: &[u8], message: &[u8]) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"sqlchain-mock-sig");
    hasher.update(pubkey);
    hasher.update(message);
    hasher.finalize().as_bytes().to_vec()
}
