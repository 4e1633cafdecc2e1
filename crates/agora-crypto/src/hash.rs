//! Hashing utilities for Agora
//!
//! The ledger hashes with Keccak-256 (the pre-standard SHA-3 padding), not
//! NIST SHA3-256. The two disagree on every input.

use agora_types::Bytes32;
use sha3::{Digest, Keccak256};

/// Compute Keccak-256 of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute Keccak-256 and return as lowercase hex
pub fn keccak256_hex(data: &[u8]) -> String {
    hex::encode(keccak256(data))
}

/// Compute Keccak-256 of the concatenation of multiple items
pub fn hash_all(items: &[&[u8]]) -> Bytes32 {
    let mut hasher = Keccak256::new();
    for item in items {
        hasher.update(item);
    }
    Bytes32::new(hasher.finalize().into())
}
