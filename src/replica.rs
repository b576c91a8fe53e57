//! Deterministic derivation of replica keys from a base key (C4).
//!
//! Each replica key is the SHA-256 hash of the previous one, chained from
//! the caller-supplied base.

use crate::identifier::Identifier;

pub const DEFAULT_REPLICATION_COUNT: usize = 3;

/// Produces `count` replica identifiers starting from `base`, where each
/// subsequent key is the SHA-256 hash of the previous one's 32-byte
/// big-endian encoding, reduced `mod 2^bits`.
///
/// `count` is clamped to `bits` (the finger-table size / an upper bound on
/// useful replica fan-out) rather than rejected when it exceeds the ring's
/// practical size -- see SPEC_FULL.md §4.4 and §9.
pub fn replica_keys(base: Identifier, count: usize, bits: u32) -> Vec<Identifier> {
    let count = count.min(bits.max(1) as usize);
    let mut keys = Vec::with_capacity(count);
    let mut current = base;
    for i in 0..count {
        if i > 0 {
            current = Identifier::hash_of(&current.to_be_bytes(), bits);
        }
        keys.push(current);
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> Identifier {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Identifier::from_be_bytes(&bytes)
    }

    #[test]
    fn first_key_is_the_base() {
        let keys = replica_keys(id(100), 3, 8);
        assert_eq!(keys[0], id(100));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn keys_are_deterministic() {
        let a = replica_keys(id(100), 3, 8);
        let b = replica_keys(id(100), 3, 8);
        assert_eq!(a, b);
    }

    #[test]
    fn subsequent_keys_chain_through_sha256() {
        let keys = replica_keys(id(100), 2, 8);
        let expected_second = Identifier::hash_of(&id(100).to_be_bytes(), 8);
        assert_eq!(keys[1], expected_second);
    }

    #[test]
    fn replication_count_is_clamped_to_ring_bits() {
        let keys = replica_keys(id(1), 1000, 8);
        assert_eq!(keys.len(), 8);
    }
}
