//! Identifiers living on the Chord ring.
//!
//! The ring is `Z / 2^m Z` for a configurable `m <= 256`. Rather than picking
//! a fixed machine integer width (which would cap `m` below what the design
//! allows), an identifier is stored as the full 256-bit SHA-256 output and
//! every arithmetic operation is told the ring's bit width `m` so it can mask
//! down to `mod 2^m`.

use sha2::{Digest, Sha256};
use std::fmt;

/// Number of 64-bit limbs needed to hold a 256-bit value.
const LIMBS: usize = 4;

/// A point on the identifier ring, stored as 256 bits, big-endian limb order
/// (`0` is the most significant limb). `Ord` on the limb array matches
/// numeric order because comparison is lexicographic over big-endian limbs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Identifier([u64; LIMBS]);

impl Identifier {
    pub const ZERO: Identifier = Identifier([0; LIMBS]);

    pub fn one() -> Self {
        Identifier([0, 0, 0, 1])
    }

    /// `2^k`, valid for `k < 256`.
    pub fn pow2(k: u32) -> Self {
        assert!(k < 256, "exponent out of range for a 256-bit ring");
        let mut limbs = [0u64; LIMBS];
        let limb = LIMBS - 1 - (k / 64) as usize;
        limbs[limb] = 1u64 << (k % 64);
        Identifier(limbs)
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; LIMBS];
        for i in 0..LIMBS {
            let chunk: [u8; 8] = bytes[i * 8..i * 8 + 8].try_into().unwrap();
            limbs[i] = u64::from_be_bytes(chunk);
        }
        Identifier(limbs)
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..LIMBS {
            out[i * 8..i * 8 + 8].copy_from_slice(&self.0[i].to_be_bytes());
        }
        out
    }

    /// SHA-256 of `bytes`, interpreted big-endian, reduced `mod 2^bits`.
    pub fn hash_of(bytes: &[u8], bits: u32) -> Self {
        let digest = Sha256::digest(bytes);
        let arr: [u8; 32] = digest.into();
        Identifier::from_be_bytes(&arr).mask(bits)
    }

    /// Zeroes every bit at position `bits` and above, i.e. computes `self mod 2^bits`.
    pub fn mask(self, bits: u32) -> Self {
        if bits >= 256 {
            return self;
        }
        if bits == 0 {
            return Identifier::ZERO;
        }
        let mut limbs = self.0;
        let keep_limbs = (bits + 63) / 64; // number of limbs (from the low end) that survive at all
        let full_bits_in_top_kept_limb = bits % 64;
        for i in 0..LIMBS {
            let limb_index_from_low = (LIMBS - 1 - i) as u32;
            if limb_index_from_low >= keep_limbs {
                limbs[i] = 0;
            } else if limb_index_from_low + 1 == keep_limbs && full_bits_in_top_kept_limb != 0 {
                let shift = 64 - full_bits_in_top_kept_limb;
                limbs[i] = (limbs[i] << shift) >> shift;
            }
        }
        Identifier(limbs)
    }

    fn add_raw(self, other: Self) -> Self {
        let mut result = [0u64; LIMBS];
        let mut carry: u128 = 0;
        for i in (0..LIMBS).rev() {
            let sum = self.0[i] as u128 + other.0[i] as u128 + carry;
            result[i] = sum as u64;
            carry = sum >> 64;
        }
        Identifier(result)
    }

    fn two_complement(self, bits: u32) -> Self {
        // -(self) mod 2^bits == (!self + 1) masked to bits, where ! flips all 256 bits.
        let mut flipped = [0u64; LIMBS];
        for i in 0..LIMBS {
            flipped[i] = !self.0[i];
        }
        Identifier(flipped).add_raw(Identifier::one()).mask(bits)
    }

    /// `(self + other) mod 2^bits`.
    pub fn wrapping_add(self, other: Self, bits: u32) -> Self {
        self.add_raw(other).mask(bits)
    }

    /// `(self - other) mod 2^bits`.
    pub fn wrapping_sub(self, other: Self, bits: u32) -> Self {
        self.add_raw(other.two_complement(bits)).mask(bits)
    }

    /// `(self + 2^k) mod 2^bits`.
    pub fn add_offset(self, k: u32, bits: u32) -> Self {
        self.wrapping_add(Self::pow2(k), bits)
    }

    /// `(self - 2^k) mod 2^bits`.
    pub fn sub_offset(self, k: u32, bits: u32) -> Self {
        self.wrapping_sub(Self::pow2(k), bits)
    }

    pub fn is_zero(self) -> bool {
        self.0 == [0; LIMBS]
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Small-ring identifiers (the common case, m <= 64) print as plain decimal.
        if self.0[0] == 0 && self.0[1] == 0 && self.0[2] == 0 {
            write!(f, "{}", self.0[3])
        } else {
            write!(f, "0x{}", hex_encode(&self.to_be_bytes()))
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Derives `self.id` for a node bound at `address`.
pub fn id_of_address(address: &str, bits: u32) -> Identifier {
    Identifier::hash_of(address.as_bytes(), bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_only_low_bits() {
        let id = Identifier::from_be_bytes(&[0xff; 32]);
        let masked = id.mask(8);
        assert_eq!(masked.to_be_bytes()[31], 0xff);
        assert_eq!(masked.to_be_bytes()[30], 0x00);
    }

    #[test]
    fn wrapping_add_wraps_at_ring_size() {
        let bits = 8;
        let id = Identifier::from_be_bytes(&[0; 32]).wrapping_add(
            Identifier::from_be_bytes(&{
                let mut b = [0u8; 32];
                b[31] = 250;
                b
            }),
            bits,
        );
        let wrapped = id.add_offset(3, bits); // +8 => 258 mod 256 == 2
        assert_eq!(wrapped.to_be_bytes()[31], 2);
    }

    #[test]
    fn sub_offset_wraps_backwards() {
        let bits = 8;
        let zero = Identifier::ZERO;
        let result = zero.sub_offset(0, bits); // 0 - 1 mod 256 == 255
        assert_eq!(result.to_be_bytes()[31], 255);
    }

    #[test]
    fn pow2_and_one_agree() {
        assert_eq!(Identifier::pow2(0), Identifier::one());
    }

    #[test]
    fn hash_of_is_deterministic_and_masked() {
        let a = Identifier::hash_of(b"127.0.0.1:5000", 8);
        let b = Identifier::hash_of(b"127.0.0.1:5000", 8);
        assert_eq!(a, b);
        assert_eq!(a.to_be_bytes()[..31], [0u8; 31]);
    }
}
