//! Core header and target types for difficulty validation

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Block height
pub type Height = u32;

/// Compact target: 𝒞 = 𝔹⁸ × 𝔹²⁴
///
/// The 32-bit "bits" field of a block header. The high byte is the size of the
/// encoded integer in bytes, the low three bytes are its most significant
/// bytes. `0x00800000` is reserved as a sign bit.
///
/// Decoding is lossless, encoding keeps only three significant bytes, so
/// `from_target(to_target(x)) == x` holds only for canonical encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompactTarget(pub u32);

impl CompactTarget {
    /// Sign bit of the packed mantissa
    pub const SIGN_BIT: u32 = 0x0080_0000;

    /// Mantissa bits, excluding the sign
    pub const MANTISSA_MASK: u32 = 0x007f_ffff;

    /// Size byte: number of bytes in the encoded integer
    pub const fn exponent(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Decode to the full target.
    ///
    /// target = mantissa × 256^(exponent − 3), with the sign bit excluded from
    /// the mantissa. Use [`CompactTarget::is_negative`] to inspect the sign.
    pub fn to_target(self) -> BigUint {
        let size = self.0 >> 24;
        let word = self.0 & Self::MANTISSA_MASK;

        if size <= 3 {
            BigUint::from(word >> (8 * (3 - size)))
        } else {
            BigUint::from(word) << (8 * (size - 3))
        }
    }

    /// Encode a target, keeping its three most significant bytes.
    ///
    /// The size is the two's-complement byte length of the value, so a
    /// mantissa never carries the sign bit and zero encodes as `0x01000000`.
    pub fn from_target(target: &BigUint) -> Self {
        let size = target.bits() / 8 + 1;

        let mantissa = if size <= 3 {
            low_u32(target) << (8 * (3 - size))
        } else {
            low_u32(&(target >> (8 * (size - 3))))
        };

        CompactTarget(((size as u32) << 24) | mantissa)
    }

    /// True when the sign bit is set on a non-zero mantissa
    pub fn is_negative(self) -> bool {
        self.0 & Self::SIGN_BIT != 0 && !self.to_target().is_zero()
    }
}

impl fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::LowerHex for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Least significant 32 bits of a big integer
fn low_u32(value: &BigUint) -> u32 {
    value.iter_u32_digits().next().unwrap_or(0)
}

/// Block Header: ℋ = ℤ × ℍ × ℍ × ℕ × 𝒞 × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    /// Seconds since the Unix epoch
    pub time: u32,
    pub bits: CompactTarget,
    pub nonce: u32,
}

impl BlockHeader {
    /// Size of a serialized header in bytes
    pub const SIZE: usize = 80;

    /// Serialize to the 80-byte wire form (little-endian integers)
    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.prev_block_hash);
        bytes[36..68].copy_from_slice(&self.merkle_root);
        bytes[68..72].copy_from_slice(&self.time.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.0.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Block identifier: SHA256(SHA256(header))
    pub fn hash(&self) -> Hash {
        let first = Sha256::digest(self.serialize());
        let second = Sha256::digest(first);

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&second);
        hash
    }
}

/// Stored Header: 𝒮 = ℋ × ℕ
///
/// A header that has been connected to the chain, together with its height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
    pub header: BlockHeader,
    pub height: Height,
}

impl StoredHeader {
    pub fn new(header: BlockHeader, height: Height) -> Self {
        Self { header, height }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn time(&self) -> u32 {
        self.header.time
    }

    pub fn bits(&self) -> CompactTarget {
        self.header.bits
    }

    pub fn prev_block_hash(&self) -> &Hash {
        &self.header.prev_block_hash
    }
}

/// Outcome of computing the expected target for the next block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetargetOutcome {
    /// The target the next block must declare
    Target(CompactTarget),
    /// History ends at a checkpoint before the retarget anchor; the
    /// network-supplied target has to be trusted.
    CheckpointEncountered,
}

impl RetargetOutcome {
    pub fn target(&self) -> Option<CompactTarget> {
        match self {
            RetargetOutcome::Target(bits) => Some(*bits),
            RetargetOutcome::CheckpointEncountered => None,
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        matches!(self, RetargetOutcome::CheckpointEncountered)
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}
