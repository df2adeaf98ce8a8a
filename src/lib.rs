//! # Difficulty-Oracle
//!
//! Proof-of-work difficulty retargeting for a Bitcoin-derived ledger.
//!
//! This crate computes the compact difficulty target a candidate block must
//! declare, given the chain history before it. The rules are consensus
//! critical: any divergence in rounding, clamping or precision handling makes
//! a node accept different blocks than its peers.
//!
//! ## Architecture
//!
//! - Types (headers, compact targets, retarget outcomes)
//! - Chain parameters (static network configuration)
//! - Chain view (read access to validated history, possibly truncated at a checkpoint)
//! - Proof of work (the retarget rules themselves)
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: All rules are deterministic and side-effect-free
//! 2. **Exact Arithmetic**: Targets are arbitrary-precision integers, never floats
//! 3. **Exact Version Pinning**: All consensus-critical dependencies pinned to exact versions
//! 4. **Checkpoints Are Outcomes**: Truncated history is a value, not an error
//!
//! ## Usage
//!
//! ```rust
//! use difficulty_oracle::DifficultyOracle;
//! use difficulty_oracle::chain::HeaderStore;
//! use difficulty_oracle::types::*;
//!
//! let oracle = DifficultyOracle::mainnet();
//! let mut store = HeaderStore::new();
//! let genesis = BlockHeader {
//!     version: 1,
//!     prev_block_hash: [0; 32],
//!     merkle_root: [0; 32],
//!     time: 1394102925,
//!     bits: CompactTarget(0x1e0ffff0),
//!     nonce: 2482334,
//! };
//! let genesis_hash = store.push(genesis).unwrap();
//! let tip = store.tip().unwrap();
//!
//! let candidate = BlockHeader {
//!     version: 1,
//!     prev_block_hash: genesis_hash,
//!     merkle_root: [0; 32],
//!     time: 1394102955,
//!     bits: CompactTarget(0x1e03bbb8),
//!     nonce: 0,
//! };
//! let outcome = oracle.expected_next_target(&tip, &candidate, &store).unwrap();
//! assert_eq!(outcome, RetargetOutcome::Target(CompactTarget(0x1e03bbb8)));
//! ```

pub mod types;
pub mod constants;
pub mod params;
pub mod chain;
pub mod pow;
pub mod error;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use chain::{ChainView, HeaderStore};
pub use params::{ChainParameters, Network};
pub use error::{ConsensusError, Result};

/// Difficulty oracle bound to one network's parameters
///
/// # Examples
///
/// ```
/// use difficulty_oracle::{DifficultyOracle, Network};
///
/// let oracle = DifficultyOracle::for_network(Network::Testnet);
/// assert!(oracle.params().allow_min_difficulty_blocks);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DifficultyOracle {
    params: ChainParameters,
}

impl DifficultyOracle {
    /// Create an oracle from a validated parameter record
    ///
    /// # Examples
    ///
    /// ```
    /// use difficulty_oracle::{ChainParameters, DifficultyOracle};
    ///
    /// let oracle = DifficultyOracle::new(ChainParameters::mainnet()).unwrap();
    /// assert_eq!(oracle.params().interval, 1);
    /// ```
    pub fn new(params: ChainParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn mainnet() -> Self {
        Self::for_network(Network::Mainnet)
    }

    pub fn testnet() -> Self {
        Self::for_network(Network::Testnet)
    }

    pub fn for_network(network: Network) -> Self {
        Self {
            params: ChainParameters::for_network(network),
        }
    }

    pub fn params(&self) -> &ChainParameters {
        &self.params
    }

    /// Expected target for the block after `tip`
    ///
    /// Returns [`RetargetOutcome::CheckpointEncountered`] when `chain` does not
    /// retain the history the retarget window needs.
    ///
    /// # Examples
    ///
    /// ```
    /// use difficulty_oracle::{ChainParameters, DifficultyOracle};
    /// use difficulty_oracle::chain::HeaderStore;
    /// use difficulty_oracle::types::*;
    ///
    /// // Retarget every 4 blocks, 10 second spacing
    /// let max_target = CompactTarget(0x1e0fffff).to_target();
    /// let params = ChainParameters::new(40, 4, max_target, false).unwrap();
    /// let oracle = DifficultyOracle::new(params).unwrap();
    ///
    /// let mut store = HeaderStore::new();
    /// let mut prev = [0u8; 32];
    /// for i in 0..6 {
    ///     prev = store.push(BlockHeader {
    ///         version: 1,
    ///         prev_block_hash: prev,
    ///         merkle_root: [0; 32],
    ///         time: 1000 + i * 10,
    ///         bits: CompactTarget(0x1e0ffff0),
    ///         nonce: 0,
    ///     }).unwrap();
    /// }
    /// let tip = store.tip().unwrap();
    ///
    /// // Height 6 is not a retarget height: the target carries over
    /// let candidate = BlockHeader {
    ///     version: 1,
    ///     prev_block_hash: prev,
    ///     merkle_root: [0; 32],
    ///     time: 1060,
    ///     bits: CompactTarget(0x1e0ffff0),
    ///     nonce: 0,
    /// };
    /// let outcome = oracle.expected_next_target(&tip, &candidate, &store).unwrap();
    /// assert_eq!(outcome.target(), Some(CompactTarget(0x1e0ffff0)));
    /// ```
    pub fn expected_next_target<C: ChainView + ?Sized>(
        &self,
        tip: &StoredHeader,
        candidate: &BlockHeader,
        chain: &C,
    ) -> Result<RetargetOutcome> {
        pow::expected_next_target(tip, candidate, chain, &self.params)
    }

    /// Check the target `candidate` declares against the expected one
    pub fn check_difficulty_transition<C: ChainView + ?Sized>(
        &self,
        tip: &StoredHeader,
        candidate: &BlockHeader,
        chain: &C,
    ) -> Result<ValidationResult> {
        pow::check_difficulty_transition(tip, candidate, chain, &self.params)
    }

    /// Retarget from an explicit window, without test-network special cases
    ///
    /// # Examples
    ///
    /// ```
    /// use difficulty_oracle::DifficultyOracle;
    /// use difficulty_oracle::types::CompactTarget;
    ///
    /// let oracle = DifficultyOracle::mainnet();
    ///
    /// // Window took exactly the target timespan: no change
    /// let bits = oracle.calculate_retarget(
    ///     100,
    ///     1030,
    ///     CompactTarget(0x1e0ffff0),
    ///     1000,
    ///     CompactTarget(0x1e0ffff0),
    /// ).unwrap();
    /// assert_eq!(bits, CompactTarget(0x1e0ffff0));
    /// ```
    pub fn calculate_retarget(
        &self,
        previous_height: Height,
        previous_time: u32,
        last_bits: CompactTarget,
        last_retarget_time: u32,
        next_bits: CompactTarget,
    ) -> Result<CompactTarget> {
        pow::calculate_retarget(
            previous_height,
            previous_time,
            last_bits,
            last_retarget_time,
            next_bits,
            &self.params,
        )
    }
}
