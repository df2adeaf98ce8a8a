//! NewYorkCoin difficulty constants

/// Target time per retarget window: 30 seconds
pub const TARGET_TIMESPAN: u32 = 30;

/// Target time per block: 30 seconds
pub const TARGET_SPACING: u32 = 30;

/// Difficulty adjustment interval: every block
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u32 = TARGET_TIMESPAN / TARGET_SPACING;

/// Maximum target (minimum difficulty)
pub const MAX_TARGET_BITS: u32 = 0x1e0fffff;

/// Difficulty bits of the mainnet genesis block
pub const GENESIS_BITS: u32 = 0x1e0ffff0;

/// Timestamp of the mainnet genesis block
pub const GENESIS_TIME: u32 = 1394102925;

/// Maximum per-retarget swing factor in either direction
pub const MAX_ADJUSTMENT_FACTOR: i32 = 4;

/// Identifier of the production network
pub const ID_MAINNET: &str = "org.newyorkcoin.production";

/// Identifier of the test network
pub const ID_TESTNET: &str = "org.newyorkcoin.test";
