//! Chain parameters consumed by the difficulty rules
//!
//! A parameter record is static configuration: it is built once (from a
//! preset or an external JSON document), validated, and then only read.

use crate::constants::*;
use crate::error::{ConsensusError, Result};
use crate::types::CompactTarget;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Networks with built-in parameter presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Stable identifier of the network
    pub fn id(&self) -> &'static str {
        match self {
            Network::Mainnet => ID_MAINNET,
            Network::Testnet => ID_TESTNET,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            ID_MAINNET => Some(Network::Mainnet),
            ID_TESTNET => Some(Network::Testnet),
            _ => None,
        }
    }
}

/// Difficulty parameters: 𝒫 = ℕ × ℕ × ℕ × 𝔹
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
    /// Intended duration of one retarget window, in seconds
    pub target_timespan: u32,
    /// Blocks per retarget window
    pub interval: u32,
    /// Easiest target the network accepts
    #[serde(with = "hex_target")]
    pub max_target: BigUint,
    /// Test-network rule allowing minimum-difficulty blocks after a stall
    pub allow_min_difficulty_blocks: bool,
}

impl ChainParameters {
    /// Build and validate a parameter record
    pub fn new(
        target_timespan: u32,
        interval: u32,
        max_target: BigUint,
        allow_min_difficulty_blocks: bool,
    ) -> Result<Self> {
        let params = Self {
            target_timespan,
            interval,
            max_target,
            allow_min_difficulty_blocks,
        };
        params.validate()?;
        Ok(params)
    }

    /// NewYorkCoin production network
    pub fn mainnet() -> Self {
        Self {
            target_timespan: TARGET_TIMESPAN,
            interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            max_target: CompactTarget(MAX_TARGET_BITS).to_target(),
            allow_min_difficulty_blocks: false,
        }
    }

    /// NewYorkCoin test network
    pub fn testnet() -> Self {
        Self {
            allow_min_difficulty_blocks: true,
            ..Self::mainnet()
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
        }
    }

    /// Intended time between consecutive blocks
    pub fn target_spacing(&self) -> u32 {
        self.target_timespan / self.interval
    }

    /// Compact encoding of the maximum target
    pub fn max_target_bits(&self) -> CompactTarget {
        CompactTarget::from_target(&self.max_target)
    }

    /// Check the record is usable by the retarget arithmetic.
    ///
    /// The timespan is bounded so that four times its value still fits the
    /// signed 32-bit timespan arithmetic.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(ConsensusError::InvalidParameters(
                "retarget interval must be positive".to_string(),
            ));
        }

        if self.target_timespan == 0 {
            return Err(ConsensusError::InvalidParameters(
                "target timespan must be positive".to_string(),
            ));
        }

        if self.target_timespan > (i32::MAX / MAX_ADJUSTMENT_FACTOR) as u32 {
            return Err(ConsensusError::InvalidParameters(format!(
                "target timespan {} exceeds the 32-bit timespan range",
                self.target_timespan
            )));
        }

        if self.target_timespan < self.interval {
            return Err(ConsensusError::InvalidParameters(format!(
                "target timespan {} is shorter than the interval of {} blocks",
                self.target_timespan, self.interval
            )));
        }

        if self.max_target.is_zero() {
            return Err(ConsensusError::InvalidParameters(
                "maximum target must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Load a parameter record from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let params: ChainParameters = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Big integers travel as hex strings, with or without a `0x` prefix
mod hex_target {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", value.to_str_radix(16)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let text = String::deserialize(deserializer)?;
        let digits = text.strip_prefix("0x").unwrap_or(&text);
        BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| de::Error::custom(format!("invalid hex target: {}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_preset() {
        let params = ChainParameters::mainnet();
        assert_eq!(params.target_timespan, 30);
        assert_eq!(params.interval, 1);
        assert_eq!(params.target_spacing(), 30);
        assert_eq!(params.max_target_bits(), CompactTarget(0x1e0fffff));
        assert!(!params.allow_min_difficulty_blocks);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_testnet_preset() {
        let params = ChainParameters::for_network(Network::Testnet);
        assert!(params.allow_min_difficulty_blocks);
        assert_eq!(params.max_target, ChainParameters::mainnet().max_target);
    }

    #[test]
    fn test_network_ids() {
        assert_eq!(Network::Mainnet.id(), "org.newyorkcoin.production");
        assert_eq!(Network::from_id("org.newyorkcoin.test"), Some(Network::Testnet));
        assert_eq!(Network::from_id("regtest"), None);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let result = ChainParameters::new(30, 0, BigUint::from(1u32), false);
        assert!(matches!(result, Err(ConsensusError::InvalidParameters(_))));
    }

    #[test]
    fn test_validate_rejects_zero_spacing() {
        let result = ChainParameters::new(10, 20, BigUint::from(1u32), false);
        assert!(matches!(result, Err(ConsensusError::InvalidParameters(_))));
    }

    #[test]
    fn test_validate_rejects_zero_max_target() {
        let result = ChainParameters::new(30, 1, BigUint::zero(), false);
        assert!(matches!(result, Err(ConsensusError::InvalidParameters(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_timespan() {
        let result = ChainParameters::new(u32::MAX, 1, BigUint::from(1u32), false);
        assert!(matches!(result, Err(ConsensusError::InvalidParameters(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let params = ChainParameters::testnet();
        let json = params.to_json().unwrap();
        assert!(json.contains("\"max_target\": \"0xfffff"));
        assert_eq!(ChainParameters::from_json(&json).unwrap(), params);
    }

    #[test]
    fn test_json_accepts_unprefixed_hex() {
        let json = r#"{
            "target_timespan": 1209600,
            "interval": 2016,
            "max_target": "ffff0000000000000000000000000000000000000000000000000000",
            "allow_min_difficulty_blocks": false
        }"#;
        let params = ChainParameters::from_json(json).unwrap();
        assert_eq!(params.target_spacing(), 600);
        assert_eq!(params.max_target_bits(), CompactTarget(0x1d00ffff));
    }

    #[test]
    fn test_json_rejects_bad_hex() {
        let json = r#"{"target_timespan":30,"interval":1,"max_target":"zz","allow_min_difficulty_blocks":false}"#;
        assert!(matches!(
            ChainParameters::from_json(json),
            Err(ConsensusError::Serialization(_))
        ));
    }

    #[test]
    fn test_json_rejects_invalid_record() {
        let json = r#"{"target_timespan":30,"interval":0,"max_target":"0x1","allow_min_difficulty_blocks":false}"#;
        assert!(matches!(
            ChainParameters::from_json(json),
            Err(ConsensusError::InvalidParameters(_))
        ));
    }
}
