//! Difficulty retargeting: the target the next block must declare

use crate::chain::ChainView;
use crate::constants::MAX_ADJUSTMENT_FACTOR;
use crate::error::{ConsensusError, Result};
use crate::params::ChainParameters;
use crate::types::*;
use num_bigint::BigUint;
use tracing::{debug, error, info, warn};

/// Mantissa window kept when reducing a computed target's precision
const PRECISION_MASK: u32 = 0x00ff_ffff;

/// GetNextWorkRequired: 𝒮 × ℋ × 𝒱 × 𝒫 → 𝒞 ∪ {checkpoint}
///
/// Expected compact target for `candidate`, the block following `tip`.
///
/// 1. If (tip.height + 1) mod interval ≠ 0, the target carries over from
///    `tip`, except on test networks where the minimum-difficulty rules apply
///    (see [`min_difficulty_target`]).
/// 2. Otherwise walk back `interval − 1` blocks for the first retarget after
///    genesis and `interval` blocks for every later one, so the window always
///    overlaps the previous retarget block.
/// 3. Retarget from the timespan between `tip` and that anchor
///    (see [`calculate_retarget`]).
///
/// A chain view that stops resolving ancestors inside the window yields
/// [`RetargetOutcome::CheckpointEncountered`]. A chain view whose linkage
/// contradicts the heights it reports is an
/// [`ConsensusError::InvariantViolation`].
pub fn expected_next_target<C: ChainView + ?Sized>(
    tip: &StoredHeader,
    candidate: &BlockHeader,
    chain: &C,
    params: &ChainParameters,
) -> Result<RetargetOutcome> {
    params.validate()?;

    let interval = u64::from(params.interval);
    let next_height = u64::from(tip.height) + 1;

    if next_height % interval != 0 {
        if params.allow_min_difficulty_blocks {
            return min_difficulty_target(tip, candidate, chain, params)
                .map(RetargetOutcome::Target);
        }
        return Ok(RetargetOutcome::Target(tip.bits()));
    }

    // Go back the full window unless this is the first retarget after
    // genesis. Closes the window where the boundary block's timestamp could be
    // chosen freely by a majority miner.
    let go_back = if next_height == interval {
        params.interval - 1
    } else {
        params.interval
    };

    let anchor = match find_retarget_anchor(tip, go_back, chain)? {
        Some(anchor) => anchor,
        None => {
            debug!(height = next_height, "difficulty transition: hit checkpoint");
            return Ok(RetargetOutcome::CheckpointEncountered);
        }
    };

    Ok(RetargetOutcome::Target(retarget(
        tip.height,
        tip.time(),
        tip.bits(),
        anchor.time(),
        candidate.bits,
        params,
    )))
}

/// Test-network rules for non-retarget heights.
///
/// - If `candidate` comes more than twice the target spacing after `tip`, it
///   may use the maximum target.
/// - Otherwise return the target of the last block that was not mined under
///   that rule: walk back while the cursor is off a retarget boundary and
///   carries the maximum target, stopping early when history runs out.
pub fn min_difficulty_target<C: ChainView + ?Sized>(
    tip: &StoredHeader,
    candidate: &BlockHeader,
    chain: &C,
    params: &ChainParameters,
) -> Result<CompactTarget> {
    params.validate()?;

    let max_bits = params.max_target_bits();

    let stall_limit = i64::from(tip.time()) + 2 * i64::from(params.target_spacing());
    if i64::from(candidate.time) > stall_limit {
        debug!(
            tip_time = tip.time(),
            candidate_time = candidate.time,
            "minimum difficulty block allowed after stall"
        );
        return Ok(max_bits);
    }

    let mut cursor = tip.clone();
    while cursor.height % params.interval != 0 && cursor.bits() == max_bits {
        match chain.get_prev(&cursor) {
            Some(prev) => cursor = prev,
            None => break,
        }
    }

    Ok(cursor.bits())
}

/// CalculateNextWorkRequired: ℕ × ℕ × 𝒞 × ℕ × 𝒞 × 𝒫 → 𝒞
///
/// Retarget from a measured window, without any test-network special cases.
///
/// 1. timespan = clamp(previous_time − last_retarget_time, T/4, 4T)
/// 2. target = expand(last_bits) × timespan / T
/// 3. target = min(target, max_target)
/// 4. Keep only the 3-byte mantissa window implied by `next_bits`'s exponent,
///    so the result carries the precision the next block itself claims
/// 5. Return compress(target)
///
/// `previous_height` is the height of the block before the retarget.
pub fn calculate_retarget(
    previous_height: Height,
    previous_time: u32,
    last_bits: CompactTarget,
    last_retarget_time: u32,
    next_bits: CompactTarget,
    params: &ChainParameters,
) -> Result<CompactTarget> {
    params.validate()?;
    Ok(retarget(
        previous_height,
        previous_time,
        last_bits,
        last_retarget_time,
        next_bits,
        params,
    ))
}

fn retarget(
    previous_height: Height,
    previous_time: u32,
    last_bits: CompactTarget,
    last_retarget_time: u32,
    next_bits: CompactTarget,
    params: &ChainParameters,
) -> CompactTarget {
    let timespan = clamped_timespan(previous_time, last_retarget_time, params.target_timespan);

    // Clamping keeps the timespan non-negative
    let mut new_target = last_bits.to_target() * BigUint::from(timespan as u64)
        / BigUint::from(params.target_timespan);

    if new_target > params.max_target {
        info!(
            height = u64::from(previous_height) + 1,
            "difficulty hit proof of work limit: {:x}", new_target
        );
        new_target = params.max_target.clone();
    }

    new_target &= precision_mask(next_bits);
    CompactTarget::from_target(&new_target)
}

/// Measured retarget timespan, bounded to [T/4, 4T].
///
/// The raw difference is narrowed to a signed 32-bit value before clamping,
/// so misordered timestamps clamp to the lower bound.
pub fn clamped_timespan(previous_time: u32, last_retarget_time: u32, target_timespan: u32) -> i64 {
    let actual = (i64::from(previous_time) - i64::from(last_retarget_time)) as i32;
    let target_timespan = i64::from(target_timespan);
    let factor = i64::from(MAX_ADJUSTMENT_FACTOR);

    i64::from(actual).clamp(target_timespan / factor, target_timespan * factor)
}

/// 0xFFFFFF shifted to the mantissa position of `bits`
fn precision_mask(bits: CompactTarget) -> BigUint {
    let accuracy_bytes = i32::from(bits.exponent()) - 3;
    let mask = BigUint::from(PRECISION_MASK);

    if accuracy_bytes >= 0 {
        mask << (accuracy_bytes as u32 * 8)
    } else {
        mask >> (accuracy_bytes.unsigned_abs() * 8)
    }
}

/// Walk `go_back` ancestors from `tip`.
///
/// `Ok(None)` when history ends at a checkpoint inside the window.
fn find_retarget_anchor<C: ChainView + ?Sized>(
    tip: &StoredHeader,
    go_back: u32,
    chain: &C,
) -> Result<Option<StoredHeader>> {
    let mut cursor = tip.clone();

    for step in 0..go_back {
        if cursor.height == 0 {
            error!(tip_height = tip.height, step, go_back, "retarget walked past genesis");
            return Err(ConsensusError::InvariantViolation(format!(
                "difficulty transition point but no way back to genesis: \
                 reached height 0 after {} of {} steps from height {}",
                step, go_back, tip.height
            )));
        }

        let prev = match chain.get_prev(&cursor) {
            Some(prev) => prev,
            None => return Ok(None),
        };

        if prev.height.checked_add(1) != Some(cursor.height) {
            error!(
                expected = cursor.height - 1,
                found = prev.height,
                "chain view returned ancestor at wrong height"
            );
            return Err(ConsensusError::InvariantViolation(format!(
                "parent of block at height {} reported at height {}",
                cursor.height, prev.height
            )));
        }

        cursor = prev;
    }

    Ok(Some(cursor))
}

/// CheckDifficultyTransition: 𝒮 × ℋ × 𝒱 × 𝒫 → {valid, invalid}
///
/// Compare the target `candidate` declares with the expected one. When history
/// ends at a checkpoint the declared target is taken on trust.
pub fn check_difficulty_transition<C: ChainView + ?Sized>(
    tip: &StoredHeader,
    candidate: &BlockHeader,
    chain: &C,
    params: &ChainParameters,
) -> Result<ValidationResult> {
    match expected_next_target(tip, candidate, chain, params)? {
        RetargetOutcome::CheckpointEncountered => Ok(ValidationResult::Valid),
        RetargetOutcome::Target(expected) if expected == candidate.bits => {
            Ok(ValidationResult::Valid)
        }
        RetargetOutcome::Target(expected) => {
            warn!(
                height = u64::from(tip.height) + 1,
                %expected,
                received = %candidate.bits,
                "difficulty bits mismatch"
            );
            Ok(ValidationResult::Invalid(format!(
                "Network provided difficulty bits do not match what was calculated: {} vs {}",
                expected, candidate.bits
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::HeaderStore;

    fn header(prev_block_hash: Hash, time: u32, bits: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash,
            merkle_root: [0; 32],
            time,
            bits: CompactTarget(bits),
            nonce: 0,
        }
    }

    fn bitcoin_params() -> ChainParameters {
        ChainParameters::new(14 * 24 * 60 * 60, 2016, CompactTarget(0x1d00ffff).to_target(), false)
            .unwrap()
    }

    #[test]
    fn test_clamped_timespan_bounds() {
        assert_eq!(clamped_timespan(1030, 1000, 30), 30);
        assert_eq!(clamped_timespan(1000, 1000, 30), 7);
        assert_eq!(clamped_timespan(1000, 5000, 30), 7);
        assert_eq!(clamped_timespan(9000, 1000, 30), 120);
    }

    #[test]
    fn test_clamped_timespan_narrows_to_32_bits() {
        // 2^31 seconds wraps to i32::MIN and clamps to the lower bound
        assert_eq!(clamped_timespan(0x8000_0000, 0, 30), 7);
    }

    #[test]
    fn test_calculate_retarget_bitcoin_block_32256() {
        let bits = calculate_retarget(
            32255,
            1262152739,
            CompactTarget(0x1d00ffff),
            1261130161,
            CompactTarget(0x1d00d86a),
            &bitcoin_params(),
        )
        .unwrap();
        assert_eq!(bits, CompactTarget(0x1d00d86a));
    }

    #[test]
    fn test_calculate_retarget_unchanged_on_schedule() {
        let params = ChainParameters::mainnet();
        let bits = calculate_retarget(
            10,
            1030,
            CompactTarget(0x1e0ffff0),
            1000,
            CompactTarget(0x1e0ffff0),
            &params,
        )
        .unwrap();
        assert_eq!(bits, CompactTarget(0x1e0ffff0));
    }

    #[test]
    fn test_calculate_retarget_fast_blocks_clamped() {
        let params = ChainParameters::mainnet();
        let bits = calculate_retarget(
            10,
            1000,
            CompactTarget(0x1e0ffff0),
            1000,
            CompactTarget(0x1e03bbb8),
            &params,
        )
        .unwrap();
        // 0x0ffff0 × 7 / 30
        assert_eq!(bits, CompactTarget(0x1e03bbb8));
    }

    #[test]
    fn test_calculate_retarget_slow_blocks_hit_limit() {
        let params = ChainParameters::mainnet();
        let bits = calculate_retarget(
            10,
            2000,
            CompactTarget(0x1e0ffff0),
            1000,
            CompactTarget(0x1e0fffff),
            &params,
        )
        .unwrap();
        assert_eq!(bits, CompactTarget(0x1e0fffff));
    }

    #[test]
    fn test_precision_follows_next_block_exponent() {
        let params = ChainParameters::mainnet();
        let compute = |next_bits| {
            calculate_retarget(10, 1029, CompactTarget(0x1e0fffff), 1000, CompactTarget(next_bits), &params)
                .unwrap()
        };

        assert_eq!(compute(0x1e000000), CompactTarget(0x1e0f7776));
        assert_eq!(compute(0x1f000000), CompactTarget(0x1e0f7700));
    }

    #[test]
    fn test_precision_mask_small_exponents() {
        assert_eq!(precision_mask(CompactTarget(0x03000000)), BigUint::from(0xffffffu32));
        assert_eq!(precision_mask(CompactTarget(0x01000000)), BigUint::from(0xffu32));
        assert_eq!(precision_mask(CompactTarget(0x00000000)), BigUint::from(0u32));
    }

    #[test]
    fn test_calculate_retarget_rejects_invalid_params() {
        let mut params = ChainParameters::mainnet();
        params.target_timespan = 0;
        let result = calculate_retarget(
            0,
            0,
            CompactTarget(0x1e0fffff),
            0,
            CompactTarget(0x1e0fffff),
            &params,
        );
        assert!(matches!(result, Err(ConsensusError::InvalidParameters(_))));
    }

    #[test]
    fn test_anchor_walk_past_genesis_is_invariant_violation() {
        let mut store = HeaderStore::new();
        let mut prev = [0u8; 32];
        for i in 0..2 {
            prev = store.push(header(prev, 1000 + i * 30, 0x1e0fffff)).unwrap();
        }
        let tip = store.tip().unwrap();

        let result = find_retarget_anchor(&tip, 3, &store);
        assert!(matches!(result, Err(ConsensusError::InvariantViolation(_))));
    }

    #[test]
    fn test_anchor_walk_stops_at_missing_parent() {
        let mut store = HeaderStore::new();
        let mut prev = [0u8; 32];
        for i in 0..4 {
            prev = store.push(header(prev, 1000 + i * 30, 0x1e0fffff)).unwrap();
        }
        store.prune_below(2);
        let tip = store.tip().unwrap();

        assert_eq!(find_retarget_anchor(&tip, 1, &store).unwrap().unwrap().height, 2);
        assert!(find_retarget_anchor(&tip, 2, &store).unwrap().is_none());
    }

    #[test]
    fn test_first_mainnet_retarget_uses_genesis_as_anchor() {
        // Interval of one: the block after genesis retargets with a zero-length window
        let params = ChainParameters::mainnet();
        let mut store = HeaderStore::new();
        let genesis = store.push(header([0; 32], 1394102925, 0x1e0ffff0)).unwrap();
        let tip = store.tip().unwrap();

        let candidate = header(genesis, 1394102955, 0x1e03bbb8);
        let outcome = expected_next_target(&tip, &candidate, &store, &params).unwrap();
        assert_eq!(outcome, RetargetOutcome::Target(CompactTarget(0x1e03bbb8)));
    }

    #[test]
    fn test_mainnet_retarget_every_block() {
        let params = ChainParameters::mainnet();
        let mut store = HeaderStore::new();
        let mut prev = [0u8; 32];
        for i in 0..4 {
            prev = store.push(header(prev, 1000 + i * 30, 0x1e0ffff0)).unwrap();
        }
        let tip = store.tip().unwrap();

        let candidate = header(prev, 1120, 0x1e0ffff0);
        let result = check_difficulty_transition(&tip, &candidate, &store, &params).unwrap();
        assert_eq!(result, ValidationResult::Valid);
    }

    #[test]
    fn test_mismatch_is_invalid() {
        let params = ChainParameters::mainnet();
        let mut store = HeaderStore::new();
        let mut prev = [0u8; 32];
        for i in 0..3 {
            prev = store.push(header(prev, 1000 + i * 30, 0x1e0ffff0)).unwrap();
        }
        let tip = store.tip().unwrap();

        let candidate = header(prev, 1090, 0x1e0fffff);
        let result = check_difficulty_transition(&tip, &candidate, &store, &params).unwrap();
        assert_eq!(
            result,
            ValidationResult::Invalid(
                "Network provided difficulty bits do not match what was calculated: \
                 0x1e0ffff0 vs 0x1e0fffff"
                    .to_string()
            )
        );
    }
}
