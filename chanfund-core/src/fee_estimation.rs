//! Fee rate sources for funding transactions
//!
//! A funding attempt prices its transaction at a single fee rate. That rate
//! comes from the request when the caller overrides it, otherwise from a
//! [`FeeOracle`]. Either way the result is clamped to the relay floor so a
//! funding transaction is never built below what nodes will relay.

use crate::weight::SatPerKWeight;

/// Minimum relay fee rate, 253 sat/kw (just above 1 sat/vB after rounding)
pub const FEERATE_FLOOR: SatPerKWeight = SatPerKWeight::from_sat_per_kwu(253);

/// Source of the current on-chain fee rate
pub trait FeeOracle: Send + Sync {
    /// Fee rate to use for a funding transaction right now
    fn fee_rate(&self) -> SatPerKWeight;
}

/// Oracle returning a fixed fee rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticFeeOracle {
    rate: SatPerKWeight,
}

impl StaticFeeOracle {
    /// Create an oracle that always answers `rate`
    pub fn new(rate: SatPerKWeight) -> Self {
        Self { rate }
    }
}

impl Default for StaticFeeOracle {
    fn default() -> Self {
        Self::new(SatPerKWeight::from_sat_per_kwu(12_500))
    }
}

impl FeeOracle for StaticFeeOracle {
    fn fee_rate(&self) -> SatPerKWeight {
        self.rate
    }
}

/// An estimate already obtained from a BDK blockchain backend can serve
/// directly as an oracle.
impl FeeOracle for bdk::FeeRate {
    fn fee_rate(&self) -> SatPerKWeight {
        SatPerKWeight::from(*self)
    }
}

/// Pick the fee rate for an attempt
///
/// # Arguments
/// * `override_rate` - Rate requested by the caller, if any
/// * `estimated` - Rate reported by the oracle
/// * `floor` - Relay floor; the result is never below it
///
/// # Returns
/// The override if present, else the estimate, raised to the floor
pub fn resolve_fee_rate(
    override_rate: Option<SatPerKWeight>,
    estimated: SatPerKWeight,
    floor: SatPerKWeight,
) -> SatPerKWeight {
    let rate = override_rate.unwrap_or(estimated);
    if rate < floor {
        log::debug!("Fee rate {} below floor, using {}", rate, floor);
        floor
    } else {
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_estimate() {
        let rate = resolve_fee_rate(
            Some(SatPerKWeight::from_sat_per_vbyte(15)),
            SatPerKWeight::from_sat_per_kwu(12_500),
            FEERATE_FLOOR,
        );
        assert_eq!(rate.to_sat_per_kwu(), 3_750);
    }

    #[test]
    fn one_sat_per_vbyte_is_raised_to_floor() {
        let rate = resolve_fee_rate(
            Some(SatPerKWeight::from_sat_per_vbyte(1)),
            SatPerKWeight::from_sat_per_kwu(12_500),
            FEERATE_FLOOR,
        );
        assert_eq!(rate, FEERATE_FLOOR);
    }

    #[test]
    fn bdk_fee_rate_is_an_oracle() {
        let oracle = bdk::FeeRate::from_sat_per_vb(4.0);
        assert_eq!(oracle.fee_rate().to_sat_per_kwu(), 1_000);
        assert_eq!(StaticFeeOracle::default().fee_rate().to_sat_per_kwu(), 12_500);
    }
}
