//! Limits and reserve validation for funding plans
//!
//! Every plan the assembler produces passes through [`validate`] before it is
//! handed out. The checks run in a fixed order and the first failure wins:
//!
//! 1. Dust: the funding output, then the change output
//! 2. Channel size: minimum, then the (wumbo gated) maximum
//! 3. Funder balance: what the funder keeps after the push must still pay the
//!    commitment fee and leave `min_funder_balance`
//! 4. Reserve: anchor channels need an on-chain wallet reserve for fee bumping
//!
//! Each check is also exposed on its own. All of them are pure: they look at
//! amounts and policy and never touch leases or the wallet.

use bitcoin::{Amount, SignedAmount};

use crate::config::ChannelPolicy;
use crate::error::{FundingError, FundingResult};
use crate::funding::FundingPlan;
use crate::types::{signed_difference, to_signed_amount, CommitmentFormat, ScriptClass};
use crate::utxo_selection::selector::FUNDING_OUTPUT_CLASS;
use crate::weight::SatPerKWeight;

/// Policy values frozen for the duration of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// Channel limits, dust thresholds and reserve parameters
    pub policy: ChannelPolicy,
    /// Fee rate of the funding transaction, also used for the commitment fee
    pub fee_rate: SatPerKWeight,
    /// Script class of the change output
    pub change_class: ScriptClass,
    /// Public anchor channels already open
    pub existing_public_channels: u32,
    /// Public anchor channels this attempt will add
    pub additional_public_channels: u32,
}

impl PolicySnapshot {
    /// Wallet reserve this attempt must leave behind
    ///
    /// Zero for formats without anchors.
    pub fn required_reserve(&self, format: CommitmentFormat) -> Amount {
        if !format.requires_wallet_reserve() {
            return Amount::ZERO;
        }
        let channels = self
            .existing_public_channels
            .saturating_add(self.additional_public_channels);
        self.policy.required_reserve(channels)
    }
}

/// Validate a plan against the policy snapshot
///
/// # Arguments
/// * `plan` - The priced plan
/// * `snapshot` - Policy for the attempt that produced it
///
/// # Returns
/// * `Ok(())`, or the first failing check's error
pub fn validate(plan: &FundingPlan, snapshot: &PolicySnapshot) -> FundingResult<()> {
    let policy = &snapshot.policy;

    check_dust(
        to_signed_amount(plan.funding_amount),
        plan.fee,
        policy.dust_limit(FUNDING_OUTPUT_CLASS),
    )?;
    if let Some(change) = plan.change {
        check_dust(
            to_signed_amount(change),
            plan.fee,
            policy.dust_limit(snapshot.change_class),
        )?;
    }

    check_chan_size(plan.funding_amount, policy)?;

    check_funder_balance(
        plan.funding_amount,
        plan.remote_balance,
        plan.commitment_format,
        snapshot.fee_rate,
        policy,
    )?;

    check_reserve(plan.wallet_remainder, snapshot.required_reserve(plan.commitment_format))
}

/// Reject an output below its dust limit
///
/// `amount` is signed because a fund-max output can go negative when the fee
/// exceeds the inputs.
pub fn check_dust(amount: SignedAmount, fee: Amount, dust_limit: Amount) -> FundingResult<()> {
    if amount < to_signed_amount(dust_limit) {
        return Err(FundingError::DustOutput { amount, fee, dust_limit });
    }
    Ok(())
}

/// Check the funding amount against the channel size bounds
pub fn check_chan_size(funding: Amount, policy: &ChannelPolicy) -> FundingResult<()> {
    if funding < policy.min_chan_size() {
        return Err(FundingError::BelowMinChanSize {
            available: funding,
            minimum: policy.min_chan_size(),
        });
    }
    if funding > policy.max_chan_size() {
        return Err(FundingError::AboveMaxChanSize {
            requested: funding,
            maximum: policy.max_chan_size(),
        });
    }
    Ok(())
}

/// Check that the funder can pay the commitment fee after the push
///
/// # Arguments
/// * `funding` - Channel capacity
/// * `push` - Amount pushed to the remote side
/// * `format` - Commitment format, which decides the commitment weight
/// * `fee_rate` - Fee rate of the attempt
/// * `policy` - Supplies the minimum funder balance and the anchor fee cap
pub fn check_funder_balance(
    funding: Amount,
    push: Amount,
    format: CommitmentFormat,
    fee_rate: SatPerKWeight,
    policy: &ChannelPolicy,
) -> FundingResult<()> {
    let commit_fee = policy.commitment_fee(format, fee_rate);
    let after_push = signed_difference(funding, push) - to_signed_amount(commit_fee);
    let minimum = policy.min_funder_balance();

    if after_push < to_signed_amount(minimum) {
        return Err(FundingError::FunderBalanceTooSmall { after_push, commit_fee, minimum });
    }
    Ok(())
}

/// Check that the wallet keeps at least `required` after the funding
/// transaction
pub fn check_reserve(wallet_remainder: Amount, required: Amount) -> FundingResult<()> {
    match required.checked_sub(wallet_remainder) {
        Some(shortfall) if shortfall > Amount::ZERO => {
            Err(FundingError::ReserveViolation { shortfall, required })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dust_boundary_is_inclusive() {
        let limit = Amount::from_sat(330);
        assert!(check_dust(SignedAmount::from_sat(330), Amount::ZERO, limit).is_ok());
        assert!(check_dust(SignedAmount::from_sat(329), Amount::ZERO, limit).is_err());
        assert!(check_dust(SignedAmount::from_sat(-5), Amount::ZERO, limit).is_err());
    }

    #[test]
    fn funder_balance_after_full_push() {
        let policy = ChannelPolicy::default();
        let err = check_funder_balance(
            policy.max_chan_size(),
            policy.max_chan_size(),
            CommitmentFormat::StaticRemoteKey,
            SatPerKWeight::from_sat_per_kwu(12_500),
            &policy,
        )
        .unwrap_err();
        assert_eq!(
            err,
            FundingError::FunderBalanceTooSmall {
                after_push: SignedAmount::from_sat(-9_050),
                commit_fee: Amount::from_sat(9_050),
                minimum: Amount::from_sat(708),
            }
        );
    }

    #[test]
    fn reserve_shortfall() {
        assert_eq!(
            check_reserve(Amount::from_sat(4_000), Amount::from_sat(10_000)),
            Err(FundingError::ReserveViolation {
                shortfall: Amount::from_sat(6_000),
                required: Amount::from_sat(10_000),
            })
        );
        assert!(check_reserve(Amount::from_sat(10_000), Amount::from_sat(10_000)).is_ok());
        assert!(check_reserve(Amount::ZERO, Amount::ZERO).is_ok());
    }

    #[test]
    fn reserve_only_for_anchor_formats() {
        let snapshot = PolicySnapshot {
            policy: ChannelPolicy::default(),
            fee_rate: SatPerKWeight::from_sat_per_kwu(12_500),
            change_class: ScriptClass::Taproot,
            existing_public_channels: 2,
            additional_public_channels: 1,
        };
        assert_eq!(snapshot.required_reserve(CommitmentFormat::StaticRemoteKey), Amount::ZERO);
        assert_eq!(snapshot.required_reserve(CommitmentFormat::Anchors), Amount::from_sat(30_000));
    }

    #[test]
    fn chan_size_bounds() {
        let policy = ChannelPolicy::default();
        assert_eq!(
            check_chan_size(Amount::from_sat(17_877), &policy),
            Err(FundingError::BelowMinChanSize {
                available: Amount::from_sat(17_877),
                minimum: Amount::from_sat(20_000),
            })
        );
        assert!(check_chan_size(Amount::from_sat(16_777_216), &policy).is_err());
        assert!(check_chan_size(Amount::from_sat(16_777_215), &policy).is_ok());
    }
}
