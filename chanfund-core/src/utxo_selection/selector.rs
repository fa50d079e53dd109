//! Main coin selector implementation
//!
//! The [`CoinSelector`] turns a set of candidate outputs into a priced
//! funding transaction shape: which inputs, how much goes into the channel,
//! whether there is change, and what the fee is.
//!
//! # Modes
//!
//! - **Wallet mode** ([`CoinSelector::select`]): candidates are ordered by a
//!   [`Strategy`] and taken until the target plus fee is covered. A fund-max
//!   target takes every candidate.
//! - **Explicit mode** ([`CoinSelector::select_explicit`]): exactly the given
//!   inputs are used, none are added or dropped.
//!
//! # Change
//!
//! A change output is only created when it would be at least the dust limit
//! of the change script class. Otherwise the leftover is folded into the fee
//! and reported as `folded_dust`, so the balance equation
//! `inputs == funding + change + fee` always holds exactly.

use bitcoin::Amount;
use serde_json::json;

use crate::config::ChannelPolicy;
use crate::error::{FundingError, FundingResult};
use crate::logging::{self, LogLevel};
use crate::types::{signed_difference, total_amount, ScriptClass, UnspentOutput};
use crate::utxo_selection::strategies::Strategy;
use crate::utxo_selection::types::{SelectionResult, SelectionTarget};
use crate::validation;
use crate::weight::{SatPerKWeight, Weight, WeightTable};

/// Script class of the 2-of-2 funding output
pub const FUNDING_OUTPUT_CLASS: ScriptClass = ScriptClass::WitnessScriptHash;

/// Coin selector for one funding attempt
///
/// Holds the fee rate and the limits it needs to price and shape a funding
/// transaction; it does not touch leases.
pub struct CoinSelector<'a> {
    weights: &'a WeightTable,
    fee_rate: SatPerKWeight,
    change_class: ScriptClass,
    funding_dust_limit: Amount,
    change_dust_limit: Amount,
    min_chan_size: Amount,
    max_chan_size: Amount,
}

impl<'a> CoinSelector<'a> {
    /// Create a selector for one attempt
    ///
    /// # Arguments
    /// * `weights` - Size table used to price the transaction
    /// * `policy` - Channel policy supplying dust limits and channel bounds
    /// * `fee_rate` - Fee rate of the funding transaction
    /// * `change_class` - Script class of a change output
    pub fn new(
        weights: &'a WeightTable,
        policy: &ChannelPolicy,
        fee_rate: SatPerKWeight,
        change_class: ScriptClass,
    ) -> Self {
        Self {
            weights,
            fee_rate,
            change_class,
            funding_dust_limit: policy.dust_limit(FUNDING_OUTPUT_CLASS),
            change_dust_limit: policy.dust_limit(change_class),
            min_chan_size: policy.min_chan_size(),
            max_chan_size: policy.max_chan_size(),
        }
    }

    /// Fee rate this selector prices with
    pub fn fee_rate(&self) -> SatPerKWeight {
        self.fee_rate
    }

    /// Weight of a funding transaction spending `inputs`, with or without a
    /// change output
    pub fn estimate_weight(&self, inputs: &[UnspentOutput], with_change: bool) -> Weight {
        let input_classes: Vec<ScriptClass> = inputs.iter().map(|u| u.script_class).collect();
        let mut output_classes = vec![FUNDING_OUTPUT_CLASS];
        if with_change {
            output_classes.push(self.change_class);
        }
        self.weights.estimate(&input_classes, &output_classes)
    }

    /// Fee of a funding transaction spending `inputs`
    pub fn fee_for(&self, inputs: &[UnspentOutput], with_change: bool) -> Amount {
        self.fee_rate.fee_for_weight(self.estimate_weight(inputs, with_change))
    }

    /// Select from wallet candidates in the order given by `strategy`
    ///
    /// # Arguments
    /// * `candidates` - Free outputs of the wallet
    /// * `target` - Fund-max or a fixed channel amount
    /// * `strategy` - Candidate ordering
    ///
    /// # Returns
    /// * The priced selection, or `InsufficientFunds` / `DustOutput`
    pub fn select(
        &self,
        candidates: &[UnspentOutput],
        target: SelectionTarget,
        strategy: &dyn Strategy,
    ) -> FundingResult<SelectionResult> {
        let mut ordered = candidates.to_vec();
        strategy.order(&mut ordered);

        logging::log_selection(
            LogLevel::Debug,
            "wallet_selection",
            Some(json!({
                "strategy": strategy.name(),
                "candidates": ordered.len(),
                "fee_rate": self.fee_rate.to_sat_per_kwu(),
            })),
        );

        match target {
            SelectionTarget::FundMax => self.fund_max(ordered),
            SelectionTarget::Amount(amount) => {
                let available = total_amount(&ordered);
                let mut selected = Vec::new();
                let mut selected_total = Amount::ZERO;

                for utxo in ordered {
                    selected_total += utxo.amount;
                    selected.push(utxo);

                    let needed = amount + self.fee_for(&selected, false);
                    if selected_total >= needed {
                        return self.fixed_amount(selected, amount);
                    }
                }

                Err(FundingError::InsufficientFunds { requested: amount, available })
            }
        }
    }

    /// Use exactly `inputs`
    ///
    /// # Arguments
    /// * `inputs` - The outputs the caller chose
    /// * `target` - Fund-max or a fixed channel amount
    ///
    /// # Returns
    /// * The priced selection, or `InsufficientFunds` / `DustOutput`
    pub fn select_explicit(
        &self,
        inputs: Vec<UnspentOutput>,
        target: SelectionTarget,
    ) -> FundingResult<SelectionResult> {
        match target {
            SelectionTarget::FundMax => self.fund_max(inputs),
            SelectionTarget::Amount(amount) => self.fixed_amount(inputs, amount),
        }
    }

    /// Everything selected goes into the channel, less the fee. Anything above
    /// the maximum channel size becomes change.
    fn fund_max(&self, inputs: Vec<UnspentOutput>) -> FundingResult<SelectionResult> {
        let total = total_amount(&inputs);
        if inputs.is_empty() {
            return Err(FundingError::InsufficientFunds {
                requested: self.min_chan_size,
                available: total,
            });
        }

        let weight = self.estimate_weight(&inputs, false);
        let fee = self.fee_rate.fee_for_weight(weight);
        validation::check_dust(signed_difference(total, fee), fee, self.funding_dust_limit)?;
        let funding = total - fee;

        if funding <= self.max_chan_size {
            return Ok(SelectionResult {
                inputs,
                funding,
                change: None,
                fee,
                folded_dust: Amount::ZERO,
                weight,
            });
        }

        let change_weight = self.estimate_weight(&inputs, true);
        let change_fee = self.fee_rate.fee_for_weight(change_weight);

        logging::log_selection(
            LogLevel::Debug,
            "fund_max_capped",
            Some(json!({
                "max_chan_size": self.max_chan_size.to_sat(),
                "excess": (funding - self.max_chan_size).to_sat(),
            })),
        );

        match total.checked_sub(self.max_chan_size + change_fee) {
            Some(change) if change >= self.change_dust_limit => Ok(SelectionResult {
                inputs,
                funding: self.max_chan_size,
                change: Some(change),
                fee: change_fee,
                folded_dust: Amount::ZERO,
                weight: change_weight,
            }),
            _ => {
                // funding > max, so this cannot underflow
                let folded = funding - self.max_chan_size;
                Ok(SelectionResult {
                    inputs,
                    funding: self.max_chan_size,
                    change: None,
                    fee: fee + folded,
                    folded_dust: folded,
                    weight,
                })
            }
        }
    }

    /// Fund exactly `amount`, returning the rest as change when it is not dust.
    fn fixed_amount(&self, inputs: Vec<UnspentOutput>, amount: Amount) -> FundingResult<SelectionResult> {
        let total = total_amount(&inputs);
        let weight = self.estimate_weight(&inputs, false);
        let fee = self.fee_rate.fee_for_weight(weight);

        let leftover = match total.checked_sub(amount + fee) {
            Some(leftover) if !inputs.is_empty() => leftover,
            _ => {
                return Err(FundingError::InsufficientFunds { requested: amount, available: total })
            }
        };

        let change_weight = self.estimate_weight(&inputs, true);
        let change_fee = self.fee_rate.fee_for_weight(change_weight);

        match total.checked_sub(amount + change_fee) {
            Some(change) if change >= self.change_dust_limit => Ok(SelectionResult {
                inputs,
                funding: amount,
                change: Some(change),
                fee: change_fee,
                folded_dust: Amount::ZERO,
                weight: change_weight,
            }),
            _ => {
                if leftover > Amount::ZERO {
                    logging::log_selection(
                        LogLevel::Debug,
                        "change_folded_into_fee",
                        Some(json!({ "folded_sat": leftover.to_sat() })),
                    );
                }
                Ok(SelectionResult {
                    inputs,
                    funding: amount,
                    change: None,
                    fee: fee + leftover,
                    folded_dust: leftover,
                    weight,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo_selection::strategies::LargestFirstStrategy;
    use bitcoin::{OutPoint, SignedAmount, Txid};
    use std::str::FromStr;

    fn utxo(vout: u32, sat: u64) -> UnspentOutput {
        UnspentOutput::new(
            OutPoint::new(
                Txid::from_str("1111111111111111111111111111111111111111111111111111111111111111")
                    .unwrap(),
                vout,
            ),
            Amount::from_sat(sat),
            ScriptClass::WitnessPubkeyHash,
        )
    }

    fn selector(weights: &WeightTable, rate: u64) -> CoinSelector<'_> {
        CoinSelector::new(
            weights,
            &ChannelPolicy::default(),
            SatPerKWeight::from_sat_per_kwu(rate),
            ScriptClass::Taproot,
        )
    }

    #[test]
    fn fund_max_single_input() {
        let weights = WeightTable::default();
        let result = selector(&weights, 12_500)
            .select_explicit(vec![utxo(0, 37_000)], SelectionTarget::FundMax)
            .unwrap();
        assert_eq!(result.funding, Amount::from_sat(37_000 - 6_087));
        assert_eq!(result.change, None);
        assert_eq!(result.fee, Amount::from_sat(6_087));
    }

    #[test]
    fn fund_max_dust_reports_signed_amount() {
        let weights = WeightTable::default();
        let err = selector(&weights, 3_750)
            .select_explicit(vec![utxo(0, 2_000)], SelectionTarget::FundMax)
            .unwrap_err();
        assert_eq!(
            err,
            FundingError::DustOutput {
                amount: SignedAmount::from_sat(174),
                fee: Amount::from_sat(1_826),
                dust_limit: Amount::from_sat(330),
            }
        );
    }

    #[test]
    fn fund_max_caps_at_max_chan_size() {
        let weights = WeightTable::default();
        let result = selector(&weights, 12_500)
            .select_explicit(vec![utxo(0, 20_000_000)], SelectionTarget::FundMax)
            .unwrap();
        assert_eq!(result.funding, Amount::from_sat(16_777_215));
        assert_eq!(result.change, Some(Amount::from_sat(20_000_000 - 16_777_215 - 8_237)));
        assert_eq!(result.fee, Amount::from_sat(8_237));
    }

    #[test]
    fn fixed_amount_accumulates_largest_first() {
        let weights = WeightTable::default();
        let result = selector(&weights, 12_500)
            .select(
                &[utxo(0, 100_000), utxo(1, 200_000)],
                SelectionTarget::Amount(Amount::from_sat(250_000)),
                &LargestFirstStrategy,
            )
            .unwrap();
        assert_eq!(result.inputs.len(), 2);
        assert_eq!(result.inputs[0].amount, Amount::from_sat(200_000));
        assert_eq!(result.change, Some(Amount::from_sat(300_000 - 250_000 - 11_650)));
    }

    #[test]
    fn small_leftover_is_folded() {
        let weights = WeightTable::default();
        // 100 sat over amount + fee(no change) is below any change dust limit
        let result = selector(&weights, 12_500)
            .select_explicit(
                vec![utxo(0, 50_000 + 6_087 + 100)],
                SelectionTarget::Amount(Amount::from_sat(50_000)),
            )
            .unwrap();
        assert_eq!(result.change, None);
        assert_eq!(result.folded_dust, Amount::from_sat(100));
        assert_eq!(result.fee, Amount::from_sat(6_187));
        assert_eq!(result.input_total(), result.funding + result.fee);
    }

    #[test]
    fn insufficient_reports_requested_and_available() {
        let weights = WeightTable::default();
        let err = selector(&weights, 12_500)
            .select(
                &[utxo(0, 100_000)],
                SelectionTarget::Amount(Amount::from_sat(210_337)),
                &LargestFirstStrategy,
            )
            .unwrap_err();
        assert_eq!(
            err,
            FundingError::InsufficientFunds {
                requested: Amount::from_sat(210_337),
                available: Amount::from_sat(100_000),
            }
        );
    }
}
