//! Property-based tests for funding plans
//!
//! These tests use quickcheck to check the invariants every committed plan
//! must satisfy, whatever the wallet contents and fee rate.

use bitcoin::{Amount, OutPoint, Txid};
use chanfund_core::config::ChannelPolicy;
use chanfund_core::funding::{FundingAssembler, FundingRequest};
use chanfund_core::types::{CommitmentFormat, ScriptClass, UnspentOutput};
use chanfund_core::utxo_management::{LeaseStore, UtxoLeaseManager};
use chanfund_core::utxo_selection::{CoinSelector, SelectionTarget};
use chanfund_core::wallet::InMemoryWallet;
use chanfund_core::weight::{SatPerKWeight, WeightTable};
use chanfund_core::FundingError;
use quickcheck::{Arbitrary, Gen, TestResult};
use quickcheck_macros::quickcheck;
use std::str::FromStr;
use std::sync::Arc;

// A small wallet of witness outputs
#[derive(Clone, Debug)]
struct ArbitraryWallet(Vec<u64>);

impl Arbitrary for ArbitraryWallet {
    fn arbitrary(g: &mut Gen) -> Self {
        let count = 1 + usize::arbitrary(g) % 6;
        let amounts = (0..count).map(|_| 1_000 + u64::arbitrary(g) % 5_000_000).collect();
        ArbitraryWallet(amounts)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().filter(|v| !v.is_empty()).map(ArbitraryWallet))
    }
}

// Fee rate between the relay floor and 200 sat/vB
#[derive(Clone, Copy, Debug)]
struct ArbitraryFeeRate(u64);

impl Arbitrary for ArbitraryFeeRate {
    fn arbitrary(g: &mut Gen) -> Self {
        ArbitraryFeeRate(253 + u64::arbitrary(g) % 50_000)
    }
}

fn utxos(amounts: &[u64]) -> Vec<UnspentOutput> {
    let txid =
        Txid::from_str("4444444444444444444444444444444444444444444444444444444444444444").unwrap();
    amounts
        .iter()
        .enumerate()
        .map(|(vout, sat)| {
            let class = if vout % 2 == 0 { ScriptClass::WitnessPubkeyHash } else { ScriptClass::Taproot };
            UnspentOutput::new(OutPoint::new(txid, vout as u32), Amount::from_sat(*sat), class)
        })
        .collect()
}

fn check_plan_invariants(request: FundingRequest, wallet: &ArbitraryWallet, rate: u64) -> TestResult {
    let policy = ChannelPolicy::default();
    let leases = Arc::new(UtxoLeaseManager::new());
    let assembler = FundingAssembler::new(
        Arc::new(
            InMemoryWallet::new(utxos(&wallet.0))
                .with_fee_rate(SatPerKWeight::from_sat_per_kwu(rate)),
        ),
        leases.clone(),
    );

    let plan = match assembler.assemble(request) {
        Ok(plan) => plan,
        // Failed attempts must not leak leases
        Err(_) => return TestResult::from_bool(leases.is_empty()),
    };

    let change_ok = plan
        .change
        .map_or(true, |change| change >= policy.dust_limit(plan.change_class));
    let bounds_ok =
        plan.funding_amount >= policy.min_chan_size() && plan.funding_amount <= policy.max_chan_size();
    let leased_ok = plan.outpoints().iter().all(|op| leases.holder(op) == Some(plan.attempt));

    TestResult::from_bool(
        plan.is_balanced()
            && change_ok
            && bounds_ok
            && leased_ok
            && plan.funding_amount >= plan.remote_balance,
    )
}

#[quickcheck]
fn fund_max_plans_are_balanced(wallet: ArbitraryWallet, rate: ArbitraryFeeRate) -> TestResult {
    check_plan_invariants(FundingRequest::fund_max(), &wallet, rate.0)
}

#[quickcheck]
fn fixed_amount_plans_are_balanced(wallet: ArbitraryWallet, rate: ArbitraryFeeRate, amount: u64) -> TestResult {
    let amount = 20_000 + amount % 5_000_000;
    check_plan_invariants(FundingRequest::amount(Amount::from_sat(amount)), &wallet, rate.0)
}

#[quickcheck]
fn anchor_plans_keep_reserve(wallet: ArbitraryWallet, rate: ArbitraryFeeRate) -> TestResult {
    let request = FundingRequest::fund_max().with_commitment_format(CommitmentFormat::Anchors);
    let leases = Arc::new(UtxoLeaseManager::new());
    let assembler = FundingAssembler::new(
        Arc::new(
            InMemoryWallet::new(utxos(&wallet.0))
                .with_fee_rate(SatPerKWeight::from_sat_per_kwu(rate.0)),
        ),
        leases,
    );

    match assembler.assemble(request) {
        Ok(plan) => TestResult::from_bool(
            plan.wallet_remainder >= Amount::from_sat(10_000) && plan.is_balanced(),
        ),
        Err(_) => TestResult::discard(),
    }
}

#[quickcheck]
fn dust_is_monotonic_in_fee_rate(sat: u64, low: ArbitraryFeeRate, bump: u64) -> TestResult {
    let sat = sat % 50_000;
    let high = low.0 + bump % 50_000;
    let weights = WeightTable::default();
    let policy = ChannelPolicy::default();
    let inputs = utxos(&[sat]);

    let is_dust = |rate: u64| {
        let selector = CoinSelector::new(
            &weights,
            &policy,
            SatPerKWeight::from_sat_per_kwu(rate),
            ScriptClass::Taproot,
        );
        matches!(
            selector.select_explicit(inputs.clone(), SelectionTarget::FundMax),
            Err(FundingError::DustOutput { .. })
        )
    };

    if !is_dust(low.0) {
        return TestResult::discard();
    }
    TestResult::from_bool(is_dust(high))
}
