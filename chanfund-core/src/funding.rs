//! Funding plan assembly
//!
//! A funding attempt turns a [`FundingRequest`] into a [`FundingPlan`]: the
//! exact inputs, funding amount, change and fee of the transaction that opens
//! a channel. It moves through a small state machine:
//!
//! ```text
//! Collecting -> Estimating -> Validating -> Committed
//!      ^             |             |
//!      +-------------+             +------> Aborted (from any state)
//! ```
//!
//! - **Collecting** gathers candidates. With explicit outpoints it resolves
//!   and leases them right away. In wallet mode it lists the free outputs, and
//!   once Estimating has picked inputs the attempt comes back here to lease
//!   exactly those.
//! - **Estimating** runs coin selection and prices the transaction.
//! - **Validating** builds the plan and checks it. A fund-max plan that would
//!   leave the wallet below its anchor reserve is shrunk once and checked
//!   again; a second failure is final.
//!
//! A committed plan keeps its leases under the attempt id until the caller
//! releases them (normally after broadcasting). Any failure, an explicit
//! [`FundingAttempt::abort`], or dropping an unfinished attempt releases
//! every lease the attempt holds.
//!
//! # Usage
//!
//! ```
//! use std::str::FromStr;
//! use std::sync::Arc;
//! use bitcoin::{Amount, OutPoint, Txid};
//! use chanfund_core::funding::{FundingAssembler, FundingRequest};
//! use chanfund_core::types::{ScriptClass, UnspentOutput};
//! use chanfund_core::utxo_management::{LeaseStore, UtxoLeaseManager};
//! use chanfund_core::wallet::InMemoryWallet;
//!
//! let txid = Txid::from_str(
//!     "1111111111111111111111111111111111111111111111111111111111111111",
//! ).unwrap();
//! let wallet = Arc::new(InMemoryWallet::new(vec![UnspentOutput::new(
//!     OutPoint::new(txid, 0),
//!     Amount::from_sat(37_000),
//!     ScriptClass::WitnessPubkeyHash,
//! )]));
//! let leases = Arc::new(UtxoLeaseManager::new());
//! let assembler = FundingAssembler::new(wallet, leases.clone());
//!
//! let plan = assembler.assemble(FundingRequest::fund_max()).unwrap();
//! assert_eq!(plan.funding_amount, Amount::from_sat(37_000 - 6_087));
//!
//! // After broadcasting the funding transaction
//! assert_eq!(leases.release(plan.attempt), 1);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitcoin::{Amount, OutPoint};
use serde_json::json;

use crate::config::{ChannelPolicy, FundingConfig};
use crate::error::{FundingError, FundingResult};
use crate::fee_estimation::{resolve_fee_rate, FEERATE_FLOOR};
use crate::logging::{self, LogLevel};
use crate::types::{
    signed_difference, to_signed_amount, total_amount, AttemptId, CommitmentFormat, ScriptClass,
    UnspentOutput,
};
use crate::utxo_management::LeaseStore;
use crate::utxo_selection::selector::CoinSelector;
use crate::utxo_selection::types::{SelectionResult, SelectionStrategy, SelectionTarget};
use crate::validation::{self, PolicySnapshot};
use crate::wallet::FundingSource;
use crate::weight::{SatPerKWeight, Weight, WeightTable};

/// Parameters of a channel open, as far as the funding transaction cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRequest {
    /// Channel capacity to fund; zero means "fund with everything selected"
    pub local_amount: Amount,
    /// Outpoints the caller insists on; empty lets the wallet choose
    pub outpoints: Vec<OutPoint>,
    /// Amount given to the remote side at open
    pub push_amount: Amount,
    /// Fee rate override for the funding transaction
    pub fee_rate: Option<SatPerKWeight>,
    pub commitment_format: CommitmentFormat,
    /// Private channels are not announced
    pub private: bool,
    /// Public anchor channels this open adds, for the reserve calculation
    pub additional_public_channels: u32,
    /// Coin selection order in wallet mode; the configured default if unset
    pub strategy: Option<SelectionStrategy>,
}

impl Default for FundingRequest {
    fn default() -> Self {
        Self {
            local_amount: Amount::ZERO,
            outpoints: Vec::new(),
            push_amount: Amount::ZERO,
            fee_rate: None,
            commitment_format: CommitmentFormat::default(),
            private: false,
            additional_public_channels: 1,
            strategy: None,
        }
    }
}

impl FundingRequest {
    /// Fund the channel with everything the selected inputs hold
    pub fn fund_max() -> Self {
        Self::default()
    }

    /// Fund the channel with exactly `amount`
    pub fn amount(amount: Amount) -> Self {
        Self { local_amount: amount, ..Self::default() }
    }

    /// Spend exactly these outpoints
    pub fn with_outpoints(mut self, outpoints: Vec<OutPoint>) -> Self {
        self.outpoints = outpoints;
        self
    }

    pub fn with_push(mut self, push: Amount) -> Self {
        self.push_amount = push;
        self
    }

    pub fn with_fee_rate(mut self, rate: SatPerKWeight) -> Self {
        self.fee_rate = Some(rate);
        self
    }

    pub fn with_commitment_format(mut self, format: CommitmentFormat) -> Self {
        self.commitment_format = format;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn with_additional_public_channels(mut self, count: u32) -> Self {
        self.additional_public_channels = count;
        self
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Whether this is a fund-max request
    pub fn is_fund_max(&self) -> bool {
        self.local_amount == Amount::ZERO
    }

    /// Whether the caller named the inputs
    pub fn is_explicit(&self) -> bool {
        !self.outpoints.is_empty()
    }

    fn target(&self) -> SelectionTarget {
        if self.is_fund_max() {
            SelectionTarget::FundMax
        } else {
            SelectionTarget::Amount(self.local_amount)
        }
    }
}

/// A funding transaction ready to be signed and broadcast
///
/// The inputs always sum to exactly `funding_amount + change + fee`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingPlan {
    /// Attempt holding the leases on `inputs`
    pub attempt: AttemptId,
    /// Inputs, in selection order
    pub inputs: Vec<UnspentOutput>,
    /// Value of the 2-of-2 funding output (channel capacity)
    pub funding_amount: Amount,
    pub change: Option<Amount>,
    pub change_class: ScriptClass,
    /// Total fee, including `folded_dust`
    pub fee: Amount,
    /// Leftover too small for a change output, paid as fee
    pub folded_dust: Amount,
    pub weight: Weight,
    pub fee_rate: SatPerKWeight,
    /// Funder's side of the channel: capacity minus push
    pub local_balance: Amount,
    /// Remote side of the channel: the push amount
    pub remote_balance: Amount,
    /// Free wallet funds left after the open, change included
    pub wallet_remainder: Amount,
    pub commitment_format: CommitmentFormat,
    pub private: bool,
    /// Whether the funding amount was reduced to keep the anchor reserve
    pub shrunk_for_reserve: bool,
}

impl FundingPlan {
    /// Sum of the inputs
    pub fn input_total(&self) -> Amount {
        total_amount(&self.inputs)
    }

    /// Change value, zero without a change output
    pub fn change_amount(&self) -> Amount {
        self.change.unwrap_or(Amount::ZERO)
    }

    /// Outpoints spent by the plan
    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.inputs.iter().map(|u| u.outpoint).collect()
    }

    /// `inputs == funding + change + fee`
    pub fn is_balanced(&self) -> bool {
        self.input_total() == self.funding_amount + self.change_amount() + self.fee
    }
}

/// State of a funding attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Collecting,
    Estimating,
    Validating,
    Committed,
    Aborted,
}

impl AttemptState {
    /// Whether the attempt has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Committed | AttemptState::Aborted)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Collecting => write!(f, "collecting"),
            AttemptState::Estimating => write!(f, "estimating"),
            AttemptState::Validating => write!(f, "validating"),
            AttemptState::Committed => write!(f, "committed"),
            AttemptState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Creates funding attempts and hands out attempt ids
pub struct FundingAssembler {
    source: Arc<dyn FundingSource>,
    leases: Arc<dyn LeaseStore>,
    // Replaces the funding source's policy when set
    policy: Option<ChannelPolicy>,
    weights: WeightTable,
    change_class: ScriptClass,
    default_strategy: SelectionStrategy,
    fee_floor: SatPerKWeight,
    next_attempt: AtomicU64,
}

impl FundingAssembler {
    /// Create an assembler with the default weights and wallet settings
    ///
    /// Every attempt reads a fresh channel policy from the funding source.
    pub fn new(source: Arc<dyn FundingSource>, leases: Arc<dyn LeaseStore>) -> Self {
        let mut assembler = Self::from_config(&FundingConfig::default(), source, leases);
        assembler.policy = None;
        assembler
    }

    /// Create an assembler using the channel policy, weight table, change
    /// class, default strategy and fee floor from `config`
    ///
    /// The `[channel]` section of `config` takes precedence over the policy
    /// reported by the funding source.
    pub fn from_config(
        config: &FundingConfig,
        source: Arc<dyn FundingSource>,
        leases: Arc<dyn LeaseStore>,
    ) -> Self {
        Self {
            source,
            leases,
            policy: Some(config.channel.clone()),
            weights: config.weights.clone(),
            change_class: config.wallet.change_output_class,
            default_strategy: config.wallet.strategy,
            fee_floor: config.fees.fee_floor().max(FEERATE_FLOOR),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Lease store shared by all attempts of this assembler
    pub fn leases(&self) -> &Arc<dyn LeaseStore> {
        &self.leases
    }

    /// Release the leases of a committed plan, typically after broadcast
    pub fn release(&self, attempt: AttemptId) -> usize {
        self.leases.release(attempt)
    }

    /// Start a new attempt in the `Collecting` state
    pub fn begin(&self, request: FundingRequest) -> FundingAttempt {
        let id = AttemptId(self.next_attempt.fetch_add(1, Ordering::SeqCst));

        let fee_rate = resolve_fee_rate(request.fee_rate, self.source.current_fee_rate(), self.fee_floor);
        let snapshot = PolicySnapshot {
            policy: self.policy.clone().unwrap_or_else(|| self.source.channel_policy()),
            fee_rate,
            change_class: self.change_class,
            existing_public_channels: self.source.public_anchor_channels(),
            additional_public_channels: request.additional_public_channels,
        };
        let strategy = request.strategy.unwrap_or(self.default_strategy);

        log::debug!(
            "{} started: amount={} push={} explicit_inputs={} format={} fee_rate={}",
            id,
            request.local_amount,
            request.push_amount,
            request.outpoints.len(),
            request.commitment_format,
            fee_rate
        );

        FundingAttempt {
            id,
            request,
            strategy,
            source: Arc::clone(&self.source),
            leases: Arc::clone(&self.leases),
            weights: self.weights.clone(),
            snapshot,
            state: AttemptState::Collecting,
            free: Vec::new(),
            candidates: Vec::new(),
            selection: None,
            plan: None,
            reserve_violation: None,
            failure: None,
        }
    }

    /// Run a request to completion
    ///
    /// # Returns
    /// * The committed plan, whose inputs stay leased under `plan.attempt`
    /// * The error of the failed attempt, with all its leases released.
    ///   Concurrent wallet-mode attempts that pick the same coin fail with
    ///   `AlreadyLeased`; calling again starts a fresh attempt.
    pub fn assemble(&self, request: FundingRequest) -> FundingResult<FundingPlan> {
        self.begin(request).run()
    }
}

/// One in-flight funding attempt
pub struct FundingAttempt {
    id: AttemptId,
    request: FundingRequest,
    strategy: SelectionStrategy,
    source: Arc<dyn FundingSource>,
    leases: Arc<dyn LeaseStore>,
    weights: WeightTable,
    snapshot: PolicySnapshot,
    state: AttemptState,
    // Free wallet outputs seen while collecting
    free: Vec<UnspentOutput>,
    // Outputs the selector may use: the explicit set or the free set
    candidates: Vec<UnspentOutput>,
    selection: Option<SelectionResult>,
    plan: Option<FundingPlan>,
    // Violation that triggered the single reserve shrink
    reserve_violation: Option<FundingError>,
    failure: Option<FundingError>,
}

impl FundingAttempt {
    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Fee rate the attempt prices with, after floor clamping
    pub fn fee_rate(&self) -> SatPerKWeight {
        self.snapshot.fee_rate
    }

    /// The committed plan, once the attempt reached `Committed`
    pub fn plan(&self) -> Option<&FundingPlan> {
        self.plan.as_ref()
    }

    /// Take the committed plan out of the attempt
    pub fn into_plan(mut self) -> Option<FundingPlan> {
        self.plan.take()
    }

    /// Perform a single state transition
    ///
    /// # Returns
    /// * The state after the transition. Terminal states are returned as is.
    /// * On failure the attempt is aborted, its leases released, and the error
    ///   returned (again on every later call)
    pub fn step(&mut self) -> FundingResult<AttemptState> {
        let result = match self.state {
            AttemptState::Collecting => self.collect(),
            AttemptState::Estimating => self.estimate(),
            AttemptState::Validating => self.check(),
            AttemptState::Committed => Ok(AttemptState::Committed),
            AttemptState::Aborted => {
                return Err(self
                    .failure
                    .clone()
                    .unwrap_or(FundingError::Cancelled { attempt: self.id }))
            }
        };

        match result {
            Ok(next) => {
                if next != self.state {
                    log::debug!("{}: {} -> {}", self.id, self.state, next);
                }
                self.state = next;
                Ok(next)
            }
            Err(err) => {
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Drive the attempt until it commits or fails
    pub fn run(mut self) -> FundingResult<FundingPlan> {
        loop {
            if self.step()? == AttemptState::Committed {
                break;
            }
        }
        self.plan
            .take()
            .ok_or(FundingError::Cancelled { attempt: self.id })
    }

    /// Cancel the attempt and release its leases
    ///
    /// Works in any state, including after commit when the caller decides not
    /// to broadcast. Returns how many leases were released.
    pub fn abort(&mut self) -> usize {
        let released = self.leases.release(self.id);
        if self.state != AttemptState::Aborted {
            logging::log_funding(
                LogLevel::Info,
                "attempt_aborted",
                Some(json!({
                    "attempt": self.id.to_string(),
                    "state": self.state.to_string(),
                    "released": released,
                })),
            );
            self.state = AttemptState::Aborted;
            self.failure = Some(FundingError::Cancelled { attempt: self.id });
            self.plan = None;
        }
        released
    }

    fn fail(&mut self, err: FundingError) {
        let released = self.leases.release(self.id);
        logging::log_funding(
            LogLevel::Warn,
            "attempt_failed",
            Some(json!({
                "attempt": self.id.to_string(),
                "state": self.state.to_string(),
                "error": err.kind(),
                "released": released,
            })),
        );
        log::warn!("{} failed: {}", self.id, err);
        self.state = AttemptState::Aborted;
        self.failure = Some(err);
    }

    fn selector(&self) -> CoinSelector<'_> {
        CoinSelector::new(
            &self.weights,
            &self.snapshot.policy,
            self.snapshot.fee_rate,
            self.snapshot.change_class,
        )
    }

    fn collect(&mut self) -> FundingResult<AttemptState> {
        // Second visit in wallet mode: lease what Estimating picked.
        if let Some(selection) = &self.selection {
            self.leases.lease_batch(self.id, &selection.outpoints())?;
            return Ok(AttemptState::Validating);
        }

        self.check_request()?;

        let id = self.id;
        let leases = &self.leases;
        self.free = self
            .source
            .list_unspent()
            .into_iter()
            .filter(|utxo| leases.holder(&utxo.outpoint).map_or(true, |holder| holder == id))
            .collect();

        if !self.request.is_explicit() {
            self.candidates = self.free.clone();
            return Ok(AttemptState::Estimating);
        }

        let mut seen = HashSet::new();
        let wanted: Vec<OutPoint> = self
            .request
            .outpoints
            .iter()
            .filter(|outpoint| seen.insert(**outpoint))
            .copied()
            .collect();

        let mut resolved = Vec::with_capacity(wanted.len());
        for outpoint in &wanted {
            if let Some(holder) = self.leases.holder(outpoint).filter(|holder| *holder != self.id) {
                return Err(FundingError::AlreadyLeased { outpoint: *outpoint, holder });
            }
            match self.free.iter().find(|utxo| utxo.outpoint == *outpoint) {
                Some(utxo) => resolved.push(utxo.clone()),
                None => {
                    log::debug!(
                        "{}: outpoint {} is not a spendable wallet output",
                        self.id,
                        logging::short_outpoint(outpoint)
                    );
                    return Err(FundingError::InsufficientFunds {
                        requested: self.requested_amount(),
                        available: total_amount(&resolved),
                    });
                }
            }
        }

        self.leases.lease_batch(self.id, &wanted)?;
        self.candidates = resolved;
        Ok(AttemptState::Estimating)
    }

    fn estimate(&mut self) -> FundingResult<AttemptState> {
        let selector = self.selector();
        let target = self.request.target();

        let selection = if self.request.is_explicit() {
            selector.select_explicit(self.candidates.clone(), target)?
        } else {
            let strategy = self.strategy.strategy();
            selector.select(&self.candidates, target, strategy.as_ref())?
        };

        logging::log_selection(
            LogLevel::Debug,
            "inputs_priced",
            Some(json!({
                "attempt": self.id.to_string(),
                "inputs": selection.inputs.len(),
                "funding_sat": selection.funding.to_sat(),
                "change_sat": selection.change_amount().to_sat(),
                "fee_sat": selection.fee.to_sat(),
                "weight": selection.weight.to_wu(),
            })),
        );

        self.selection = Some(selection);
        if self.request.is_explicit() {
            Ok(AttemptState::Validating)
        } else {
            Ok(AttemptState::Collecting)
        }
    }

    fn check(&mut self) -> FundingResult<AttemptState> {
        let plan = match self.plan.take() {
            Some(plan) => plan,
            None => match &self.selection {
                Some(selection) => self.build_plan(selection, false),
                None => return Err(FundingError::Cancelled { attempt: self.id }),
            },
        };

        match validation::validate(&plan, &self.snapshot) {
            Ok(()) => {
                logging::log_funding(
                    LogLevel::Info,
                    "plan_committed",
                    Some(json!({
                        "attempt": self.id.to_string(),
                        "funding_sat": plan.funding_amount.to_sat(),
                        "change_sat": plan.change_amount().to_sat(),
                        "fee_sat": plan.fee.to_sat(),
                        "inputs": plan.inputs.len(),
                        "shrunk": plan.shrunk_for_reserve,
                    })),
                );
                self.plan = Some(plan);
                Ok(AttemptState::Committed)
            }
            Err(FundingError::ReserveViolation { shortfall, required })
                if self.reserve_violation.is_none() && self.request.is_fund_max() =>
            {
                let violation = FundingError::ReserveViolation { shortfall, required };
                self.reserve_violation = Some(violation.clone());
                log::info!(
                    "{}: wallet short of reserve {} by {}, moving the reserve into change",
                    self.id,
                    required,
                    shortfall
                );
                let shrunk = self.shrink_for_reserve(&plan, required).ok_or(violation)?;
                self.plan = Some(shrunk);
                Ok(AttemptState::Validating)
            }
            Err(err) if self.reserve_violation.is_some() => {
                log::debug!("{}: shrunk plan rejected: {}", self.id, err);
                Err(self.reserve_violation.clone().unwrap_or(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Move the whole `reserve` from the funding output into change
    ///
    /// The change output, if not already present, costs extra weight; that
    /// fee also comes out of the funding amount. A change smaller than the
    /// dust limit is raised to it.
    fn shrink_for_reserve(&self, plan: &FundingPlan, reserve: Amount) -> Option<FundingPlan> {
        let selector = self.selector();
        let dust_limit = self.snapshot.policy.dust_limit(self.snapshot.change_class);

        let weight = selector.estimate_weight(&plan.inputs, true);
        let fee = self.snapshot.fee_rate.fee_for_weight(weight);
        let change = (plan.change_amount() + reserve).max(dust_limit);
        let funding = plan.input_total().checked_sub(fee + change)?;

        let selection = SelectionResult {
            inputs: plan.inputs.clone(),
            funding,
            change: Some(change),
            fee,
            folded_dust: Amount::ZERO,
            weight,
        };
        Some(self.build_plan(&selection, true))
    }

    fn build_plan(&self, selection: &SelectionResult, shrunk: bool) -> FundingPlan {
        let push = self.request.push_amount;
        FundingPlan {
            attempt: self.id,
            inputs: selection.inputs.clone(),
            funding_amount: selection.funding,
            change: selection.change,
            change_class: self.snapshot.change_class,
            fee: selection.fee,
            folded_dust: selection.folded_dust,
            weight: selection.weight,
            fee_rate: self.snapshot.fee_rate,
            local_balance: selection.funding.checked_sub(push).unwrap_or(Amount::ZERO),
            remote_balance: push,
            wallet_remainder: self.unselected_total(&selection.inputs) + selection.change_amount(),
            commitment_format: self.request.commitment_format,
            private: self.request.private,
            shrunk_for_reserve: shrunk,
        }
    }

    /// Free wallet funds not spent by `inputs`
    fn unselected_total(&self, inputs: &[UnspentOutput]) -> Amount {
        let spent: HashSet<OutPoint> = inputs.iter().map(|u| u.outpoint).collect();
        total_amount(self.free.iter().filter(|utxo| !spent.contains(&utxo.outpoint)))
    }

    fn requested_amount(&self) -> Amount {
        if self.request.is_fund_max() {
            self.snapshot.policy.min_chan_size()
        } else {
            self.request.local_amount
        }
    }

    /// Checks that need nothing but the request and the policy
    fn check_request(&self) -> FundingResult<()> {
        if self.request.is_fund_max() {
            return Ok(());
        }

        let policy = &self.snapshot.policy;
        let amount = self.request.local_amount;

        if amount > policy.max_chan_size() {
            return Err(FundingError::AboveMaxChanSize {
                requested: amount,
                maximum: policy.max_chan_size(),
            });
        }
        if amount < policy.min_chan_size() {
            return Err(FundingError::BelowMinChanSize {
                available: amount,
                minimum: policy.min_chan_size(),
            });
        }
        if self.request.push_amount > amount {
            let commit_fee = policy.commitment_fee(self.request.commitment_format, self.snapshot.fee_rate);
            return Err(FundingError::FunderBalanceTooSmall {
                after_push: signed_difference(amount, self.request.push_amount)
                    - to_signed_amount(commit_fee),
                commit_fee,
                minimum: policy.min_funder_balance(),
            });
        }
        Ok(())
    }
}

impl Drop for FundingAttempt {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            let released = self.leases.release(self.id);
            log::debug!("{} dropped in state {}, released {} leases", self.id, self.state, released);
        }
    }
}
