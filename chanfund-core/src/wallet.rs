//! Wallet-side interface of the funding engine
//!
//! The engine never talks to a wallet backend directly. Everything it needs
//! (the spendable outputs, a fee rate, the channel policy and how many
//! public anchor channels are already open) comes through [`FundingSource`].
//!
//! [`InMemoryWallet`] is a complete in-process implementation used by the
//! tests and by embedders that keep their UTXO set elsewhere and only hand a
//! snapshot to the engine.

use std::sync::RwLock;

use bitcoin::OutPoint;

use crate::config::{ChannelPolicy, FundingConfig};
use crate::fee_estimation::{FeeOracle, StaticFeeOracle};
use crate::types::UnspentOutput;
use crate::weight::SatPerKWeight;

/// Everything a funding attempt reads from the wallet
pub trait FundingSource: Send + Sync {
    /// All spendable outputs, leased or not
    fn list_unspent(&self) -> Vec<UnspentOutput>;

    /// Fee rate to price the funding transaction with when the request does
    /// not override it
    fn current_fee_rate(&self) -> SatPerKWeight;

    /// Policy snapshot for one attempt
    fn channel_policy(&self) -> ChannelPolicy;

    /// Number of public anchor channels already open
    fn public_anchor_channels(&self) -> u32;
}

/// Funding source backed by an in-memory UTXO list
pub struct InMemoryWallet {
    utxos: RwLock<Vec<UnspentOutput>>,
    fee_oracle: Box<dyn FeeOracle>,
    policy: ChannelPolicy,
    public_anchor_channels: u32,
}

impl InMemoryWallet {
    /// Create a wallet holding `utxos` with the default policy and fee rate
    pub fn new(utxos: Vec<UnspentOutput>) -> Self {
        Self {
            utxos: RwLock::new(utxos),
            fee_oracle: Box::new(StaticFeeOracle::default()),
            policy: ChannelPolicy::default(),
            public_anchor_channels: 0,
        }
    }

    /// Create a wallet holding `utxos` with the channel policy and default
    /// fee rate of `config`
    pub fn from_config(utxos: Vec<UnspentOutput>, config: &FundingConfig) -> Self {
        Self::new(utxos)
            .with_policy(config.channel.clone())
            .with_fee_rate(config.fees.default_fee_rate())
    }

    /// Use a fixed fee rate
    pub fn with_fee_rate(self, rate: SatPerKWeight) -> Self {
        self.with_fee_oracle(StaticFeeOracle::new(rate))
    }

    /// Use a custom fee oracle
    pub fn with_fee_oracle(mut self, oracle: impl FeeOracle + 'static) -> Self {
        self.fee_oracle = Box::new(oracle);
        self
    }

    /// Use a custom channel policy
    pub fn with_policy(mut self, policy: ChannelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the number of public anchor channels already open
    pub fn with_public_anchor_channels(mut self, count: u32) -> Self {
        self.public_anchor_channels = count;
        self
    }

    /// Add an output to the wallet
    pub fn add_utxo(&self, utxo: UnspentOutput) {
        if let Ok(mut utxos) = self.utxos.write() {
            utxos.retain(|u| u.outpoint != utxo.outpoint);
            utxos.push(utxo);
        }
    }

    /// Remove an output, for example once the funding transaction spending it
    /// has been broadcast
    pub fn remove_utxo(&self, outpoint: &OutPoint) -> Option<UnspentOutput> {
        let mut utxos = self.utxos.write().ok()?;
        let index = utxos.iter().position(|u| &u.outpoint == outpoint)?;
        Some(utxos.remove(index))
    }
}

impl FundingSource for InMemoryWallet {
    fn list_unspent(&self) -> Vec<UnspentOutput> {
        self.utxos.read().map(|utxos| utxos.clone()).unwrap_or_default()
    }

    fn current_fee_rate(&self) -> SatPerKWeight {
        self.fee_oracle.fee_rate()
    }

    fn channel_policy(&self) -> ChannelPolicy {
        self.policy.clone()
    }

    fn public_anchor_channels(&self) -> u32 {
        self.public_anchor_channels
    }
}
