//! Configuration management for the funding engine.
//!
//! Settings are stored in TOML. Every section and field has a serde default,
//! so an empty file (or a missing section) yields the standard policy:
//!
//! ```toml
//! [channel]
//! min_chan_size_sat = 20000
//! wumbo_channels = false
//!
//! [wallet]
//! change_output_class = "taproot"
//! ```
//!
//! The [`ChannelPolicy`] section is also what a [`crate::wallet::FundingSource`]
//! hands to the assembler as the per-attempt policy snapshot.

use anyhow::{anyhow, Result};
use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::logging::LogConfig;
use crate::types::{CommitmentFormat, ScriptClass, ANCHOR_OUTPUT_VALUE, MAX_BITCOIN_SUPPLY};
use crate::utxo_selection::types::SelectionStrategy;
use crate::weight::{SatPerKWeight, Weight, WeightTable};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FundingConfig {
    #[serde(default)]
    pub channel: ChannelPolicy,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub weights: WeightTable,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Channel size, dust, funder balance and reserve policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPolicy {
    /// Smallest channel the node will open
    #[serde(default = "default_min_chan_size")]
    pub min_chan_size_sat: u64,

    /// Largest channel without the wumbo feature (2^24 - 1)
    #[serde(default = "default_max_funding_amount")]
    pub max_funding_amount_sat: u64,

    /// Largest channel when wumbo channels are allowed
    #[serde(default = "default_max_funding_amount_wumbo")]
    pub max_funding_amount_wumbo_sat: u64,

    /// Whether large ("wumbo") channels are permitted
    #[serde(default)]
    pub wumbo_channels: bool,

    /// Wallet reserve required per public anchor channel
    #[serde(default = "default_reserve_per_channel")]
    pub reserve_per_channel_sat: u64,

    /// Upper bound on the wallet reserve regardless of channel count
    #[serde(default = "default_max_reserve")]
    pub max_reserve_sat: u64,

    /// Smallest balance the funder may keep after push and commitment fee
    #[serde(default = "default_min_funder_balance")]
    pub min_funder_balance_sat: u64,

    /// Commitment fee rate cap for anchor formats, in sat/kw
    #[serde(default = "default_max_anchor_commit_fee_rate")]
    pub max_anchor_commit_fee_rate: u64,

    /// Serialized as the `[channel.dust_limits]` table, so it stays last
    #[serde(default)]
    pub dust_limits: DustLimits,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            min_chan_size_sat: default_min_chan_size(),
            max_funding_amount_sat: default_max_funding_amount(),
            max_funding_amount_wumbo_sat: default_max_funding_amount_wumbo(),
            wumbo_channels: false,
            reserve_per_channel_sat: default_reserve_per_channel(),
            max_reserve_sat: default_max_reserve(),
            min_funder_balance_sat: default_min_funder_balance(),
            max_anchor_commit_fee_rate: default_max_anchor_commit_fee_rate(),
            dust_limits: DustLimits::default(),
        }
    }
}

impl ChannelPolicy {
    /// Minimum channel size
    pub fn min_chan_size(&self) -> Amount {
        Amount::from_sat(self.min_chan_size_sat)
    }

    /// Maximum channel size, two-tier depending on the wumbo setting
    pub fn max_chan_size(&self) -> Amount {
        if self.wumbo_channels {
            Amount::from_sat(self.max_funding_amount_wumbo_sat)
        } else {
            Amount::from_sat(self.max_funding_amount_sat)
        }
    }

    /// Dust threshold for an output of the given class
    pub fn dust_limit(&self, class: ScriptClass) -> Amount {
        Amount::from_sat(self.dust_limits.for_class(class))
    }

    /// Smallest balance the funder must keep to pay future commitment fees
    pub fn min_funder_balance(&self) -> Amount {
        Amount::from_sat(self.min_funder_balance_sat)
    }

    /// Wallet reserve required while `channels` public anchor channels are open
    ///
    /// # Arguments
    /// * `channels` - Existing plus newly opened public anchor channels
    ///
    /// # Returns
    /// `min(channels * reserve_per_channel, max_reserve)`
    pub fn required_reserve(&self, channels: u32) -> Amount {
        let reserve = (channels as u64).saturating_mul(self.reserve_per_channel_sat);
        Amount::from_sat(reserve.min(self.max_reserve_sat))
    }

    /// Fee the funder pays for the initial commitment transaction
    ///
    /// Anchor formats cap the commitment fee rate and additionally pay for
    /// the two anchor outputs.
    pub fn commitment_fee(&self, format: CommitmentFormat, fee_rate: SatPerKWeight) -> Amount {
        let rate = if format.has_anchors() {
            fee_rate.min(SatPerKWeight::from_sat_per_kwu(self.max_anchor_commit_fee_rate))
        } else {
            fee_rate
        };
        let fee = rate.fee_for_weight(Weight::from_wu(format.commit_weight()));
        if format.has_anchors() {
            fee + ANCHOR_OUTPUT_VALUE + ANCHOR_OUTPUT_VALUE
        } else {
            fee
        }
    }
}

/// Dust thresholds by output script class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustLimits {
    #[serde(default = "default_p2wpkh_dust")]
    pub p2wpkh_sat: u64,

    #[serde(default = "default_p2wsh_dust")]
    pub p2wsh_sat: u64,

    #[serde(default = "default_p2tr_dust")]
    pub p2tr_sat: u64,
}

impl Default for DustLimits {
    fn default() -> Self {
        Self {
            p2wpkh_sat: default_p2wpkh_dust(),
            p2wsh_sat: default_p2wsh_dust(),
            p2tr_sat: default_p2tr_dust(),
        }
    }
}

impl DustLimits {
    pub fn for_class(&self, class: ScriptClass) -> u64 {
        match class {
            ScriptClass::WitnessPubkeyHash => self.p2wpkh_sat,
            ScriptClass::WitnessScriptHash => self.p2wsh_sat,
            ScriptClass::Taproot => self.p2tr_sat,
        }
    }
}

/// Fee rate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fee rate of a wallet built with `InMemoryWallet::from_config`
    #[serde(default = "default_fee_rate")]
    pub default_fee_rate_sat_per_kw: u64,

    /// Relay floor; lower rates are raised to this value
    #[serde(default = "default_fee_floor")]
    pub fee_floor_sat_per_kw: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_fee_rate_sat_per_kw: default_fee_rate(),
            fee_floor_sat_per_kw: default_fee_floor(),
        }
    }
}

impl FeeConfig {
    pub fn default_fee_rate(&self) -> SatPerKWeight {
        SatPerKWeight::from_sat_per_kwu(self.default_fee_rate_sat_per_kw)
    }

    pub fn fee_floor(&self) -> SatPerKWeight {
        SatPerKWeight::from_sat_per_kwu(self.fee_floor_sat_per_kw)
    }
}

/// Wallet-facing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Script class of change outputs created by the wallet
    #[serde(default = "default_change_output_class")]
    pub change_output_class: ScriptClass,

    /// Coin selection strategy used when the request names no outpoints
    #[serde(default)]
    pub strategy: SelectionStrategy,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            change_output_class: default_change_output_class(),
            strategy: SelectionStrategy::default(),
        }
    }
}

impl FundingConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: FundingConfig =
            toml::from_str(&content).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| anyhow!("Failed to write config file: {}", e))?;
        log::debug!("Funding config saved to {}", path.display());

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let channel = &self.channel;

        if channel.min_chan_size_sat == 0 {
            return Err(anyhow!("Invalid minimum channel size: must be greater than 0"));
        }

        if channel.min_chan_size_sat > channel.max_funding_amount_sat {
            anyhow::bail!(
                "Minimum channel size {} exceeds maximum funding amount {}",
                channel.min_chan_size_sat,
                channel.max_funding_amount_sat
            );
        }

        if channel.max_funding_amount_wumbo_sat < channel.max_funding_amount_sat {
            anyhow::bail!("Wumbo maximum must not be below the standard maximum");
        }

        if channel.max_funding_amount_wumbo_sat > MAX_BITCOIN_SUPPLY {
            anyhow::bail!("Wumbo maximum exceeds the bitcoin supply");
        }

        for class in ScriptClass::ALL {
            if channel.dust_limits.for_class(class) == 0 {
                anyhow::bail!("Dust limit for {} must be greater than 0", class);
            }
        }

        if channel.max_reserve_sat < channel.reserve_per_channel_sat {
            anyhow::bail!("Maximum reserve must cover at least one channel");
        }

        if self.fees.fee_floor_sat_per_kw == 0 {
            return Err(anyhow!("Invalid fee floor: must be greater than 0"));
        }

        if self.weights.input_base_size == 0 {
            return Err(anyhow!("Invalid weight table: input size must be greater than 0"));
        }

        Ok(())
    }
}

/// Ensure a configuration file exists at the specified path
/// If it doesn't exist, create it with default values
pub fn ensure_config_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        let default_config = FundingConfig::default();
        let content = toml::to_string_pretty(&default_config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;
            }
        }

        fs::write(path, content)
            .map_err(|e| anyhow!("Failed to write default config file: {}", e))?;
    }

    Ok(())
}

// Default value functions

fn default_min_chan_size() -> u64 {
    20_000
}

fn default_max_funding_amount() -> u64 {
    (1 << 24) - 1
}

fn default_max_funding_amount_wumbo() -> u64 {
    1_000_000_000
}

fn default_reserve_per_channel() -> u64 {
    10_000
}

fn default_max_reserve() -> u64 {
    100_000
}

fn default_min_funder_balance() -> u64 {
    // Twice the default channel dust limit
    2 * 354
}

fn default_max_anchor_commit_fee_rate() -> u64 {
    // 10 sat/vB
    2_500
}

fn default_p2wpkh_dust() -> u64 {
    294
}

fn default_p2wsh_dust() -> u64 {
    330
}

fn default_p2tr_dust() -> u64 {
    330
}

fn default_fee_rate() -> u64 {
    12_500
}

fn default_fee_floor() -> u64 {
    253
}

fn default_change_output_class() -> ScriptClass {
    ScriptClass::Taproot
}
