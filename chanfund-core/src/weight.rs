//! Transaction weight estimation and fee pricing
//!
//! Weight follows BIP141: every non-witness byte counts 4 weight units and
//! every witness byte counts 1. A transaction that carries any witness data
//! additionally pays for the 2 byte marker/flag header.
//!
//! The per-script-class sizes live in a [`WeightTable`] instead of hidden
//! constants so that policies (and tests) can substitute their own values.
//!
//! Example:
//! ```
//! use chanfund_core::types::ScriptClass;
//! use chanfund_core::weight::{SatPerKWeight, WeightTable};
//!
//! let table = WeightTable::default();
//! let weight = table.estimate(
//!     &[ScriptClass::WitnessPubkeyHash],
//!     &[ScriptClass::WitnessScriptHash],
//! );
//! assert_eq!(weight.to_wu(), 487);
//!
//! let fee = SatPerKWeight::from_sat_per_kwu(12_500).fee_for_weight(weight);
//! assert_eq!(fee.to_sat(), 6_087);
//! ```

use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

use crate::types::{ScriptClass, MAX_BITCOIN_SUPPLY};

/// Number of weight units per virtual byte
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Version (4 bytes) plus locktime (4 bytes)
pub const BASE_TX_SIZE: u64 = 8;

/// Segwit marker and flag bytes
pub const WITNESS_HEADER_SIZE: u64 = 2;

/// Transaction weight in weight units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Weight(u64);

impl Weight {
    /// Zero weight
    pub const ZERO: Weight = Weight(0);

    /// Create a weight from raw weight units
    pub const fn from_wu(wu: u64) -> Self {
        Self(wu)
    }

    /// Create weight from non-witness bytes
    pub const fn from_non_witness_bytes(bytes: u64) -> Self {
        Self(bytes * WITNESS_SCALE_FACTOR)
    }

    /// Create weight from witness bytes
    pub const fn from_witness_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Raw weight units
    pub const fn to_wu(&self) -> u64 {
        self.0
    }

    /// Virtual size, rounded up
    pub const fn to_vbytes_ceil(&self) -> u64 {
        (self.0 + WITNESS_SCALE_FACTOR - 1) / WITNESS_SCALE_FACTOR
    }
}

impl Add for Weight {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wu", self.0)
    }
}

/// Fee rate in satoshis per 1000 weight units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SatPerKWeight(u64);

impl SatPerKWeight {
    /// Create a fee rate from sat/kw
    pub const fn from_sat_per_kwu(rate: u64) -> Self {
        Self(rate)
    }

    /// Create a fee rate from sat/vbyte. One vbyte is four weight units, so
    /// 1 sat/vB is 250 sat/kw.
    pub const fn from_sat_per_vbyte(rate: u64) -> Self {
        Self(rate.saturating_mul(1000) / WITNESS_SCALE_FACTOR)
    }

    /// Create a fee rate from sat per 1000 vbytes
    pub const fn from_sat_per_kvbyte(rate: u64) -> Self {
        Self(rate / WITNESS_SCALE_FACTOR)
    }

    /// Raw sat/kw value
    pub const fn to_sat_per_kwu(&self) -> u64 {
        self.0
    }

    /// Fee for a transaction of the given weight: `rate * weight / 1000`,
    /// rounded down.
    ///
    /// # Arguments
    /// * `weight` - Estimated transaction weight
    ///
    /// # Returns
    /// The fee as a bitcoin Amount, never more than the bitcoin supply
    pub fn fee_for_weight(&self, weight: Weight) -> Amount {
        let fee = self.0 as u128 * weight.to_wu() as u128 / 1000;
        Amount::from_sat(fee.min(MAX_BITCOIN_SUPPLY as u128) as u64)
    }
}

impl fmt::Display for SatPerKWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kw", self.0)
    }
}

impl From<bdk::FeeRate> for SatPerKWeight {
    fn from(rate: bdk::FeeRate) -> Self {
        let sat_per_kwu = (rate.as_sat_per_vb() * 1000.0 / WITNESS_SCALE_FACTOR as f32).round();
        Self(if sat_per_kwu.is_finite() && sat_per_kwu > 0.0 { sat_per_kwu as u64 } else { 0 })
    }
}

/// Size table used by the estimator
///
/// Input sizes are split into the non-witness part (outpoint, script length
/// and sequence) and the witness stack. Output sizes are non-witness only:
/// 8 bytes of value, the script length byte and the script itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTable {
    /// Non-witness bytes of a native segwit input: 32 + 4 + 1 + 4
    #[serde(default = "default_input_base_size")]
    pub input_base_size: u64,

    /// Witness bytes spending a P2WPKH output (count, signature, pubkey)
    #[serde(default = "default_p2wpkh_witness_size")]
    pub p2wpkh_witness_size: u64,

    /// Witness bytes spending a 2-of-2 P2WSH multisig output
    #[serde(default = "default_p2wsh_witness_size")]
    pub p2wsh_witness_size: u64,

    /// Witness bytes of a taproot key path spend with the default sighash
    #[serde(default = "default_p2tr_witness_size")]
    pub p2tr_witness_size: u64,

    /// P2WPKH output: 8 + 1 + 22
    #[serde(default = "default_p2wpkh_output_size")]
    pub p2wpkh_output_size: u64,

    /// P2WSH output: 8 + 1 + 34
    #[serde(default = "default_p2wsh_output_size")]
    pub p2wsh_output_size: u64,

    /// P2TR output: 8 + 1 + 34
    #[serde(default = "default_p2tr_output_size")]
    pub p2tr_output_size: u64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            input_base_size: default_input_base_size(),
            p2wpkh_witness_size: default_p2wpkh_witness_size(),
            p2wsh_witness_size: default_p2wsh_witness_size(),
            p2tr_witness_size: default_p2tr_witness_size(),
            p2wpkh_output_size: default_p2wpkh_output_size(),
            p2wsh_output_size: default_p2wsh_output_size(),
            p2tr_output_size: default_p2tr_output_size(),
        }
    }
}

impl WeightTable {
    /// Witness bytes needed to spend an output of the given class
    pub fn input_witness_size(&self, class: ScriptClass) -> u64 {
        match class {
            ScriptClass::WitnessPubkeyHash => self.p2wpkh_witness_size,
            ScriptClass::WitnessScriptHash => self.p2wsh_witness_size,
            ScriptClass::Taproot => self.p2tr_witness_size,
        }
    }

    /// Serialized size of an output of the given class
    pub fn output_size(&self, class: ScriptClass) -> u64 {
        match class {
            ScriptClass::WitnessPubkeyHash => self.p2wpkh_output_size,
            ScriptClass::WitnessScriptHash => self.p2wsh_output_size,
            ScriptClass::Taproot => self.p2tr_output_size,
        }
    }

    /// Weight added by one more output of the given class. Ignores the case
    /// where the extra output grows the output count varint.
    pub fn output_weight(&self, class: ScriptClass) -> Weight {
        Weight::from_non_witness_bytes(self.output_size(class))
    }

    /// Estimate the weight of a transaction spending `inputs` and creating
    /// `outputs`.
    ///
    /// Pure and deterministic; zero inputs are priced like any other shape.
    ///
    /// # Arguments
    /// * `inputs` - Script classes of the outputs being spent
    /// * `outputs` - Script classes of the outputs being created
    ///
    /// # Returns
    /// The estimated transaction weight
    pub fn estimate(&self, inputs: &[ScriptClass], outputs: &[ScriptClass]) -> Weight {
        let inputs_size = inputs.len() as u64 * self.input_base_size;
        let outputs_size: u64 = outputs.iter().map(|class| self.output_size(*class)).sum();

        let stripped_size = BASE_TX_SIZE
            + var_int_size(inputs.len() as u64)
            + inputs_size
            + var_int_size(outputs.len() as u64)
            + outputs_size;

        // Every class we price is a witness spend.
        let witness_size: u64 = inputs.iter().map(|class| self.input_witness_size(*class)).sum();
        let witness = if inputs.is_empty() {
            Weight::ZERO
        } else {
            Weight::from_witness_bytes(WITNESS_HEADER_SIZE + witness_size)
        };

        Weight::from_non_witness_bytes(stripped_size) + witness
    }
}

/// Serialized size of a Bitcoin compact size integer
pub fn var_int_size(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

// Default value functions

fn default_input_base_size() -> u64 {
    32 + 4 + 1 + 4
}

fn default_p2wpkh_witness_size() -> u64 {
    1 + 1 + 73 + 1 + 33
}

fn default_p2wsh_witness_size() -> u64 {
    // count, nil, two signatures with length prefixes, 71 byte witness script
    1 + 1 + 1 + 73 + 1 + 73 + 1 + 71
}

fn default_p2tr_witness_size() -> u64 {
    1 + 1 + 64
}

fn default_p2wpkh_output_size() -> u64 {
    8 + 1 + 22
}

fn default_p2wsh_output_size() -> u64 {
    8 + 1 + 34
}

fn default_p2tr_output_size() -> u64 {
    8 + 1 + 34
}
