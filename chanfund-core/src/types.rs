//! Common data types for the funding engine
//!
//! These types describe the wallet-side inputs of a channel funding attempt:
//! the spendable outputs the wallet reports, the script classes that decide
//! how much weight spending or creating an output costs, and the commitment
//! formats a channel can be opened with.
//!
//! The wallet owns every [`UnspentOutput`]; this crate only reads the amount
//! and script class and asks the lease manager to reserve outpoints. Lease
//! state is therefore not stored on the output itself.

use bitcoin::{Amount, OutPoint, SignedAmount};
use serde::{Deserialize, Serialize};
use std::fmt;

// Constants for Bitcoin-specific values

/// Constant for satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Constant for maximum Bitcoin supply in satoshis
pub const MAX_BITCOIN_SUPPLY: u64 = 21_000_000 * SATS_PER_BTC;

/// Value of a single anchor output on an anchor-format commitment transaction
pub const ANCHOR_OUTPUT_VALUE: Amount = Amount::from_sat(330);

/// Script class of an output, as far as weight and dust accounting care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptClass {
    /// Native SegWit v0 single key (P2WPKH)
    WitnessPubkeyHash,
    /// Native SegWit v0 script hash, used for the 2-of-2 funding output (P2WSH)
    WitnessScriptHash,
    /// SegWit v1 key path spend (P2TR)
    Taproot,
}

impl ScriptClass {
    /// All script classes, in a stable order.
    pub const ALL: [ScriptClass; 3] = [
        ScriptClass::WitnessPubkeyHash,
        ScriptClass::WitnessScriptHash,
        ScriptClass::Taproot,
    ];
}

impl fmt::Display for ScriptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptClass::WitnessPubkeyHash => write!(f, "p2wpkh"),
            ScriptClass::WitnessScriptHash => write!(f, "p2wsh"),
            ScriptClass::Taproot => write!(f, "p2tr"),
        }
    }
}

/// Unspent transaction output reported by the wallet
///
/// # Fields
///
/// * `outpoint` - Reference to the transaction output (txid and vout)
/// * `amount` - Amount of bitcoin in this output
/// * `script_class` - Script class, which decides the input weight when spent
/// * `confirmations` - Number of confirmations (0 for unconfirmed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Reference to the transaction output (txid and vout)
    pub outpoint: OutPoint,

    /// Amount in this output, serialized in satoshis
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,

    /// Script class of the output being spent
    pub script_class: ScriptClass,

    /// Number of confirmations (0 for unconfirmed)
    #[serde(default)]
    pub confirmations: u32,
}

impl UnspentOutput {
    /// Create a new unspent output
    ///
    /// # Arguments
    /// * `outpoint` - The transaction outpoint (txid and vout)
    /// * `amount` - The amount held by the output
    /// * `script_class` - Script class of the output
    ///
    /// # Returns
    /// * A new output with zero confirmations
    pub fn new(outpoint: OutPoint, amount: Amount, script_class: ScriptClass) -> Self {
        Self {
            outpoint,
            amount,
            script_class,
            confirmations: 0,
        }
    }

    /// Set the confirmation count
    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }
}

/// Identifier of a single funding attempt. Leases are held per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Commitment transaction format negotiated for the channel
///
/// The format decides two things this crate cares about: the weight of the
/// commitment transaction (and so the fee the funder must be able to cover)
/// and whether the wallet has to keep an on-chain reserve for fee bumping
/// anchor outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentFormat {
    /// Original commitment format with tweaked remote key
    Legacy,
    /// Commitment with a static remote key
    #[default]
    StaticRemoteKey,
    /// Commitment with two anchor outputs
    Anchors,
    /// Taproot commitment with anchor outputs
    SimpleTaproot,
}

impl CommitmentFormat {
    /// Weight of a commitment transaction without HTLC outputs, in weight units
    pub fn commit_weight(&self) -> u64 {
        match self {
            CommitmentFormat::Legacy | CommitmentFormat::StaticRemoteKey => 724,
            CommitmentFormat::Anchors => 1124,
            CommitmentFormat::SimpleTaproot => 968,
        }
    }

    /// Whether the commitment carries anchor outputs
    pub fn has_anchors(&self) -> bool {
        matches!(self, CommitmentFormat::Anchors | CommitmentFormat::SimpleTaproot)
    }

    /// Anchor channels need wallet funds to bump fees, so opening one requires
    /// the wallet to keep a reserve after the funding transaction.
    pub fn requires_wallet_reserve(&self) -> bool {
        self.has_anchors()
    }
}

impl fmt::Display for CommitmentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitmentFormat::Legacy => write!(f, "legacy"),
            CommitmentFormat::StaticRemoteKey => write!(f, "static_remote_key"),
            CommitmentFormat::Anchors => write!(f, "anchors"),
            CommitmentFormat::SimpleTaproot => write!(f, "simple_taproot"),
        }
    }
}

/// Signed difference `a - b`, used where an amount may legitimately go
/// negative before it is rejected (fees larger than the inputs, pushes larger
/// than the channel).
pub fn signed_difference(a: Amount, b: Amount) -> SignedAmount {
    SignedAmount::from_sat(a.to_sat() as i64 - b.to_sat() as i64)
}

/// Signed view of an amount. Amounts above `i64::MAX` satoshi cannot occur
/// for valid bitcoin values.
pub fn to_signed_amount(amount: Amount) -> SignedAmount {
    SignedAmount::from_sat(amount.to_sat() as i64)
}

/// Sum the amounts of a set of outputs
pub fn total_amount<'a, I>(outputs: I) -> Amount
where
    I: IntoIterator<Item = &'a UnspentOutput>,
{
    outputs.into_iter().map(|u| u.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_formats_require_reserve() {
        assert!(!CommitmentFormat::Legacy.requires_wallet_reserve());
        assert!(!CommitmentFormat::StaticRemoteKey.requires_wallet_reserve());
        assert!(CommitmentFormat::Anchors.requires_wallet_reserve());
        assert!(CommitmentFormat::SimpleTaproot.requires_wallet_reserve());
    }

    #[test]
    fn unspent_output_serializes_amount_in_sats() {
        use std::str::FromStr;

        let outpoint = OutPoint::new(
            bitcoin::Txid::from_str("6666666666666666666666666666666666666666666666666666666666666666")
                .unwrap(),
            1,
        );
        let utxo = UnspentOutput::new(outpoint, Amount::from_sat(50_000), ScriptClass::Taproot)
            .with_confirmations(3);

        let value = serde_json::to_value(&utxo).unwrap();
        assert_eq!(value["amount"], 50_000);
        assert_eq!(value["script_class"], "taproot");

        let parsed: UnspentOutput = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, utxo);
    }

    #[test]
    fn signed_difference_goes_negative() {
        let diff = signed_difference(Amount::from_sat(2_000), Amount::from_sat(2_435));
        assert_eq!(diff, SignedAmount::from_sat(-435));
    }
}
