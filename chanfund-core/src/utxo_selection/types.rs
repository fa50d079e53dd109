//! Core types for coin selection

use bitcoin::{Amount, OutPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::UnspentOutput;
use crate::utxo_selection::strategies::{LargestFirstStrategy, OldestFirstStrategy, Strategy};
use crate::weight::Weight;

/// UTXO selection strategy
///
/// Decides the order in which wallet candidates are considered when the
/// request names no explicit outpoints. The selector takes candidates in that
/// order until the target plus fee is covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Largest outputs first, which keeps the input count (and fee) low
    #[default]
    LargestFirst,

    /// Outputs with the most confirmations first
    OldestFirst,
}

impl SelectionStrategy {
    /// Strategy implementation for this variant
    pub fn strategy(&self) -> Box<dyn Strategy> {
        match self {
            SelectionStrategy::LargestFirst => Box::new(LargestFirstStrategy),
            SelectionStrategy::OldestFirst => Box::new(OldestFirstStrategy),
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.strategy().name())
    }
}

/// What the selected inputs have to pay for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    /// Put everything selected into the channel, less the fee
    FundMax,

    /// Fund the channel with exactly this amount
    Amount(Amount),
}

/// Result of a successful selection
///
/// `inputs` sum to exactly `funding + change + fee`. When a change output
/// would have been dust the leftover is folded into `fee` and reported again
/// in `folded_dust`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Selected inputs, in selection order
    pub inputs: Vec<UnspentOutput>,

    /// Value of the funding output
    pub funding: Amount,

    /// Value of the change output, if one is created
    pub change: Option<Amount>,

    /// Total fee, including any folded dust
    pub fee: Amount,

    /// Part of `fee` that would otherwise have been a dust change output
    pub folded_dust: Amount,

    /// Estimated weight of the funding transaction
    pub weight: Weight,
}

impl SelectionResult {
    /// Sum of the selected inputs
    pub fn input_total(&self) -> Amount {
        crate::types::total_amount(&self.inputs)
    }

    /// Change value, zero when there is no change output
    pub fn change_amount(&self) -> Amount {
        self.change.unwrap_or(Amount::ZERO)
    }

    /// Outpoints of the selected inputs
    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.inputs.iter().map(|u| u.outpoint).collect()
    }
}
