//! OldestFirst UTXO selection strategy

use crate::types::UnspentOutput;
use crate::utxo_selection::strategies::Strategy;

/// Strategy for selecting oldest UTXOs first based on confirmation count
///
/// Outputs with equal confirmations fall back to the larger amount first.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestFirstStrategy;

impl Strategy for OldestFirstStrategy {
    fn name(&self) -> &'static str {
        "OldestFirst"
    }

    fn order(&self, candidates: &mut [UnspentOutput]) {
        candidates.sort_by(|a, b| {
            b.confirmations
                .cmp(&a.confirmations)
                .then_with(|| b.amount.cmp(&a.amount))
                .then_with(|| a.outpoint.cmp(&b.outpoint))
        });
    }
}
