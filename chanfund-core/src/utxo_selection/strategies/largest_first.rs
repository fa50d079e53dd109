//! LargestFirst UTXO selection strategy

use crate::types::UnspentOutput;
use crate::utxo_selection::strategies::Strategy;

/// Strategy selecting the largest outputs first
///
/// Fewer inputs means a lighter transaction, so this is the cheapest order
/// for a given target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirstStrategy;

impl Strategy for LargestFirstStrategy {
    fn name(&self) -> &'static str {
        "LargestFirst"
    }

    fn order(&self, candidates: &mut [UnspentOutput]) {
        candidates.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.outpoint.cmp(&b.outpoint)));
    }
}
