//! UTXO selection strategies
//!
//! A strategy only decides the order in which candidates are tried. Fee
//! pricing, change handling and dust folding are shared by every strategy
//! and live in the selector.

use crate::types::UnspentOutput;

pub mod largest_first;
pub mod oldest_first;

// Re-export implementations
pub use largest_first::LargestFirstStrategy;
pub use oldest_first::OldestFirstStrategy;

/// Trait defining a UTXO selection strategy
///
/// Any struct implementing this trait can be used as a strategy
/// for UTXO selection.
pub trait Strategy: Send + Sync {
    /// Name of this strategy
    fn name(&self) -> &'static str;

    /// Sort `candidates` into the order they should be selected in
    ///
    /// Implementations must be deterministic: ties are broken by outpoint so
    /// that the same wallet state always yields the same selection.
    fn order(&self, candidates: &mut [UnspentOutput]);
}
