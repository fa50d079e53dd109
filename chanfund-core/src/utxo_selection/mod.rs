//! UTXO selection module
//!
//! Picks the wallet outputs that fund a channel and prices the resulting
//! transaction.
//!
//! # Module Structure
//!
//! - `types.rs` - Selection targets, results and the strategy enum
//! - `selector.rs` - The [`CoinSelector`], which prices shapes, creates or
//!   folds change and caps fund-max requests at the maximum channel size
//! - `strategies/` - Candidate orderings
//!   - `largest_first.rs` - Largest outputs first (the default)
//!   - `oldest_first.rs` - Most confirmed outputs first
//!
//! Strategies never decide how much to take; they only order candidates. The
//! selector then takes candidates in that order until the target plus fee is
//! covered, so every strategy shares one set of fee and dust rules.
//!
//! # Usage
//!
//! ```
//! use bitcoin::{Amount, OutPoint, Txid};
//! use chanfund_core::config::ChannelPolicy;
//! use chanfund_core::types::{ScriptClass, UnspentOutput};
//! use chanfund_core::utxo_selection::{CoinSelector, SelectionStrategy, SelectionTarget};
//! use chanfund_core::weight::{SatPerKWeight, WeightTable};
//! use std::str::FromStr;
//!
//! let txid = Txid::from_str(
//!     "0000000000000000000000000000000000000000000000000000000000000001",
//! ).unwrap();
//! let utxos = vec![
//!     UnspentOutput::new(OutPoint::new(txid, 0), Amount::from_sat(200_000), ScriptClass::WitnessPubkeyHash),
//!     UnspentOutput::new(OutPoint::new(txid, 1), Amount::from_sat(100_000), ScriptClass::WitnessPubkeyHash),
//! ];
//!
//! let weights = WeightTable::default();
//! let selector = CoinSelector::new(
//!     &weights,
//!     &ChannelPolicy::default(),
//!     SatPerKWeight::from_sat_per_kwu(12_500),
//!     ScriptClass::Taproot,
//! );
//! let strategy = SelectionStrategy::LargestFirst.strategy();
//! let result = selector
//!     .select(&utxos, SelectionTarget::Amount(Amount::from_sat(250_000)), strategy.as_ref())
//!     .unwrap();
//!
//! assert_eq!(result.inputs.len(), 2);
//! assert_eq!(result.change, Some(Amount::from_sat(38_350)));
//! ```

pub mod selector;
pub mod strategies;
pub mod types;

pub use selector::{CoinSelector, FUNDING_OUTPUT_CLASS};
pub use strategies::{LargestFirstStrategy, OldestFirstStrategy, Strategy};
pub use types::{SelectionResult, SelectionStrategy, SelectionTarget};
