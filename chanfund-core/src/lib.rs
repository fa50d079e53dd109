//! Chanfund Core Library
//!
//! This crate plans the on-chain funding transaction of a payment channel
//! open: which wallet outputs to spend, how much goes into the channel, what
//! comes back as change and what the transaction costs, all checked against
//! channel size, dust, funder balance and wallet reserve policy before the
//! plan is handed out.
//!
//! # Modules
//!
//! - `types`: Core domain types (outputs, script classes, commitment formats)
//! - `error`: Typed failures of a funding attempt
//! - `logging`: Structured logging infrastructure
//! - `config`: Configuration management and channel policy
//! - `weight`: Transaction weight estimation and fee pricing
//! - `fee_estimation`: Fee rate sources and the relay floor
//! - `wallet`: The wallet-facing `FundingSource` interface
//! - `utxo_management`: Leases that keep concurrent attempts off each other's coins
//! - `utxo_selection`: Coin selection strategies and the selector
//! - `validation`: Limits and reserve checks
//! - `funding`: The funding attempt state machine and plan assembler
//!
//! # Concurrency
//!
//! Attempts may run on any number of threads against one lease store. The
//! lease store is the only shared mutable state; everything else an attempt
//! reads is snapshotted when it begins.

/// Core domain types
pub mod types;

/// Error types for funding attempts
pub mod error;

/// Structured logging functionality
pub mod logging;

/// Configuration management
pub mod config;

/// Transaction weight estimation
pub mod weight;

/// Fee rate sources
pub mod fee_estimation;

/// Wallet interface
pub mod wallet;

/// UTXO lease management
pub mod utxo_management;

/// UTXO selection algorithms
pub mod utxo_selection;

/// Limits and reserve validation
pub mod validation;

/// Funding plan assembly
pub mod funding;

pub use config::{ChannelPolicy, FundingConfig};
pub use error::{FundingError, FundingResult, LeaseError};
pub use fee_estimation::{FeeOracle, StaticFeeOracle, FEERATE_FLOOR};
pub use funding::{AttemptState, FundingAssembler, FundingAttempt, FundingPlan, FundingRequest};
pub use types::{AttemptId, CommitmentFormat, ScriptClass, UnspentOutput};
pub use utxo_management::{LeaseStore, UtxoLeaseManager};
pub use utxo_selection::{CoinSelector, SelectionStrategy};
pub use wallet::{FundingSource, InMemoryWallet};
pub use weight::{SatPerKWeight, Weight, WeightTable};

// Re-export the bitcoin types that appear in the public API
pub use bitcoin::{Amount, OutPoint, SignedAmount, Txid};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
///
/// Sets up logging with the default configuration. Safe to call any number
/// of times; embedders that install their own `log` backend can skip it.
///
/// # Returns
/// * Result with () on success, or an error message string
pub fn init() -> Result<(), String> {
    logging::init(&logging::LogConfig::default())
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}
