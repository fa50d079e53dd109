//! Error types for funding attempts
//!
//! Every failure a funding attempt can produce is a variant of
//! [`FundingError`]. The amounts that explain a failure are kept as structured
//! fields rather than pre-formatted strings so callers can act on (and tests
//! can assert) the exact values, while the `Display` output stays legible for
//! operators reading logs.
//!
//! All variants are terminal for the attempt that produced them. Nothing in
//! the crate downgrades one error into another or swallows it; the only
//! internal retry is the single reserve shrink performed by the assembler.
//!
//! # Usage
//!
//! ```
//! use bitcoin::Amount;
//! use chanfund_core::error::FundingError;
//!
//! let err = FundingError::InsufficientFunds {
//!     requested: Amount::from_sat(210_337),
//!     available: Amount::from_sat(100_000),
//! };
//! assert!(err.is_insufficient_funds_class());
//! ```

use bitcoin::{Amount, OutPoint, SignedAmount};
use thiserror::Error;

use crate::types::AttemptId;

/// The main error type for funding attempts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundingError {
    /// An output would fall below the network dust threshold after fees
    #[error("output amount({amount}) after subtracting fees({fee}) below dust limit({dust_limit})")]
    DustOutput {
        amount: SignedAmount,
        fee: Amount,
        dust_limit: Amount,
    },

    /// The post-fee funding amount cannot meet the minimum channel size
    #[error("available funds({available}) below the minimum amount({minimum})")]
    BelowMinChanSize { available: Amount, minimum: Amount },

    /// The requested channel exceeds the (possibly wumbo gated) maximum
    #[error("funding amount({requested}) above the maximum channel size({maximum})")]
    AboveMaxChanSize { requested: Amount, maximum: Amount },

    /// The candidate coins cannot cover the requested amount plus fees
    #[error(
        "not enough witness outputs to create funding transaction, need {requested} only have {available} available"
    )]
    InsufficientFunds { requested: Amount, available: Amount },

    /// What is left to the funder after the push cannot pay commitment fees
    #[error(
        "funder balance too small ({after_push}) with fee={commit_fee}, minimum={minimum} required"
    )]
    FunderBalanceTooSmall {
        after_push: SignedAmount,
        commit_fee: Amount,
        minimum: Amount,
    },

    /// The wallet would keep less than the anchor reserve after the open
    #[error("reserved wallet balance invalidated: shortfall of {shortfall} against required reserve {required}")]
    ReserveViolation { shortfall: Amount, required: Amount },

    /// A selected output is held by another in-flight attempt
    ///
    /// In wallet mode this means another attempt leased the coin between
    /// listing and leasing. The attempt is not re-run; a new attempt sees
    /// the coin as taken and selects around it.
    #[error("output {outpoint} is already leased by {holder}")]
    AlreadyLeased { outpoint: OutPoint, holder: AttemptId },

    /// The attempt was aborted by its caller before it completed
    #[error("funding {attempt} was cancelled")]
    Cancelled { attempt: AttemptId },
}

impl FundingError {
    /// `InsufficientFunds` and `AlreadyLeased` surface to users as the same
    /// class of failure ("these coins cannot fund the channel") with a
    /// distinguishable cause.
    pub fn is_insufficient_funds_class(&self) -> bool {
        matches!(
            self,
            FundingError::InsufficientFunds { .. } | FundingError::AlreadyLeased { .. }
        )
    }

    /// Short machine-readable name of the variant, used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            FundingError::DustOutput { .. } => "dust_output",
            FundingError::BelowMinChanSize { .. } => "below_min_chan_size",
            FundingError::AboveMaxChanSize { .. } => "above_max_chan_size",
            FundingError::InsufficientFunds { .. } => "insufficient_funds",
            FundingError::FunderBalanceTooSmall { .. } => "funder_balance_too_small",
            FundingError::ReserveViolation { .. } => "reserve_violation",
            FundingError::AlreadyLeased { .. } => "already_leased",
            FundingError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Errors produced by a lease store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    /// The outpoint is currently leased to a different attempt
    #[error("output {outpoint} is already leased by {holder}")]
    AlreadyLeased { outpoint: OutPoint, holder: AttemptId },
}

impl From<LeaseError> for FundingError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::AlreadyLeased { outpoint, holder } => {
                FundingError::AlreadyLeased { outpoint, holder }
            }
        }
    }
}

/// Result type used throughout the crate
pub type FundingResult<T> = Result<T, FundingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Txid;
    use std::str::FromStr;

    #[test]
    fn lease_error_keeps_holder() {
        let outpoint = OutPoint::new(
            Txid::from_str("1111111111111111111111111111111111111111111111111111111111111111").unwrap(),
            3,
        );
        let err: FundingError = LeaseError::AlreadyLeased { outpoint, holder: AttemptId(7) }.into();
        assert_eq!(err, FundingError::AlreadyLeased { outpoint, holder: AttemptId(7) });
        assert!(err.is_insufficient_funds_class());
        assert_eq!(err.kind(), "already_leased");
    }

    #[test]
    fn dust_error_is_not_insufficient_funds() {
        let err = FundingError::DustOutput {
            amount: SignedAmount::from_sat(174),
            fee: Amount::from_sat(1_826),
            dust_limit: Amount::from_sat(330),
        };
        assert!(!err.is_insufficient_funds_class());
        assert!(err.to_string().starts_with("output amount("));
    }
}
