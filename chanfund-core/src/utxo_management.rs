//! UTXO lease management
//!
//! Concurrent funding attempts must never pick the same coin. Before an
//! attempt commits to a set of inputs it leases them here; the lease is held
//! under the attempt's [`AttemptId`] until the attempt aborts or the caller
//! releases it after broadcasting the funding transaction.
//!
//! Leasing a batch is all-or-nothing: either every outpoint in the batch is
//! leased to the attempt, or none is and the first conflicting holder is
//! reported.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use bitcoin::OutPoint;
use serde_json::json;

use crate::error::LeaseError;
use crate::logging::{self, short_outpoint, LogLevel};
use crate::types::AttemptId;

/// Storage for outpoint leases
pub trait LeaseStore: Send + Sync {
    /// Lease every outpoint in `outpoints` to `attempt`, or none of them
    ///
    /// Outpoints already held by the same attempt are accepted unchanged.
    fn lease_batch(&self, attempt: AttemptId, outpoints: &[OutPoint]) -> Result<(), LeaseError>;

    /// Release every lease held by `attempt`, returning how many were dropped
    fn release(&self, attempt: AttemptId) -> usize;

    /// Whether no attempt holds `outpoint`
    fn is_free(&self, outpoint: &OutPoint) -> bool {
        self.holder(outpoint).is_none()
    }

    /// Attempt currently holding `outpoint`
    fn holder(&self, outpoint: &OutPoint) -> Option<AttemptId>;

    /// Outpoints held by `attempt`
    fn leased_by(&self, attempt: AttemptId) -> Vec<OutPoint>;
}

/// Process-local lease store guarded by a single mutex
#[derive(Debug, Default)]
pub struct UtxoLeaseManager {
    leases: Mutex<HashMap<OutPoint, AttemptId>>,
}

impl UtxoLeaseManager {
    /// Creates a lease manager with no leases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outpoints currently leased
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<OutPoint, AttemptId>> {
        self.leases.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LeaseStore for UtxoLeaseManager {
    fn lease_batch(&self, attempt: AttemptId, outpoints: &[OutPoint]) -> Result<(), LeaseError> {
        let mut leases = self.lock();

        if let Some((outpoint, holder)) = outpoints.iter().find_map(|outpoint| {
            leases
                .get(outpoint)
                .filter(|holder| **holder != attempt)
                .map(|holder| (*outpoint, *holder))
        }) {
            logging::log_lease(
                LogLevel::Debug,
                "lease_conflict",
                Some(json!({
                    "attempt": attempt.to_string(),
                    "outpoint": short_outpoint(&outpoint),
                    "holder": holder.to_string(),
                })),
            );
            return Err(LeaseError::AlreadyLeased { outpoint, holder });
        }

        for outpoint in outpoints {
            leases.insert(*outpoint, attempt);
        }

        logging::log_lease(
            LogLevel::Debug,
            "leased",
            Some(json!({ "attempt": attempt.to_string(), "count": outpoints.len() })),
        );
        Ok(())
    }

    fn release(&self, attempt: AttemptId) -> usize {
        let mut leases = self.lock();
        let before = leases.len();
        leases.retain(|_, holder| *holder != attempt);
        let released = before - leases.len();

        if released > 0 {
            logging::log_lease(
                LogLevel::Debug,
                "released",
                Some(json!({ "attempt": attempt.to_string(), "count": released })),
            );
        }
        released
    }

    fn holder(&self, outpoint: &OutPoint) -> Option<AttemptId> {
        self.lock().get(outpoint).copied()
    }

    fn leased_by(&self, attempt: AttemptId) -> Vec<OutPoint> {
        self.lock()
            .iter()
            .filter(|(_, holder)| **holder == attempt)
            .map(|(outpoint, _)| *outpoint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Txid;
    use std::str::FromStr;

    fn outpoint(vout: u32) -> OutPoint {
        OutPoint::new(
            Txid::from_str("1111111111111111111111111111111111111111111111111111111111111111").unwrap(),
            vout,
        )
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let manager = UtxoLeaseManager::new();
        manager.lease_batch(AttemptId(1), &[outpoint(0)]).unwrap();

        let err = manager
            .lease_batch(AttemptId(2), &[outpoint(1), outpoint(0)])
            .unwrap_err();
        assert_eq!(err, LeaseError::AlreadyLeased { outpoint: outpoint(0), holder: AttemptId(1) });
        assert!(manager.is_free(&outpoint(1)));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let manager = UtxoLeaseManager::new();
        manager.lease_batch(AttemptId(1), &[outpoint(0), outpoint(1)]).unwrap();
        assert_eq!(manager.release(AttemptId(1)), 2);
        assert_eq!(manager.release(AttemptId(1)), 0);
        assert_eq!(manager.release(AttemptId(9)), 0);
        assert!(manager.is_empty());
    }

    #[test]
    fn same_attempt_may_lease_again() {
        let manager = UtxoLeaseManager::new();
        manager.lease_batch(AttemptId(4), &[outpoint(0)]).unwrap();
        manager.lease_batch(AttemptId(4), &[outpoint(0), outpoint(2)]).unwrap();
        assert_eq!(manager.holder(&outpoint(2)), Some(AttemptId(4)));
        assert_eq!(manager.leased_by(AttemptId(4)).len(), 2);
    }

    #[test]
    fn release_only_touches_own_leases() {
        let manager = UtxoLeaseManager::new();
        manager.lease_batch(AttemptId(1), &[outpoint(0)]).unwrap();
        manager.lease_batch(AttemptId(2), &[outpoint(1)]).unwrap();
        assert_eq!(manager.release(AttemptId(1)), 1);
        assert_eq!(manager.holder(&outpoint(1)), Some(AttemptId(2)));
    }
}
