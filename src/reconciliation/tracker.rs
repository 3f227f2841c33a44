//! Pending unreconciliation tracking

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::traits::LedgerService;
use crate::types::*;

/// Bank movements the user has staged for unreconciliation
///
/// The set is inverted from the checkbox shown to the user: a checked box means
/// "keep reconciled", so unchecking adds the movement here. Nothing reaches the
/// backend until [`UnreconcileTracker::commit`] or [`UnreconcileTracker::undo_single`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreconcileTracker {
    pending: BTreeSet<String>,
}

impl UnreconcileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the checkbox state of a reconciled movement
    pub fn toggle(&mut self, transaction_id: &str, checked: bool) {
        if checked {
            self.pending.remove(transaction_id);
        } else {
            self.pending.insert(transaction_id.to_string());
        }
    }

    /// Drop every staged decision
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, transaction_id: &str) -> bool {
        self.pending.contains(transaction_id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Unreconcile every pending movement, one call at a time
    ///
    /// Successfully processed ids leave the pending set; failed ones stay so the
    /// user can retry. Returns `NothingPending` without calling the backend when
    /// the set is empty.
    #[tracing::instrument(skip_all, fields(pending = self.pending.len()))]
    pub async fn commit<S: LedgerService + ?Sized>(
        &mut self,
        service: &S,
    ) -> ReconcileResult<BatchOutcome> {
        if self.pending.is_empty() {
            info!("No pending unreconciliations");
            return Err(ReconciliationError::NothingPending);
        }

        let mut outcome = BatchOutcome::new();
        let ids: Vec<String> = self.pending.iter().cloned().collect();

        for (position, id) in ids.iter().enumerate() {
            info!(
                batch_id = %outcome.batch_id,
                bank_movement = %id,
                progress = position + 1,
                total = ids.len(),
                "Unreconciling"
            );
            match unreconcile_one(service, id).await {
                Ok(()) => {
                    self.pending.remove(id);
                    outcome.record_success(id.clone());
                }
                Err(message) => {
                    warn!(batch_id = %outcome.batch_id, bank_movement = %id, %message, "Unreconcile failed");
                    outcome.record_failure(id.clone(), message);
                }
            }
        }

        info!(
            batch_id = %outcome.batch_id,
            succeeded = outcome.success_count,
            failed = outcome.failures.len(),
            "Unreconcile batch finished"
        );
        Ok(outcome)
    }

    /// Unreconcile a single movement right away
    ///
    /// The id leaves the pending set whatever the outcome, since its
    /// reconciliation state is no longer known; errors still reach the caller.
    pub async fn undo_single<S: LedgerService + ?Sized>(
        &mut self,
        service: &S,
        transaction_id: &str,
    ) -> ReconcileResult<()> {
        self.pending.remove(transaction_id);

        unreconcile_one(service, transaction_id)
            .await
            .map_err(|message| {
                warn!(bank_movement = transaction_id, %message, "Undo failed");
                ReconciliationError::Backend {
                    id: transaction_id.to_string(),
                    message,
                }
            })
    }
}

async fn unreconcile_one<S: LedgerService + ?Sized>(service: &S, id: &str) -> Result<(), String> {
    match service.unreconcile(id).await {
        Ok(response) if response.success => Ok(()),
        Ok(response) => Err(response.failure_message()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_service::MemoryLedgerService;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn reconciled_movement(id: &str) -> BankMovement {
        let mut movement = BankMovement::new(
            id,
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            BigDecimal::from(30),
            MovementType::Credit,
            "Receipt",
        );
        movement.linked_vouchers = vec![LinkedVoucherRef::new(
            "Payment Entry",
            format!("PE-{id}"),
            BigDecimal::from(30),
        )];
        movement.unallocated_amount = Some(BigDecimal::from(0));
        movement.is_reconciled = true;
        movement
    }

    #[test]
    fn test_toggle_round_trip() {
        let mut tracker = UnreconcileTracker::new();
        tracker.toggle("BT-0", false);
        let before = tracker.clone();

        tracker.toggle("BT-1", false);
        assert!(tracker.is_pending("BT-1"));
        tracker.toggle("BT-1", true);

        assert_eq!(tracker, before);
        assert!(!tracker.is_pending("BT-1"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = UnreconcileTracker::new();
        tracker.toggle("BT-1", false);
        tracker.toggle("BT-2", false);
        assert_eq!(tracker.len(), 2);

        tracker.reset();
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_commit_empty_makes_no_calls() {
        let service = MemoryLedgerService::new();
        let mut tracker = UnreconcileTracker::new();

        let result = tracker.commit(&service).await;

        assert_eq!(result, Err(ReconciliationError::NothingPending));
        assert_eq!(service.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_keeps_failed_ids_pending() {
        let service = MemoryLedgerService::new();
        service.add_bank_movement(reconciled_movement("BT-1"));
        service.add_bank_movement(reconciled_movement("BT-2"));
        service.fail_on("BT-2", "Period is closed");

        let mut tracker = UnreconcileTracker::new();
        tracker.toggle("BT-1", false);
        tracker.toggle("BT-2", false);

        let outcome = tracker.commit(&service).await.unwrap();

        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.succeeded, vec!["BT-1".to_string()]);
        assert_eq!(outcome.failures[0].message, "Period is closed");
        assert_eq!(tracker.pending().collect::<Vec<_>>(), vec!["BT-2"]);
        assert_eq!(service.mutation_count(), 2);
    }

    #[tokio::test]
    async fn test_undo_single_clears_pending_even_on_failure() {
        let service = MemoryLedgerService::new();
        service.add_bank_movement(reconciled_movement("BT-1"));
        service.fail_on("BT-1", "Backend unavailable");

        let mut tracker = UnreconcileTracker::new();
        tracker.toggle("BT-1", false);

        let result = tracker.undo_single(&service, "BT-1").await;

        assert_eq!(
            result,
            Err(ReconciliationError::Backend {
                id: "BT-1".to_string(),
                message: "Backend unavailable".to_string(),
            })
        );
        assert!(!tracker.is_pending("BT-1"));
    }
}
