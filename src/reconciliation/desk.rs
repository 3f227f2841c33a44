//! Reconciliation desk that coordinates selections, batches and refreshes

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::reconciliation::groups::build_reconciled_groups;
use crate::reconciliation::identifiers::{
    build_reconciled_identifiers, filter_vouchers, index_vouchers, VoucherTab,
};
use crate::reconciliation::resolver::{
    resolve_reconciliation, submit_requests, Cardinality, Selection,
};
use crate::reconciliation::tracker::UnreconcileTracker;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_identifier;

/// Lists fetched together in one refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub bank_movements: Vec<BankMovement>,
    pub vouchers: Vec<LedgerVoucher>,
    /// Backend-computed reconciled identifiers over the unfiltered date range
    pub reconciled_ledger_identifiers: Vec<String>,
    pub bank_has_more: bool,
    pub vouchers_have_more: bool,
}

/// Outcome of a successful manual reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileSummary {
    pub success_count: usize,
    pub cardinality: Cardinality,
    pub dropped_vouchers: Vec<String>,
}

/// Reconciliation workspace for one treasury account
///
/// Owns the service handle, the latest snapshot of both lists, the user's
/// selection and the pending unreconcile set. Derived views are recomputed
/// from the snapshot on every call.
pub struct ReconciliationDesk<S: LedgerService> {
    service: S,
    account_id: String,
    config: ReconcilerConfig,
    query: MovementQuery,
    snapshot: Snapshot,
    selection: Selection,
    tracker: UnreconcileTracker,
}

impl<S: LedgerService> ReconciliationDesk<S> {
    /// Create a desk for an account; call [`Self::refresh`] to load data
    pub fn new(service: S, account_id: impl Into<String>, config: ReconcilerConfig) -> Self {
        Self {
            service,
            account_id: account_id.into(),
            config,
            query: MovementQuery::new(),
            snapshot: Snapshot::default(),
            selection: Selection::new(),
            tracker: UnreconcileTracker::new(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn query(&self) -> &MovementQuery {
        &self.query
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn tracker(&self) -> &UnreconcileTracker {
        &self.tracker
    }

    // Scope changes. Pending undo decisions belong to the visible view and are dropped.

    /// Switch to another account; the snapshot is emptied until the next refresh
    pub fn set_account(&mut self, account_id: impl Into<String>) {
        self.account_id = account_id.into();
        self.query = MovementQuery::new();
        self.snapshot = Snapshot::default();
        self.selection.clear();
        self.tracker.reset();
    }

    pub fn set_date_range(&mut self, from_date: Option<NaiveDate>, to_date: Option<NaiveDate>) {
        self.query = self.query.clone().with_date_range(from_date, to_date).with_page(1);
        self.selection.clear();
        self.tracker.reset();
    }

    pub fn set_page(&mut self, page: u32) {
        self.query = self.query.clone().with_page(page);
        self.tracker.reset();
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.query = self.query.clone().with_search(search).with_page(1);
    }

    // Selection

    pub fn select_bank(&mut self, id: impl Into<String>, selected: bool) {
        self.selection.toggle_bank(id, selected);
        self.tracker.reset();
    }

    /// Select a voucher by its `type:name` identifier
    pub fn select_voucher(&mut self, identifier: impl Into<String>, selected: bool) {
        self.selection.toggle_voucher(identifier, selected);
        self.tracker.reset();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.tracker.reset();
    }

    /// Record the "keep reconciled" checkbox of a reconciled movement
    pub fn toggle_pending(&mut self, transaction_id: &str, checked: bool) {
        self.tracker.toggle(transaction_id, checked);
    }

    // Backend operations

    /// Fetch both lists together and replace the snapshot
    #[tracing::instrument(skip(self), fields(account = %self.account_id, page = self.query.page))]
    pub async fn refresh(&mut self) -> ReconcileResult<()> {
        let (bank_page, voucher_page) = futures::try_join!(
            self.service.fetch_bank_movements(&self.account_id, &self.query),
            self.service.fetch_accounting_movements(&self.account_id, &self.query)
        )?;

        // Kept verbatim; malformed entries only match nothing in the voucher table
        let reconciled_ledger_identifiers =
            bank_page.reconciled_ledger_identifiers.unwrap_or_default();
        for identifier in &reconciled_ledger_identifiers {
            if let Err(e) = validate_identifier(identifier) {
                warn!(error = %e, %identifier, "Backend returned a malformed reconciled identifier");
            }
        }

        self.snapshot = Snapshot {
            bank_movements: bank_page.movements,
            vouchers: voucher_page.movements,
            reconciled_ledger_identifiers,
            bank_has_more: bank_page.pagination.has_more,
            vouchers_have_more: voucher_page.pagination.has_more,
        };

        debug!(
            bank_movements = self.snapshot.bank_movements.len(),
            vouchers = self.snapshot.vouchers.len(),
            "Snapshot refreshed"
        );
        Ok(())
    }

    async fn refresh_after_batch(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Refresh after batch failed");
        }
    }

    /// Reconcile the current selection
    ///
    /// Validation failures return before any backend call. Otherwise every
    /// planned call is issued in order, both lists are refetched, and the
    /// selection is cleared if at least one call succeeded.
    pub async fn reconcile_selected(
        &mut self,
        date_mismatch_acknowledged: bool,
    ) -> ReconcileResult<ReconcileSummary> {
        let plan = resolve_reconciliation(
            &self.selection.bank_ids,
            &self.selection.voucher_ids,
            &self.snapshot.bank_movements,
            &self.snapshot.vouchers,
            date_mismatch_acknowledged,
            &self.config,
        )?;

        info!(
            account = %self.account_id,
            cardinality = ?plan.cardinality,
            calls = plan.requests.len(),
            bank_total = %plan.bank_total,
            "Submitting reconciliation"
        );
        let outcome = submit_requests(&self.service, &plan.requests).await;

        if outcome.success_count > 0 {
            self.clear_selection();
        }
        self.refresh_after_batch().await;

        let success_count = outcome.into_result()?;
        Ok(ReconcileSummary {
            success_count,
            cardinality: plan.cardinality,
            dropped_vouchers: plan.dropped_vouchers,
        })
    }

    /// Unreconcile every pending movement
    ///
    /// Returns the number undone, `NothingPending` when there was nothing to do,
    /// or `PartialFailure` when some calls failed; failed ids stay pending.
    pub async fn commit_pending(&mut self) -> ReconcileResult<usize> {
        let outcome = self.tracker.commit(&self.service).await?;
        self.refresh_after_batch().await;
        outcome.into_result()
    }

    /// Unreconcile one movement immediately
    pub async fn undo_single(&mut self, transaction_id: &str) -> ReconcileResult<()> {
        let result = self.tracker.undo_single(&self.service, transaction_id).await;
        self.refresh_after_batch().await;
        result
    }

    // Derived views

    /// Identifiers of reconciled vouchers for the ledger-voucher table
    pub fn reconciled_identifiers(&self) -> HashSet<String> {
        build_reconciled_identifiers(
            &self.snapshot.bank_movements,
            Some(self.snapshot.reconciled_ledger_identifiers.as_slice()),
        )
    }

    /// Grouped reconciled view of the loaded bank movements
    pub fn reconciled_groups(&self) -> Vec<ReconciliationGroup> {
        let vouchers = index_vouchers(&self.snapshot.vouchers);
        build_reconciled_groups(&self.snapshot.bank_movements, &vouchers)
    }

    /// Loaded vouchers visible under a tab
    pub fn vouchers_for_tab(&self, tab: VoucherTab) -> Vec<&LedgerVoucher> {
        filter_vouchers(&self.snapshot.vouchers, &self.reconciled_identifiers(), tab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_service::MemoryLedgerService;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;

    /// Serves one fixed bank page and no vouchers
    struct FixedPageService {
        bank_page: BankMovementPage,
    }

    #[async_trait]
    impl LedgerService for FixedPageService {
        async fn reconcile(
            &self,
            _bank_movement_id: &str,
            _vouchers: &[VoucherAllocation],
        ) -> ServiceResult<ServiceResponse> {
            Ok(ServiceResponse::ok())
        }

        async fn unreconcile(&self, _bank_movement_id: &str) -> ServiceResult<ServiceResponse> {
            Ok(ServiceResponse::ok())
        }

        async fn fetch_bank_movements(
            &self,
            _account_id: &str,
            _query: &MovementQuery,
        ) -> ServiceResult<BankMovementPage> {
            Ok(self.bank_page.clone())
        }

        async fn fetch_accounting_movements(
            &self,
            _account_id: &str,
            _query: &MovementQuery,
        ) -> ServiceResult<AccountingMovementPage> {
            Ok(AccountingMovementPage {
                movements: Vec::new(),
                pagination: Pagination::default(),
            })
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn seeded() -> MemoryLedgerService {
        let service = MemoryLedgerService::new();
        service.add_bank_movement(BankMovement::new(
            "BT-1",
            date(3),
            BigDecimal::from(120),
            MovementType::Credit,
            "Invoice 17",
        ));
        service.add_voucher(LedgerVoucher::new(
            "Payment Entry",
            "PE-1",
            date(3),
            BigDecimal::from(120),
            BigDecimal::from(0),
        ));
        service
    }

    #[tokio::test]
    async fn test_reconcile_selected_refreshes_and_clears() {
        let service = seeded();
        let mut desk = ReconciliationDesk::new(service.clone(), "ACC-1", ReconcilerConfig::default());
        desk.refresh().await.unwrap();

        desk.select_bank("BT-1", true);
        desk.select_voucher("Payment Entry:PE-1", true);
        let summary = desk.reconcile_selected(false).await.unwrap();

        assert_eq!(summary.success_count, 1);
        assert!(desk.selection().is_empty());
        assert!(desk.reconciled_identifiers().contains("Payment Entry:PE-1"));
        assert_eq!(desk.reconciled_groups().len(), 1);
        assert!(desk.vouchers_for_tab(VoucherTab::Unreconciled).is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_calls() {
        let service = seeded();
        let mut desk = ReconciliationDesk::new(service.clone(), "ACC-1", ReconcilerConfig::default());
        desk.refresh().await.unwrap();

        desk.select_bank("BT-1", true);
        let result = desk.reconcile_selected(false).await;

        assert_eq!(result, Err(ReconciliationError::EmptyVoucherSelection));
        assert_eq!(service.mutation_count(), 0);
        assert!(!desk.selection().is_empty());
    }

    #[tokio::test]
    async fn test_backend_identifiers_are_kept_verbatim() {
        let mut movement = BankMovement::new(
            "BT-1",
            date(3),
            BigDecimal::from(40),
            MovementType::Credit,
            "Invoice 18",
        );
        movement.linked_vouchers = vec![LinkedVoucherRef::new(
            "Payment Entry",
            "PE-7",
            BigDecimal::from(40),
        )];
        let service = FixedPageService {
            bank_page: BankMovementPage {
                movements: vec![movement],
                reconciled_ledger_identifiers: Some(vec!["PE-9".to_string()]),
                pagination: Pagination::default(),
            },
        };
        let mut desk = ReconciliationDesk::new(service, "ACC-1", ReconcilerConfig::default());
        desk.refresh().await.unwrap();

        assert_eq!(desk.snapshot().reconciled_ledger_identifiers, vec!["PE-9"]);
        let identifiers = desk.reconciled_identifiers();
        assert_eq!(identifiers.len(), 1);
        assert!(identifiers.contains("PE-9"));
        assert!(!identifiers.contains("Payment Entry:PE-7"));
    }

    #[tokio::test]
    async fn test_scope_changes_reset_pending() {
        let mut desk =
            ReconciliationDesk::new(seeded(), "ACC-1", ReconcilerConfig::default());

        desk.toggle_pending("BT-1", false);
        desk.set_date_range(Some(date(1)), Some(date(31)));
        assert!(desk.tracker().is_empty());

        desk.toggle_pending("BT-1", false);
        desk.select_bank("BT-1", true);
        assert!(desk.tracker().is_empty());

        desk.toggle_pending("BT-1", false);
        desk.set_search("invoice");
        assert!(desk.tracker().is_pending("BT-1"));

        desk.set_account("ACC-2");
        assert!(desk.tracker().is_empty());
        assert!(desk.selection().is_empty());
        assert_eq!(desk.account_id(), "ACC-2");
    }
}
