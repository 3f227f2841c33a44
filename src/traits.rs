//! Traits for the external ledger service and the shapes it exchanges

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::*;

/// Abstraction over the ledger/bank backend that records reconciliations
///
/// The engine never mutates movements or vouchers itself; every change goes
/// through `reconcile` and `unreconcile`, and the caller refetches afterwards.
/// Implement this for whatever transport the host application uses.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Reconcile one bank movement against one or more vouchers
    async fn reconcile(
        &self,
        bank_movement_id: &str,
        vouchers: &[VoucherAllocation],
    ) -> ServiceResult<ServiceResponse>;

    /// Break every active link of a bank movement
    async fn unreconcile(&self, bank_movement_id: &str) -> ServiceResult<ServiceResponse>;

    /// Fetch one page of bank movements for an account
    async fn fetch_bank_movements(
        &self,
        account_id: &str,
        query: &MovementQuery,
    ) -> ServiceResult<BankMovementPage>;

    /// Fetch one page of ledger vouchers for an account
    async fn fetch_accounting_movements(
        &self,
        account_id: &str,
        query: &MovementQuery,
    ) -> ServiceResult<AccountingMovementPage>;
}

/// Acknowledgement returned by mutating calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServiceResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    /// Message to show when the backend refused the call
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Page, date range and search filter for list fetches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementQuery {
    /// 1-based page number
    pub page: u32,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl MovementQuery {
    pub fn new() -> Self {
        Self {
            page: 1,
            from_date: None,
            to_date: None,
            search: None,
        }
    }

    pub fn with_date_range(
        mut self,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Self {
        self.from_date = from_date;
        self.to_date = to_date;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = if search.trim().is_empty() {
            None
        } else {
            Some(search)
        };
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Whether a date falls inside the query's range
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.from_date.is_none_or(|from| date >= from) && self.to_date.is_none_or(|to| date <= to)
    }
}

impl Default for MovementQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Pagination metadata of a list fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub has_more: bool,
}

/// Page of bank movements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankMovementPage {
    pub movements: Vec<BankMovement>,
    /// `type:name` identifiers reconciled over the whole date range, ignoring search
    #[serde(default)]
    pub reconciled_ledger_identifiers: Option<Vec<String>>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Page of ledger vouchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingMovementPage {
    pub movements: Vec<LedgerVoucher>,
    #[serde(default)]
    pub pagination: Pagination,
}
