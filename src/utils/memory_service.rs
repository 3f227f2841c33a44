//! In-memory ledger service for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::reconciliation::identifiers::build_reconciled_identifiers;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_reconcile_request;

const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug)]
struct State {
    bank_movements: Vec<BankMovement>,
    vouchers: Vec<LedgerVoucher>,
    failures: HashMap<String, String>,
    mutation_count: usize,
    page_size: usize,
}

/// In-memory ledger service for testing and development
///
/// Clones share the same state, so a test can keep a handle while the desk owns
/// another. Mutating calls are counted and can be made to fail per movement.
#[derive(Debug, Clone)]
pub struct MemoryLedgerService {
    state: Arc<RwLock<State>>,
}

impl MemoryLedgerService {
    /// Create an empty service
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty service returning pages of `page_size` rows
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                bank_movements: Vec::new(),
                vouchers: Vec::new(),
                failures: HashMap::new(),
                mutation_count: 0,
                page_size: page_size.max(1),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_bank_movement(&self, movement: BankMovement) {
        self.write().bank_movements.push(movement);
    }

    pub fn add_voucher(&self, voucher: LedgerVoucher) {
        self.write().vouchers.push(voucher);
    }

    /// Make every mutating call for `bank_movement_id` fail with `message`
    pub fn fail_on(&self, bank_movement_id: &str, message: &str) {
        self.write()
            .failures
            .insert(bank_movement_id.to_string(), message.to_string());
    }

    pub fn clear_failure(&self, bank_movement_id: &str) {
        self.write().failures.remove(bank_movement_id);
    }

    /// Number of reconcile/unreconcile calls received
    pub fn mutation_count(&self) -> usize {
        self.read().mutation_count
    }

    pub fn bank_movement(&self, id: &str) -> Option<BankMovement> {
        self.read().bank_movements.iter().find(|m| m.id == id).cloned()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        let mut state = self.write();
        state.bank_movements.clear();
        state.vouchers.clear();
        state.failures.clear();
        state.mutation_count = 0;
    }
}

impl Default for MemoryLedgerService {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_search(search: Option<&str>, fields: &[&str]) -> bool {
    match search {
        None => true,
        Some(search) => {
            let needle = search.to_lowercase();
            fields.iter().any(|f| f.to_lowercase().contains(&needle))
        }
    }
}

/// Slice a 1-based page out of `rows`, reporting whether more follow
fn paginate<T: Clone>(rows: &[T], page: u32, page_size: usize) -> (Vec<T>, bool) {
    let start = (page.max(1) as usize - 1) * page_size;
    let end = (start + page_size).min(rows.len());
    if start >= rows.len() {
        return (Vec::new(), false);
    }
    (rows[start..end].to_vec(), end < rows.len())
}

#[async_trait]
impl LedgerService for MemoryLedgerService {
    async fn reconcile(
        &self,
        bank_movement_id: &str,
        vouchers: &[VoucherAllocation],
    ) -> ServiceResult<ServiceResponse> {
        let mut state = self.write();
        state.mutation_count += 1;

        if let Some(message) = state.failures.get(bank_movement_id) {
            return Ok(ServiceResponse::failed(message.clone()));
        }
        validate_reconcile_request(bank_movement_id, vouchers)?;

        let movement = state
            .bank_movements
            .iter_mut()
            .find(|m| m.id == bank_movement_id)
            .ok_or_else(|| ServiceError::NotFound(bank_movement_id.to_string()))?;

        let unallocated = movement
            .unallocated_amount
            .clone()
            .unwrap_or_else(|| movement.absolute_amount());
        let total: BigDecimal = vouchers.iter().map(|v| &v.amount).sum();
        if total > &unallocated + BigDecimal::new(1.into(), 2) {
            return Ok(ServiceResponse::failed(format!(
                "Allocated amount {total} exceeds unallocated amount {unallocated}"
            )));
        }

        for voucher in vouchers {
            movement.linked_vouchers.push(LinkedVoucherRef::new(
                voucher.payment_doctype.clone(),
                voucher.payment_name.clone(),
                voucher.amount.clone(),
            ));
        }
        let remaining = (&unallocated - &total).max(BigDecimal::from(0));
        movement.is_reconciled = remaining == BigDecimal::from(0);
        movement.unallocated_amount = Some(remaining);

        Ok(ServiceResponse::ok())
    }

    async fn unreconcile(&self, bank_movement_id: &str) -> ServiceResult<ServiceResponse> {
        let mut state = self.write();
        state.mutation_count += 1;

        if let Some(message) = state.failures.get(bank_movement_id) {
            return Ok(ServiceResponse::failed(message.clone()));
        }

        let movement = state
            .bank_movements
            .iter_mut()
            .find(|m| m.id == bank_movement_id)
            .ok_or_else(|| ServiceError::NotFound(bank_movement_id.to_string()))?;

        if movement.active_links().next().is_none() {
            return Ok(ServiceResponse::failed("Bank transaction is not reconciled"));
        }

        for link in &mut movement.linked_vouchers {
            link.delinked = true;
        }
        movement.unallocated_amount = Some(movement.absolute_amount());
        movement.is_reconciled = false;

        Ok(ServiceResponse::ok())
    }

    async fn fetch_bank_movements(
        &self,
        _account_id: &str,
        query: &MovementQuery,
    ) -> ServiceResult<BankMovementPage> {
        let state = self.read();

        let in_range: Vec<BankMovement> = state
            .bank_movements
            .iter()
            .filter(|m| query.contains_date(m.date))
            .cloned()
            .collect();

        let mut identifiers: Vec<String> = build_reconciled_identifiers(&in_range, None)
            .into_iter()
            .collect();
        identifiers.sort();

        let matching: Vec<BankMovement> = in_range
            .into_iter()
            .filter(|m| {
                matches_search(
                    query.search.as_deref(),
                    &[
                        m.id.as_str(),
                        m.description.as_str(),
                        m.reference.as_deref().unwrap_or(""),
                    ],
                )
            })
            .collect();
        let (movements, has_more) = paginate(&matching, query.page, state.page_size);

        Ok(BankMovementPage {
            movements,
            reconciled_ledger_identifiers: Some(identifiers),
            pagination: Pagination { has_more },
        })
    }

    async fn fetch_accounting_movements(
        &self,
        _account_id: &str,
        query: &MovementQuery,
    ) -> ServiceResult<AccountingMovementPage> {
        let state = self.read();

        let matching: Vec<LedgerVoucher> = state
            .vouchers
            .iter()
            .filter(|v| query.contains_date(v.date))
            .filter(|v| {
                matches_search(
                    query.search.as_deref(),
                    &[v.name.as_str(), v.voucher_no.as_str(), v.description.as_str()],
                )
            })
            .cloned()
            .collect();
        let (movements, has_more) = paginate(&matching, query.page, state.page_size);

        Ok(AccountingMovementPage {
            movements,
            pagination: Pagination { has_more },
        })
    }
}
