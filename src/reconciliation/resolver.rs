//! Pairing resolver for manual reconciliation
//!
//! Decides how selected bank movements map onto selected ledger vouchers,
//! validates the match and plans the reconcile calls. Planning is pure; the
//! calls are issued afterwards by [`submit_requests`], one at a time.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::traits::LedgerService;
use crate::types::*;

/// How the selected movements were paired with the selected vouchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// One bank movement against every selected voucher
    ManyVouchersToOneBank,
    /// One voucher split across every selected bank movement
    OneVoucherToManyBanks,
    /// Equal counts, paired by position after sorting by amount
    PairedByAmount,
}

/// Validated reconcile calls for a selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    pub cardinality: Cardinality,
    pub requests: Vec<ReconcileRequest>,
    pub bank_total: BigDecimal,
    pub voucher_total: BigDecimal,
    /// Selected voucher ids that could not be resolved and were left out
    pub dropped_vouchers: Vec<String>,
}

/// User selection of bank movements and vouchers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub bank_ids: BTreeSet<String>,
    pub voucher_ids: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_bank(&mut self, id: impl Into<String>, selected: bool) {
        toggle(&mut self.bank_ids, id.into(), selected);
    }

    /// Voucher ids are canonical `type:name` identifiers
    pub fn toggle_voucher(&mut self, id: impl Into<String>, selected: bool) {
        toggle(&mut self.voucher_ids, id.into(), selected);
    }

    pub fn clear(&mut self) {
        self.bank_ids.clear();
        self.voucher_ids.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.bank_ids.is_empty() && self.voucher_ids.is_empty()
    }
}

fn toggle(set: &mut BTreeSet<String>, id: String, selected: bool) {
    if selected {
        set.insert(id);
    } else {
        set.remove(&id);
    }
}

/// A voucher with its resolved absolute amount
struct ResolvedVoucher<'a> {
    voucher: &'a LedgerVoucher,
    amount: BigDecimal,
}

impl ResolvedVoucher<'_> {
    fn allocation(&self, amount: BigDecimal) -> VoucherAllocation {
        VoucherAllocation {
            payment_doctype: self.voucher.voucher_type.clone(),
            payment_name: self.voucher.voucher_no.clone(),
            amount,
        }
    }
}

/// Validate a selection and plan the reconcile calls
///
/// Preconditions are checked in order and the first failure is returned:
/// empty bank selection, empty voucher selection, a selection spanning more
/// than one calendar month (unless acknowledged), no resolvable voucher, totals differing by more than the
/// configured tolerance, and finally a cardinality that cannot be paired.
/// Voucher ids are canonical `type:name` identifiers; a bare voucher name is
/// accepted as well; a voucher selected under both forms counts once.
pub fn resolve_reconciliation(
    selected_bank_ids: &BTreeSet<String>,
    selected_voucher_ids: &BTreeSet<String>,
    bank_movements: &[BankMovement],
    vouchers: &[LedgerVoucher],
    date_mismatch_acknowledged: bool,
    config: &ReconcilerConfig,
) -> ReconcileResult<ReconciliationPlan> {
    let mut banks: Vec<&BankMovement> = bank_movements
        .iter()
        .filter(|movement| selected_bank_ids.contains(&movement.id))
        .collect();
    if banks.len() < selected_bank_ids.len() {
        warn!(
            selected = selected_bank_ids.len(),
            found = banks.len(),
            "Some selected bank movements are not in the loaded page"
        );
    }
    if banks.is_empty() {
        return Err(ReconciliationError::EmptyBankSelection);
    }
    if selected_voucher_ids.is_empty() {
        return Err(ReconciliationError::EmptyVoucherSelection);
    }

    let by_identifier: HashMap<String, &LedgerVoucher> = vouchers
        .iter()
        .map(|voucher| (voucher.identifier(), voucher))
        .collect();
    let found: Vec<(&String, Option<&LedgerVoucher>)> = selected_voucher_ids
        .iter()
        .map(|id| {
            let voucher = by_identifier
                .get(id)
                .copied()
                .or_else(|| vouchers.iter().find(|v| &v.name == id));
            (id, voucher)
        })
        .collect();

    if config.enforce_month_alignment && !date_mismatch_acknowledged {
        let bank_months: BTreeSet<String> = banks.iter().map(|m| m.month_label()).collect();
        let voucher_months: BTreeSet<String> = found
            .iter()
            .filter_map(|(_, voucher)| voucher.map(LedgerVoucher::month_label))
            .collect();
        let spanned = bank_months.union(&voucher_months).count();
        if !voucher_months.is_empty() && spanned > 1 {
            return Err(ReconciliationError::UnacknowledgedDateMismatch {
                bank_months: bank_months.into_iter().collect(),
                voucher_months: voucher_months.into_iter().collect(),
            });
        }
    }

    let mut resolved = Vec::new();
    let mut resolved_keys: HashSet<VoucherKey> = HashSet::new();
    let mut dropped_vouchers = Vec::new();
    for (id, voucher) in found {
        match voucher {
            Some(voucher) if !resolved_keys.insert(voucher.key()) => {
                debug!(voucher = %id, "Voucher already selected under another id");
            }
            Some(voucher) if voucher.absolute_amount() > BigDecimal::from(0) => {
                resolved.push(ResolvedVoucher {
                    amount: voucher.absolute_amount(),
                    voucher,
                });
            }
            _ => {
                debug!(voucher = %id, "Dropping unresolvable voucher from selection");
                dropped_vouchers.push(id.clone());
            }
        }
    }
    if resolved.is_empty() {
        return Err(ReconciliationError::NoValidVouchers);
    }

    // Ties on amount break by date, then by identifier, so pairing does not
    // depend on the order the backend returned rows in.
    banks.sort_by(|a, b| {
        a.absolute_amount()
            .cmp(&b.absolute_amount())
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.id.cmp(&b.id))
    });
    resolved.sort_by(|a, b| {
        a.amount
            .cmp(&b.amount)
            .then_with(|| a.voucher.date.cmp(&b.voucher.date))
            .then_with(|| a.voucher.identifier().cmp(&b.voucher.identifier()))
    });

    let bank_total: BigDecimal = banks.iter().map(|m| m.absolute_amount()).sum();
    let voucher_total: BigDecimal = resolved.iter().map(|v| &v.amount).sum();
    if (&bank_total - &voucher_total).abs() > config.amount_tolerance {
        return Err(ReconciliationError::AmountMismatch {
            bank_total,
            voucher_total,
        });
    }

    let (cardinality, requests) = if banks.len() == 1 {
        let request = ReconcileRequest {
            bank_movement_id: banks[0].id.clone(),
            vouchers: resolved
                .iter()
                .map(|v| v.allocation(v.amount.clone()))
                .collect(),
        };
        (Cardinality::ManyVouchersToOneBank, vec![request])
    } else if resolved.len() == 1 {
        let voucher = &resolved[0];
        let requests = banks
            .iter()
            .map(|bank| ReconcileRequest {
                bank_movement_id: bank.id.clone(),
                vouchers: vec![voucher.allocation(bank.absolute_amount())],
            })
            .collect();
        (Cardinality::OneVoucherToManyBanks, requests)
    } else if banks.len() == resolved.len() {
        let requests = banks
            .iter()
            .zip(&resolved)
            .map(|(bank, voucher)| ReconcileRequest {
                bank_movement_id: bank.id.clone(),
                vouchers: vec![voucher.allocation(voucher.amount.clone())],
            })
            .collect();
        (Cardinality::PairedByAmount, requests)
    } else {
        return Err(ReconciliationError::UnsupportedCardinality {
            bank_count: banks.len(),
            voucher_count: resolved.len(),
        });
    };

    debug!(?cardinality, calls = requests.len(), "Planned reconciliation");

    Ok(ReconciliationPlan {
        cardinality,
        requests,
        bank_total,
        voucher_total,
        dropped_vouchers,
    })
}

/// Issue reconcile calls one after another, collecting per-call failures
///
/// A failed call never stops the rest of the batch.
#[tracing::instrument(skip_all, fields(calls = requests.len()))]
pub async fn submit_requests<S: LedgerService + ?Sized>(
    service: &S,
    requests: &[ReconcileRequest],
) -> BatchOutcome {
    let mut outcome = BatchOutcome::new();

    for request in requests {
        let id = request.bank_movement_id.as_str();
        match service.reconcile(id, &request.vouchers).await {
            Ok(response) if response.success => {
                debug!(batch_id = %outcome.batch_id, bank_movement = id, "Reconciled");
                outcome.record_success(id);
            }
            Ok(response) => {
                let message = response.failure_message();
                warn!(batch_id = %outcome.batch_id, bank_movement = id, %message, "Reconcile rejected");
                outcome.record_failure(id, message);
            }
            Err(e) => {
                warn!(batch_id = %outcome.batch_id, bank_movement = id, error = %e, "Reconcile call failed");
                outcome.record_failure(id, e.to_string());
            }
        }
    }

    info!(
        batch_id = %outcome.batch_id,
        succeeded = outcome.success_count,
        failed = outcome.failures.len(),
        "Reconcile batch finished"
    );
    outcome
}
