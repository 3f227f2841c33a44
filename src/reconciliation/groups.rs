//! Reconstruction of reconciled groups for display
//!
//! Turns the flat list of bank movements, each carrying its voucher links, into
//! groups of mutually reconciled rows. Every bank movement and every voucher
//! ends up in at most one group.

use bigdecimal::BigDecimal;
use std::collections::{HashMap, HashSet};

use crate::types::*;

/// Active links from one bank movement to one voucher
struct LinkEntry<'a> {
    identifier: String,
    link: &'a LinkedVoucherRef,
    /// Sum over every active link between the pair
    allocated: BigDecimal,
}

/// Build the reconciled groups from the current snapshot
///
/// Only fully reconciled movements and their active links are considered.
/// Vouchers linked from more than one movement are grouped first, anchored on
/// the voucher, so a payment split across several bank lines stays together.
/// Remaining movements are then grouped with their remaining vouchers. A voucher
/// missing from `voucher_by_identifier` still appears, using the link's
/// allocated amount. Output order follows the order of `bank_movements`.
pub fn build_reconciled_groups(
    bank_movements: &[BankMovement],
    voucher_by_identifier: &HashMap<String, &LedgerVoucher>,
) -> Vec<ReconciliationGroup> {
    let mut voucher_order: Vec<String> = Vec::new();
    let mut voucher_to_banks: HashMap<String, Vec<&BankMovement>> = HashMap::new();
    let mut voucher_links: HashMap<String, Vec<(&str, &LinkedVoucherRef)>> = HashMap::new();
    let mut bank_order: Vec<&BankMovement> = Vec::new();
    let mut bank_to_vouchers: HashMap<&str, Vec<LinkEntry>> = HashMap::new();

    for movement in bank_movements.iter().filter(|m| m.is_fully_reconciled()) {
        if !bank_to_vouchers.contains_key(movement.id.as_str()) {
            bank_order.push(movement);
        }
        let entries = bank_to_vouchers.entry(movement.id.as_str()).or_default();

        for link in movement.active_links() {
            let identifier = link.identifier();
            voucher_links
                .entry(identifier.clone())
                .or_default()
                .push((movement.id.as_str(), link));

            if let Some(entry) = entries.iter_mut().find(|e| e.identifier == identifier) {
                entry.allocated = &entry.allocated + &link.allocated_amount;
                continue;
            }

            let banks = voucher_to_banks.entry(identifier.clone()).or_insert_with(|| {
                voucher_order.push(identifier.clone());
                Vec::new()
            });
            if !banks.iter().any(|b| b.id == movement.id) {
                banks.push(movement);
            }
            entries.push(LinkEntry {
                identifier,
                link,
                allocated: link.allocated_amount.clone(),
            });
        }
    }

    let mut processed_banks: HashSet<&str> = HashSet::new();
    let mut processed_vouchers: HashSet<&str> = HashSet::new();
    let mut groups = Vec::new();

    for identifier in &voucher_order {
        let banks: Vec<&BankMovement> = voucher_to_banks[identifier]
            .iter()
            .copied()
            .filter(|b| !processed_banks.contains(b.id.as_str()))
            .collect();
        if banks.len() < 2 {
            continue;
        }

        // Only allocations from this group's own bank lines count
        let links: Vec<&LinkedVoucherRef> = voucher_links[identifier]
            .iter()
            .filter(|(bank_id, _)| banks.iter().any(|b| b.id == *bank_id))
            .map(|(_, link)| *link)
            .collect();
        let allocated: BigDecimal = links.iter().map(|l| &l.allocated_amount).sum();
        let voucher = group_voucher(links[0], allocated, voucher_by_identifier);

        processed_vouchers.insert(identifier.as_str());
        processed_banks.extend(banks.iter().map(|b| b.id.as_str()));
        groups.push(ReconciliationGroup::Voucher {
            voucher,
            bank_movements: banks.into_iter().cloned().collect(),
        });
    }

    for movement in bank_order {
        if processed_banks.contains(movement.id.as_str()) {
            continue;
        }

        let remaining: Vec<&LinkEntry> = bank_to_vouchers[movement.id.as_str()]
            .iter()
            .filter(|e| !processed_vouchers.contains(e.identifier.as_str()))
            .collect();
        if remaining.is_empty() {
            continue;
        }

        let vouchers = remaining
            .iter()
            .map(|e| group_voucher(e.link, e.allocated.clone(), voucher_by_identifier))
            .collect();

        processed_banks.insert(movement.id.as_str());
        processed_vouchers.extend(remaining.iter().map(|e| e.identifier.as_str()));
        groups.push(ReconciliationGroup::Bank {
            bank_movement: movement.clone(),
            vouchers,
        });
    }

    groups
}

fn group_voucher(
    link: &LinkedVoucherRef,
    fallback_amount: BigDecimal,
    voucher_by_identifier: &HashMap<String, &LedgerVoucher>,
) -> GroupVoucher {
    let accounting_movement = voucher_by_identifier
        .get(&link.identifier())
        .map(|voucher| (*voucher).clone());
    let amount = accounting_movement
        .as_ref()
        .map(LedgerVoucher::absolute_amount)
        .unwrap_or(fallback_amount);

    GroupVoucher {
        doctype: link.payment_doctype.clone(),
        docname: link.payment_name.clone(),
        amount,
        accounting_movement,
    }
}
