//! Index of reconciled voucher identifiers

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::*;

/// Tabs of the ledger-voucher table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherTab {
    #[default]
    All,
    Unreconciled,
    Reconciled,
}

/// Build the set of `type:name` identifiers of reconciled vouchers
///
/// A non-empty backend list is computed over the unfiltered date range and is
/// returned as is, so searching the bank table never changes which vouchers are
/// marked. Otherwise the set is derived from the active links of `bank_movements`.
pub fn build_reconciled_identifiers(
    bank_movements: &[BankMovement],
    backend_identifiers: Option<&[String]>,
) -> HashSet<String> {
    if let Some(identifiers) = backend_identifiers.filter(|ids| !ids.is_empty()) {
        return identifiers.iter().cloned().collect();
    }

    derive_identifiers(bank_movements)
}

fn derive_identifiers(bank_movements: &[BankMovement]) -> HashSet<String> {
    bank_movements
        .iter()
        .flat_map(BankMovement::active_links)
        .map(LinkedVoucherRef::identifier)
        .collect()
}

/// Lookup of loaded vouchers by canonical identifier
pub fn index_vouchers(vouchers: &[LedgerVoucher]) -> HashMap<String, &LedgerVoucher> {
    vouchers
        .iter()
        .map(|voucher| (voucher.identifier(), voucher))
        .collect()
}

/// Vouchers visible under a tab
pub fn filter_vouchers<'a>(
    vouchers: &'a [LedgerVoucher],
    reconciled: &HashSet<String>,
    tab: VoucherTab,
) -> Vec<&'a LedgerVoucher> {
    vouchers
        .iter()
        .filter(|voucher| match tab {
            VoucherTab::All => true,
            VoucherTab::Reconciled => reconciled.contains(&voucher.identifier()),
            VoucherTab::Unreconciled => !reconciled.contains(&voucher.identifier()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn movement(id: &str, links: Vec<LinkedVoucherRef>) -> BankMovement {
        let mut movement = BankMovement::new(
            id,
            date(),
            BigDecimal::from(100),
            MovementType::Credit,
            "Deposit",
        );
        movement.linked_vouchers = links;
        movement
    }

    fn link(doctype: &str, name: &str) -> LinkedVoucherRef {
        LinkedVoucherRef::new(doctype, name, BigDecimal::from(100))
    }

    #[test]
    fn test_derived_from_active_links() {
        let mut delinked = link("Payment Entry", "PE-3");
        delinked.delinked = true;

        let movements = vec![
            movement("BT-1", vec![link("Payment Entry", "PE-1"), delinked]),
            movement("BT-2", vec![link("Journal Entry", "JE-1"), link("Payment Entry", "PE-1")]),
        ];

        let ids = build_reconciled_identifiers(&movements, None);

        assert_eq!(ids.len(), 2);
        assert!(ids.contains("Payment Entry:PE-1"));
        assert!(ids.contains("Journal Entry:JE-1"));
        assert!(!ids.contains("Payment Entry:PE-3"));
    }

    #[test]
    fn test_empty_backend_list_falls_back() {
        let movements = vec![movement("BT-1", vec![link("Payment Entry", "PE-1")])];
        let ids = build_reconciled_identifiers(&movements, Some(&[]));
        assert!(ids.contains("Payment Entry:PE-1"));
    }

    #[test]
    fn test_backend_list_wins_over_links() {
        let backend = vec!["Journal Entry:JE-9".to_string()];
        let mut movements = vec![movement("BT-1", vec![link("Payment Entry", "PE-1")])];

        let first = build_reconciled_identifiers(&movements, Some(&backend));
        movements[0].linked_vouchers.push(link("Payment Entry", "PE-2"));
        movements.push(movement("BT-2", vec![link("Payment Entry", "PE-3")]));
        let second = build_reconciled_identifiers(&movements, Some(&backend));

        assert_eq!(first, second);
        assert_eq!(first, HashSet::from(["Journal Entry:JE-9".to_string()]));
    }

    #[test]
    fn test_idempotent() {
        let movements = vec![
            movement("BT-1", vec![link("Payment Entry", "PE-1")]),
            movement("BT-2", vec![link("Payment Entry", "PE-1")]),
        ];
        assert_eq!(
            build_reconciled_identifiers(&movements, None),
            build_reconciled_identifiers(&movements, None)
        );
    }

    #[test]
    fn test_filter_vouchers_by_tab() {
        let vouchers = vec![
            LedgerVoucher::new("Payment Entry", "PE-1", date(), BigDecimal::from(100), BigDecimal::from(0)),
            LedgerVoucher::new("Payment Entry", "PE-2", date(), BigDecimal::from(50), BigDecimal::from(0)),
        ];
        let reconciled = HashSet::from(["Payment Entry:PE-1".to_string()]);

        let names = |tab| {
            filter_vouchers(&vouchers, &reconciled, tab)
                .into_iter()
                .map(|v| v.name.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(VoucherTab::All), vec!["PE-1", "PE-2"]);
        assert_eq!(names(VoucherTab::Reconciled), vec!["PE-1"]);
        assert_eq!(names(VoucherTab::Unreconciled), vec!["PE-2"]);
    }

    #[test]
    fn test_index_vouchers() {
        let vouchers = vec![LedgerVoucher::new(
            "Journal Entry",
            "JE-1",
            date(),
            BigDecimal::from(0),
            BigDecimal::from(40),
        )];
        let index = index_vouchers(&vouchers);
        assert_eq!(index["Journal Entry:JE-1"].name, "JE-1");
    }
}
