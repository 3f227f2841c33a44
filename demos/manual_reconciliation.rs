//! Manual reconciliation walkthrough against the in-memory service

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::utils::MemoryLedgerService;
use reconciliation_core::{
    BankMovement, LedgerVoucher, MovementType, ReconcilerConfig, ReconciliationDesk,
    ReconciliationGroup, VoucherTab,
};

fn date(day: u32) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    NaiveDate::from_ymd_opt(2024, 5, day).ok_or_else(|| "invalid date".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Reconciliation Core - Manual Reconciliation Example\n");

    let service = MemoryLedgerService::new();

    // A card processor settled one sales journal entry in three payouts
    for (id, day, amount) in [("BT-101", 6, 300), ("BT-102", 7, 450), ("BT-103", 8, 250)] {
        service.add_bank_movement(BankMovement::new(
            id,
            date(day)?,
            BigDecimal::from(amount),
            MovementType::Credit,
            format!("Card payout {id}"),
        ));
    }
    service.add_voucher(LedgerVoucher::new(
        "Journal Entry",
        "JE-2024-0051",
        date(8)?,
        BigDecimal::from(1000),
        BigDecimal::from(0),
    ));

    // A supplier payment matched one to one
    service.add_bank_movement(BankMovement::new(
        "BT-104",
        date(15)?,
        BigDecimal::from(-780),
        MovementType::Debit,
        "Transfer to Acme Supplies",
    ));
    service.add_voucher(LedgerVoucher::new(
        "Payment Entry",
        "PE-2024-0310",
        date(15)?,
        BigDecimal::from(0),
        BigDecimal::from(780),
    ));

    let mut desk = ReconciliationDesk::new(service.clone(), "Bank - Main", ReconcilerConfig::from_env());
    desk.refresh().await?;

    println!("Splitting the journal entry across three payouts...");
    for id in ["BT-101", "BT-102", "BT-103"] {
        desk.select_bank(id, true);
    }
    desk.select_voucher("Journal Entry:JE-2024-0051", true);
    let summary = desk.reconcile_selected(false).await?;
    println!(
        "  ✓ {} calls succeeded ({:?})\n",
        summary.success_count, summary.cardinality
    );

    println!("Matching the supplier payment...");
    desk.select_bank("BT-104", true);
    desk.select_voucher("Payment Entry:PE-2024-0310", true);
    let summary = desk.reconcile_selected(false).await?;
    println!("  ✓ {} call succeeded\n", summary.success_count);

    println!("Reconciled groups:");
    for group in desk.reconciled_groups() {
        match &group {
            ReconciliationGroup::Voucher {
                voucher,
                bank_movements,
            } => println!(
                "  voucher {} ({}) <- {} bank lines",
                voucher.identifier(),
                voucher.amount,
                bank_movements.len()
            ),
            ReconciliationGroup::Bank {
                bank_movement,
                vouchers,
            } => println!(
                "  bank {} ({}) -> {} voucher(s)",
                bank_movement.id,
                bank_movement.signed_amount(),
                vouchers.len()
            ),
        }
    }

    println!("\nUndoing the supplier match...");
    desk.toggle_pending("BT-104", false);
    let undone = desk.commit_pending().await?;
    println!("  ✓ {undone} movement(s) unreconciled");

    let open: Vec<String> = desk
        .vouchers_for_tab(VoucherTab::Unreconciled)
        .iter()
        .map(|v| v.identifier())
        .collect();
    println!("  Unreconciled vouchers: {}", open.join(", "));

    Ok(())
}
