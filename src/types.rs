//! Core types and data structures for the reconciliation engine

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Voucher type assumed when neither the link nor the voucher names one
pub const DEFAULT_VOUCHER_TYPE: &str = "Payment Entry";

/// Direction of a bank movement as reported by the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Money coming into the treasury account
    #[serde(alias = "Credit", alias = "deposit")]
    Credit,
    /// Money leaving the treasury account
    #[serde(alias = "Debit", alias = "withdrawal")]
    Debit,
}

/// Canonical `type:name` identity of a ledger voucher
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoucherKey {
    pub doctype: String,
    pub docname: String,
}

impl VoucherKey {
    pub fn new(doctype: impl Into<String>, docname: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            docname: docname.into(),
        }
    }

    /// Parse a `type:name` identifier, splitting on the first colon
    pub fn parse(identifier: &str) -> Option<Self> {
        let (doctype, docname) = identifier.split_once(':')?;
        if doctype.is_empty() || docname.is_empty() {
            return None;
        }
        Some(Self::new(doctype, docname))
    }
}

impl fmt::Display for VoucherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doctype, self.docname)
    }
}

/// Link from a bank movement to a ledger voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LinkedVoucherWire")]
pub struct LinkedVoucherRef {
    /// Voucher type, e.g. "Payment Entry" or "Journal Entry"
    pub payment_doctype: String,
    /// Voucher name / number
    pub payment_name: String,
    /// Portion of the bank movement allocated to this voucher
    pub allocated_amount: BigDecimal,
    /// Inactive links are kept by the backend for history only
    pub delinked: bool,
}

impl LinkedVoucherRef {
    /// Create an active link
    pub fn new(
        payment_doctype: impl Into<String>,
        payment_name: impl Into<String>,
        allocated_amount: BigDecimal,
    ) -> Self {
        Self {
            payment_doctype: payment_doctype.into(),
            payment_name: payment_name.into(),
            allocated_amount,
            delinked: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.delinked
    }

    pub fn key(&self) -> VoucherKey {
        VoucherKey::new(self.payment_doctype.clone(), self.payment_name.clone())
    }

    /// Canonical `type:name` identifier
    pub fn identifier(&self) -> String {
        self.key().to_string()
    }
}

/// Wire shape of a link; the backend spells the voucher fields several ways
#[derive(Deserialize)]
struct LinkedVoucherWire {
    payment_doctype: Option<String>,
    voucher_type: Option<String>,
    payment_name: Option<String>,
    payment_entry: Option<String>,
    voucher_no: Option<String>,
    name: Option<String>,
    #[serde(default)]
    allocated_amount: Option<BigDecimal>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    delinked: bool,
}

impl From<LinkedVoucherWire> for LinkedVoucherRef {
    fn from(wire: LinkedVoucherWire) -> Self {
        Self {
            payment_doctype: first_present([wire.payment_doctype, wire.voucher_type])
                .unwrap_or_else(|| DEFAULT_VOUCHER_TYPE.to_string()),
            payment_name: first_present([
                wire.payment_name,
                wire.payment_entry,
                wire.voucher_no,
                wire.name,
            ])
            .unwrap_or_default(),
            allocated_amount: wire.allocated_amount.unwrap_or_default(),
            delinked: wire.delinked,
        }
    }
}

/// A single line from an imported or synced bank statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BankMovementWire")]
pub struct BankMovement {
    /// Canonical identifier
    pub id: String,
    pub date: NaiveDate,
    /// Amount as reported; the sign is normalised through `movement_type`
    pub amount: BigDecimal,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub description: String,
    pub reference: Option<String>,
    /// Amount not yet matched to any voucher, when the backend reports it
    pub unallocated_amount: Option<BigDecimal>,
    pub is_reconciled: bool,
    pub linked_vouchers: Vec<LinkedVoucherRef>,
}

impl BankMovement {
    /// Create an open movement with no links
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        amount: BigDecimal,
        movement_type: MovementType,
        description: impl Into<String>,
    ) -> Self {
        let unallocated = amount.abs();
        Self {
            id: id.into(),
            date,
            amount,
            movement_type,
            description: description.into(),
            reference: None,
            unallocated_amount: Some(unallocated),
            is_reconciled: false,
            linked_vouchers: Vec::new(),
        }
    }

    pub fn absolute_amount(&self) -> BigDecimal {
        self.amount.abs()
    }

    /// Credits are positive, debits negative
    pub fn signed_amount(&self) -> BigDecimal {
        match self.movement_type {
            MovementType::Credit => self.amount.abs(),
            MovementType::Debit => -self.amount.abs(),
        }
    }

    /// Links currently in force
    pub fn active_links(&self) -> impl Iterator<Item = &LinkedVoucherRef> {
        self.linked_vouchers.iter().filter(|link| link.is_active())
    }

    /// Whether the backend considers the movement fully matched
    pub fn is_fully_reconciled(&self) -> bool {
        self.is_reconciled
            || self
                .unallocated_amount
                .as_ref()
                .is_some_and(|unallocated| *unallocated == BigDecimal::from(0))
    }

    /// `YYYY-MM` label of the movement date
    pub fn month_label(&self) -> String {
        month_label(self.date)
    }
}

#[derive(Deserialize)]
struct BankMovementWire {
    id: Option<String>,
    name: Option<String>,
    date: NaiveDate,
    amount: BigDecimal,
    #[serde(rename = "type")]
    movement_type: Option<MovementType>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    unallocated_amount: Option<BigDecimal>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_reconciled: bool,
    #[serde(default)]
    linked_vouchers: Option<Vec<LinkedVoucherRef>>,
}

impl From<BankMovementWire> for BankMovement {
    fn from(wire: BankMovementWire) -> Self {
        let movement_type = wire.movement_type.unwrap_or_else(|| {
            if wire.amount < BigDecimal::from(0) {
                MovementType::Debit
            } else {
                MovementType::Credit
            }
        });
        Self {
            id: first_present([wire.id, wire.name]).unwrap_or_default(),
            date: wire.date,
            amount: wire.amount,
            movement_type,
            description: wire.description.unwrap_or_default(),
            reference: wire.reference.filter(|r| !r.is_empty()),
            unallocated_amount: wire.unallocated_amount,
            is_reconciled: wire.is_reconciled,
            linked_vouchers: wire.linked_vouchers.unwrap_or_default(),
        }
    }
}

/// Accounting document (payment or journal entry) posted to the treasury account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LedgerVoucherWire")]
pub struct LedgerVoucher {
    pub name: String,
    pub voucher_type: String,
    pub voucher_no: String,
    pub date: NaiveDate,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub description: String,
}

impl LedgerVoucher {
    /// Create a voucher whose number equals its name
    pub fn new(
        voucher_type: impl Into<String>,
        name: impl Into<String>,
        date: NaiveDate,
        debit: BigDecimal,
        credit: BigDecimal,
    ) -> Self {
        let name = name.into();
        Self {
            voucher_no: name.clone(),
            name,
            voucher_type: voucher_type.into(),
            date,
            debit,
            credit,
            description: String::new(),
        }
    }

    /// Debit minus credit
    pub fn net_amount(&self) -> BigDecimal {
        &self.debit - &self.credit
    }

    pub fn absolute_amount(&self) -> BigDecimal {
        self.net_amount().abs()
    }

    pub fn key(&self) -> VoucherKey {
        VoucherKey::new(self.voucher_type.clone(), self.voucher_no.clone())
    }

    /// Canonical `type:name` identifier, comparable with link identifiers
    pub fn identifier(&self) -> String {
        self.key().to_string()
    }

    pub fn month_label(&self) -> String {
        month_label(self.date)
    }
}

#[derive(Deserialize)]
struct LedgerVoucherWire {
    name: Option<String>,
    voucher_type: Option<String>,
    voucher_no: Option<String>,
    date: NaiveDate,
    #[serde(default)]
    debit: Option<BigDecimal>,
    #[serde(default)]
    credit: Option<BigDecimal>,
    #[serde(default)]
    description: Option<String>,
}

impl From<LedgerVoucherWire> for LedgerVoucher {
    fn from(wire: LedgerVoucherWire) -> Self {
        let name = first_present([wire.name.clone(), wire.voucher_no.clone()]).unwrap_or_default();
        Self {
            voucher_no: first_present([wire.voucher_no, wire.name]).unwrap_or_default(),
            name,
            voucher_type: first_present([wire.voucher_type])
                .unwrap_or_else(|| DEFAULT_VOUCHER_TYPE.to_string()),
            date: wire.date,
            debit: wire.debit.unwrap_or_default(),
            credit: wire.credit.unwrap_or_default(),
            description: wire.description.unwrap_or_default(),
        }
    }
}

/// Voucher as shown inside a reconciliation group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupVoucher {
    pub doctype: String,
    pub docname: String,
    /// Voucher amount when loaded, otherwise the link's allocated amount
    pub amount: BigDecimal,
    /// The ledger voucher, when it is part of the loaded page
    pub accounting_movement: Option<LedgerVoucher>,
}

impl GroupVoucher {
    pub fn identifier(&self) -> String {
        VoucherKey::new(self.doctype.clone(), self.docname.clone()).to_string()
    }
}

/// Display aggregate of mutually reconciled bank movements and vouchers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReconciliationGroup {
    /// One voucher reconciled against several bank movements
    Voucher {
        voucher: GroupVoucher,
        bank_movements: Vec<BankMovement>,
    },
    /// One bank movement reconciled against one or more vouchers
    Bank {
        bank_movement: BankMovement,
        vouchers: Vec<GroupVoucher>,
    },
}

impl ReconciliationGroup {
    /// Identifiers of the bank movements in this group
    pub fn bank_ids(&self) -> Vec<&str> {
        match self {
            ReconciliationGroup::Voucher { bank_movements, .. } => {
                bank_movements.iter().map(|m| m.id.as_str()).collect()
            }
            ReconciliationGroup::Bank { bank_movement, .. } => vec![bank_movement.id.as_str()],
        }
    }

    /// Canonical identifiers of the vouchers in this group
    pub fn voucher_identifiers(&self) -> Vec<String> {
        match self {
            ReconciliationGroup::Voucher { voucher, .. } => vec![voucher.identifier()],
            ReconciliationGroup::Bank { vouchers, .. } => {
                vouchers.iter().map(GroupVoucher::identifier).collect()
            }
        }
    }

    pub fn bank_total(&self) -> BigDecimal {
        match self {
            ReconciliationGroup::Voucher { bank_movements, .. } => bank_movements
                .iter()
                .map(BankMovement::absolute_amount)
                .sum(),
            ReconciliationGroup::Bank { bank_movement, .. } => bank_movement.absolute_amount(),
        }
    }

    pub fn voucher_total(&self) -> BigDecimal {
        match self {
            ReconciliationGroup::Voucher { voucher, .. } => voucher.amount.clone(),
            ReconciliationGroup::Bank { vouchers, .. } => {
                vouchers.iter().map(|v| &v.amount).sum()
            }
        }
    }
}

/// Allocation of one voucher inside a reconcile call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherAllocation {
    pub payment_doctype: String,
    pub payment_name: String,
    pub amount: BigDecimal,
}

/// One reconcile call: a bank movement against one or more vouchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub bank_movement_id: String,
    pub vouchers: Vec<VoucherAllocation>,
}

impl ReconcileRequest {
    pub fn total_amount(&self) -> BigDecimal {
        self.vouchers.iter().map(|v| &v.amount).sum()
    }
}

/// A single failed call inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: String,
    pub message: String,
}

/// Result of a sequential batch of backend calls
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub success_count: usize,
    /// Identifiers processed successfully, in call order
    pub succeeded: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            success_count: 0,
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, id: impl Into<String>) {
        self.success_count += 1;
        self.succeeded.push(id.into());
    }

    pub fn record_failure(&mut self, id: impl Into<String>, message: impl Into<String>) {
        self.failures.push(ItemFailure {
            id: id.into(),
            message: message.into(),
        });
    }

    /// Number of calls actually issued
    pub fn attempted(&self) -> usize {
        self.success_count + self.failures.len()
    }

    /// Messages of the failed calls, for user notification
    pub fn error_messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.id, f.message))
            .collect()
    }

    /// Success count, or `PartialFailure` if any call failed
    pub fn into_result(self) -> ReconcileResult<usize> {
        if self.failures.is_empty() {
            Ok(self.success_count)
        } else {
            Err(ReconciliationError::PartialFailure {
                success_count: self.success_count,
                failures: self.failures,
            })
        }
    }
}

impl Default for BatchOutcome {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by the external ledger service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for ledger service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that can occur while reconciling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconciliationError {
    #[error("Select at least one bank movement")]
    EmptyBankSelection,
    #[error("Select at least one ledger voucher")]
    EmptyVoucherSelection,
    #[error(
        "Selected movements fall in different months: bank {}, vouchers {}",
        .bank_months.join(", "),
        .voucher_months.join(", ")
    )]
    UnacknowledgedDateMismatch {
        bank_months: Vec<String>,
        voucher_months: Vec<String>,
    },
    #[error("None of the selected vouchers could be resolved")]
    NoValidVouchers,
    #[error("Amounts do not match: bank total = {bank_total}, voucher total = {voucher_total}")]
    AmountMismatch {
        bank_total: BigDecimal,
        voucher_total: BigDecimal,
    },
    #[error("Cannot pair {bank_count} bank movements with {voucher_count} vouchers")]
    UnsupportedCardinality {
        bank_count: usize,
        voucher_count: usize,
    },
    #[error("{success_count} succeeded, {} failed", .failures.len())]
    PartialFailure {
        success_count: usize,
        failures: Vec<ItemFailure>,
    },
    #[error("Nothing pending to unreconcile")]
    NothingPending,
    #[error("Backend rejected {id}: {message}")]
    Backend { id: String, message: String },
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconciliationError>;

/// `YYYY-MM` label of a date
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
}

/// Accepts `0`/`1` as well as `true`/`false`
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Int(value)) => value != 0,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_link_resolves_fallback_fields() {
        let link: LinkedVoucherRef = serde_json::from_value(serde_json::json!({
            "voucher_type": "Journal Entry",
            "voucher_no": "JE-0001",
            "allocated_amount": "25.50",
            "delinked": 0
        }))
        .unwrap();

        assert_eq!(link.payment_doctype, "Journal Entry");
        assert_eq!(link.payment_name, "JE-0001");
        assert_eq!(link.allocated_amount, dec("25.50"));
        assert!(link.is_active());
        assert_eq!(link.identifier(), "Journal Entry:JE-0001");
    }

    #[test]
    fn test_link_defaults_to_payment_entry() {
        let link: LinkedVoucherRef = serde_json::from_value(serde_json::json!({
            "payment_doctype": "",
            "payment_entry": "PE-7",
            "delinked": 1
        }))
        .unwrap();

        assert_eq!(link.identifier(), "Payment Entry:PE-7");
        assert!(link.delinked);
        assert_eq!(link.allocated_amount, BigDecimal::from(0));
    }

    #[test]
    fn test_bank_movement_accepts_name_as_id() {
        let movement: BankMovement = serde_json::from_value(serde_json::json!({
            "name": "BT-1",
            "date": "2024-03-15",
            "amount": "-120",
            "description": "Card payment",
            "is_reconciled": true
        }))
        .unwrap();

        assert_eq!(movement.id, "BT-1");
        assert_eq!(movement.movement_type, MovementType::Debit);
        assert_eq!(movement.signed_amount(), dec("-120"));
        assert_eq!(movement.absolute_amount(), dec("120"));
        assert_eq!(movement.month_label(), "2024-03");
        assert!(movement.is_fully_reconciled());
        assert!(movement.linked_vouchers.is_empty());
    }

    #[test]
    fn test_fully_reconciled_via_unallocated_amount() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut movement =
            BankMovement::new("BT-2", date, dec("10"), MovementType::Credit, "Deposit");
        assert!(!movement.is_fully_reconciled());

        movement.unallocated_amount = Some(dec("0.00"));
        assert!(movement.is_fully_reconciled());
    }

    #[test]
    fn test_voucher_identity_falls_back_to_name() {
        let voucher: LedgerVoucher = serde_json::from_value(serde_json::json!({
            "name": "ACC-PAY-0009",
            "date": "2024-02-01",
            "debit": "0",
            "credit": "75"
        }))
        .unwrap();

        assert_eq!(voucher.identifier(), "Payment Entry:ACC-PAY-0009");
        assert_eq!(voucher.net_amount(), dec("-75"));
        assert_eq!(voucher.absolute_amount(), dec("75"));
    }

    #[test]
    fn test_voucher_key_parse() {
        let key = VoucherKey::parse("Journal Entry:JE:2024:01").unwrap();
        assert_eq!(key.doctype, "Journal Entry");
        assert_eq!(key.docname, "JE:2024:01");
        assert_eq!(key.to_string(), "Journal Entry:JE:2024:01");

        assert!(VoucherKey::parse("no-separator").is_none());
        assert!(VoucherKey::parse(":PE-1").is_none());
    }

    #[test]
    fn test_batch_outcome_into_result() {
        let mut outcome = BatchOutcome::new();
        outcome.record_success("BT-1");
        assert_eq!(outcome.clone().into_result(), Ok(1));

        outcome.record_failure("BT-2", "locked period");
        assert_eq!(outcome.attempted(), 2);
        assert_eq!(outcome.error_messages(), vec!["BT-2: locked period".to_string()]);
        match outcome.into_result() {
            Err(ReconciliationError::PartialFailure {
                success_count,
                failures,
            }) => {
                assert_eq!(success_count, 1);
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_date_mismatch_message_lists_months() {
        let err = ReconciliationError::UnacknowledgedDateMismatch {
            bank_months: vec!["2024-01".to_string()],
            voucher_months: vec!["2024-02".to_string(), "2024-03".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Selected movements fall in different months: bank 2024-01, vouchers 2024-02, 2024-03"
        );
    }
}
