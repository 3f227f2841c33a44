//! # Reconciliation Core
//!
//! Bank-to-ledger reconciliation engine for a treasury account: pairs
//! bank-statement movements with ledger vouchers, tracks staged
//! unreconciliations and rebuilds the grouped reconciled view.
//!
//! ## Features
//!
//! - **Pairing resolver**: 1:1, 1:N, N:1 and equal-count N:N matching with total and month checks
//! - **Unreconcile tracking**: staged undo with sequential commit and per-item failure reporting
//! - **Group reconstruction**: deduplicated voucher- and bank-anchored reconciliation groups
//! - **Reconciled index**: range-stable identifiers for the ledger-voucher tabs
//! - **Service abstraction**: backend-agnostic design through the `LedgerService` trait
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{build_reconciled_identifiers, BankMovement, LinkedVoucherRef, MovementType};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! let mut movement = BankMovement::new(
//!     "BT-1",
//!     NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
//!     BigDecimal::from(250),
//!     MovementType::Credit,
//!     "Customer receipt",
//! );
//! movement.linked_vouchers.push(LinkedVoucherRef::new("Payment Entry", "PE-1", BigDecimal::from(250)));
//!
//! let reconciled = build_reconciled_identifiers(&[movement], None);
//! assert!(reconciled.contains("Payment Entry:PE-1"));
//! ```

pub mod config;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
