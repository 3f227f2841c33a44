//! Bank-to-ledger reconciliation engine
//!
//! - `identifiers`: which vouchers count as reconciled
//! - `resolver`: pairing of selected bank movements with selected vouchers
//! - `tracker`: staged unreconciliation
//! - `groups`: grouped display of reconciled rows
//! - `desk`: orchestration against a [`crate::traits::LedgerService`]

pub mod desk;
pub mod groups;
pub mod identifiers;
pub mod resolver;
pub mod tracker;

pub use desk::*;
pub use groups::*;
pub use identifiers::*;
pub use resolver::*;
pub use tracker::*;
