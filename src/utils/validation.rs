//! Validation utilities

use bigdecimal::BigDecimal;

use crate::types::*;

/// Validate that an allocation amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> ServiceResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ServiceError::InvalidRequest(
            "Allocated amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate the arguments of a reconcile call
pub fn validate_reconcile_request(
    bank_movement_id: &str,
    vouchers: &[VoucherAllocation],
) -> ServiceResult<()> {
    if bank_movement_id.trim().is_empty() {
        return Err(ServiceError::InvalidRequest(
            "Bank movement ID cannot be empty".to_string(),
        ));
    }

    if vouchers.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "At least one voucher is required".to_string(),
        ));
    }

    for voucher in vouchers {
        if voucher.payment_doctype.trim().is_empty() || voucher.payment_name.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(format!(
                "Voucher '{}:{}' is missing its type or name",
                voucher.payment_doctype, voucher.payment_name
            )));
        }
        validate_positive_amount(&voucher.amount)?;
    }

    Ok(())
}

/// Validate a `type:name` voucher identifier
pub fn validate_identifier(identifier: &str) -> ServiceResult<VoucherKey> {
    VoucherKey::parse(identifier).ok_or_else(|| {
        ServiceError::InvalidRequest(format!(
            "Voucher identifier '{identifier}' is not of the form type:name"
        ))
    })
}
