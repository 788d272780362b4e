//! Currency amounts travel as decimal text end to end: parsed into
//! `rust_decimal::Decimal` for comparison, persisted back as canonical text.
//! Floating point never touches an amount.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::errors::WorkflowError;

/// Parses a user-supplied amount, stripping thousands separators first, so
/// `"12,000.00"` and `"12000.00"` are the same value. Empty, malformed, and
/// negative inputs are rejected.
pub fn parse_amount(raw: &str) -> Result<Decimal, WorkflowError> {
    let cleaned: String = raw.trim().chars().filter(|ch| *ch != ',').collect();
    if cleaned.is_empty() {
        return Err(WorkflowError::validation("amount is required"));
    }

    let amount = Decimal::from_str(&cleaned)
        .map_err(|_| WorkflowError::validation(format!("amount `{raw}` is not a decimal number")))?;

    if amount.is_sign_negative() {
        return Err(WorkflowError::validation(format!("amount `{raw}` must not be negative")));
    }

    Ok(amount)
}

/// Canonical storage text. `Decimal` preserves scale, so `"12,000.00"`
/// round-trips as `"12000.00"`, not `"12000"`.
pub fn format_amount(amount: &Decimal) -> String {
    amount.to_string()
}
