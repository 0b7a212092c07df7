//! Major/minor currency unit conversion.
//!
//! Amounts cross the HTTP boundary in major units (rupees) and are converted
//! to integer minor units (paise) on ingress. Nothing past the handlers does
//! arithmetic on floats.

use crate::error::AppError;

/// Minor units per major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Smallest accepted top-up, 50.00 in major units.
pub const MIN_TOPUP_MINOR_UNITS: i64 = 5_000;

/// Convert a major-unit amount to minor units, rounding to the nearest unit.
///
/// Rejects NaN, infinities and values outside the `i64` range. Sign and
/// minimum checks belong to the individual operations.
pub fn to_minor_units(amount: f64) -> Result<i64, AppError> {
    if !amount.is_finite() {
        return Err(AppError::InvalidAmount(
            "Amount must be a finite number".to_string(),
        ));
    }

    let minor = (amount * MINOR_PER_MAJOR as f64).round();
    if minor >= i64::MAX as f64 || minor <= i64::MIN as f64 {
        return Err(AppError::InvalidAmount("Amount is out of range".to_string()));
    }

    Ok(minor as i64)
}

/// Major-unit representation for responses.
pub fn to_major_units(minor: i64) -> f64 {
    minor as f64 / MINOR_PER_MAJOR as f64
}
