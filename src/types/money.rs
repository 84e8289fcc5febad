//! Monetary amount helpers
//!
//! Balances and amounts carry a fixed scale of two fractional digits. The
//! durable store keeps them as integer cents.

use rust_decimal::Decimal;

/// Number of fractional digits every stored amount carries
pub const SCALE: u32 = 2;

/// Whether `amount` is usable as a deposit, withdrawal, or transfer amount
///
/// Accepts strictly positive values with at most two significant fractional
/// digits. Trailing zeros are ignored, so `1.500` is accepted.
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.normalize().scale() <= SCALE
}

/// Rescale to exactly two fractional digits
///
/// Only called on values that already passed [`is_valid_amount`] or came out
/// of the store, so no rounding takes place.
pub fn to_scale(amount: Decimal) -> Decimal {
    let mut scaled = amount;
    scaled.rescale(SCALE);
    scaled
}

/// Convert to integer cents for storage
///
/// Returns `None` if the value does not fit an `i64`.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    i64::try_from(to_scale(amount).mantissa()).ok()
}

/// Convert stored integer cents back to a decimal
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, SCALE)
}
