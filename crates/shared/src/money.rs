//! Monetary helpers.
//!
//! Prices travel as `f64` but are always normalised to two decimal places
//! (cents) before they leave the engine.

/// Rounds a monetary amount to two decimal places, half away from zero.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Applies a percentage discount (`percent` of `price` is subtracted).
///
/// Negative percentages act as surcharges. The result never drops below
/// zero and is rounded to cents.
pub fn apply_percentage(price: f64, percent: f64) -> f64 {
    let delta = price * (percent / 100.0);
    round_cents((price - delta).max(0.0))
}
