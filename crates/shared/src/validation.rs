//! Common validation utilities.

use validator::ValidationError;

/// Validates that a percentage adjustment is within range (-100 to 100).
pub fn validate_adjustment_percentage(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (-100.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(validation_error("percentage_range", "Percentage must be between -100 and 100"))
    }
}

/// Validates that a price is finite and non-negative.
pub fn validate_price(price: f64) -> Result<(), ValidationError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(validation_error("price_range", "Price must be a non-negative amount"))
    }
}

/// Validates that a rollout percentage is within range (0 to 100).
pub fn validate_rollout_percentage(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(validation_error("rollout_percentage_range", "Rollout percentage must be between 0 and 100"))
    }
}

/// Clamps a rollout percentage into 0..=100; non-finite values become 0.
pub fn clamp_rollout_percentage(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Builds a validation error with a message.
pub fn validation_error(code: &'static str, message: impl Into<String>) -> ValidationError {
    let message: String = message.into();
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}
