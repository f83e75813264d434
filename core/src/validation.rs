//! Shared request validators. All of these fail before any side effect and
//! carry the offending field or value as `ErrorInfo` metadata.

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;

pub fn require_string(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AutomationError::required_field(field));
    }
    Ok(())
}

/// Dimensions (widths, heights, sizes) must be finite and strictly positive.
pub fn require_dimension(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AutomationError::invalid_argument_with(
            reason::INVALID_DIMENSION,
            format!("{field} must be a finite positive number, got {value}"),
            [("field", field.to_string()), ("value", value.to_string())],
        ));
    }
    Ok(())
}

/// Coordinates may be negative (multi-display layouts) but must be finite.
pub fn require_coordinate(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(AutomationError::invalid_argument_with(
            reason::INVALID_COORDINATE,
            format!("{field} must be finite, got {value}"),
            [("field", field.to_string()), ("value", value.to_string())],
        ));
    }
    Ok(())
}

/// Paddings, durations and other scalar extents: finite and non-negative.
pub fn require_non_negative(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AutomationError::invalid_argument_with(
            reason::INVALID_DIMENSION,
            format!("{field} must be finite and non-negative, got {value}"),
            [("field", field.to_string()), ("value", value.to_string())],
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_required_string_reports_the_field() {
        let err = require_string("display_name", "").unwrap_err();
        assert_eq!(err.reason(), reason::REQUIRED_FIELD_MISSING);
        assert!(require_string("display_name", "x").is_ok());
    }

    #[test]
    fn dimensions_must_be_finite_and_positive() {
        assert!(require_dimension("width", 1.0).is_ok());
        for bad in [0.0, -4.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = require_dimension("width", bad).unwrap_err();
            assert_eq!(err.reason(), reason::INVALID_DIMENSION);
        }
    }

    #[test]
    fn coordinates_may_be_negative_but_not_nan() {
        assert!(require_coordinate("x", -1024.0).is_ok());
        assert!(require_coordinate("x", f64::NAN).is_err());
        assert!(require_coordinate("x", f64::INFINITY).is_err());
    }

    #[test]
    fn non_negative_accepts_zero() {
        assert!(require_non_negative("padding", 0.0).is_ok());
        assert!(require_non_negative("padding", -0.1).is_err());
    }
}
