//! Column-level invariants checked before any row reaches the database.
//!
//! The same bounds are repeated as SQL `CHECK` constraints in the migration;
//! the Rust check runs first so callers get the violated field and bound
//! instead of a bare SQLite error.

use chrono::{Duration, NaiveDateTime};

use crate::error::StoreError;

pub const TEMPERATURE_MIN_C: f64 = -50.0;
pub const TEMPERATURE_MAX_C: f64 = 100.0;
pub const HUMIDITY_MIN_PCT: f64 = 0.0;
pub const HUMIDITY_MAX_PCT: f64 = 100.0;
pub const LIGHT_MIN_LUX: f64 = 0.0;

pub const ACTION_MAX_LEN: usize = 32;
pub const ALERT_TYPE_MAX_LEN: usize = 64;
pub const COMPONENT_MAX_LEN: usize = 64;

pub fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), StoreError> {
    // NaN fails both comparisons, so it is rejected here as well
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(StoreError::violation(field, format!("{} <= {} <= {}", min, field, max), value))
    }
}

pub fn check_at_least(field: &'static str, value: f64, min: f64) -> Result<(), StoreError> {
    if value >= min && value.is_finite() {
        Ok(())
    } else {
        Err(StoreError::violation(field, format!("{} >= {}", field, min), value))
    }
}

pub fn check_finite(field: &'static str, value: f64) -> Result<(), StoreError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StoreError::violation(field, "a finite number", value))
    }
}

/// Free-form tokens (actions, alert types, component names): non-empty,
/// bounded length, no whitespace.
pub fn check_token(field: &'static str, value: &str, max_len: usize) -> Result<(), StoreError> {
    if value.is_empty() || value.len() > max_len || value.chars().any(char::is_whitespace) {
        return Err(StoreError::violation(
            field,
            format!("a non-empty token without whitespace of at most {} bytes", max_len),
            format!("{:?}", value),
        ));
    }
    Ok(())
}

pub fn check_non_empty(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        Err(StoreError::violation(field, "non-empty text", format!("{:?}", value)))
    } else {
        Ok(())
    }
}

/// Whole days as a `Duration`, for caller-supplied horizons.
pub fn days_span(what: &str, days: i64) -> Result<Duration, StoreError> {
    Duration::try_days(days).ok_or_else(|| StoreError::InvalidParameter(format!("{} out of range: {} days", what, days)))
}

/// `now - span`, refusing spans that reach past the representable calendar.
pub fn checked_since(what: &str, now: NaiveDateTime, span: Duration) -> Result<NaiveDateTime, StoreError> {
    now.checked_sub_signed(span).ok_or_else(|| {
        StoreError::InvalidParameter(format!("{} out of range: {}s before {}", what, span.num_seconds(), now))
    })
}
