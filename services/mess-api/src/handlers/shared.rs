//! Shared handler utilities
//!
//! Input bounds and request metrics used across handlers.

use std::time::Instant;

use mess_types::MAX_SCAN_LEN;

use crate::error::ApiError;

// ============================================================================
// Input Validation
// ============================================================================

/// Maximum length for a typed coupon code
pub const MAX_CODE_LEN: usize = 64;

/// Maximum length for a dining hall location
pub const MAX_LOCATION_LEN: usize = 100;

/// Validate a coupon code typed at a staff terminal.
///
/// Only the shape is checked here; existence is the ledger's job.
pub fn validate_code(code: &str) -> Result<&str, ApiError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ApiError::BadRequest("couponCode is required".into()));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(ApiError::BadRequest(format!(
            "couponCode too long (max {MAX_CODE_LEN} chars)"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(
            "couponCode contains invalid characters".into(),
        ));
    }
    Ok(code)
}

/// Validate raw QR scanner output before it is parsed
pub fn validate_scan(raw: &str) -> Result<&str, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::BadRequest("qrData is required".into()));
    }
    if raw.len() > MAX_SCAN_LEN {
        return Err(ApiError::BadRequest(format!(
            "qrData too long (max {MAX_SCAN_LEN} bytes)"
        )));
    }
    Ok(raw)
}

/// Normalize an optional location; blank means "use the default"
pub fn validate_location(location: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(location) = location else {
        return Ok(None);
    };
    let location = location.trim();
    if location.is_empty() {
        return Ok(None);
    }
    if location.chars().count() > MAX_LOCATION_LEN {
        return Err(ApiError::BadRequest(format!(
            "location too long (max {MAX_LOCATION_LEN} chars)"
        )));
    }
    if location.chars().any(char::is_control) {
        return Err(ApiError::BadRequest(
            "location contains control characters".into(),
        ));
    }
    Ok(Some(location.to_string()))
}

// ============================================================================
// Metrics Helpers
// ============================================================================

/// Record HTTP operation duration with result label.
///
/// Labels: operation, result (ok/err)
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    metrics::histogram!(
        "http_request_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

// ============================================================================
// Tests
// ============================================================================
