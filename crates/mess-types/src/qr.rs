//! QR payload schema
//!
//! Student apps render this record as a QR code and staff scanners send it
//! back verbatim. Field names are part of the wire contract.

use serde::{Deserialize, Serialize};

use crate::{is_coupon_code, Coupon, MessTypeError};

/// Longest scan accepted, to bound parsing work
pub const MAX_SCAN_LEN: usize = 1024;

/// Record encoded into a coupon's QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponQrPayload {
    #[serde(default)]
    pub coupon_id: String,
    pub coupon_code: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl CouponQrPayload {
    /// Build the payload for a coupon
    pub fn for_coupon(coupon: &Coupon, student_id: Option<String>) -> Self {
        Self {
            coupon_id: coupon.id.to_string(),
            coupon_code: coupon.code.clone(),
            user_id: coupon.user_id.to_string(),
            student_id,
        }
    }

    /// Parse a scanned JSON payload
    pub fn parse(raw: &str) -> Result<Self, MessTypeError> {
        if raw.len() > MAX_SCAN_LEN {
            return Err(MessTypeError::InvalidPayload("payload too long".to_string()));
        }

        let payload: Self = serde_json::from_str(raw)
            .map_err(|e| MessTypeError::InvalidPayload(e.to_string()))?;

        if payload.coupon_code.trim().is_empty() {
            return Err(MessTypeError::InvalidPayload(
                "couponCode is empty".to_string(),
            ));
        }

        Ok(payload)
    }

    /// Serialize to the JSON string placed in the QR code
    pub fn to_json(&self) -> String {
        // A struct of strings cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Check the payload's identifiers against the coupon it names.
    ///
    /// Identifiers left empty by the scanner are not compared.
    pub fn matches(&self, coupon: &Coupon) -> bool {
        (self.coupon_id.is_empty() || self.coupon_id == coupon.id.to_string())
            && (self.user_id.is_empty() || self.user_id == coupon.user_id.to_string())
    }
}

/// What a staff terminal submits for redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponInput {
    /// Code typed or read as plain text
    Code(String),
    /// Decoded QR record
    Qr(CouponQrPayload),
}

impl CouponInput {
    /// Interpret raw scanner output: a bare code or a JSON payload
    pub fn from_scan(raw: &str) -> Result<Self, MessTypeError> {
        let trimmed = raw.trim();
        if is_coupon_code(trimmed) {
            return Ok(Self::Code(trimmed.to_string()));
        }
        CouponQrPayload::parse(trimmed).map(Self::Qr)
    }

    /// The coupon code to look up
    pub fn code(&self) -> &str {
        match self {
            Self::Code(code) => code,
            Self::Qr(payload) => &payload.coupon_code,
        }
    }
}
