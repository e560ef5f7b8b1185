//! Human-readable code generation
//!
//! Codes are a fixed prefix, the millisecond timestamp and uppercase hex of
//! random bytes, e.g. `CPN1704067200000A1B2C3D4E5F6`.

use chrono::{DateTime, Utc};
use rand::RngCore;

/// Prefix of coupon codes
pub const COUPON_CODE_PREFIX: &str = "CPN";

/// Prefix of subscription codes
pub const SUBSCRIPTION_CODE_PREFIX: &str = "SUB";

const COUPON_RANDOM_BYTES: usize = 6;
const SUBSCRIPTION_RANDOM_BYTES: usize = 4;

/// Generate a coupon code
pub fn generate_coupon_code(now: DateTime<Utc>) -> String {
    generate_code(COUPON_CODE_PREFIX, now, COUPON_RANDOM_BYTES)
}

/// Generate a subscription code
pub fn generate_subscription_code(now: DateTime<Utc>) -> String {
    generate_code(SUBSCRIPTION_CODE_PREFIX, now, SUBSCRIPTION_RANDOM_BYTES)
}

fn generate_code(prefix: &str, now: DateTime<Utc>, random_bytes: usize) -> String {
    let mut bytes = vec![0u8; random_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "{prefix}{}{}",
        now.timestamp_millis(),
        hex::encode_upper(bytes)
    )
}

/// Check whether a string looks like a coupon code.
///
/// Used to tell a bare code apart from a scanned JSON payload.
pub fn is_coupon_code(s: &str) -> bool {
    let Some(rest) = s.strip_prefix(COUPON_CODE_PREFIX) else {
        return false;
    };
    let hex_len = COUPON_RANDOM_BYTES * 2;
    if rest.len() <= hex_len {
        return false;
    }
    let (millis, random) = rest.split_at(rest.len() - hex_len);
    millis.chars().all(|c| c.is_ascii_digit())
        && random
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}
