//! Meal attendance records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CouponId, MealType, SubscriptionId, UserId};

/// Location recorded when a terminal does not send one
pub const DEFAULT_LOCATION: &str = "Main Mess";

/// Unique attendance record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceId(pub Uuid);

impl AttendanceId {
    /// Create a new random attendance ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttendanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttendanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable fact: one successful redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealAttendance {
    pub id: AttendanceId,
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub coupon_id: CouponId,
    pub meal_type: MealType,
    /// Check-in instant
    pub checked_in_at: DateTime<Utc>,
    /// Staff member who verified the coupon
    pub verified_by: UserId,
    pub location: String,
}
