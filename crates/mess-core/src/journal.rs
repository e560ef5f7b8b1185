//! Attendance journal
//!
//! Append-only. Entries are written only by the redemption transaction that
//! consumes the coupon; the journal builds the record and reads entries back.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use mess_db::{AttendanceRepository, CreateAttendance};
use mess_types::{AttendanceId, Coupon, MealAttendance, MealType, SubscriptionId, UserId};

use crate::config::LedgerConfig;
use crate::MessResult;

/// Default number of entries returned for a user
pub const DEFAULT_HISTORY_LIMIT: i64 = 30;

/// Attendance journal
pub struct AttendanceJournal {
    attendance: Arc<dyn AttendanceRepository>,
    config: LedgerConfig,
}

impl AttendanceJournal {
    /// Create a new journal
    pub fn new(attendance: Arc<dyn AttendanceRepository>, config: LedgerConfig) -> Self {
        Self { attendance, config }
    }

    /// Build the record for a coupon being redeemed
    pub fn entry_for(
        &self,
        coupon: &Coupon,
        meal_type: MealType,
        staff_id: UserId,
        location: Option<&str>,
        at: DateTime<Utc>,
    ) -> CreateAttendance {
        CreateAttendance {
            id: AttendanceId::new(),
            user_id: coupon.user_id,
            subscription_id: coupon.subscription_id,
            coupon_id: coupon.id,
            meal_type,
            checked_in_at: at,
            verified_by: staff_id,
            location: self.config.location_or_default(location),
        }
    }

    /// A user's most recent check-ins
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> MessResult<Vec<MealAttendance>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
        Ok(self.attendance.find_by_user(user_id, limit).await?)
    }

    /// Every check-in against a subscription
    pub async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> MessResult<Vec<MealAttendance>> {
        Ok(self.attendance.find_by_subscription(subscription_id).await?)
    }

    /// Check-ins in `[from, to)`
    pub async fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> MessResult<i64> {
        Ok(self.attendance.count_between(from, to).await?)
    }
}
