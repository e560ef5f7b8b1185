//! Coupon ledger
//!
//! Owns every coupon of every subscription: mints them in one batch, decides
//! whether a coupon can still be redeemed, and flips statuses with
//! conditional updates so concurrent callers cannot both win.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use mess_db::{
    AttendanceRepository, CouponFilter, CouponRepository, CouponUsage, CreateAttendance,
    CreateCoupon, RedeemCoupon, RedeemOutcome, RedemptionRepository,
};
use mess_types::{
    generate_coupon_code, Coupon, CouponId, CouponQrPayload, CouponStatus, CouponValidity,
    MealAttendance, Principal, Subscription, SubscriptionId, SubscriptionPlan, UserId,
};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::{MessError, MessResult};

/// Coupon together with the record its QR code encodes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponView {
    pub coupon: Coupon,
    pub qr_payload: CouponQrPayload,
    /// JSON string to render as the QR image
    pub qr_data: String,
}

/// Coupon usage across the whole hall
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_coupons: i64,
    pub used_coupons: i64,
    pub available_coupons: i64,
    pub expired_coupons: i64,
    pub cancelled_coupons: i64,
    /// Redemptions since midnight UTC
    pub today_usage: i64,
    /// Used coupons as a percentage of all coupons, two decimals
    pub usage_rate: f64,
}

/// A coupon flipped to used, with the counters and check-in written alongside
#[derive(Debug, Clone)]
pub struct ConsumedCoupon {
    pub coupon: Coupon,
    pub subscription: Subscription,
    pub attendance: MealAttendance,
}

/// Coupon ledger
pub struct CouponLedger {
    coupons: Arc<dyn CouponRepository>,
    attendance: Arc<dyn AttendanceRepository>,
    redemptions: Arc<dyn RedemptionRepository>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl CouponLedger {
    /// Create a new coupon ledger
    pub fn new(
        coupons: Arc<dyn CouponRepository>,
        attendance: Arc<dyn AttendanceRepository>,
        redemptions: Arc<dyn RedemptionRepository>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            coupons,
            attendance,
            redemptions,
            clock,
            config,
        }
    }

    /// Issue the plan's coupons for a subscription.
    ///
    /// Writes coupons with sequence numbers `1..=N`, all available and
    /// expiring with the subscription. The batch is all-or-nothing; a code
    /// collision regenerates every code and retries.
    pub async fn mint(
        &self,
        subscription: &Subscription,
        plan: &SubscriptionPlan,
    ) -> MessResult<Vec<Coupon>> {
        if subscription.status.is_terminal() {
            return Err(MessError::SubscriptionInactive);
        }

        let count = plan.total_coupons;
        if count < 1 {
            return Err(MessError::InvalidInput(
                "a plan must grant at least 1 coupon".to_string(),
            ));
        }

        for attempt in 1..=self.config.code_attempts {
            let batch = self.build_batch(subscription, count);

            match self.coupons.insert_batch(batch).await {
                Ok(coupons) => {
                    tracing::info!(
                        subscription_id = %subscription.id,
                        count = coupons.len(),
                        "Coupons minted"
                    );
                    return Ok(coupons);
                }
                Err(e) if e.is_conflict() => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        attempt,
                        error = %e,
                        "Coupon code collision, regenerating batch"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        subscription_id = %subscription.id,
                        count,
                        error = %e,
                        "Failed to mint coupons"
                    );
                    return Err(MessError::Persistence(e.to_string()));
                }
            }
        }

        Err(MessError::Persistence(format!(
            "could not generate unique coupon codes after {} attempts",
            self.config.code_attempts
        )))
    }

    fn build_batch(&self, subscription: &Subscription, count: i32) -> Vec<CreateCoupon> {
        let now = self.clock.now();
        let mut seen = HashSet::with_capacity(count as usize);

        (1..=count)
            .map(|sequence| {
                let mut code = generate_coupon_code(now);
                while !seen.insert(code.clone()) {
                    code = generate_coupon_code(now);
                }
                CreateCoupon {
                    id: CouponId::new(),
                    subscription_id: subscription.id,
                    user_id: subscription.user_id,
                    code,
                    sequence,
                    meal_type: None,
                    expiry_date: Some(subscription.end_date),
                }
            })
            .collect()
    }

    /// Find a coupon by its code
    pub async fn lookup(&self, code: &str) -> MessResult<Coupon> {
        self.coupons
            .find_by_code(code.trim())
            .await?
            .ok_or(MessError::NotFound("coupon"))
    }

    /// Decide whether a coupon can be redeemed now.
    ///
    /// An available coupon found past its expiry is flipped to `expired`
    /// in storage here; nothing else ever expires coupons.
    pub async fn check_validity(&self, coupon: &mut Coupon) -> MessResult<CouponValidity> {
        let now = self.clock.now();
        let validity = coupon.validity(now);
        if validity != CouponValidity::Expired {
            return Ok(validity);
        }

        if self.coupons.expire(coupon.id).await? {
            tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon expired");
            coupon.status = CouponStatus::Expired;
            return Ok(validity);
        }

        // Someone else changed it first
        match self.coupons.find_by_id(coupon.id).await? {
            Some(current) => {
                *coupon = current;
                Ok(coupon.validity(now))
            }
            None => Err(MessError::NotFound("coupon")),
        }
    }

    /// Consume a coupon for the given check-in.
    ///
    /// The status flip, the subscription counter bump and the attendance
    /// append commit together, and only while the subscription is active.
    /// Succeeds for exactly one caller per coupon; every other caller gets
    /// `InvalidCoupon`.
    pub async fn mark_used(
        &self,
        coupon: &Coupon,
        attendance: CreateAttendance,
    ) -> MessResult<ConsumedCoupon> {
        if attendance.coupon_id != coupon.id {
            return Err(MessError::InvalidInput(
                "attendance record belongs to another coupon".to_string(),
            ));
        }

        let validity = coupon.validity(attendance.checked_in_at);
        if !validity.is_valid() {
            return Err(MessError::InvalidCoupon(validity.reason().to_string()));
        }

        let usage = CouponUsage {
            used_by: attendance.verified_by,
            location: attendance.location.clone(),
            used_at: attendance.checked_in_at,
        };

        let outcome = self
            .redemptions
            .redeem(RedeemCoupon {
                coupon_id: coupon.id,
                subscription_id: coupon.subscription_id,
                usage,
                attendance,
            })
            .await?;

        match outcome {
            RedeemOutcome::Redeemed {
                coupon,
                subscription,
                attendance,
            } => Ok(ConsumedCoupon {
                coupon,
                subscription,
                attendance,
            }),
            RedeemOutcome::CouponUnavailable => Err(MessError::InvalidCoupon(
                CouponValidity::Unavailable.reason().to_string(),
            )),
            RedeemOutcome::SubscriptionInactive => Err(MessError::SubscriptionInactive),
        }
    }

    /// Cancel every still-available coupon of a subscription. Idempotent.
    pub async fn cancel_available(&self, subscription_id: SubscriptionId) -> MessResult<u64> {
        let cancelled = self.coupons.cancel_available(subscription_id).await?;
        if cancelled > 0 {
            tracing::info!(subscription_id = %subscription_id, cancelled, "Coupons cancelled");
        }
        Ok(cancelled)
    }

    /// A user's coupons, ordered by sequence number
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        filter: CouponFilter,
    ) -> MessResult<Vec<Coupon>> {
        Ok(self.coupons.find_by_user(user_id, filter).await?)
    }

    /// Every coupon of a subscription
    pub async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> MessResult<Vec<Coupon>> {
        Ok(self.coupons.find_by_subscription(subscription_id).await?)
    }

    /// Get a coupon with its QR payload. Owner, staff or admin only.
    pub async fn get(&self, requester: &Principal, id: CouponId) -> MessResult<CouponView> {
        let coupon = self
            .coupons
            .find_by_id(id)
            .await?
            .ok_or(MessError::NotFound("coupon"))?;

        let is_owner = coupon.user_id == requester.user_id;
        if !is_owner && !requester.is_staff_or_admin() {
            return Err(MessError::Forbidden);
        }

        let student_id = if is_owner {
            requester.student_id.clone()
        } else {
            None
        };
        let qr_payload = CouponQrPayload::for_coupon(&coupon, student_id);
        let qr_data = qr_payload.to_json();

        Ok(CouponView {
            coupon,
            qr_payload,
            qr_data,
        })
    }

    /// Coupon counts and today's redemptions. Admin only.
    pub async fn usage_stats(&self, requester: &Principal) -> MessResult<UsageStats> {
        if !requester.is_admin() {
            return Err(MessError::Forbidden);
        }

        let counts = self.coupons.count_by_status().await?;

        let now = self.clock.now();
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let today_usage = self
            .attendance
            .count_between(midnight, midnight + Duration::days(1))
            .await?;

        let total = counts.total();
        Ok(UsageStats {
            total_coupons: total,
            used_coupons: counts.used,
            available_coupons: counts.available,
            expired_coupons: counts.expired,
            cancelled_coupons: counts.cancelled,
            today_usage,
            usage_rate: usage_rate(counts.used, total),
        })
    }
}

/// Percentage of used coupons rounded to two decimals; zero when none exist
pub(crate) fn usage_rate(used: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = used as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}
