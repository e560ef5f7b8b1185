//! Repository traits
//!
//! Define async repository interfaces for database operations. Every
//! conditional update returns `None` (or `false`) when the guard did not
//! match, so callers can tell a lost race from a storage failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mess_types::{
    AttendanceId, Coupon, CouponId, CouponStatus, MealAttendance, MealType, PaymentMethod,
    PaymentStatus, PlanId, RemindersSent, Subscription, SubscriptionId, SubscriptionPlan,
    SubscriptionStatus, UserId,
};

use crate::error::DbResult;

/// Plan repository trait
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Find a plan by ID
    async fn find_by_id(&self, id: PlanId) -> DbResult<Option<SubscriptionPlan>>;

    /// List plans ordered by price, optionally only purchasable ones
    async fn list(&self, active_only: bool) -> DbResult<Vec<SubscriptionPlan>>;

    /// Create a plan; `Conflict` if the name is taken
    async fn create(&self, plan: CreatePlan) -> DbResult<SubscriptionPlan>;

    /// Apply a partial update
    async fn update(&self, id: PlanId, changes: UpdatePlan) -> DbResult<Option<SubscriptionPlan>>;

    /// Delete a plan no subscription references. False if nothing was deleted.
    async fn delete_unreferenced(&self, id: PlanId) -> DbResult<bool>;
}

/// Create plan input
#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub id: PlanId,
    pub name: String,
    pub description: String,
    pub duration_days: i32,
    pub total_coupons: i32,
    pub price: i64,
    pub meal_types: Vec<MealType>,
    pub meals_per_day: i32,
    pub is_active: bool,
    pub features: Vec<String>,
}

/// Partial plan update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_days: Option<i32>,
    pub total_coupons: Option<i32>,
    pub price: Option<i64>,
    pub meal_types: Option<Vec<MealType>>,
    pub meals_per_day: Option<i32>,
    pub is_active: Option<bool>,
    pub features: Option<Vec<String>>,
}

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find a subscription by ID
    async fn find_by_id(&self, id: SubscriptionId) -> DbResult<Option<Subscription>>;

    /// Find a user's subscriptions, newest first
    async fn find_by_user_id(
        &self,
        user_id: UserId,
        status: Option<SubscriptionStatus>,
    ) -> DbResult<Vec<Subscription>>;

    /// Page through all subscriptions, newest first, with the total match count
    async fn list(&self, filter: SubscriptionFilter) -> DbResult<(Vec<Subscription>, i64)>;

    /// Create a new subscription; `Conflict` if the code is taken
    async fn create(&self, sub: CreateSubscription) -> DbResult<Subscription>;

    /// Delete a subscription that never became visible (mint compensation)
    async fn delete(&self, id: SubscriptionId) -> DbResult<()>;

    /// Move the status from `from` to `to` if it is still `from`
    async fn transition_status(
        &self,
        id: SubscriptionId,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> DbResult<Option<Subscription>>;

    /// Settle payment: pending becomes active and payment becomes paid
    async fn confirm_payment(
        &self,
        id: SubscriptionId,
        payment: ConfirmPayment,
    ) -> DbResult<Option<Subscription>>;

    /// Update payment status only
    async fn update_payment_status(
        &self,
        id: SubscriptionId,
        status: PaymentStatus,
    ) -> DbResult<Option<Subscription>>;

    /// Move the end date of a pending or active subscription.
    ///
    /// Available coupons follow the new date and reminder flags reset, in the
    /// same transaction.
    async fn update_end_date(
        &self,
        id: SubscriptionId,
        end_date: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>>;

    /// Persist which expiry reminders have gone out
    async fn record_reminder(
        &self,
        id: SubscriptionId,
        sent: RemindersSent,
        at: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Cancel a pending or active subscription and every still-available
    /// coupon under it, in one transaction.
    ///
    /// Returns the cancelled subscription and the number of coupons cancelled,
    /// or `None` if the subscription was not cancellable.
    async fn cancel_with_coupons(&self, id: SubscriptionId)
        -> DbResult<Option<(Subscription, u64)>>;

    /// Subscription count and summed `amount_paid` per stored status
    async fn totals_by_status(&self) -> DbResult<Vec<StatusTotals>>;
}

/// Count and revenue of the subscriptions in one status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTotals {
    pub status: SubscriptionStatus,
    pub count: i64,
    pub revenue: i64,
}

/// Subscription list filter
#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    pub status: Option<SubscriptionStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: 10,
            offset: 0,
        }
    }
}

/// Create subscription input. Stored as pending with payment pending.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub code: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_coupons: i32,
    pub amount_paid: i64,
    pub payment_method: Option<PaymentMethod>,
}

/// Payment settlement input
#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub amount_paid: i64,
    pub paid_at: DateTime<Utc>,
}

/// Coupon repository trait
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Insert a batch of coupons in one transaction.
    ///
    /// Either every coupon is written or none is; a duplicate code fails the
    /// whole batch with `Conflict`.
    async fn insert_batch(&self, coupons: Vec<CreateCoupon>) -> DbResult<Vec<Coupon>>;

    /// Find a coupon by ID
    async fn find_by_id(&self, id: CouponId) -> DbResult<Option<Coupon>>;

    /// Find a coupon by code
    async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>>;

    /// All coupons of a subscription, ordered by sequence
    async fn find_by_subscription(&self, subscription_id: SubscriptionId)
        -> DbResult<Vec<Coupon>>;

    /// A user's coupons, ordered by sequence
    async fn find_by_user(&self, user_id: UserId, filter: CouponFilter) -> DbResult<Vec<Coupon>>;

    /// Flip an available coupon to expired. False if it was no longer available.
    async fn expire(&self, id: CouponId) -> DbResult<bool>;

    /// Cancel every still-available coupon of a subscription
    async fn cancel_available(&self, subscription_id: SubscriptionId) -> DbResult<u64>;

    /// Coupon counts by status across all subscriptions
    async fn count_by_status(&self) -> DbResult<CouponCounts>;
}

/// Create coupon input
#[derive(Debug, Clone)]
pub struct CreateCoupon {
    pub id: CouponId,
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub code: String,
    pub sequence: i32,
    pub meal_type: Option<MealType>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Coupon list filter
#[derive(Debug, Clone, Default)]
pub struct CouponFilter {
    pub status: Option<CouponStatus>,
    pub subscription_id: Option<SubscriptionId>,
}

/// Who used a coupon, where and when
#[derive(Debug, Clone)]
pub struct CouponUsage {
    pub used_by: UserId,
    pub location: String,
    pub used_at: DateTime<Utc>,
}

/// Coupon counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CouponCounts {
    pub available: i64,
    pub used: i64,
    pub expired: i64,
    pub cancelled: i64,
}

impl CouponCounts {
    /// All coupons regardless of status
    pub fn total(&self) -> i64 {
        self.available + self.used + self.expired + self.cancelled
    }
}

/// Attendance repository trait
///
/// Read-only; records are appended by the redemption transaction.
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// A user's attendance, newest first
    async fn find_by_user(&self, user_id: UserId, limit: i64) -> DbResult<Vec<MealAttendance>>;

    /// Attendance recorded against a subscription, newest first
    async fn find_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> DbResult<Vec<MealAttendance>>;

    /// Count check-ins in `[from, to)`
    async fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<i64>;
}

/// Create attendance input
#[derive(Debug, Clone)]
pub struct CreateAttendance {
    pub id: AttendanceId,
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub coupon_id: CouponId,
    pub meal_type: MealType,
    pub checked_in_at: DateTime<Utc>,
    pub verified_by: UserId,
    pub location: String,
}

/// Redemption repository trait
///
/// Redemption touches three tables and must commit as one unit.
#[async_trait]
pub trait RedemptionRepository: Send + Sync {
    /// In one transaction: require the subscription to be active and not past
    /// its end date, flip the coupon from available to used, bump the
    /// subscription counters and append the attendance record.
    async fn redeem(&self, redemption: RedeemCoupon) -> DbResult<RedeemOutcome>;
}

/// Redemption input
#[derive(Debug, Clone)]
pub struct RedeemCoupon {
    pub coupon_id: CouponId,
    pub subscription_id: SubscriptionId,
    pub usage: CouponUsage,
    pub attendance: CreateAttendance,
}

/// Result of a redemption transaction
#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    /// All writes committed
    Redeemed {
        coupon: Coupon,
        subscription: Subscription,
        attendance: MealAttendance,
    },
    /// The coupon was no longer available; nothing was written
    CouponUnavailable,
    /// The subscription was not active; nothing was written
    SubscriptionInactive,
}
