//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive and
//! convert into the shared domain types. Enum columns are stored as text.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use mess_types::{
    AttendanceId, Coupon, CouponId, MealAttendance, MealType, MessTypeError, PaymentMethod,
    PlanId, RemindersSent, Subscription, SubscriptionId, SubscriptionPlan, UserId,
};

/// Plan row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub duration_days: i32,
    pub total_coupons: i32,
    pub price: i64,
    pub meal_types: Vec<String>,
    pub meals_per_day: i32,
    pub is_active: bool,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription row from the database
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub code: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub total_coupons: i32,
    pub used_coupons: i32,
    pub remaining_coupons: i32,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub amount_paid: i64,
    pub transaction_id: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub reminder_seven_days: bool,
    pub reminder_three_days: bool,
    pub reminder_on_expiry: bool,
    pub last_reminder_sent: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Coupon row from the database
#[derive(Debug, Clone, FromRow)]
pub struct CouponRow {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub sequence: i32,
    pub meal_type: Option<String>,
    pub status: String,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<Uuid>,
    pub usage_location: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Attendance row from the database
#[derive(Debug, Clone, FromRow)]
pub struct AttendanceRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub coupon_id: Uuid,
    pub meal_type: String,
    pub checked_in_at: DateTime<Utc>,
    pub verified_by: Uuid,
    pub location: String,
}

// Conversion implementations from Row types to mess-types domain types

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = MessTypeError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let meal_types = row
            .meal_types
            .iter()
            .map(|m| m.parse::<MealType>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: PlanId(row.id),
            name: row.name,
            description: row.description,
            duration_days: row.duration_days,
            total_coupons: row.total_coupons,
            price: row.price,
            meal_types,
            meals_per_day: row.meals_per_day,
            is_active: row.is_active,
            features: row.features,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = MessTypeError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let mut subscription = Self {
            id: SubscriptionId(row.id),
            user_id: UserId(row.user_id),
            plan_id: PlanId(row.plan_id),
            code: row.code,
            start_date: row.start_date,
            end_date: row.end_date,
            status: row.status.parse()?,
            total_coupons: row.total_coupons,
            used_coupons: row.used_coupons,
            remaining_coupons: row.remaining_coupons,
            payment_status: row.payment_status.parse()?,
            payment_method: row
                .payment_method
                .as_deref()
                .map(str::parse::<PaymentMethod>)
                .transpose()?,
            amount_paid: row.amount_paid,
            transaction_id: row.transaction_id,
            payment_date: row.payment_date,
            reminders_sent: RemindersSent {
                seven_days: row.reminder_seven_days,
                three_days: row.reminder_three_days,
                on_expiry: row.reminder_on_expiry,
            },
            last_reminder_sent: row.last_reminder_sent,
            is_active: row.is_active,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        // Derived fields follow the stored counters and status
        subscription.recompute_counters();
        Ok(subscription)
    }
}

impl TryFrom<CouponRow> for Coupon {
    type Error = MessTypeError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CouponId(row.id),
            subscription_id: SubscriptionId(row.subscription_id),
            user_id: UserId(row.user_id),
            code: row.code,
            sequence: row.sequence,
            meal_type: row
                .meal_type
                .as_deref()
                .map(str::parse::<MealType>)
                .transpose()?,
            status: row.status.parse()?,
            used_at: row.used_at,
            used_by: row.used_by.map(UserId),
            usage_location: row.usage_location,
            expiry_date: row.expiry_date,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<AttendanceRow> for MealAttendance {
    type Error = MessTypeError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AttendanceId(row.id),
            user_id: UserId(row.user_id),
            subscription_id: SubscriptionId(row.subscription_id),
            coupon_id: CouponId(row.coupon_id),
            meal_type: row.meal_type.parse()?,
            checked_in_at: row.checked_in_at,
            verified_by: UserId(row.verified_by),
            location: row.location,
        })
    }
}
