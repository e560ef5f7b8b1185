//! PostgreSQL redemption transaction
//!
//! Lock order is subscription row first, then coupon row. Cancellation
//! takes the same order, so the two never deadlock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mess_types::{Coupon, Subscription};

use super::attendance::insert_attendance;
use super::coupon::COUPON_COLUMNS;
use super::subscription::SUBSCRIPTION_COLUMNS;
use crate::error::DbResult;
use crate::models::{CouponRow, SubscriptionRow};
use crate::repo::{RedeemCoupon, RedeemOutcome, RedemptionRepository};

/// PostgreSQL redemption repository
#[derive(Clone)]
pub struct PgRedemptionRepository {
    pool: PgPool,
}

impl PgRedemptionRepository {
    /// Create a new redemption repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RedemptionRepository for PgRedemptionRepository {
    async fn redeem(&self, redemption: RedeemCoupon) -> DbResult<RedeemOutcome> {
        let RedeemCoupon {
            coupon_id,
            subscription_id,
            usage,
            attendance,
        } = redemption;

        let mut tx = self.pool.begin().await?;

        let guard: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT status, end_date FROM subscriptions WHERE id = $1 FOR UPDATE",
        )
        .bind(subscription_id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let usable = matches!(
            &guard,
            Some((status, end_date)) if status == "active" && *end_date >= usage.used_at
        );
        if !usable {
            tx.rollback().await?;
            return Ok(RedeemOutcome::SubscriptionInactive);
        }

        let coupon = sqlx::query_as::<_, CouponRow>(&format!(
            r#"
            UPDATE coupons
            SET status = 'used', used_at = $3, used_by = $4, usage_location = $5
            WHERE id = $1 AND subscription_id = $2 AND status = 'available'
            RETURNING {COUPON_COLUMNS}
            "#
        ))
        .bind(coupon_id.0)
        .bind(subscription_id.0)
        .bind(usage.used_at)
        .bind(usage.used_by.0)
        .bind(&usage.location)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(coupon) = coupon else {
            tx.rollback().await?;
            return Ok(RedeemOutcome::CouponUnavailable);
        };

        let subscription = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET used_coupons = used_coupons + 1,
                remaining_coupons = total_coupons - (used_coupons + 1),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id.0)
        .fetch_one(&mut *tx)
        .await?;

        let attendance = insert_attendance(&mut *tx, &attendance).await?;

        tx.commit().await?;

        Ok(RedeemOutcome::Redeemed {
            coupon: Coupon::try_from(coupon)?,
            subscription: Subscription::try_from(subscription)?,
            attendance,
        })
    }
}
