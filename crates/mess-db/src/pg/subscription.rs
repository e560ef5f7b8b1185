//! PostgreSQL subscription repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mess_types::{
    PaymentStatus, RemindersSent, Subscription, SubscriptionId, SubscriptionStatus, UserId,
};

use super::{convert_all, convert_opt};
use crate::error::DbResult;
use crate::models::SubscriptionRow;
use crate::repo::{
    ConfirmPayment, CreateSubscription, StatusTotals, SubscriptionFilter, SubscriptionRepository,
};

pub(crate) const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, code, start_date, end_date, \
     status, total_coupons, used_coupons, remaining_coupons, payment_status, payment_method, \
     amount_paid, transaction_id, payment_date, reminder_seven_days, reminder_three_days, \
     reminder_on_expiry, last_reminder_sent, is_active, notes, created_at, updated_at";

/// PostgreSQL subscription repository
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    /// Create a new subscription repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn find_by_id(&self, id: SubscriptionId) -> DbResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn find_by_user_id(
        &self,
        user_id: UserId,
        status: Option<SubscriptionStatus>,
    ) -> DbResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id.0)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn list(&self, filter: SubscriptionFilter) -> DbResult<(Vec<Subscription>, i64)> {
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((convert_all(rows)?, total))
    }

    async fn create(&self, sub: CreateSubscription) -> DbResult<Subscription> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            INSERT INTO subscriptions (id, user_id, plan_id, code, start_date, end_date,
                                       total_coupons, used_coupons, remaining_coupons,
                                       amount_paid, payment_method)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $7, $8, $9)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(sub.id.0)
        .bind(sub.user_id.0)
        .bind(sub.plan_id.0)
        .bind(&sub.code)
        .bind(sub.start_date)
        .bind(sub.end_date)
        .bind(sub.total_coupons)
        .bind(sub.amount_paid)
        .bind(sub.payment_method.map(|m| m.as_str()))
        .fetch_one(&self.pool)
        .await?;

        Ok(Subscription::try_from(row)?)
    }

    async fn delete(&self, id: SubscriptionId) -> DbResult<()> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn transition_status(
        &self,
        id: SubscriptionId,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> DbResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET status = $3, is_active = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(!to.is_terminal())
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn confirm_payment(
        &self,
        id: SubscriptionId,
        payment: ConfirmPayment,
    ) -> DbResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET status = 'active', payment_status = 'paid', payment_method = $2,
                transaction_id = $3, amount_paid = $4, payment_date = $5,
                is_active = TRUE, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(payment.method.as_str())
        .bind(&payment.transaction_id)
        .bind(payment.amount_paid)
        .bind(payment.paid_at)
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn update_payment_status(
        &self,
        id: SubscriptionId,
        status: PaymentStatus,
    ) -> DbResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET payment_status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn update_end_date(
        &self,
        id: SubscriptionId,
        end_date: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET end_date = $2,
                reminder_seven_days = FALSE, reminder_three_days = FALSE,
                reminder_on_expiry = FALSE, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'active')
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(end_date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE coupons SET expiry_date = $2 WHERE subscription_id = $1 AND status = 'available'",
        )
        .bind(id.0)
        .bind(end_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Subscription::try_from(row)?))
    }

    async fn record_reminder(
        &self,
        id: SubscriptionId,
        sent: RemindersSent,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET reminder_seven_days = $2, reminder_three_days = $3, reminder_on_expiry = $4,
                last_reminder_sent = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(sent.seven_days)
        .bind(sent.three_days)
        .bind(sent.on_expiry)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel_with_coupons(
        &self,
        id: SubscriptionId,
    ) -> DbResult<Option<(Subscription, u64)>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'active')
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        // Coupons already flipped to used are untouched by the status guard
        let cancelled = sqlx::query(
            "UPDATE coupons SET status = 'cancelled' WHERE subscription_id = $1 AND status = 'available'",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(Some((Subscription::try_from(row)?, cancelled)))
    }

    async fn totals_by_status(&self) -> DbResult<Vec<StatusTotals>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*), COALESCE(SUM(amount_paid), 0)::BIGINT
            FROM subscriptions
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count, revenue)| -> DbResult<StatusTotals> {
                Ok(StatusTotals {
                    status: status.parse::<SubscriptionStatus>()?,
                    count,
                    revenue,
                })
            })
            .collect()
    }
}
