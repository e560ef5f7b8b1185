//! PostgreSQL coupon repository implementation

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use mess_types::{Coupon, CouponId, SubscriptionId, UserId};

use super::{convert_all, convert_opt};
use crate::error::DbResult;
use crate::models::CouponRow;
use crate::repo::{CouponCounts, CouponFilter, CouponRepository, CreateCoupon};

pub(crate) const COUPON_COLUMNS: &str = "id, subscription_id, user_id, code, sequence, meal_type, \
     status, used_at, used_by, usage_location, expiry_date, created_at";

/// Rows per INSERT statement; keeps bind parameters under the protocol limit
const INSERT_CHUNK: usize = 1_000;

/// PostgreSQL coupon repository
#[derive(Clone)]
pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    /// Create a new coupon repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn insert_batch(&self, coupons: Vec<CreateCoupon>) -> DbResult<Vec<Coupon>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(coupons.len());

        for chunk in coupons.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO coupons (id, subscription_id, user_id, code, sequence, meal_type, expiry_date) ",
            );
            builder.push_values(chunk, |mut b, coupon| {
                b.push_bind(coupon.id.0)
                    .push_bind(coupon.subscription_id.0)
                    .push_bind(coupon.user_id.0)
                    .push_bind(coupon.code.clone())
                    .push_bind(coupon.sequence)
                    .push_bind(coupon.meal_type.map(|m| m.as_str()))
                    .push_bind(coupon.expiry_date);
            });
            builder.push(format!(" RETURNING {COUPON_COLUMNS}"));

            // A failure here drops `tx`, which rolls the whole batch back
            let rows = builder
                .build_query_as::<CouponRow>()
                .fetch_all(&mut *tx)
                .await?;
            inserted.extend(rows);
        }

        tx.commit().await?;

        let mut coupons: Vec<Coupon> = convert_all(inserted)?;
        coupons.sort_by_key(|c| c.sequence);
        Ok(coupons)
    }

    async fn find_by_id(&self, id: CouponId) -> DbResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn find_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> DbResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE subscription_id = $1 ORDER BY sequence"
        ))
        .bind(subscription_id.0)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn find_by_user(&self, user_id: UserId, filter: CouponFilter) -> DbResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            r#"
            SELECT {COUPON_COLUMNS}
            FROM coupons
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR subscription_id = $3)
            ORDER BY sequence, created_at
            "#
        ))
        .bind(user_id.0)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.subscription_id.map(|s| s.0))
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn expire(&self, id: CouponId) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE coupons SET status = 'expired' WHERE id = $1 AND status = 'available'",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel_available(&self, subscription_id: SubscriptionId) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE coupons SET status = 'cancelled' WHERE subscription_id = $1 AND status = 'available'",
        )
        .bind(subscription_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self) -> DbResult<CouponCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM coupons GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = CouponCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "available" => counts.available = count,
                "used" => counts.used = count,
                "expired" => counts.expired = count,
                "cancelled" => counts.cancelled = count,
                other => tracing::warn!(status = other, "Unknown coupon status in counts"),
            }
        }

        Ok(counts)
    }
}
