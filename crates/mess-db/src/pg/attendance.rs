//! PostgreSQL attendance repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mess_types::{MealAttendance, SubscriptionId, UserId};

use super::convert_all;
use crate::error::DbResult;
use crate::models::AttendanceRow;
use crate::repo::{AttendanceRepository, CreateAttendance};

pub(crate) const ATTENDANCE_COLUMNS: &str =
    "id, user_id, subscription_id, coupon_id, meal_type, checked_in_at, verified_by, location";

/// PostgreSQL attendance repository
#[derive(Clone)]
pub struct PgAttendanceRepository {
    pool: PgPool,
}

impl PgAttendanceRepository {
    /// Create a new attendance repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Insert an attendance record on any executor (pool or open transaction)
pub(crate) async fn insert_attendance<'e, E>(
    executor: E,
    record: &CreateAttendance,
) -> DbResult<MealAttendance>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query_as::<_, AttendanceRow>(&format!(
        r#"
        INSERT INTO meal_attendance (id, user_id, subscription_id, coupon_id, meal_type,
                                     checked_in_at, verified_by, location)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {ATTENDANCE_COLUMNS}
        "#
    ))
    .bind(record.id.0)
    .bind(record.user_id.0)
    .bind(record.subscription_id.0)
    .bind(record.coupon_id.0)
    .bind(record.meal_type.as_str())
    .bind(record.checked_in_at)
    .bind(record.verified_by.0)
    .bind(&record.location)
    .fetch_one(executor)
    .await?;

    Ok(MealAttendance::try_from(row)?)
}

#[async_trait]
impl AttendanceRepository for PgAttendanceRepository {
    async fn find_by_user(&self, user_id: UserId, limit: i64) -> DbResult<Vec<MealAttendance>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS}
            FROM meal_attendance
            WHERE user_id = $1
            ORDER BY checked_in_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn find_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> DbResult<Vec<MealAttendance>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            r#"
            SELECT {ATTENDANCE_COLUMNS}
            FROM meal_attendance
            WHERE subscription_id = $1
            ORDER BY checked_in_at DESC
            "#
        ))
        .bind(subscription_id.0)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM meal_attendance WHERE checked_in_at >= $1 AND checked_in_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
