//! PostgreSQL plan repository implementation

use async_trait::async_trait;
use sqlx::PgPool;

use mess_types::{MealType, PlanId, SubscriptionPlan};

use super::{convert_all, convert_opt};
use crate::error::DbResult;
use crate::models::PlanRow;
use crate::repo::{CreatePlan, PlanRepository, UpdatePlan};

const PLAN_COLUMNS: &str = "id, name, description, duration_days, total_coupons, price, \
     meal_types, meals_per_day, is_active, features, created_at, updated_at";

/// PostgreSQL plan repository
#[derive(Clone)]
pub struct PgPlanRepository {
    pool: PgPool,
}

impl PgPlanRepository {
    /// Create a new plan repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn meal_names(meal_types: &[MealType]) -> Vec<String> {
    meal_types.iter().map(|m| m.as_str().to_string()).collect()
}

#[async_trait]
impl PlanRepository for PgPlanRepository {
    async fn find_by_id(&self, id: PlanId) -> DbResult<Option<SubscriptionPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn list(&self, active_only: bool) -> DbResult<Vec<SubscriptionPlan>> {
        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            SELECT {PLAN_COLUMNS}
            FROM subscription_plans
            WHERE ($1 = FALSE OR is_active)
            ORDER BY price ASC, name ASC
            "#
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn create(&self, plan: CreatePlan) -> DbResult<SubscriptionPlan> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            INSERT INTO subscription_plans (id, name, description, duration_days, total_coupons,
                                            price, meal_types, meals_per_day, is_active, features)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(plan.id.0)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.duration_days)
        .bind(plan.total_coupons)
        .bind(plan.price)
        .bind(meal_names(&plan.meal_types))
        .bind(plan.meals_per_day)
        .bind(plan.is_active)
        .bind(&plan.features)
        .fetch_one(&self.pool)
        .await?;

        Ok(SubscriptionPlan::try_from(row)?)
    }

    async fn update(&self, id: PlanId, changes: UpdatePlan) -> DbResult<Option<SubscriptionPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            UPDATE subscription_plans
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                duration_days = COALESCE($4, duration_days),
                total_coupons = COALESCE($5, total_coupons),
                price = COALESCE($6, price),
                meal_types = COALESCE($7, meal_types),
                meals_per_day = COALESCE($8, meals_per_day),
                is_active = COALESCE($9, is_active),
                features = COALESCE($10, features),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.duration_days)
        .bind(changes.total_coupons)
        .bind(changes.price)
        .bind(changes.meal_types.as_deref().map(meal_names))
        .bind(changes.meals_per_day)
        .bind(changes.is_active)
        .bind(changes.features)
        .fetch_optional(&self.pool)
        .await?;

        convert_opt(row)
    }

    async fn delete_unreferenced(&self, id: PlanId) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM subscription_plans
            WHERE id = $1
              AND NOT EXISTS (SELECT 1 FROM subscriptions WHERE plan_id = $1)
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
