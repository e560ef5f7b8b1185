//! Plan catalog
//!
//! Read model of purchasable plans plus the administrative operations that
//! maintain it.

use std::sync::Arc;

use serde::Deserialize;

use mess_db::{CreatePlan, DbError, PlanRepository, UpdatePlan};
use mess_types::{
    MealType, PlanId, Principal, SubscriptionPlan, DEFAULT_MEALS_PER_DAY, DEFAULT_MEAL_TYPES,
    MAX_MEALS_PER_DAY,
};

use crate::{MessError, MessResult};

/// Plan definition submitted by an administrator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub duration_days: i32,
    pub total_coupons: i32,
    pub price: i64,
    #[serde(default)]
    pub meal_types: Option<Vec<MealType>>,
    #[serde(default)]
    pub meals_per_day: Option<i32>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Partial plan edit; absent fields stay unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChanges {
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

/// Plan catalog
pub struct PlanCatalog {
    plans: Arc<dyn PlanRepository>,
}

impl PlanCatalog {
    /// Create a catalog over a plan repository
    pub fn new(plans: Arc<dyn PlanRepository>) -> Self {
        Self { plans }
    }

    /// List plans, cheapest first
    pub async fn list(&self, active_only: bool) -> MessResult<Vec<SubscriptionPlan>> {
        Ok(self.plans.list(active_only).await?)
    }

    /// Get a plan by ID
    pub async fn get(&self, id: PlanId) -> MessResult<SubscriptionPlan> {
        self.plans
            .find_by_id(id)
            .await?
            .ok_or(MessError::NotFound("plan"))
    }

    /// Resolve a plan that can be purchased right now
    pub async fn get_purchasable(&self, id: PlanId) -> MessResult<SubscriptionPlan> {
        let plan = self.get(id).await?;
        if !plan.is_active {
            return Err(MessError::PlanInactive);
        }
        Ok(plan)
    }

    /// Add a plan to the catalog
    pub async fn create(
        &self,
        requester: &Principal,
        plan: NewPlan,
    ) -> MessResult<SubscriptionPlan> {
        require_admin(requester)?;

        let meal_types = plan
            .meal_types
            .unwrap_or_else(|| DEFAULT_MEAL_TYPES.to_vec());
        let meals_per_day = plan.meals_per_day.unwrap_or(DEFAULT_MEALS_PER_DAY);

        let name = validate_name(&plan.name)?;
        validate_duration(plan.duration_days)?;
        validate_coupons(plan.total_coupons)?;
        validate_price(plan.price)?;
        let meal_types = validate_meal_types(meal_types)?;
        validate_meals_per_day(meals_per_day)?;

        let create = CreatePlan {
            id: PlanId::new(),
            name,
            description: plan.description,
            duration_days: plan.duration_days,
            total_coupons: plan.total_coupons,
            price: plan.price,
            meal_types,
            meals_per_day,
            is_active: true,
            features: plan.features,
        };

        let created = self.plans.create(create).await.map_err(name_conflict)?;
        tracing::info!(plan_id = %created.id, name = %created.name, "Plan created");
        Ok(created)
    }

    /// Edit a plan
    pub async fn update(
        &self,
        requester: &Principal,
        id: PlanId,
        changes: PlanChanges,
    ) -> MessResult<SubscriptionPlan> {
        require_admin(requester)?;

        let update = UpdatePlan {
            name: changes.name.as_deref().map(validate_name).transpose()?,
            description: changes.description,
            duration_days: changes.duration_days.map(validate_duration).transpose()?,
            total_coupons: changes.total_coupons.map(validate_coupons).transpose()?,
            price: changes.price.map(validate_price).transpose()?,
            meal_types: changes.meal_types.map(validate_meal_types).transpose()?,
            meals_per_day: changes
                .meals_per_day
                .map(validate_meals_per_day)
                .transpose()?,
            is_active: changes.is_active,
            features: changes.features,
        };

        let updated = self
            .plans
            .update(id, update)
            .await
            .map_err(name_conflict)?
            .ok_or(MessError::NotFound("plan"))?;

        tracing::info!(plan_id = %id, "Plan updated");
        Ok(updated)
    }

    /// Toggle whether a plan can be purchased
    pub async fn set_active(
        &self,
        requester: &Principal,
        id: PlanId,
        active: bool,
    ) -> MessResult<SubscriptionPlan> {
        self.update(
            requester,
            id,
            PlanChanges {
                is_active: Some(active),
                ..PlanChanges::default()
            },
        )
        .await
    }

    /// Delete a plan nothing was ever sold under. Admin only.
    ///
    /// Plans with subscriptions stay for their history and can only be
    /// deactivated.
    pub async fn delete(&self, requester: &Principal, id: PlanId) -> MessResult<()> {
        require_admin(requester)?;

        if self.plans.find_by_id(id).await?.is_none() {
            return Err(MessError::NotFound("plan"));
        }

        match self.plans.delete_unreferenced(id).await {
            Ok(true) => {
                tracing::info!(plan_id = %id, "Plan deleted");
                Ok(())
            }
            Ok(false) => Err(MessError::PlanInUse),
            Err(e) if e.is_referenced() => Err(MessError::PlanInUse),
            Err(e) => Err(e.into()),
        }
    }
}

fn require_admin(requester: &Principal) -> MessResult<()> {
    if requester.is_admin() {
        Ok(())
    } else {
        Err(MessError::Forbidden)
    }
}

fn name_conflict(err: DbError) -> MessError {
    if err.is_conflict() {
        MessError::InvalidInput("a plan with this name already exists".to_string())
    } else {
        err.into()
    }
}

fn validate_name(name: &str) -> MessResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MessError::InvalidInput("plan name is required".to_string()));
    }
    Ok(name.to_string())
}

fn validate_duration(days: i32) -> MessResult<i32> {
    if days < 1 {
        return Err(MessError::InvalidInput(
            "duration must be at least 1 day".to_string(),
        ));
    }
    Ok(days)
}

fn validate_coupons(total: i32) -> MessResult<i32> {
    if total < 1 {
        return Err(MessError::InvalidInput(
            "a plan must grant at least 1 coupon".to_string(),
        ));
    }
    Ok(total)
}

fn validate_price(price: i64) -> MessResult<i64> {
    if price < 0 {
        return Err(MessError::InvalidInput("price cannot be negative".to_string()));
    }
    Ok(price)
}

fn validate_meal_types(mut meals: Vec<MealType>) -> MessResult<Vec<MealType>> {
    meals.sort_unstable();
    meals.dedup();
    if meals.is_empty() {
        return Err(MessError::InvalidInput(
            "at least one meal type is required".to_string(),
        ));
    }
    Ok(meals)
}

fn validate_meals_per_day(meals: i32) -> MessResult<i32> {
    if !(1..=MAX_MEALS_PER_DAY).contains(&meals) {
        return Err(MessError::InvalidInput(format!(
            "meals per day must be between 1 and {MAX_MEALS_PER_DAY}"
        )));
    }
    Ok(meals)
}
