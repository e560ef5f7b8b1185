//! Subscription plan types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MessTypeError;

/// Unique plan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    /// Create a new random plan ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a plan ID from a string
    pub fn parse(s: &str) -> Result<Self, MessTypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| MessTypeError::InvalidId(s.to_string()))
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Meal served by the dining hall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealType {
    /// Wire name of the meal type
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MealType {
    type Err = MessTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            _ => Err(MessTypeError::invalid("meal type", s)),
        }
    }
}

/// Meal types granted when a plan does not name any
pub const DEFAULT_MEAL_TYPES: [MealType; 2] = [MealType::Lunch, MealType::Dinner];

/// Meals per day when a plan does not name a value
pub const DEFAULT_MEALS_PER_DAY: i32 = 2;

/// Upper bound on meals per day
pub const MAX_MEALS_PER_DAY: i32 = 3;

/// Purchasable plan in the catalog.
///
/// Never mutated by the lifecycle engine; only the administrative
/// catalog operations change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    /// Plan ID
    pub id: PlanId,
    /// Unique display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Validity in days
    pub duration_days: i32,
    /// Coupons granted per subscription
    pub total_coupons: i32,
    /// Price in the smallest currency unit
    pub price: i64,
    /// Meals the plan covers
    pub meal_types: Vec<MealType>,
    /// Meals per day
    pub meals_per_day: i32,
    /// Whether the plan can be purchased
    pub is_active: bool,
    /// Marketing feature list
    pub features: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    /// Check whether the plan covers a meal type
    pub fn covers(&self, meal_type: MealType) -> bool {
        self.meal_types.contains(&meal_type)
    }
}
