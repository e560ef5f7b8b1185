//! Coupon types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MealType, MessTypeError, SubscriptionId, UserId};

/// Unique coupon identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponId(pub Uuid);

impl CouponId {
    /// Create a new random coupon ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a coupon ID from a string
    pub fn parse(s: &str) -> Result<Self, MessTypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| MessTypeError::InvalidId(s.to_string()))
    }
}

impl Default for CouponId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CouponId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coupon status. Exactly one holds at any time; `used` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Available,
    Used,
    Expired,
    Cancelled,
}

impl CouponStatus {
    /// Wire name of the status
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CouponStatus {
    type Err = MessTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(MessTypeError::invalid("coupon status", s)),
        }
    }
}

/// Single-use meal token bound to one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon ID
    pub id: CouponId,
    /// Owning subscription
    pub subscription_id: SubscriptionId,
    /// Owning user
    pub user_id: UserId,
    /// Globally unique code (`CPN...`)
    pub code: String,
    /// Position within the subscription, 1-based and dense
    pub sequence: i32,
    /// Meal the coupon is restricted to, if any
    pub meal_type: Option<MealType>,
    /// Lifecycle status
    pub status: CouponStatus,
    /// When it was redeemed
    pub used_at: Option<DateTime<Utc>>,
    /// Staff member who redeemed it
    pub used_by: Option<UserId>,
    /// Where it was redeemed
    pub usage_location: Option<String>,
    /// Subscription end date at mint time
    pub expiry_date: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Outcome of checking a coupon against its status and expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponValidity {
    /// Usable now
    Valid,
    /// Status is not `available`
    Unavailable,
    /// Still `available` in storage but past its expiry date
    Expired,
}

impl CouponValidity {
    /// Human-readable reason shown at the terminal
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Valid => "coupon is valid",
            Self::Unavailable => "already used or expired",
            Self::Expired => "expired",
        }
    }

    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl Coupon {
    /// Evaluate the coupon at `now` without touching storage
    pub fn validity(&self, now: DateTime<Utc>) -> CouponValidity {
        if self.status != CouponStatus::Available {
            return CouponValidity::Unavailable;
        }
        match self.expiry_date {
            Some(expiry) if now > expiry => CouponValidity::Expired,
            _ => CouponValidity::Valid,
        }
    }
}
