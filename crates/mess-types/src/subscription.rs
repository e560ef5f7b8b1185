//! Subscription types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MessTypeError, PlanId, UserId};

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random subscription ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a subscription ID from a string
    pub fn parse(s: &str) -> Result<Self, MessTypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| MessTypeError::InvalidId(s.to_string()))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription status
///
/// `pending -> active -> {expired, cancelled}`; pending may also be cancelled.
/// `expired` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Created, waiting for payment to clear
    Pending,
    /// Paid and usable
    Active,
    /// Past its end date
    Expired,
    /// Cancelled by the owner or an administrator
    Cancelled,
}

impl SubscriptionStatus {
    /// Wire name of the status
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }

    /// Check whether moving to `next` is a legal transition
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Expired)
                | (Self::Active, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = MessTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(MessTypeError::invalid("subscription status", s)),
        }
    }
}

/// Payment status of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Wire name of the payment status
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = MessTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            _ => Err(MessTypeError::invalid("payment status", s)),
        }
    }
}

/// How a subscription was paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Upi,
    Card,
    Netbanking,
}

impl PaymentMethod {
    /// Wire name of the payment method
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Upi => "upi",
            Self::Card => "card",
            Self::Netbanking => "netbanking",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = MessTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "upi" => Ok(Self::Upi),
            "card" => Ok(Self::Card),
            "netbanking" => Ok(Self::Netbanking),
            _ => Err(MessTypeError::invalid("payment method", s)),
        }
    }
}

/// Expiry reminder milestones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReminder {
    SevenDays,
    ThreeDays,
    OnExpiry,
}

impl ExpiryReminder {
    /// Days before the end date this reminder fires
    pub const fn days(&self) -> i64 {
        match self {
            Self::SevenDays => 7,
            Self::ThreeDays => 3,
            Self::OnExpiry => 0,
        }
    }
}

/// Which expiry reminders have already gone out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemindersSent {
    pub seven_days: bool,
    pub three_days: bool,
    pub on_expiry: bool,
}

impl RemindersSent {
    /// Check whether a reminder has been sent
    pub const fn is_sent(&self, reminder: ExpiryReminder) -> bool {
        match reminder {
            ExpiryReminder::SevenDays => self.seven_days,
            ExpiryReminder::ThreeDays => self.three_days,
            ExpiryReminder::OnExpiry => self.on_expiry,
        }
    }

    /// Record a reminder as sent.
    ///
    /// A more urgent reminder supersedes the earlier milestones.
    pub fn mark(&mut self, reminder: ExpiryReminder) {
        match reminder {
            ExpiryReminder::OnExpiry => {
                self.on_expiry = true;
                self.three_days = true;
                self.seven_days = true;
            }
            ExpiryReminder::ThreeDays => {
                self.three_days = true;
                self.seven_days = true;
            }
            ExpiryReminder::SevenDays => self.seven_days = true,
        }
    }
}

/// Compute a subscription's end date from its start and the plan duration
pub fn end_date_for(start: DateTime<Utc>, duration_days: i32) -> DateTime<Utc> {
    start + Duration::days(i64::from(duration_days))
}

/// Purchased, time-boxed entitlement to a fixed number of coupons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription ID
    pub id: SubscriptionId,
    /// Owning user
    pub user_id: UserId,
    /// Plan this was bought from
    pub plan_id: PlanId,
    /// Human-readable code (`SUB...`)
    pub code: String,
    /// First valid instant
    pub start_date: DateTime<Utc>,
    /// Last valid instant
    pub end_date: DateTime<Utc>,
    /// Lifecycle status
    pub status: SubscriptionStatus,
    /// Coupons minted for this subscription
    pub total_coupons: i32,
    /// Coupons redeemed
    pub used_coupons: i32,
    /// `total_coupons - used_coupons`
    pub remaining_coupons: i32,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Payment method, once known
    pub payment_method: Option<PaymentMethod>,
    /// Amount charged, in the smallest currency unit
    pub amount_paid: i64,
    /// Gateway transaction reference
    pub transaction_id: Option<String>,
    /// When payment cleared
    pub payment_date: Option<DateTime<Utc>>,
    /// Expiry reminders already emitted
    pub reminders_sent: RemindersSent,
    /// When the last reminder went out
    pub last_reminder_sent: Option<DateTime<Utc>>,
    /// Mirror of the status: false once expired or cancelled
    pub is_active: bool,
    /// Free-form administrative notes
    pub notes: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Recompute derived fields before a persist
    pub fn recompute_counters(&mut self) {
        self.remaining_coupons = self.total_coupons - self.used_coupons;
        self.is_active = !self.status.is_terminal();
    }

    /// Check whether `now` is past the end date
    pub fn is_past_end(&self, now: DateTime<Utc>) -> bool {
        now > self.end_date
    }

    /// The most urgent expiry reminder that is due and not yet sent
    pub fn due_reminder(&self, now: DateTime<Utc>) -> Option<ExpiryReminder> {
        if self.status != SubscriptionStatus::Active && self.status != SubscriptionStatus::Expired
        {
            return None;
        }

        let left = self.end_date - now;
        let due = if left <= Duration::zero() {
            ExpiryReminder::OnExpiry
        } else if left <= Duration::days(ExpiryReminder::ThreeDays.days()) {
            ExpiryReminder::ThreeDays
        } else if left <= Duration::days(ExpiryReminder::SevenDays.days()) {
            ExpiryReminder::SevenDays
        } else {
            return None;
        };

        (!self.reminders_sent.is_sent(due)).then_some(due)
    }

    /// Whole days left until the end date, floored at zero
    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        (self.end_date - now).num_days().max(0)
    }

    /// Compact view returned to staff terminals after a redemption
    pub fn summary(&self) -> SubscriptionSummary {
        SubscriptionSummary {
            id: self.id,
            code: self.code.clone(),
            status: self.status,
            used_coupons: self.used_coupons,
            remaining_coupons: self.remaining_coupons,
            end_date: self.end_date,
        }
    }
}

/// Compact subscription view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub id: SubscriptionId,
    pub code: String,
    pub status: SubscriptionStatus,
    pub used_coupons: i32,
    pub remaining_coupons: i32,
    pub end_date: DateTime<Utc>,
}
