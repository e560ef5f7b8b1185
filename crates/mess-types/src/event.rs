//! Notification events
//!
//! The engine emits these as facts. Delivery belongs to whoever consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PaymentMethod, PlanId, SubscriptionId, UserId};

/// Lifecycle event for the notification collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessEvent {
    /// A subscription and its coupons were created
    SubscriptionCreated {
        subscription_id: SubscriptionId,
        user_id: UserId,
        plan_id: PlanId,
        total_coupons: i32,
        end_date: DateTime<Utc>,
    },
    /// A subscription is about to run out
    ExpiringSoon {
        subscription_id: SubscriptionId,
        user_id: UserId,
        days_left: i64,
        end_date: DateTime<Utc>,
    },
    /// Payment for a subscription cleared
    PaymentReceipt {
        subscription_id: SubscriptionId,
        user_id: UserId,
        amount_paid: i64,
        method: PaymentMethod,
        transaction_id: Option<String>,
        paid_at: DateTime<Utc>,
    },
}

impl MessEvent {
    /// Short name used in logs and metrics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated { .. } => "subscription_created",
            Self::ExpiringSoon { .. } => "expiring_soon",
            Self::PaymentReceipt { .. } => "payment_receipt",
        }
    }

    /// User the event concerns
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::SubscriptionCreated { user_id, .. }
            | Self::ExpiringSoon { user_id, .. }
            | Self::PaymentReceipt { user_id, .. } => *user_id,
        }
    }
}
