//! Engine errors

use thiserror::Error;

use mess_db::DbError;
use mess_types::MessTypeError;

/// Errors surfaced by the lifecycle engine.
///
/// Validation failures (`InvalidCoupon`, `SubscriptionInactive`,
/// `InvalidPayload`) are expected outcomes a terminal shows to the operator.
/// They are never retried.
#[derive(Error, Debug)]
pub enum MessError {
    /// Plan, subscription or coupon absent
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Requester may not act on this resource
    #[error("forbidden")]
    Forbidden,

    /// Coupon cannot be redeemed
    #[error("invalid coupon: {0}")]
    InvalidCoupon(String),

    /// Owning subscription is not active
    #[error("subscription is not active")]
    SubscriptionInactive,

    /// Malformed QR or scan input
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Subscription was already cancelled
    #[error("subscription already cancelled")]
    AlreadyCancelled,

    /// Plan exists but is not purchasable
    #[error("plan is inactive")]
    PlanInactive,

    /// Plan still has subscriptions sold under it
    #[error("plan has subscriptions; deactivate it instead")]
    PlanInUse,

    /// Argument validation failed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Storage failure during an operation
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl MessError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Forbidden => 403,
            Self::InvalidCoupon(_)
            | Self::SubscriptionInactive
            | Self::InvalidPayload(_)
            | Self::InvalidInput(_) => 400,
            Self::AlreadyCancelled | Self::PlanInactive | Self::PlanInUse => 409,
            Self::Persistence(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidCoupon(_) => "INVALID_COUPON",
            Self::SubscriptionInactive => "SUBSCRIPTION_INACTIVE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::AlreadyCancelled => "ALREADY_CANCELLED",
            Self::PlanInactive => "PLAN_INACTIVE",
            Self::PlanInUse => "PLAN_IN_USE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Check if this is an expected rejection rather than a failure
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}

impl From<DbError> for MessError {
    fn from(err: DbError) -> Self {
        tracing::error!("Database error: {}", err);
        Self::Persistence(err.to_string())
    }
}

impl From<MessTypeError> for MessError {
    fn from(err: MessTypeError) -> Self {
        match err {
            MessTypeError::InvalidPayload(msg) => Self::InvalidPayload(msg),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

/// Result type for engine operations
pub type MessResult<T> = Result<T, MessError>;
