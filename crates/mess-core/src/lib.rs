//! Mess Core - Subscription and coupon lifecycle engine
//!
//! Issues coupons for subscriptions, validates and redeems them at staff
//! terminals, and keeps subscription counters and attendance in step.
//!
//! # Example
//!
//! ```rust,ignore
//! use mess_core::{LedgerConfig, MessEngine, RedemptionRequest};
//! use mess_types::MealType;
//!
//! let engine = MessEngine::from_repositories(repos, LedgerConfig::new());
//!
//! // Student buys a plan; coupons are minted with the subscription
//! let sub = engine.subscriptions.create(student.user_id, request).await?;
//!
//! // Staff scans a coupon at lunch
//! let receipt = engine
//!     .redemptions
//!     .redeem(&staff, RedemptionRequest::from_scan(&scanned, MealType::Lunch)?)
//!     .await?;
//! ```

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod manager;
pub mod metrics;
pub mod notify;
pub mod redemption;

pub use catalog::{NewPlan, PlanCatalog, PlanChanges};
pub use clock::{Clock, SystemClock};
pub use config::LedgerConfig;
pub use engine::{MessEngine, Stores};
pub use error::{MessError, MessResult};
pub use journal::AttendanceJournal;
pub use ledger::{ConsumedCoupon, CouponLedger, CouponView, UsageStats};
pub use manager::{
    CancelOutcome, NewSubscription, PaymentConfirmation, StatusBreakdown, SubscriptionManager,
    SubscriptionPage, SubscriptionStats,
};
pub use notify::{Notifier, NotifyError, TracingNotifier};
pub use redemption::{RedemptionReceipt, RedemptionRequest, RedemptionService, StudentRef};
