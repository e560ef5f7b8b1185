//! Subscription manager
//!
//! Owns subscription state: creation together with coupon minting, lazy
//! expiry, cancellation with coupon fan-out, payment settlement and expiry
//! reminders.
//!
//! ```text
//! pending --payment--> active --time--> expired
//!    |                   |
//!    +-----cancel--------+----cancel--> cancelled
//! ```
//!
//! `expired` and `cancelled` are terminal.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use mess_db::{ConfirmPayment, CreateSubscription, SubscriptionFilter, SubscriptionRepository};
use mess_types::{
    end_date_for, generate_subscription_code, ExpiryReminder, MessEvent, PaymentMethod,
    PaymentStatus, PlanId, Principal, Subscription, SubscriptionId, SubscriptionStatus, UserId,
};

use crate::catalog::PlanCatalog;
use crate::clock::Clock;
use crate::ledger::CouponLedger;
use crate::metrics::{self, Operation, OperationTimer};
use crate::notify::{emit, Notifier};
use crate::{MessError, MessResult};

/// Attempts at finding an unused subscription code
const SUBSCRIPTION_CODE_ATTEMPTS: u32 = 3;

/// Longest single extension accepted
pub const MAX_EXTENSION_DAYS: i64 = 366;

/// Largest page an admin listing returns
pub const MAX_PAGE_SIZE: i64 = 100;

/// Purchase request from a student
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub plan_id: PlanId,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// Settlement reported by the payment collaborator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub method: PaymentMethod,
    #[serde(default)]
    pub transaction_id: Option<String>,
    /// Defaults to the amount captured from the plan price
    #[serde(default)]
    pub amount_paid: Option<i64>,
}

/// Result of a cancellation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub subscription: Subscription,
    pub cancelled_coupons: u64,
}

/// One page of subscriptions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPage {
    pub subscriptions: Vec<Subscription>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Subscription count and revenue for one status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub status: SubscriptionStatus,
    pub count: i64,
    /// Sum of `amount_paid`, in the smallest currency unit
    pub total_revenue: i64,
}

/// Subscription totals across the hall
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStats {
    pub by_status: Vec<StatusBreakdown>,
    pub total_subscriptions: i64,
    pub active_subscriptions: i64,
}

/// Subscription manager
pub struct SubscriptionManager {
    subscriptions: Arc<dyn SubscriptionRepository>,
    catalog: Arc<PlanCatalog>,
    ledger: Arc<CouponLedger>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionManager {
    /// Create a new subscription manager
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        catalog: Arc<PlanCatalog>,
        ledger: Arc<CouponLedger>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
            ledger,
            notifier,
            clock,
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a pending subscription and mint its coupons.
    ///
    /// The subscription row is written first, then the coupon batch. If
    /// minting fails the row is deleted again, so no reader ever sees a
    /// subscription without its coupons.
    pub async fn create(
        &self,
        user_id: UserId,
        request: NewSubscription,
    ) -> MessResult<Subscription> {
        let timer = OperationTimer::start(Operation::CreateSubscription);
        let result = self.create_inner(user_id, request).await;
        timer.finish(&result);
        result
    }

    async fn create_inner(
        &self,
        user_id: UserId,
        request: NewSubscription,
    ) -> MessResult<Subscription> {
        let plan = self.catalog.get_purchasable(request.plan_id).await?;

        let now = self.clock.now();
        let start_date = request.start_date.unwrap_or(now);
        let end_date = end_date_for(start_date, plan.duration_days);

        let subscription = self
            .insert_pending(CreateSubscription {
                id: SubscriptionId::new(),
                user_id,
                plan_id: plan.id,
                code: String::new(),
                start_date,
                end_date,
                total_coupons: plan.total_coupons,
                amount_paid: plan.price,
                payment_method: request.payment_method,
            })
            .await?;

        if let Err(mint_err) = self.ledger.mint(&subscription, &plan).await {
            self.compensate(&subscription).await;
            return Err(mint_err);
        }

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %user_id,
            plan_id = %plan.id,
            coupons = plan.total_coupons,
            "Subscription created"
        );
        metrics::record_subscription_created();

        emit(
            self.notifier.as_ref(),
            MessEvent::SubscriptionCreated {
                subscription_id: subscription.id,
                user_id,
                plan_id: plan.id,
                total_coupons: subscription.total_coupons,
                end_date: subscription.end_date,
            },
        )
        .await;

        Ok(subscription)
    }

    async fn insert_pending(&self, mut create: CreateSubscription) -> MessResult<Subscription> {
        for attempt in 1..=SUBSCRIPTION_CODE_ATTEMPTS {
            create.code = generate_subscription_code(self.clock.now());
            match self.subscriptions.create(create.clone()).await {
                Ok(subscription) => return Ok(subscription),
                Err(e) if e.is_conflict() => {
                    tracing::warn!(attempt, error = %e, "Subscription code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(MessError::Persistence(
            "could not generate a unique subscription code".to_string(),
        ))
    }

    /// Undo a subscription insert whose coupons could not be minted
    async fn compensate(&self, subscription: &Subscription) {
        match self.subscriptions.delete(subscription.id).await {
            Ok(()) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    attempted_coupons = subscription.total_coupons,
                    "Coupon mint failed, subscription rolled back"
                );
            }
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription.id,
                    user_id = %subscription.user_id,
                    attempted_coupons = subscription.total_coupons,
                    error = %e,
                    "Compensating delete failed; subscription requires manual reconciliation"
                );
            }
        }
    }

    // =========================================================================
    // Lazy expiry
    // =========================================================================

    /// Flip an active subscription past its end date to expired.
    ///
    /// Returns true when this call made the change.
    pub async fn check_expiry(&self, subscription: &mut Subscription) -> MessResult<bool> {
        if subscription.status != SubscriptionStatus::Active
            || !subscription.is_past_end(self.clock.now())
        {
            return Ok(false);
        }

        match self
            .subscriptions
            .transition_status(
                subscription.id,
                SubscriptionStatus::Active,
                SubscriptionStatus::Expired,
            )
            .await?
        {
            Some(updated) => {
                tracing::info!(subscription_id = %updated.id, "Subscription expired");
                *subscription = updated;
                Ok(true)
            }
            None => {
                *subscription = self.load(subscription.id).await?;
                Ok(false)
            }
        }
    }

    /// Send the expiry reminder due at `now`, if it has not gone out yet
    pub async fn expiry_reminder(
        &self,
        subscription: &mut Subscription,
        now: DateTime<Utc>,
    ) -> MessResult<Option<ExpiryReminder>> {
        let Some(reminder) = subscription.due_reminder(now) else {
            return Ok(None);
        };

        subscription.reminders_sent.mark(reminder);
        subscription.last_reminder_sent = Some(now);
        self.subscriptions
            .record_reminder(subscription.id, subscription.reminders_sent, now)
            .await?;

        tracing::debug!(
            subscription_id = %subscription.id,
            days = reminder.days(),
            "Expiry reminder due"
        );

        emit(
            self.notifier.as_ref(),
            MessEvent::ExpiringSoon {
                subscription_id: subscription.id,
                user_id: subscription.user_id,
                days_left: subscription.days_left(now),
                end_date: subscription.end_date,
            },
        )
        .await;

        Ok(Some(reminder))
    }

    /// Lazy checks applied whenever a subscription is read
    async fn refresh(&self, subscription: &mut Subscription) -> MessResult<()> {
        self.check_expiry(subscription).await?;
        let now = self.clock.now();
        self.expiry_reminder(subscription, now).await?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    async fn load(&self, id: SubscriptionId) -> MessResult<Subscription> {
        self.subscriptions
            .find_by_id(id)
            .await?
            .ok_or(MessError::NotFound("subscription"))
    }

    /// Load a subscription for internal callers, with lazy expiry applied
    pub async fn load_current(&self, id: SubscriptionId) -> MessResult<Subscription> {
        let mut subscription = self.load(id).await?;
        self.check_expiry(&mut subscription).await?;
        Ok(subscription)
    }

    /// Get a subscription. Owner or admin only.
    pub async fn get(&self, requester: &Principal, id: SubscriptionId) -> MessResult<Subscription> {
        let mut subscription = self.load(id).await?;
        if !requester.owns_or_admin(subscription.user_id) {
            return Err(MessError::Forbidden);
        }
        self.refresh(&mut subscription).await?;
        Ok(subscription)
    }

    /// A user's subscriptions, newest first
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        status: Option<SubscriptionStatus>,
    ) -> MessResult<Vec<Subscription>> {
        let mut subscriptions = self.subscriptions.find_by_user_id(user_id, status).await?;
        for subscription in &mut subscriptions {
            self.refresh(subscription).await?;
        }
        if let Some(status) = status {
            // Lazy expiry may have moved some out of the requested status
            subscriptions.retain(|s| s.status == status);
        }
        Ok(subscriptions)
    }

    /// Page through all subscriptions. Admin only.
    pub async fn list_all(
        &self,
        requester: &Principal,
        status: Option<SubscriptionStatus>,
        page: i64,
        limit: i64,
    ) -> MessResult<SubscriptionPage> {
        require_admin(requester)?;

        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let filter = SubscriptionFilter {
            status,
            limit,
            offset: (page - 1) * limit,
        };

        let (mut subscriptions, total) = self.subscriptions.list(filter).await?;
        for subscription in &mut subscriptions {
            self.check_expiry(subscription).await?;
        }

        Ok(SubscriptionPage {
            subscriptions,
            total,
            page,
            limit,
        })
    }

    /// Count and revenue per status. Admin only.
    ///
    /// Reads stored statuses; subscriptions nobody has looked at since their
    /// end date still count as active.
    pub async fn stats(&self, requester: &Principal) -> MessResult<SubscriptionStats> {
        require_admin(requester)?;

        let totals = self.subscriptions.totals_by_status().await?;
        let total_subscriptions = totals.iter().map(|t| t.count).sum();
        let active_subscriptions = totals
            .iter()
            .filter(|t| t.status == SubscriptionStatus::Active)
            .map(|t| t.count)
            .sum();

        Ok(SubscriptionStats {
            by_status: totals
                .into_iter()
                .map(|t| StatusBreakdown {
                    status: t.status,
                    count: t.count,
                    total_revenue: t.revenue,
                })
                .collect(),
            total_subscriptions,
            active_subscriptions,
        })
    }

    // =========================================================================
    // State changes
    // =========================================================================

    /// Cancel a subscription and every coupon still available under it.
    ///
    /// Owner or admin only. Used coupons stay used.
    pub async fn cancel(
        &self,
        requester: &Principal,
        id: SubscriptionId,
    ) -> MessResult<CancelOutcome> {
        let timer = OperationTimer::start(Operation::CancelSubscription);
        let result = self.cancel_inner(requester, id).await;
        timer.finish(&result);
        result
    }

    async fn cancel_inner(
        &self,
        requester: &Principal,
        id: SubscriptionId,
    ) -> MessResult<CancelOutcome> {
        let mut subscription = self.load(id).await?;
        if !requester.owns_or_admin(subscription.user_id) {
            return Err(MessError::Forbidden);
        }

        self.check_expiry(&mut subscription).await?;
        ensure_cancellable(&subscription)?;

        self.cancel_cascade(&subscription).await
    }

    async fn cancel_cascade(&self, subscription: &Subscription) -> MessResult<CancelOutcome> {
        match self.subscriptions.cancel_with_coupons(subscription.id).await? {
            Some((subscription, cancelled_coupons)) => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    cancelled_coupons,
                    used_coupons = subscription.used_coupons,
                    "Subscription cancelled"
                );
                metrics::record_subscription_cancelled();
                Ok(CancelOutcome {
                    subscription,
                    cancelled_coupons,
                })
            }
            None => {
                // Lost a race with another cancel or an expiry
                let current = self.load(subscription.id).await?;
                ensure_cancellable(&current)?;
                Err(MessError::Persistence(
                    "subscription changed during cancellation".to_string(),
                ))
            }
        }
    }

    /// Push the end date forward. Admin only; pending or active subscriptions.
    pub async fn extend(
        &self,
        requester: &Principal,
        id: SubscriptionId,
        days: i64,
    ) -> MessResult<Subscription> {
        require_admin(requester)?;
        if !(1..=MAX_EXTENSION_DAYS).contains(&days) {
            return Err(MessError::InvalidInput(format!(
                "extension must be between 1 and {MAX_EXTENSION_DAYS} days"
            )));
        }

        let mut subscription = self.load(id).await?;
        self.check_expiry(&mut subscription).await?;
        if subscription.status.is_terminal() {
            return Err(MessError::SubscriptionInactive);
        }

        let end_date = subscription.end_date + Duration::days(days);
        let updated = self
            .subscriptions
            .update_end_date(id, end_date)
            .await?
            .ok_or(MessError::SubscriptionInactive)?;

        tracing::info!(subscription_id = %id, days, end_date = %updated.end_date, "Subscription extended");
        Ok(updated)
    }

    /// Settle payment: pending becomes active and payment becomes paid.
    ///
    /// Called on behalf of the payment collaborator, so admin only.
    pub async fn confirm_payment(
        &self,
        requester: &Principal,
        id: SubscriptionId,
        payment: PaymentConfirmation,
    ) -> MessResult<Subscription> {
        require_admin(requester)?;

        let subscription = self.load(id).await?;
        if subscription.status != SubscriptionStatus::Pending {
            return Err(MessError::SubscriptionInactive);
        }

        let amount_paid = payment.amount_paid.unwrap_or(subscription.amount_paid);
        if amount_paid < 0 {
            return Err(MessError::InvalidInput("amount cannot be negative".to_string()));
        }

        let paid_at = self.clock.now();
        let updated = self
            .subscriptions
            .confirm_payment(
                id,
                ConfirmPayment {
                    method: payment.method,
                    transaction_id: payment.transaction_id.clone(),
                    amount_paid,
                    paid_at,
                },
            )
            .await?
            .ok_or(MessError::SubscriptionInactive)?;

        tracing::info!(
            subscription_id = %id,
            method = payment.method.as_str(),
            amount_paid,
            "Payment confirmed"
        );

        emit(
            self.notifier.as_ref(),
            MessEvent::PaymentReceipt {
                subscription_id: id,
                user_id: updated.user_id,
                amount_paid,
                method: payment.method,
                transaction_id: payment.transaction_id,
                paid_at,
            },
        )
        .await;

        Ok(updated)
    }

    /// Record a failed payment. Status is unchanged.
    pub async fn mark_payment_failed(
        &self,
        requester: &Principal,
        id: SubscriptionId,
    ) -> MessResult<Subscription> {
        require_admin(requester)?;

        let updated = self
            .subscriptions
            .update_payment_status(id, PaymentStatus::Failed)
            .await?
            .ok_or(MessError::NotFound("subscription"))?;

        tracing::warn!(subscription_id = %id, "Payment failed");
        Ok(updated)
    }

    /// Administrative status override, limited to legal transitions
    pub async fn set_status(
        &self,
        requester: &Principal,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> MessResult<Subscription> {
        require_admin(requester)?;

        let mut subscription = self.load(id).await?;
        self.check_expiry(&mut subscription).await?;

        let from = subscription.status;
        if from == SubscriptionStatus::Cancelled && status == SubscriptionStatus::Cancelled {
            return Err(MessError::AlreadyCancelled);
        }
        if !from.can_transition_to(status) {
            return Err(MessError::InvalidInput(format!(
                "cannot move subscription from {} to {}",
                from.as_str(),
                status.as_str()
            )));
        }

        if status == SubscriptionStatus::Cancelled {
            return Ok(self.cancel_cascade(&subscription).await?.subscription);
        }

        let updated = self
            .subscriptions
            .transition_status(id, from, status)
            .await?
            .ok_or_else(|| {
                MessError::Persistence("subscription changed during status update".to_string())
            })?;

        tracing::info!(
            subscription_id = %id,
            from = from.as_str(),
            to = status.as_str(),
            "Subscription status overridden"
        );
        Ok(updated)
    }
}

fn require_admin(requester: &Principal) -> MessResult<()> {
    if requester.is_admin() {
        Ok(())
    } else {
        Err(MessError::Forbidden)
    }
}

fn ensure_cancellable(subscription: &Subscription) -> MessResult<()> {
    match subscription.status {
        SubscriptionStatus::Cancelled => Err(MessError::AlreadyCancelled),
        SubscriptionStatus::Expired => Err(MessError::SubscriptionInactive),
        SubscriptionStatus::Pending | SubscriptionStatus::Active => Ok(()),
    }
}
