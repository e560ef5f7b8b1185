//! In-memory repositories for testing
//!
//! One store implements every repository trait. Multi-row operations take a
//! single lock, which gives them the same all-or-nothing behaviour as the
//! PostgreSQL transactions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use mess_core::Stores;
use mess_db::{
    AttendanceRepository, ConfirmPayment, CouponCounts, CouponFilter, CouponRepository,
    CreateAttendance, CreateCoupon, CreatePlan, CreateSubscription, DbError, DbResult,
    PlanRepository, RedeemCoupon, RedeemOutcome, RedemptionRepository, StatusTotals,
    SubscriptionFilter, SubscriptionRepository, UpdatePlan,
};
use mess_types::{
    Coupon, CouponId, CouponStatus, MealAttendance, PaymentStatus, PlanId, RemindersSent,
    Subscription, SubscriptionId, SubscriptionPlan, SubscriptionStatus, UserId,
};

#[derive(Default)]
struct LedgerState {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    coupons: HashMap<CouponId, Coupon>,
    attendance: Vec<MealAttendance>,
}

/// Fault switches for exercising failure paths
#[derive(Default)]
pub struct Faults {
    /// Fail the next coupon batch with a storage error
    pub fail_coupon_insert: AtomicBool,
    /// Report this many code collisions before accepting a batch
    pub coupon_conflicts: AtomicU32,
    /// Fail subscription deletes
    pub fail_delete: AtomicBool,
    /// Let a redemption land between the expiry check and the expire update
    pub redeem_before_expire: AtomicBool,
}

/// In-memory store implementing every repository trait
#[derive(Default, Clone)]
pub struct MemoryStore {
    plans: Arc<DashMap<PlanId, SubscriptionPlan>>,
    state: Arc<Mutex<LedgerState>>,
    pub faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository handles for the engine
    pub fn stores(&self) -> Stores {
        Stores {
            plans: Arc::new(self.clone()),
            subscriptions: Arc::new(self.clone()),
            coupons: Arc::new(self.clone()),
            attendance: Arc::new(self.clone()),
            redemptions: Arc::new(self.clone()),
        }
    }

    /// Insert a plan directly
    pub fn insert_plan(&self, plan: SubscriptionPlan) {
        self.plans.insert(plan.id, plan);
    }

    /// Snapshot of a subscription
    pub async fn subscription(&self, id: SubscriptionId) -> Option<Subscription> {
        self.state.lock().await.subscriptions.get(&id).cloned()
    }

    /// Number of stored subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.state.lock().await.subscriptions.len()
    }

    /// Snapshot of a subscription's coupons, ordered by sequence
    pub async fn coupons_of(&self, id: SubscriptionId) -> Vec<Coupon> {
        let state = self.state.lock().await;
        let mut coupons: Vec<Coupon> = state
            .coupons
            .values()
            .filter(|c| c.subscription_id == id)
            .cloned()
            .collect();
        coupons.sort_by_key(|c| c.sequence);
        coupons
    }

    /// Number of stored coupons
    pub async fn coupon_count(&self) -> usize {
        self.state.lock().await.coupons.len()
    }

    /// Attendance recorded for a coupon
    pub async fn attendance_for(&self, coupon_id: CouponId) -> Vec<MealAttendance> {
        let state = self.state.lock().await;
        state
            .attendance
            .iter()
            .filter(|a| a.coupon_id == coupon_id)
            .cloned()
            .collect()
    }

    /// Overwrite a subscription's status, bypassing transition rules
    pub async fn force_status(&self, id: SubscriptionId, status: SubscriptionStatus) {
        let mut state = self.state.lock().await;
        if let Some(sub) = state.subscriptions.get_mut(&id) {
            sub.status = status;
            sub.recompute_counters();
        }
    }
}

fn sorted_newest_first(mut subs: Vec<Subscription>) -> Vec<Subscription> {
    subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    subs
}

#[async_trait]
impl PlanRepository for MemoryStore {
    async fn find_by_id(&self, id: PlanId) -> DbResult<Option<SubscriptionPlan>> {
        Ok(self.plans.get(&id).map(|r| r.value().clone()))
    }

    async fn list(&self, active_only: bool) -> DbResult<Vec<SubscriptionPlan>> {
        let mut plans: Vec<SubscriptionPlan> = self
            .plans
            .iter()
            .filter(|r| !active_only || r.is_active)
            .map(|r| r.value().clone())
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        Ok(plans)
    }

    async fn create(&self, plan: CreatePlan) -> DbResult<SubscriptionPlan> {
        if self.plans.iter().any(|r| r.name == plan.name) {
            return Err(DbError::Conflict("subscription_plans_name_key".to_string()));
        }
        let now = Utc::now();
        let row = SubscriptionPlan {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            duration_days: plan.duration_days,
            total_coupons: plan.total_coupons,
            price: plan.price,
            meal_types: plan.meal_types,
            meals_per_day: plan.meals_per_day,
            is_active: plan.is_active,
            features: plan.features,
            created_at: now,
            updated_at: now,
        };
        self.plans.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: PlanId, changes: UpdatePlan) -> DbResult<Option<SubscriptionPlan>> {
        if let Some(name) = &changes.name {
            if self.plans.iter().any(|r| r.id != id && &r.name == name) {
                return Err(DbError::Conflict("subscription_plans_name_key".to_string()));
            }
        }
        let Some(mut plan) = self.plans.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = changes.name {
            plan.name = v;
        }
        if let Some(v) = changes.description {
            plan.description = v;
        }
        if let Some(v) = changes.duration_days {
            plan.duration_days = v;
        }
        if let Some(v) = changes.total_coupons {
            plan.total_coupons = v;
        }
        if let Some(v) = changes.price {
            plan.price = v;
        }
        if let Some(v) = changes.meal_types {
            plan.meal_types = v;
        }
        if let Some(v) = changes.meals_per_day {
            plan.meals_per_day = v;
        }
        if let Some(v) = changes.is_active {
            plan.is_active = v;
        }
        if let Some(v) = changes.features {
            plan.features = v;
        }
        plan.updated_at = Utc::now();
        Ok(Some(plan.clone()))
    }

    async fn delete_unreferenced(&self, id: PlanId) -> DbResult<bool> {
        // Hold the ledger lock so no subscription lands between check and delete
        let state = self.state.lock().await;
        if state.subscriptions.values().any(|s| s.plan_id == id) {
            return Ok(false);
        }
        Ok(self.plans.remove(&id).is_some())
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn find_by_id(&self, id: SubscriptionId) -> DbResult<Option<Subscription>> {
        Ok(self.subscription(id).await)
    }

    async fn find_by_user_id(
        &self,
        user_id: UserId,
        status: Option<SubscriptionStatus>,
    ) -> DbResult<Vec<Subscription>> {
        let state = self.state.lock().await;
        let subs = state
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        Ok(sorted_newest_first(subs))
    }

    async fn list(&self, filter: SubscriptionFilter) -> DbResult<(Vec<Subscription>, i64)> {
        let state = self.state.lock().await;
        let subs = sorted_newest_first(
            state
                .subscriptions
                .values()
                .filter(|s| filter.status.map_or(true, |st| s.status == st))
                .cloned()
                .collect(),
        );
        let total = subs.len() as i64;
        let page = subs
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn create(&self, sub: CreateSubscription) -> DbResult<Subscription> {
        let mut state = self.state.lock().await;
        if state.subscriptions.values().any(|s| s.code == sub.code) {
            return Err(DbError::Conflict("subscriptions_code_key".to_string()));
        }
        let now = Utc::now();
        let row = Subscription {
            id: sub.id,
            user_id: sub.user_id,
            plan_id: sub.plan_id,
            code: sub.code,
            start_date: sub.start_date,
            end_date: sub.end_date,
            status: SubscriptionStatus::Pending,
            total_coupons: sub.total_coupons,
            used_coupons: 0,
            remaining_coupons: sub.total_coupons,
            payment_status: PaymentStatus::Pending,
            payment_method: sub.payment_method,
            amount_paid: sub.amount_paid,
            transaction_id: None,
            payment_date: None,
            reminders_sent: RemindersSent::default(),
            last_reminder_sent: None,
            is_active: true,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        state.subscriptions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete(&self, id: SubscriptionId) -> DbResult<()> {
        if self.faults.fail_delete.load(Ordering::SeqCst) {
            return Err(DbError::Corrupt("injected delete failure".to_string()));
        }
        let mut state = self.state.lock().await;
        state.subscriptions.remove(&id);
        state.coupons.retain(|_, c| c.subscription_id != id);
        Ok(())
    }

    async fn transition_status(
        &self,
        id: SubscriptionId,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> DbResult<Option<Subscription>> {
        let mut state = self.state.lock().await;
        match state.subscriptions.get_mut(&id) {
            Some(sub) if sub.status == from => {
                sub.status = to;
                sub.recompute_counters();
                sub.updated_at = Utc::now();
                Ok(Some(sub.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn confirm_payment(
        &self,
        id: SubscriptionId,
        payment: ConfirmPayment,
    ) -> DbResult<Option<Subscription>> {
        let mut state = self.state.lock().await;
        match state.subscriptions.get_mut(&id) {
            Some(sub) if sub.status == SubscriptionStatus::Pending => {
                sub.status = SubscriptionStatus::Active;
                sub.payment_status = PaymentStatus::Paid;
                sub.payment_method = Some(payment.method);
                sub.transaction_id = payment.transaction_id;
                sub.amount_paid = payment.amount_paid;
                sub.payment_date = Some(payment.paid_at);
                sub.recompute_counters();
                Ok(Some(sub.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_payment_status(
        &self,
        id: SubscriptionId,
        status: PaymentStatus,
    ) -> DbResult<Option<Subscription>> {
        let mut state = self.state.lock().await;
        Ok(state.subscriptions.get_mut(&id).map(|sub| {
            sub.payment_status = status;
            sub.clone()
        }))
    }

    async fn update_end_date(
        &self,
        id: SubscriptionId,
        end_date: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>> {
        let mut state = self.state.lock().await;
        let updated = match state.subscriptions.get_mut(&id) {
            Some(sub) if !sub.status.is_terminal() => {
                sub.end_date = end_date;
                sub.reminders_sent = RemindersSent::default();
                sub.clone()
            }
            _ => return Ok(None),
        };
        for coupon in state.coupons.values_mut() {
            if coupon.subscription_id == id && coupon.status == CouponStatus::Available {
                coupon.expiry_date = Some(end_date);
            }
        }
        Ok(Some(updated))
    }

    async fn record_reminder(
        &self,
        id: SubscriptionId,
        sent: RemindersSent,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut state = self.state.lock().await;
        if let Some(sub) = state.subscriptions.get_mut(&id) {
            sub.reminders_sent = sent;
            sub.last_reminder_sent = Some(at);
        }
        Ok(())
    }

    async fn cancel_with_coupons(
        &self,
        id: SubscriptionId,
    ) -> DbResult<Option<(Subscription, u64)>> {
        let mut state = self.state.lock().await;
        let cancelled = match state.subscriptions.get_mut(&id) {
            Some(sub) if !sub.status.is_terminal() => {
                sub.status = SubscriptionStatus::Cancelled;
                sub.recompute_counters();
                sub.clone()
            }
            _ => return Ok(None),
        };
        let mut count = 0;
        for coupon in state.coupons.values_mut() {
            if coupon.subscription_id == id && coupon.status == CouponStatus::Available {
                coupon.status = CouponStatus::Cancelled;
                count += 1;
            }
        }
        Ok(Some((cancelled, count)))
    }

    async fn totals_by_status(&self) -> DbResult<Vec<StatusTotals>> {
        let state = self.state.lock().await;
        let mut totals: HashMap<SubscriptionStatus, StatusTotals> = HashMap::new();
        for sub in state.subscriptions.values() {
            let entry = totals.entry(sub.status).or_insert(StatusTotals {
                status: sub.status,
                count: 0,
                revenue: 0,
            });
            entry.count += 1;
            entry.revenue += sub.amount_paid;
        }
        let mut totals: Vec<StatusTotals> = totals.into_values().collect();
        totals.sort_by_key(|t| t.status.as_str());
        Ok(totals)
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn insert_batch(&self, coupons: Vec<CreateCoupon>) -> DbResult<Vec<Coupon>> {
        if self.faults.fail_coupon_insert.swap(false, Ordering::SeqCst) {
            return Err(DbError::Corrupt("injected insert failure".to_string()));
        }
        let pending_conflicts = self.faults.coupon_conflicts.load(Ordering::SeqCst);
        if pending_conflicts > 0 {
            self.faults
                .coupon_conflicts
                .store(pending_conflicts - 1, Ordering::SeqCst);
            return Err(DbError::Conflict("coupons_code_key".to_string()));
        }

        let mut state = self.state.lock().await;
        let mut codes: HashSet<&str> = state.coupons.values().map(|c| c.code.as_str()).collect();
        for coupon in &coupons {
            if !codes.insert(coupon.code.as_str()) {
                return Err(DbError::Conflict("coupons_code_key".to_string()));
            }
        }

        let now = Utc::now();
        let rows: Vec<Coupon> = coupons
            .into_iter()
            .map(|c| Coupon {
                id: c.id,
                subscription_id: c.subscription_id,
                user_id: c.user_id,
                code: c.code,
                sequence: c.sequence,
                meal_type: c.meal_type,
                status: CouponStatus::Available,
                used_at: None,
                used_by: None,
                usage_location: None,
                expiry_date: c.expiry_date,
                created_at: now,
            })
            .collect();
        for row in &rows {
            state.coupons.insert(row.id, row.clone());
        }
        Ok(rows)
    }

    async fn find_by_id(&self, id: CouponId) -> DbResult<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let state = self.state.lock().await;
        Ok(state.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn find_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> DbResult<Vec<Coupon>> {
        Ok(self.coupons_of(subscription_id).await)
    }

    async fn find_by_user(&self, user_id: UserId, filter: CouponFilter) -> DbResult<Vec<Coupon>> {
        let state = self.state.lock().await;
        let mut coupons: Vec<Coupon> = state
            .coupons
            .values()
            .filter(|c| c.user_id == user_id)
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.subscription_id.map_or(true, |s| c.subscription_id == s))
            .cloned()
            .collect();
        coupons.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(coupons)
    }

    async fn expire(&self, id: CouponId) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        if self.faults.redeem_before_expire.swap(false, Ordering::SeqCst) {
            if let Some(c) = state.coupons.get_mut(&id) {
                c.status = CouponStatus::Used;
            }
        }
        match state.coupons.get_mut(&id) {
            Some(c) if c.status == CouponStatus::Available => {
                c.status = CouponStatus::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_available(&self, subscription_id: SubscriptionId) -> DbResult<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for c in state.coupons.values_mut() {
            if c.subscription_id == subscription_id && c.status == CouponStatus::Available {
                c.status = CouponStatus::Cancelled;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_status(&self) -> DbResult<CouponCounts> {
        let state = self.state.lock().await;
        let mut counts = CouponCounts::default();
        for c in state.coupons.values() {
            match c.status {
                CouponStatus::Available => counts.available += 1,
                CouponStatus::Used => counts.used += 1,
                CouponStatus::Expired => counts.expired += 1,
                CouponStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }
}

fn attendance_row(record: CreateAttendance) -> MealAttendance {
    MealAttendance {
        id: record.id,
        user_id: record.user_id,
        subscription_id: record.subscription_id,
        coupon_id: record.coupon_id,
        meal_type: record.meal_type,
        checked_in_at: record.checked_in_at,
        verified_by: record.verified_by,
        location: record.location,
    }
}

#[async_trait]
impl AttendanceRepository for MemoryStore {
    async fn find_by_user(&self, user_id: UserId, limit: i64) -> DbResult<Vec<MealAttendance>> {
        let state = self.state.lock().await;
        let mut rows: Vec<MealAttendance> = state
            .attendance
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.checked_in_at.cmp(&a.checked_in_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn find_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> DbResult<Vec<MealAttendance>> {
        let state = self.state.lock().await;
        let mut rows: Vec<MealAttendance> = state
            .attendance
            .iter()
            .filter(|a| a.subscription_id == subscription_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.checked_in_at.cmp(&a.checked_in_at));
        Ok(rows)
    }

    async fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .attendance
            .iter()
            .filter(|a| a.checked_in_at >= from && a.checked_in_at < to)
            .count() as i64)
    }
}

#[async_trait]
impl RedemptionRepository for MemoryStore {
    async fn redeem(&self, redemption: RedeemCoupon) -> DbResult<RedeemOutcome> {
        let mut state = self.state.lock().await;

        let usable = state
            .subscriptions
            .get(&redemption.subscription_id)
            .is_some_and(|s| {
                s.status == SubscriptionStatus::Active && s.end_date >= redemption.usage.used_at
            });
        if !usable {
            return Ok(RedeemOutcome::SubscriptionInactive);
        }

        let coupon = match state.coupons.get_mut(&redemption.coupon_id) {
            Some(c)
                if c.status == CouponStatus::Available
                    && c.subscription_id == redemption.subscription_id =>
            {
                c.status = CouponStatus::Used;
                c.used_at = Some(redemption.usage.used_at);
                c.used_by = Some(redemption.usage.used_by);
                c.usage_location = Some(redemption.usage.location.clone());
                c.clone()
            }
            _ => return Ok(RedeemOutcome::CouponUnavailable),
        };

        let subscription = match state.subscriptions.get_mut(&redemption.subscription_id) {
            Some(sub) => {
                sub.used_coupons += 1;
                sub.recompute_counters();
                sub.clone()
            }
            None => return Err(DbError::NotFound),
        };

        let attendance = attendance_row(redemption.attendance);
        state.attendance.push(attendance.clone());

        Ok(RedeemOutcome::Redeemed {
            coupon,
            subscription,
            attendance,
        })
    }
}
