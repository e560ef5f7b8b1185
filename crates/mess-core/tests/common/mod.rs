//! Common test utilities for mess-core integration tests

pub mod mock_repos;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use mess_core::{Clock, LedgerConfig, MessEngine, NewSubscription, Notifier, NotifyError};
use mess_types::{
    MealType, MessEvent, PaymentMethod, PlanId, Principal, Role, Subscription, SubscriptionPlan,
    UserId,
};

#[allow(unused_imports)]
pub use mock_repos::MemoryStore;

/// Clock the test moves by hand
#[derive(Debug)]
pub struct TestClock(Mutex<DateTime<Utc>>);

#[allow(dead_code)]
impl TestClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Notifier that keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<MessEvent>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn events(&self) -> Vec<MessEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(MessEvent::kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &MessEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Engine wired over an in-memory store
pub struct Harness {
    pub engine: MessEngine,
    pub store: MemoryStore,
    pub clock: Arc<TestClock>,
    pub notifier: Arc<RecordingNotifier>,
}

#[allow(dead_code)]
impl Harness {
    /// Harness with the clock at 2024-01-01T00:00:00Z
    pub fn new() -> Self {
        Self::at(utc(2024, 1, 1))
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self::with_config(now, LedgerConfig::new())
    }

    pub fn with_config(now: DateTime<Utc>, config: LedgerConfig) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(TestClock::at(now));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = MessEngine::new(store.stores(), config, notifier.clone(), clock.clone());
        Self {
            engine,
            store,
            clock,
            notifier,
        }
    }

    /// Add an active plan to the catalog
    pub fn plan(&self, duration_days: i32, total_coupons: i32, price: i64) -> SubscriptionPlan {
        let plan = plan_fixture(duration_days, total_coupons, price);
        self.store.insert_plan(plan.clone());
        plan
    }

    /// Create a pending subscription starting now
    pub async fn subscribe(&self, user: UserId, plan: &SubscriptionPlan) -> Subscription {
        self.engine
            .subscriptions
            .create(
                user,
                NewSubscription {
                    plan_id: plan.id,
                    start_date: None,
                    payment_method: Some(PaymentMethod::Upi),
                },
            )
            .await
            .expect("create subscription")
    }

    /// Create a subscription and settle its payment
    pub async fn active_subscription(
        &self,
        user: UserId,
        plan: &SubscriptionPlan,
    ) -> Subscription {
        let sub = self.subscribe(user, plan).await;
        self.engine
            .subscriptions
            .confirm_payment(
                &admin(),
                sub.id,
                mess_core::PaymentConfirmation {
                    method: PaymentMethod::Upi,
                    transaction_id: Some("TXN-1".to_string()),
                    amount_paid: None,
                },
            )
            .await
            .expect("confirm payment")
    }
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn plan_fixture(duration_days: i32, total_coupons: i32, price: i64) -> SubscriptionPlan {
    let now = Utc::now();
    SubscriptionPlan {
        id: PlanId::new(),
        name: format!("Plan {}", PlanId::new()),
        description: "Lunch and dinner".to_string(),
        duration_days,
        total_coupons,
        price,
        meal_types: vec![MealType::Lunch, MealType::Dinner],
        meals_per_day: 2,
        is_active: true,
        features: vec![],
        created_at: now,
        updated_at: now,
    }
}

#[allow(dead_code)]
pub fn student() -> Principal {
    Principal::new(UserId::new(), Role::Student)
}

#[allow(dead_code)]
pub fn staff() -> Principal {
    Principal::new(UserId::new(), Role::Staff)
}

#[allow(dead_code)]
pub fn admin() -> Principal {
    Principal::new(UserId::new(), Role::Admin)
}
