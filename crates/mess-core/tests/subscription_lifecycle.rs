//! Subscription lifecycle tests: creation with minting, compensation,
//! cancellation fan-out, lazy expiry, extension, payment and reminders.

mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use chrono::Duration;

use common::{admin, staff, student, utc, Harness};
use mess_core::{LedgerConfig, MessError, NewSubscription, PaymentConfirmation, RedemptionRequest};
use mess_types::{
    CouponStatus, ExpiryReminder, MealType, PaymentMethod, PaymentStatus, PlanId, Principal,
    SubscriptionStatus,
};

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_mints_full_coupon_run() {
    let h = Harness::new();
    let plan = h.plan(30, 60, 3000);
    let user = student();

    let sub = h.subscribe(user.user_id, &plan).await;

    assert_eq!(sub.start_date, utc(2024, 1, 1));
    assert_eq!(sub.end_date, utc(2024, 1, 31));
    assert_eq!(sub.status, SubscriptionStatus::Pending);
    assert_eq!(sub.payment_status, PaymentStatus::Pending);
    assert_eq!(sub.total_coupons, 60);
    assert_eq!(sub.remaining_coupons, 60);
    assert_eq!(sub.amount_paid, 3000);
    assert!(sub.code.starts_with("SUB"));

    let coupons = h.store.coupons_of(sub.id).await;
    assert_eq!(coupons.len(), 60);

    let sequences: Vec<i32> = coupons.iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, (1..=60).collect::<Vec<_>>());

    let codes: HashSet<&str> = coupons.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes.len(), 60);

    for coupon in &coupons {
        assert_eq!(coupon.status, CouponStatus::Available);
        assert_eq!(coupon.expiry_date, Some(sub.end_date));
        assert_eq!(coupon.user_id, user.user_id);
        assert!(coupon.code.starts_with("CPN"));
    }

    assert_eq!(h.notifier.kinds(), vec!["subscription_created"]);
}

#[tokio::test]
async fn test_create_with_explicit_start_date() {
    let h = Harness::new();
    let plan = h.plan(7, 14, 700);

    let sub = h
        .engine
        .subscriptions
        .create(
            student().user_id,
            NewSubscription {
                plan_id: plan.id,
                start_date: Some(utc(2024, 3, 1)),
                payment_method: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(sub.end_date, utc(2024, 3, 8));
    assert_eq!(sub.payment_method, None);
}

#[tokio::test]
async fn test_create_rejects_missing_and_inactive_plans() {
    let h = Harness::new();
    let user = student().user_id;

    let err = h
        .engine
        .subscriptions
        .create(
            user,
            NewSubscription {
                plan_id: PlanId::new(),
                start_date: None,
                payment_method: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MessError::NotFound("plan")));

    let mut plan = common::plan_fixture(30, 60, 3000);
    plan.is_active = false;
    h.store.insert_plan(plan.clone());

    let err = h
        .engine
        .subscriptions
        .create(
            user,
            NewSubscription {
                plan_id: plan.id,
                start_date: None,
                payment_method: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MessError::PlanInactive));
    assert_eq!(h.store.subscription_count().await, 0);
}

#[tokio::test]
async fn test_mint_failure_deletes_subscription() {
    let h = Harness::new();
    let plan = h.plan(30, 60, 3000);
    h.store
        .faults
        .fail_coupon_insert
        .store(true, Ordering::SeqCst);

    let err = h
        .engine
        .subscriptions
        .create(
            student().user_id,
            NewSubscription {
                plan_id: plan.id,
                start_date: None,
                payment_method: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MessError::Persistence(_)));
    assert_eq!(h.store.subscription_count().await, 0);
    assert_eq!(h.store.coupon_count().await, 0);
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn test_failed_compensation_still_reports_mint_error() {
    let h = Harness::new();
    let plan = h.plan(30, 10, 500);
    h.store
        .faults
        .fail_coupon_insert
        .store(true, Ordering::SeqCst);
    h.store.faults.fail_delete.store(true, Ordering::SeqCst);

    let err = h
        .engine
        .subscriptions
        .create(
            student().user_id,
            NewSubscription {
                plan_id: plan.id,
                start_date: None,
                payment_method: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MessError::Persistence(_)));
    // Left behind for manual reconciliation, with no coupons
    assert_eq!(h.store.subscription_count().await, 1);
    assert_eq!(h.store.coupon_count().await, 0);
}

#[tokio::test]
async fn test_code_collisions_are_retried() {
    let h = Harness::new();
    let plan = h.plan(30, 5, 300);
    h.store.faults.coupon_conflicts.store(2, Ordering::SeqCst);

    let sub = h.subscribe(student().user_id, &plan).await;
    assert_eq!(h.store.coupons_of(sub.id).await.len(), 5);
}

#[tokio::test]
async fn test_code_collisions_exhaust_attempts() {
    let h = Harness::with_config(utc(2024, 1, 1), LedgerConfig::new().with_code_attempts(2));
    let plan = h.plan(30, 5, 300);
    h.store.faults.coupon_conflicts.store(5, Ordering::SeqCst);

    let err = h
        .engine
        .subscriptions
        .create(
            student().user_id,
            NewSubscription {
                plan_id: plan.id,
                start_date: None,
                payment_method: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MessError::Persistence(_)));
    assert_eq!(h.store.subscription_count().await, 0);
}

// ============================================================================
// Cancellation
// ============================================================================

async fn redeem_n(h: &Harness, sub_id: mess_types::SubscriptionId, n: usize) {
    let terminal = staff();
    let coupons = h.store.coupons_of(sub_id).await;
    for coupon in coupons.iter().take(n) {
        h.engine
            .redemptions
            .redeem(
                &terminal,
                RedemptionRequest::by_code(&coupon.code, MealType::Lunch),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_cancel_keeps_used_and_cancels_available() {
    let h = Harness::new();
    let plan = h.plan(30, 10, 1000);
    let owner = student();
    let sub = h.active_subscription(owner.user_id, &plan).await;
    redeem_n(&h, sub.id, 3).await;

    let outcome = h.engine.subscriptions.cancel(&owner, sub.id).await.unwrap();

    assert_eq!(outcome.cancelled_coupons, 7);
    assert_eq!(outcome.subscription.status, SubscriptionStatus::Cancelled);
    assert!(!outcome.subscription.is_active);
    assert_eq!(outcome.subscription.used_coupons, 3);

    let coupons = h.engine.ledger.list_for_subscription(sub.id).await.unwrap();
    assert_eq!(coupons.len(), 10);
    assert!(coupons.windows(2).all(|w| w[0].sequence < w[1].sequence));
    let used = coupons
        .iter()
        .filter(|c| c.status == CouponStatus::Used)
        .count();
    let cancelled = coupons
        .iter()
        .filter(|c| c.status == CouponStatus::Cancelled)
        .count();
    assert_eq!((used, cancelled), (3, 7));
}

#[tokio::test]
async fn test_cancel_authorization_and_repeat() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner = student();
    let sub = h.subscribe(owner.user_id, &plan).await;

    let err = h
        .engine
        .subscriptions
        .cancel(&student(), sub.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MessError::Forbidden));

    let err = h
        .engine
        .subscriptions
        .cancel(&staff(), sub.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MessError::Forbidden));

    h.engine.subscriptions.cancel(&admin(), sub.id).await.unwrap();

    let err = h
        .engine
        .subscriptions
        .cancel(&owner, sub.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MessError::AlreadyCancelled));
}

#[tokio::test]
async fn test_cancel_is_idempotent_for_coupons() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let sub = h.subscribe(student().user_id, &plan).await;

    h.engine.subscriptions.cancel(&admin(), sub.id).await.unwrap();
    let again = h.engine.ledger.cancel_available(sub.id).await.unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_cancel_after_lazy_expiry_is_rejected() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner = student();
    let sub = h.active_subscription(owner.user_id, &plan).await;

    h.clock.advance(Duration::days(31));
    let err = h
        .engine
        .subscriptions
        .cancel(&owner, sub.id)
        .await
        .unwrap_err();

    assert!(matches!(err, MessError::SubscriptionInactive));
    let stored = h.store.subscription(sub.id).await.unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired);
    assert!(!stored.is_active);
}

// ============================================================================
// Reads and lazy expiry
// ============================================================================

#[tokio::test]
async fn test_get_applies_lazy_expiry() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner = student();
    let sub = h.active_subscription(owner.user_id, &plan).await;

    // Exactly at the end date the subscription is still active
    h.clock.set(utc(2024, 1, 31));
    let current = h.engine.subscriptions.get(&owner, sub.id).await.unwrap();
    assert_eq!(current.status, SubscriptionStatus::Active);

    h.clock.advance(Duration::seconds(1));
    let current = h.engine.subscriptions.get(&owner, sub.id).await.unwrap();
    assert_eq!(current.status, SubscriptionStatus::Expired);
}

#[tokio::test]
async fn test_pending_subscription_never_expires_lazily() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner = student();
    let sub = h.subscribe(owner.user_id, &plan).await;

    h.clock.advance(Duration::days(60));
    let current = h.engine.subscriptions.get(&owner, sub.id).await.unwrap();
    assert_eq!(current.status, SubscriptionStatus::Pending);
}

#[tokio::test]
async fn test_get_requires_owner_or_admin() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner = student();
    let sub = h.subscribe(owner.user_id, &plan).await;

    assert!(h.engine.subscriptions.get(&owner, sub.id).await.is_ok());
    assert!(h.engine.subscriptions.get(&admin(), sub.id).await.is_ok());
    assert!(matches!(
        h.engine.subscriptions.get(&student(), sub.id).await,
        Err(MessError::Forbidden)
    ));
}

#[tokio::test]
async fn test_list_for_user_filters_by_status() {
    let h = Harness::new();
    let plan = h.plan(30, 2, 200);
    let owner = student();
    h.subscribe(owner.user_id, &plan).await;
    h.active_subscription(owner.user_id, &plan).await;
    h.subscribe(student().user_id, &plan).await;

    let all = h
        .engine
        .subscriptions
        .list_for_user(owner.user_id, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let active = h
        .engine
        .subscriptions
        .list_for_user(owner.user_id, Some(SubscriptionStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_list_all_is_paginated_and_admin_only() {
    let h = Harness::new();
    let plan = h.plan(30, 2, 200);
    for _ in 0..3 {
        h.subscribe(student().user_id, &plan).await;
    }

    let page = h
        .engine
        .subscriptions
        .list_all(&admin(), None, 1, 2)
        .await
        .unwrap();
    assert_eq!(page.subscriptions.len(), 2);
    assert_eq!(page.total, 3);

    let page = h
        .engine
        .subscriptions
        .list_all(&admin(), None, 2, 2)
        .await
        .unwrap();
    assert_eq!(page.subscriptions.len(), 1);

    assert!(matches!(
        h.engine.subscriptions.list_all(&staff(), None, 1, 10).await,
        Err(MessError::Forbidden)
    ));
}

#[tokio::test]
async fn test_stats_count_and_revenue_per_status() {
    let h = Harness::new();
    let plan = h.plan(30, 2, 200);
    h.subscribe(student().user_id, &plan).await;
    h.subscribe(student().user_id, &plan).await;
    h.active_subscription(student().user_id, &plan).await;
    let dropped = h.active_subscription(student().user_id, &plan).await;
    h.engine
        .subscriptions
        .cancel(&admin(), dropped.id)
        .await
        .unwrap();

    let stats = h.engine.subscriptions.stats(&admin()).await.unwrap();
    assert_eq!(stats.total_subscriptions, 4);
    assert_eq!(stats.active_subscriptions, 1);

    let rows: Vec<_> = stats
        .by_status
        .iter()
        .map(|b| (b.status, b.count, b.total_revenue))
        .collect();
    assert_eq!(
        rows,
        vec![
            (SubscriptionStatus::Active, 1, 200),
            (SubscriptionStatus::Cancelled, 1, 200),
            (SubscriptionStatus::Pending, 2, 400),
        ]
    );
}

#[tokio::test]
async fn test_stats_are_admin_only_and_empty_without_subscriptions() {
    let h = Harness::new();

    assert!(matches!(
        h.engine.subscriptions.stats(&staff()).await,
        Err(MessError::Forbidden)
    ));

    let stats = h.engine.subscriptions.stats(&admin()).await.unwrap();
    assert!(stats.by_status.is_empty());
    assert_eq!(stats.total_subscriptions, 0);
    assert_eq!(stats.active_subscriptions, 0);
}

// ============================================================================
// Extension
// ============================================================================

#[tokio::test]
async fn test_extend_moves_end_date_and_coupon_expiry() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let sub = h.active_subscription(student().user_id, &plan).await;

    let extended = h
        .engine
        .subscriptions
        .extend(&admin(), sub.id, 10)
        .await
        .unwrap();

    assert_eq!(extended.end_date, utc(2024, 2, 10));
    for coupon in h.store.coupons_of(sub.id).await {
        assert_eq!(coupon.expiry_date, Some(utc(2024, 2, 10)));
    }
}

#[tokio::test]
async fn test_extend_rejects_terminal_and_bad_input() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner = student();
    let sub = h.active_subscription(owner.user_id, &plan).await;

    assert!(matches!(
        h.engine.subscriptions.extend(&owner, sub.id, 5).await,
        Err(MessError::Forbidden)
    ));
    assert!(matches!(
        h.engine.subscriptions.extend(&admin(), sub.id, 0).await,
        Err(MessError::InvalidInput(_))
    ));

    h.clock.advance(Duration::days(45));
    assert!(matches!(
        h.engine.subscriptions.extend(&admin(), sub.id, 5).await,
        Err(MessError::SubscriptionInactive)
    ));
}

// ============================================================================
// Payment and status overrides
// ============================================================================

#[tokio::test]
async fn test_confirm_payment_activates_and_emits_receipt() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let sub = h.subscribe(student().user_id, &plan).await;

    let paid = h
        .engine
        .subscriptions
        .confirm_payment(
            &admin(),
            sub.id,
            PaymentConfirmation {
                method: PaymentMethod::Card,
                transaction_id: Some("TXN-42".to_string()),
                amount_paid: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(paid.status, SubscriptionStatus::Active);
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.payment_method, Some(PaymentMethod::Card));
    assert_eq!(paid.amount_paid, 400);
    assert_eq!(paid.payment_date, Some(utc(2024, 1, 1)));
    assert_eq!(
        h.notifier.kinds(),
        vec!["subscription_created", "payment_receipt"]
    );

    let err = h
        .engine
        .subscriptions
        .confirm_payment(
            &admin(),
            sub.id,
            PaymentConfirmation {
                method: PaymentMethod::Cash,
                transaction_id: None,
                amount_paid: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MessError::SubscriptionInactive));
}

#[tokio::test]
async fn test_mark_payment_failed_keeps_status() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let sub = h.subscribe(student().user_id, &plan).await;

    let updated = h
        .engine
        .subscriptions
        .mark_payment_failed(&admin(), sub.id)
        .await
        .unwrap();

    assert_eq!(updated.payment_status, PaymentStatus::Failed);
    assert_eq!(updated.status, SubscriptionStatus::Pending);
}

#[tokio::test]
async fn test_set_status_allows_only_legal_transitions() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let sub = h.subscribe(student().user_id, &plan).await;
    let root = admin();

    let active = h
        .engine
        .subscriptions
        .set_status(&root, sub.id, SubscriptionStatus::Active)
        .await
        .unwrap();
    assert_eq!(active.status, SubscriptionStatus::Active);

    assert!(matches!(
        h.engine
            .subscriptions
            .set_status(&root, sub.id, SubscriptionStatus::Pending)
            .await,
        Err(MessError::InvalidInput(_))
    ));

    let cancelled = h
        .engine
        .subscriptions
        .set_status(&root, sub.id, SubscriptionStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(h
        .store
        .coupons_of(sub.id)
        .await
        .iter()
        .all(|c| c.status == CouponStatus::Cancelled));

    assert!(matches!(
        h.engine
            .subscriptions
            .set_status(&root, sub.id, SubscriptionStatus::Cancelled)
            .await,
        Err(MessError::AlreadyCancelled)
    ));
    assert!(matches!(
        h.engine
            .subscriptions
            .set_status(&root, sub.id, SubscriptionStatus::Active)
            .await,
        Err(MessError::InvalidInput(_))
    ));
}

// ============================================================================
// Expiry reminders
// ============================================================================

#[tokio::test]
async fn test_reminders_fire_once_per_milestone() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner = student();
    let sub = h.active_subscription(owner.user_id, &plan).await;
    let manager = &h.engine.subscriptions;

    // Eight days out: nothing due
    h.clock.set(utc(2024, 1, 23));
    manager.get(&owner, sub.id).await.unwrap();
    assert_eq!(h.notifier.kinds().len(), 2);

    h.clock.set(utc(2024, 1, 26));
    manager.get(&owner, sub.id).await.unwrap();
    manager.get(&owner, sub.id).await.unwrap();

    h.clock.set(utc(2024, 1, 29));
    let current = manager.get(&owner, sub.id).await.unwrap();

    assert_eq!(
        h.notifier.kinds(),
        vec![
            "subscription_created",
            "payment_receipt",
            "expiring_soon",
            "expiring_soon"
        ]
    );
    assert!(current.reminders_sent.is_sent(ExpiryReminder::ThreeDays));
    assert!(!current.reminders_sent.is_sent(ExpiryReminder::OnExpiry));
    assert_eq!(current.last_reminder_sent, Some(utc(2024, 1, 29)));
}

#[tokio::test]
async fn test_expiry_reminder_reports_days_left() {
    let h = Harness::new();
    let plan = h.plan(30, 4, 400);
    let owner: Principal = student();
    let mut sub = h.active_subscription(owner.user_id, &plan).await;

    let sent = h
        .engine
        .subscriptions
        .expiry_reminder(&mut sub, utc(2024, 1, 25))
        .await
        .unwrap();
    assert_eq!(sent, Some(ExpiryReminder::SevenDays));

    let events = h.notifier.events();
    match events.last() {
        Some(mess_types::MessEvent::ExpiringSoon { days_left, .. }) => assert_eq!(*days_left, 6),
        other => panic!("unexpected event: {other:?}"),
    }

    let again = h
        .engine
        .subscriptions
        .expiry_reminder(&mut sub, utc(2024, 1, 25))
        .await
        .unwrap();
    assert_eq!(again, None);
}
