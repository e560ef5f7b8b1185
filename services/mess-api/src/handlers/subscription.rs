//! Subscription handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use mess_core::{
    CancelOutcome, NewSubscription, PaymentConfirmation, SubscriptionPage, SubscriptionStats,
};
use mess_types::{PaymentMethod, Subscription, SubscriptionId, SubscriptionStatus};

use crate::error::{ApiError, ApiResult};
use crate::extractors::Caller;
use crate::handlers::shared::record_op_duration;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<SubscriptionStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub status: Option<SubscriptionStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: SubscriptionStatus,
}

/// Result reported by the payment collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub status: PaymentOutcome,
    pub method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub amount_paid: Option<i64>,
}

impl PaymentRequest {
    /// Turn a "paid" report into a confirmation
    pub fn into_confirmation(self) -> Result<PaymentConfirmation, ApiError> {
        let method = self
            .method
            .ok_or_else(|| ApiError::BadRequest("method is required for a paid status".into()))?;
        if matches!(self.amount_paid, Some(amount) if amount < 0) {
            return Err(ApiError::BadRequest("amountPaid cannot be negative".into()));
        }
        Ok(PaymentConfirmation {
            method,
            transaction_id: self.transaction_id.filter(|t| !t.trim().is_empty()),
            amount_paid: self.amount_paid,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub days: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/subscriptions
#[instrument(skip(state, caller, payload), fields(user_id = %caller.user_id))]
pub async fn create_subscription(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<NewSubscription>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    let Json(req) = payload?;
    let subscription = state
        .engine
        .subscriptions
        .create(caller.user_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /api/v1/subscriptions/mine
pub async fn my_subscriptions(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Subscription>>> {
    let start = Instant::now();
    let Query(query) = query?;

    let result = state
        .engine
        .subscriptions
        .list_for_user(caller.user_id, query.status)
        .await;
    record_op_duration("list_my_subscriptions", start, result.is_ok());

    Ok(Json(result?))
}

/// GET /api/v1/subscriptions/:id
pub async fn get_subscription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state
        .engine
        .subscriptions
        .get(&caller, SubscriptionId(id))
        .await?;
    Ok(Json(subscription))
}

/// GET /api/v1/subscriptions
pub async fn list_subscriptions(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<ListSubscriptionsQuery>, QueryRejection>,
) -> ApiResult<Json<SubscriptionPage>> {
    let start = Instant::now();
    let Query(query) = query?;

    let result = state
        .engine
        .subscriptions
        .list_all(
            &caller,
            query.status,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await;
    record_op_duration("list_subscriptions", start, result.is_ok());

    Ok(Json(result?))
}

/// GET /api/v1/subscriptions/stats
pub async fn subscription_stats(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<SubscriptionStats>> {
    let stats = state.engine.subscriptions.stats(&caller).await?;
    Ok(Json(stats))
}

/// PATCH /api/v1/subscriptions/:id/cancel
#[instrument(skip(state, caller), fields(subscription_id = %id, user_id = %caller.user_id))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CancelOutcome>> {
    let outcome = state
        .engine
        .subscriptions
        .cancel(&caller, SubscriptionId(id))
        .await?;
    Ok(Json(outcome))
}

/// PATCH /api/v1/subscriptions/:id/status
#[instrument(skip(state, caller, payload), fields(subscription_id = %id))]
pub async fn update_subscription_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<Subscription>> {
    let Json(req) = payload?;
    let subscription = state
        .engine
        .subscriptions
        .set_status(&caller, SubscriptionId(id), req.status)
        .await?;
    Ok(Json(subscription))
}

/// POST /api/v1/subscriptions/:id/payment
#[instrument(skip(state, caller, payload), fields(subscription_id = %id))]
pub async fn record_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> ApiResult<Json<Subscription>> {
    let Json(req) = payload?;
    let id = SubscriptionId(id);
    let manager = &state.engine.subscriptions;

    let subscription = match req.status {
        PaymentOutcome::Paid => {
            manager
                .confirm_payment(&caller, id, req.into_confirmation()?)
                .await?
        }
        PaymentOutcome::Failed => manager.mark_payment_failed(&caller, id).await?,
    };
    Ok(Json(subscription))
}

/// POST /api/v1/subscriptions/:id/extend
#[instrument(skip(state, caller, payload), fields(subscription_id = %id))]
pub async fn extend_subscription(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<ExtendRequest>, JsonRejection>,
) -> ApiResult<Json<Subscription>> {
    let Json(req) = payload?;
    let subscription = state
        .engine
        .subscriptions
        .extend(&caller, SubscriptionId(id), req.days)
        .await?;
    Ok(Json(subscription))
}
