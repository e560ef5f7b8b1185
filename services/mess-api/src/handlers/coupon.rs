//! Coupon handlers
//!
//! Staff terminals redeem coupons through `validate` (typed code) or
//! `scan-qr` (raw scanner output). Students read their own coupons.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use mess_core::{CouponView, RedemptionReceipt, RedemptionRequest, UsageStats};
use mess_db::CouponFilter;
use mess_types::{Coupon, CouponId, CouponStatus, MealType, SubscriptionId};

use crate::error::ApiResult;
use crate::extractors::Caller;
use crate::handlers::shared::{validate_code, validate_location, validate_scan};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponListQuery {
    pub status: Option<CouponStatus>,
    pub subscription_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    pub coupon_code: String,
    pub meal_type: MealType,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanQrRequest {
    pub qr_data: String,
    pub meal_type: MealType,
    pub location: Option<String>,
}

fn with_location(request: RedemptionRequest, location: Option<String>) -> RedemptionRequest {
    match location {
        Some(location) => request.at(location),
        None => request,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/coupons/mine
pub async fn my_coupons(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<CouponListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Coupon>>> {
    let Query(query) = query?;
    let filter = CouponFilter {
        status: query.status,
        subscription_id: query.subscription_id.map(SubscriptionId),
    };
    let coupons = state
        .engine
        .ledger
        .list_for_user(caller.user_id, filter)
        .await?;
    Ok(Json(coupons))
}

/// GET /api/v1/coupons/:id
pub async fn get_coupon(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CouponView>> {
    let view = state.engine.ledger.get(&caller, CouponId(id)).await?;
    Ok(Json(view))
}

/// POST /api/v1/coupons/validate
///
/// Redeem a coupon by its typed code.
#[instrument(skip(state, caller, payload), fields(staff_id = %caller.user_id))]
pub async fn validate_coupon(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ValidateCouponRequest>, JsonRejection>,
) -> ApiResult<Json<RedemptionReceipt>> {
    let Json(req) = payload?;
    let code = validate_code(&req.coupon_code)?;
    let location = validate_location(req.location)?;

    let request = with_location(RedemptionRequest::by_code(code, req.meal_type), location);
    let receipt = state.engine.redemptions.redeem(&caller, request).await?;
    Ok(Json(receipt))
}

/// POST /api/v1/coupons/scan-qr
///
/// Redeem a coupon from raw scanner output: a QR JSON payload or a bare code.
#[instrument(skip(state, caller, payload), fields(staff_id = %caller.user_id))]
pub async fn scan_qr(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ScanQrRequest>, JsonRejection>,
) -> ApiResult<Json<RedemptionReceipt>> {
    let Json(req) = payload?;
    let raw = validate_scan(&req.qr_data)?;
    let location = validate_location(req.location)?;

    let request = with_location(RedemptionRequest::from_scan(raw, req.meal_type)?, location);
    let receipt = state.engine.redemptions.redeem(&caller, request).await?;
    Ok(Json(receipt))
}

/// GET /api/v1/coupons/stats/usage
pub async fn usage_stats(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<UsageStats>> {
    let stats = state.engine.ledger.usage_stats(&caller).await?;
    Ok(Json(stats))
}
