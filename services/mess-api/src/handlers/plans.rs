//! Plan catalog handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use mess_core::{MessError, NewPlan, PlanChanges};
use mess_types::{PlanId, SubscriptionPlan};

use crate::error::ApiResult;
use crate::extractors::Caller;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPlansQuery {
    /// Admins may see plans that are no longer sold
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatusRequest {
    pub is_active: bool,
}

/// GET /api/v1/plans
pub async fn list_plans(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ListPlansQuery>,
) -> ApiResult<Json<Vec<SubscriptionPlan>>> {
    if query.include_inactive && !caller.is_admin() {
        return Err(MessError::Forbidden.into());
    }
    let plans = state.engine.catalog.list(!query.include_inactive).await?;
    Ok(Json(plans))
}

/// GET /api/v1/plans/:id
pub async fn get_plan(
    State(state): State<AppState>,
    _caller: Caller,
    Path(plan_id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionPlan>> {
    let plan = state.engine.catalog.get(PlanId(plan_id)).await?;
    Ok(Json(plan))
}

/// POST /api/v1/plans
pub async fn create_plan(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<NewPlan>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubscriptionPlan>)> {
    let Json(req) = payload?;
    let plan = state.engine.catalog.create(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// PUT /api/v1/plans/:id
pub async fn update_plan(
    State(state): State<AppState>,
    caller: Caller,
    Path(plan_id): Path<Uuid>,
    payload: Result<Json<PlanChanges>, JsonRejection>,
) -> ApiResult<Json<SubscriptionPlan>> {
    let Json(changes) = payload?;
    let plan = state
        .engine
        .catalog
        .update(&caller, PlanId(plan_id), changes)
        .await?;
    Ok(Json(plan))
}

/// PATCH /api/v1/plans/:id/status
pub async fn set_plan_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(plan_id): Path<Uuid>,
    payload: Result<Json<PlanStatusRequest>, JsonRejection>,
) -> ApiResult<Json<SubscriptionPlan>> {
    let Json(req) = payload?;
    let plan = state
        .engine
        .catalog
        .set_active(&caller, PlanId(plan_id), req.is_active)
        .await?;
    Ok(Json(plan))
}

/// DELETE /api/v1/plans/:id
pub async fn delete_plan(
    State(state): State<AppState>,
    caller: Caller,
    Path(plan_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.engine.catalog.delete(&caller, PlanId(plan_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_request_requires_flag() {
        let req: PlanStatusRequest = serde_json::from_str(r#"{"isActive":false}"#).unwrap();
        assert!(!req.is_active);

        assert!(serde_json::from_str::<PlanStatusRequest>("{}").is_err());
        assert!(serde_json::from_str::<PlanStatusRequest>(r#"{"isActive":"no"}"#).is_err());
    }
}
