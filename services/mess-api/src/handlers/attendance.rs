//! Attendance history handlers

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use mess_types::MealAttendance;

use crate::error::ApiResult;
use crate::extractors::Caller;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/attendance/mine
pub async fn my_attendance(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<MealAttendance>>> {
    let Query(query) = query?;
    let history = state
        .engine
        .journal
        .list_for_user(caller.user_id, query.limit)
        .await?;
    Ok(Json(history))
}
