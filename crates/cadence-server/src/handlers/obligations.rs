//! Obligation handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::patterns::owned_pattern;
use crate::{get_user_id, AppError, AppState, MAX_PAGE_LIMIT};
use cadence_core::models::{Obligation, ObligationStatus};

/// Query params for a pattern's obligation history
#[derive(Debug, Deserialize)]
pub struct ObligationsQuery {
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/patterns/:id/obligations - Obligation history for a pattern
pub async fn list_pattern_obligations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ObligationsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Obligation>>, AppError> {
    let user_id = get_user_id(&headers)?;
    owned_pattern(&state, user_id, id)?;

    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<ObligationStatus>()
                .map_err(|e| AppError::bad_request(&e))
        })
        .transpose()?;

    let obligations = state.db.obligations_for_pattern(
        id,
        status,
        query.from,
        query.to,
        query.limit.clamp(1, MAX_PAGE_LIMIT),
    )?;
    Ok(Json(obligations))
}

/// Query params for the upcoming view
#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

/// GET /api/obligations/upcoming?days=N - Pending obligations across the
/// caller's patterns due within N days, soonest first
pub async fn list_upcoming(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpcomingQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Obligation>>, AppError> {
    let user_id = get_user_id(&headers)?;

    if query.days < 0 {
        return Err(AppError::bad_request("days must be non-negative"));
    }
    let until = Utc::now().date_naive() + chrono::Duration::days(query.days);
    let obligations = state.db.upcoming_obligations(user_id, until)?;
    Ok(Json(obligations))
}
