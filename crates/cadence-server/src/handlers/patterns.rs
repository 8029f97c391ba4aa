//! Pattern management handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{get_user_id, AppError, AppState, SuccessResponse};
use cadence_core::models::{Obligation, Pattern, PatternStatus, PatternStreak};
use cadence_core::summarize::{SummaryContext, Summarizer};

/// Query params for listing patterns
#[derive(Debug, Deserialize)]
pub struct ListPatternsQuery {
    pub status: Option<String>,
}

/// GET /api/patterns - List the caller's patterns
pub async fn list_patterns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPatternsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Pattern>>, AppError> {
    let user_id = get_user_id(&headers)?;

    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<PatternStatus>()
                .map_err(|e| AppError::bad_request(&e))
        })
        .transpose()?;

    let patterns = state.db.list_patterns(user_id, status)?;
    Ok(Json(patterns))
}

/// Query params for a single pattern
#[derive(Debug, Deserialize)]
pub struct GetPatternQuery {
    /// How many recent obligations to include
    #[serde(default = "default_history")]
    pub history: i64,
}

fn default_history() -> i64 {
    6
}

/// A pattern with its streak and recent obligation history
#[derive(Serialize)]
pub struct PatternDetail {
    #[serde(flatten)]
    pub pattern: Pattern,
    pub streak: Option<PatternStreak>,
    pub recent_obligations: Vec<Obligation>,
}

/// GET /api/patterns/:id - A pattern, its streak, and its last N obligations
pub async fn get_pattern(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<GetPatternQuery>,
    headers: HeaderMap,
) -> Result<Json<PatternDetail>, AppError> {
    let user_id = get_user_id(&headers)?;
    let pattern = owned_pattern(&state, user_id, id)?;

    let streak = state.db.get_streak(id)?;
    let recent_obligations = state
        .db
        .obligations_for_pattern(id, None, None, None, query.history.clamp(1, crate::MAX_PAGE_LIMIT))?;

    Ok(Json(PatternDetail {
        pattern,
        streak,
        recent_obligations,
    }))
}

/// POST /api/patterns/:id/pause - Stop matching against this pattern
pub async fn pause_pattern(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers)?;
    owned_pattern(&state, user_id, id)?;

    state.db.update_pattern_status(id, PatternStatus::Paused)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/patterns/:id/resume - Resume matching
pub async fn resume_pattern(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers)?;
    owned_pattern(&state, user_id, id)?;

    state.db.update_pattern_status(id, PatternStatus::Active)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Query params for deleting a pattern
#[derive(Debug, Default, Deserialize)]
pub struct DeletePatternQuery {
    /// Hard delete requires explicit confirmation; the default is a soft
    /// archive that keeps history queryable
    #[serde(default)]
    pub confirm: bool,
}

/// DELETE /api/patterns/:id - Archive, or hard-delete with ?confirm=true
///
/// The confirmed delete cascades to the streak, obligations, and links.
pub async fn delete_pattern(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<DeletePatternQuery>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = get_user_id(&headers)?;
    owned_pattern(&state, user_id, id)?;

    if query.confirm {
        state.db.delete_pattern(id)?;
        info!(pattern_id = id, user_id, "Pattern hard-deleted");
    } else {
        state.db.cancel_pending_obligation(id)?;
        state.db.update_pattern_status(id, PatternStatus::Archived)?;
        info!(pattern_id = id, user_id, "Pattern archived");
    }
    Ok(Json(SuccessResponse { success: true }))
}

/// Response for the annotation endpoint
#[derive(Serialize)]
pub struct AnnotateResponse {
    pub summary: String,
}

/// POST /api/patterns/:id/annotate - Generate and store a summary
///
/// Advisory only: failures surface to the caller but never touch the
/// pattern's state, and no summariser backend means 503, not an empty
/// annotation.
pub async fn annotate_pattern(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<AnnotateResponse>, AppError> {
    let user_id = get_user_id(&headers)?;
    let pattern = owned_pattern(&state, user_id, id)?;

    let Some(summarizer) = &state.summarizer else {
        return Err(AppError::from(cadence_core::Error::Retryable(
            "no summariser backend configured".to_string(),
        )));
    };

    let payee = state
        .db
        .get_payee(pattern.payee_id)?
        .map(|p| p.name)
        .unwrap_or_else(|| "unknown".to_string());
    let currency = state
        .db
        .get_currency(pattern.currency_id)?
        .map(|c| c.code)
        .unwrap_or_else(|| "?".to_string());
    let recent = state
        .db
        .obligations_for_pattern(id, None, None, None, 6)?;

    let context = SummaryContext {
        payee_name: &payee,
        currency_code: &currency,
        recent_obligations: &recent,
    };
    let summary = summarizer
        .summarize_pattern(&pattern, &context)
        .await?;

    state.db.set_pattern_summary(id, &summary)?;
    Ok(Json(AnnotateResponse { summary }))
}

/// Load a pattern and verify the caller owns it; a foreign pattern reads
/// as not-found rather than forbidden
pub(super) fn owned_pattern(
    state: &AppState,
    user_id: i64,
    pattern_id: i64,
) -> Result<Pattern, AppError> {
    let pattern = state
        .db
        .get_pattern(pattern_id)?
        .filter(|p| p.user_id == user_id)
        .ok_or_else(|| AppError::not_found(&format!("Pattern {} not found", pattern_id)))?;
    Ok(pattern)
}
