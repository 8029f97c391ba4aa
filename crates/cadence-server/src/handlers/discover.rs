//! Discovery handler

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;

use crate::{get_user_id, AppError, AppState};
use cadence_core::models::Direction;
use cadence_core::{DiscoveryFilter, DiscoveryRun, PatternDiscovery};

/// Optional narrowing of a discovery run
#[derive(Debug, Default, Deserialize)]
pub struct DiscoverRequest {
    pub payee_id: Option<i64>,
    pub direction: Option<Direction>,
}

/// POST /api/patterns/discover - Run the discovery path for the caller
///
/// Serialised per user; a run already in flight surfaces as 409. The
/// response lists created and updated patterns with their
/// detection_version, plus the reason codes for everything that was
/// looked at and turned away. Idempotent under re-issue.
pub async fn run_discovery(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<DiscoverRequest>>,
) -> Result<Json<DiscoveryRun>, AppError> {
    let user_id = get_user_id(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let filter = DiscoveryFilter {
        payee_id: request.payee_id,
        direction: request.direction,
    };

    // the pipeline is CPU-bound in-memory work plus blocking reads; keep
    // it off the async workers
    let db = state.db.clone();
    let locks = Arc::clone(&state.discovery_locks);
    let config = state.discovery_config.clone();
    let run = tokio::task::spawn_blocking(move || {
        PatternDiscovery::with_config(&db, locks, config).run(user_id, filter)
    })
    .await
    .map_err(|e| AppError::from(cadence_core::Error::Invariant(e.to_string())))??;

    Ok(Json(run))
}
