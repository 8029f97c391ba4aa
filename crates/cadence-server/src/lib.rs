//! Cadence Web Server
//!
//! Axum-based REST API over the pattern discovery and obligation matching
//! core. The identity subsystem in front of this service resolves the
//! caller and forwards the user id in the `x-user-id` header; requests
//! without it are rejected. Authentication itself lives upstream.

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info};

use cadence_core::db::Database;
use cadence_core::{
    DiscoveryConfig, DiscoveryLocks, MatchKeyLocks, MatcherConfig, SummarizerClient,
};

mod handlers;

#[cfg(test)]
mod tests;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header carrying the authenticated user id, set by the identity layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub discovery_locks: Arc<DiscoveryLocks>,
    pub matcher_locks: Arc<MatchKeyLocks>,
    pub discovery_config: DiscoveryConfig,
    pub matcher_config: MatcherConfig,
    /// Optional advisory pattern summariser
    pub summarizer: Option<SummarizerClient>,
}

/// Extract the caller's user id from the identity header
pub fn get_user_id(headers: &HeaderMap) -> Result<i64, AppError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| AppError::bad_request("Missing or invalid x-user-id header"))
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database) -> Router {
    let summarizer = SummarizerClient::from_env();
    match &summarizer {
        Some(client) => info!("Summariser configured: {}", client.host()),
        None => info!("Summariser not configured (set OLLAMA_HOST to enable annotations)"),
    }

    let state = Arc::new(AppState {
        db,
        discovery_locks: Arc::new(DiscoveryLocks::new()),
        matcher_locks: Arc::new(MatchKeyLocks::new()),
        discovery_config: DiscoveryConfig::default(),
        matcher_config: MatcherConfig::default(),
        summarizer,
    });

    let api_routes = Router::new()
        // Discovery
        .route("/patterns/discover", post(handlers::run_discovery))
        // Patterns
        .route("/patterns", get(handlers::list_patterns))
        .route(
            "/patterns/:id",
            get(handlers::get_pattern).delete(handlers::delete_pattern),
        )
        .route("/patterns/:id/pause", post(handlers::pause_pattern))
        .route("/patterns/:id/resume", post(handlers::resume_pattern))
        .route("/patterns/:id/annotate", post(handlers::annotate_pattern))
        .route(
            "/patterns/:id/obligations",
            get(handlers::list_pattern_obligations),
        )
        // Obligations
        .route("/obligations/upcoming", get(handlers::list_upcoming))
        // Transactions (ingestion notify + read-back)
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::record_transaction),
        )
        // Dead letters (operator visibility)
        .route("/dead-letters", get(handlers::list_dead_letters));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(db);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

/// Map core errors onto the HTTP surface: input errors are the caller's,
/// transient exhaustion is 503, invariant violations are 500 with the
/// detail kept server-side.
impl From<cadence_core::Error> for AppError {
    fn from(err: cadence_core::Error) -> Self {
        use cadence_core::Error;
        match err {
            Error::NotFound(msg) => Self {
                status: StatusCode::NOT_FOUND,
                message: msg,
                internal: None,
            },
            Error::Conflict(msg) => Self {
                status: StatusCode::CONFLICT,
                message: msg,
                internal: None,
            },
            Error::InvalidData(msg) => Self {
                status: StatusCode::BAD_REQUEST,
                message: msg,
                internal: None,
            },
            Error::Retryable(msg) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "Temporarily unable to process; the work has been parked".to_string(),
                internal: Some(anyhow::anyhow!(msg)),
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "An internal error occurred".to_string(),
                internal: Some(anyhow::Error::from(other)),
            },
        }
    }
}
