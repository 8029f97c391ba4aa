//! Transaction ingestion and read-back handlers
//!
//! The ingestion pipeline persists a transaction through POST and the
//! handler dispatches the runtime matcher for it, so "write the row, then
//! notify the matcher" is one call from the producer's point of view.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{get_user_id, AppError, AppState, MAX_PAGE_LIMIT};
use cadence_core::models::{DeadLetter, Direction, NewTransaction, Transaction};
use cadence_core::{dispatch_transaction, MatchOutcome};

/// Body for recording a transaction. The producer may send resolved ids
/// or names; names are upserted.
#[derive(Debug, Deserialize)]
pub struct RecordTransactionRequest {
    pub payee_id: Option<i64>,
    pub payee_name: Option<String>,
    pub direction: Direction,
    pub currency_id: Option<i64>,
    pub currency_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub amount: Decimal,
    pub source_message_id: String,
}

/// Response: the stored transaction id plus what the matcher did with it
#[derive(Serialize)]
pub struct RecordTransactionResponse {
    pub transaction_id: i64,
    pub outcome: MatchOutcome,
}

/// POST /api/transactions - Record a transaction and run the matcher
pub async fn record_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RecordTransactionRequest>,
) -> Result<Json<RecordTransactionResponse>, AppError> {
    let user_id = get_user_id(&headers)?;

    let payee_id = match (body.payee_id, body.payee_name.as_deref()) {
        (Some(id), _) => id,
        (None, Some(name)) if !name.trim().is_empty() => {
            state.db.upsert_payee(user_id, name.trim())?
        }
        _ => return Err(AppError::bad_request("payee_id or payee_name is required")),
    };
    let currency_id = match (body.currency_id, body.currency_code.as_deref()) {
        (Some(id), _) => id,
        (None, Some(code)) if !code.trim().is_empty() => {
            state.db.upsert_currency(code.trim())?
        }
        _ => {
            return Err(AppError::bad_request(
                "currency_id or currency_code is required",
            ))
        }
    };

    let transaction_id = state.db.insert_transaction(&NewTransaction {
        user_id,
        payee_id,
        direction: body.direction,
        currency_id,
        occurred_at: body.occurred_at,
        amount: body.amount,
        source_message_id: body.source_message_id,
    })?;

    // The transaction is durable at this point; a matcher failure parks
    // the work in the dead-letter store rather than losing it.
    let outcome = dispatch_transaction(
        state.db.clone(),
        Arc::clone(&state.matcher_locks),
        state.matcher_config.clone(),
        transaction_id,
    )
    .await?;

    Ok(Json(RecordTransactionResponse {
        transaction_id,
        outcome,
    }))
}

/// Query params for listing transactions
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub payee_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/transactions - The caller's transactions, newest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTransactionsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user_id = get_user_id(&headers)?;

    let transactions = state.db.list_transactions(
        user_id,
        query.payee_id,
        query.limit.clamp(1, MAX_PAGE_LIMIT),
        query.offset.max(0),
    )?;
    Ok(Json(transactions))
}

/// GET /api/dead-letters - Matcher work that exhausted its retry budget
pub async fn list_dead_letters(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DeadLetter>>, AppError> {
    // identity is still required even though dead letters are not
    // user-scoped; this is an operator surface
    get_user_id(&headers)?;
    let letters = state.db.list_dead_letters(MAX_PAGE_LIMIT)?;
    Ok(Json(letters))
}
