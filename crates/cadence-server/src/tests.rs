//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use cadence_core::db::Database;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn setup_test_app() -> Router {
    let db = Database::in_memory().unwrap();
    create_router(db)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn record_body(date: &str, amount: i64, msg: &str) -> String {
    serde_json::json!({
        "payee_name": "Sabitha",
        "direction": "credit",
        "currency_code": "INR",
        "occurred_at": format!("{}T10:00:00Z", date),
        "amount": amount,
        "source_message_id": msg,
    })
    .to_string()
}

async fn post_json(app: &Router, uri: &str, body: String) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header(USER_ID_HEADER, "1")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(USER_ID_HEADER, "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_missing_user_header_is_rejected() {
    let app = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/patterns")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_record_discover_and_query_flow() {
    let app = setup_test_app();

    // three salary credits
    for (i, date) in ["2025-10-31", "2025-12-01", "2025-12-30"].iter().enumerate() {
        let response = post_json(
            &app,
            "/api/transactions",
            record_body(date, 16500, &format!("sal-{}", i)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // discovery finds the monthly pattern
    let response = post_json(&app, "/api/patterns/discover", "{}".to_string()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let run = get_body_json(response).await;
    assert_eq!(run["patterns"].as_array().unwrap().len(), 1);
    let pattern_id = run["patterns"][0]["pattern"]["id"].as_i64().unwrap();
    assert_eq!(
        run["patterns"][0]["pattern"]["pattern_case"],
        "fixed_monthly"
    );

    // list and detail views
    let response = get(&app, "/api/patterns").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);

    let response = get(&app, &format!("/api/patterns/{}", pattern_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = get_body_json(response).await;
    assert_eq!(detail["streak"]["current_streak"], 3);
    assert_eq!(detail["recent_obligations"].as_array().unwrap().len(), 1);

    // the pending obligation shows up in the upcoming view
    let response = get(&app, "/api/obligations/upcoming?days=365").await;
    assert_eq!(response.status(), StatusCode::OK);
    let upcoming = get_body_json(response).await;
    assert_eq!(upcoming.as_array().unwrap().len(), 1);
    assert_eq!(upcoming[0]["expected_date"], "2026-01-29");

    // obligation history endpoint
    let response = get(
        &app,
        &format!("/api/patterns/{}/obligations?status=expected", pattern_id),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_matching_transaction_fulfils_over_http() {
    let app = setup_test_app();

    for (i, date) in ["2025-10-31", "2025-12-01", "2025-12-30"].iter().enumerate() {
        post_json(
            &app,
            "/api/transactions",
            record_body(date, 16500, &format!("sal-{}", i)),
        )
        .await;
    }
    post_json(&app, "/api/patterns/discover", "{}".to_string()).await;

    // January's salary lands inside the expected window
    let response = post_json(
        &app,
        "/api/transactions",
        record_body("2026-01-30", 16500, "sal-jan"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = get_body_json(response).await;
    assert_eq!(body["outcome"]["fulfilled"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_source_message_conflicts() {
    let app = setup_test_app();

    let first = post_json(
        &app,
        "/api/transactions",
        record_body("2025-10-31", 16500, "dup-1"),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = post_json(
        &app,
        "/api/transactions",
        record_body("2025-10-31", 16500, "dup-1"),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_pattern_is_not_found() {
    let app = setup_test_app();

    let response = get(&app, "/api/patterns/999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pause_resume_and_archive() {
    let app = setup_test_app();

    for (i, date) in ["2025-10-31", "2025-12-01", "2025-12-30"].iter().enumerate() {
        post_json(
            &app,
            "/api/transactions",
            record_body(date, 16500, &format!("sal-{}", i)),
        )
        .await;
    }
    let response = post_json(&app, "/api/patterns/discover", "{}".to_string()).await;
    let run = get_body_json(response).await;
    let pattern_id = run["patterns"][0]["pattern"]["id"].as_i64().unwrap();

    let response = post_json(
        &app,
        &format!("/api/patterns/{}/pause", pattern_id),
        String::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/api/patterns?status=paused").await;
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);

    let response = post_json(
        &app,
        &format!("/api/patterns/{}/resume", pattern_id),
        String::new(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // default delete is a soft archive; the pattern stays queryable
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/patterns/{}", pattern_id))
                .header(USER_ID_HEADER, "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, &format!("/api/patterns/{}", pattern_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = get_body_json(response).await;
    assert_eq!(detail["status"], "archived");

    // confirmed delete removes it entirely
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/patterns/{}?confirm=true", pattern_id))
                .header(USER_ID_HEADER, "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, &format!("/api/patterns/{}", pattern_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_foreign_user_cannot_see_patterns() {
    let app = setup_test_app();

    for (i, date) in ["2025-10-31", "2025-12-01", "2025-12-30"].iter().enumerate() {
        post_json(
            &app,
            "/api/transactions",
            record_body(date, 16500, &format!("sal-{}", i)),
        )
        .await;
    }
    let response = post_json(&app, "/api/patterns/discover", "{}".to_string()).await;
    let run = get_body_json(response).await;
    let pattern_id = run["patterns"][0]["pattern"]["id"].as_i64().unwrap();

    // user 2 asks for user 1's pattern
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/patterns/{}", pattern_id))
                .header(USER_ID_HEADER, "2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
