use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Router};
use gauntlet_instruments::{OperationTotals, ReportConfig, Reporter};
use http_client_instrumented::prelude::{HttpBody, HttpClient};
use pretty_assertions::assert_eq;

async fn start_mock_service() -> String {
    let app = Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route(
            "/fail",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/form",
            post(|Form(fields): Form<HashMap<String, String>>| async move {
                fields.get("username").cloned().unwrap_or_default()
            }),
        )
        .route(
            "/auth",
            post(|headers: HeaderMap| async move {
                match headers.get("authorization") {
                    Some(value) => (StatusCode::OK, value.to_str().unwrap_or_default().to_string()),
                    None => (StatusCode::UNAUTHORIZED, String::new()),
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn reporter() -> Arc<Reporter> {
    Arc::new(ReportConfig::default().init())
}

#[tokio::test]
async fn successful_request_is_recorded() {
    let reporter = reporter();
    let client = HttpClient::new(&start_mock_service().await, reporter.clone()).unwrap();

    let response = client.get("smoke", "/ok").await.unwrap();

    assert_eq!(200, response.status());
    assert_eq!("ok", response.text());
    assert_eq!(
        OperationTotals { count: 1, errors: 0 },
        reporter.operation_totals("smoke")
    );
}

#[tokio::test]
async fn error_status_counts_as_failed_request() {
    let reporter = reporter();
    let client = HttpClient::new(&start_mock_service().await, reporter.clone()).unwrap();

    let response = client.get("smoke", "/fail").await.unwrap();

    assert_eq!(500, response.status());
    assert_eq!(
        OperationTotals { count: 1, errors: 1 },
        reporter.operation_totals("smoke")
    );
}

#[tokio::test]
async fn form_body_is_sent() {
    let reporter = reporter();
    let client = HttpClient::new(&start_mock_service().await, reporter.clone()).unwrap();

    let response = client
        .post(
            "purchase",
            "/form",
            HttpBody::Form(&[("username", "demo"), ("password", "demo")]),
            None,
        )
        .await
        .unwrap();

    assert_eq!("demo", response.text());
    assert_eq!(1, reporter.operation_totals("purchase").count);
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let client = HttpClient::new(&start_mock_service().await, reporter()).unwrap();

    let anonymous = client
        .post("purchase", "/auth", HttpBody::Empty, None)
        .await
        .unwrap();
    let authorized = client
        .post("purchase", "/auth", HttpBody::Empty, Some("abc"))
        .await
        .unwrap();

    assert_eq!(401, anonymous.status());
    assert_eq!("Bearer abc", authorized.text());
}

#[tokio::test]
async fn transport_error_is_recorded_and_returned() {
    let reporter = reporter();
    // Nothing listens on the discard port
    let client = HttpClient::new("http://127.0.0.1:9", reporter.clone()).unwrap();

    let result = client.get("smoke", "/api/events").await;

    assert!(result.is_err());
    assert_eq!(
        OperationTotals { count: 1, errors: 1 },
        reporter.operation_totals("smoke")
    );
}
