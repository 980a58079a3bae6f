use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use keel_axum::prelude::*;
use serde_json::Value;

async fn server() -> TestServer {
    let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
    store.connect().await.unwrap();

    let app = KeelApp::new(AppConfig::default())
        .request_context()
        .health_checks(store.clone())
        .mount(UsersController::new(store))
        .build()
        .unwrap();
    TestServer::new(app.router).unwrap()
}

async fn create(server: &TestServer, email: &str) -> Value {
    let response = server
        .post("/api/users")
        .json(&json!({ "email": email, "name": "Test User" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_create_and_fetch_user() {
    let server = server().await;
    let created = create(&server, "ada@example.com").await;
    assert_eq!(created["email"], "ada@example.com");
    assert_eq!(created["isActive"], true);

    let id = created["id"].as_str().unwrap();
    let response = server.get(&format!("/api/users/{id}")).await;
    response.assert_status_ok();
    response.assert_json(&created);
}

#[tokio::test]
async fn test_create_rejects_invalid_body() {
    let server = server().await;

    let response = server
        .post("/api/users")
        .json(&json!({ "email": "not-an-email" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["message"][0], "email: email must be a valid email address");

    let response = server.post("/api/users").json(&json!({ "name": "x" })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let server = server().await;
    create(&server, "ada@example.com").await;

    let response = server
        .post("/api/users")
        .json(&json!({ "email": "ada@example.com" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn test_list_is_paginated() {
    let server = server().await;
    for i in 0..3 {
        create(&server, &format!("user{i}@example.com")).await;
    }

    let response = server
        .get("/api/users")
        .add_query_param("page", 2)
        .add_query_param("limit", 2)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["email"], "user2@example.com");
    assert_eq!(
        body["meta"],
        json!({
            "page": 2,
            "limit": 2,
            "total": 3,
            "totalPages": 2,
            "hasNext": false,
            "hasPrev": true
        })
    );
}

#[tokio::test]
async fn test_list_rejects_out_of_range_limit() {
    let server = server().await;
    let response = server.get("/api/users").add_query_param("limit", 500).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/api/users").add_query_param("page", "first").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_and_delete_user() {
    let server = server().await;
    let created = create(&server, "ada@example.com").await;
    let path = format!("/api/users/{}", created["id"].as_str().unwrap());

    let response = server
        .patch(&path)
        .json(&json!({ "name": "Ada Lovelace", "isActive": false }))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["name"], "Ada Lovelace");
    assert_eq!(updated["isActive"], false);
    assert_eq!(updated["email"], "ada@example.com");

    server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
    server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
    server.delete(&path).await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let server = server().await;
    let response = server.get("/api/users/42").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let server = server().await;
    let correlation_id = Uuid::new_v4().to_string();

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-correlation-id"),
            HeaderValue::from_str(&correlation_id).unwrap(),
        )
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.header("x-correlation-id").to_str().unwrap(),
        correlation_id
    );
}

#[tokio::test]
async fn test_readiness_reports_disconnected_store() {
    let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
    let app = KeelApp::new(AppConfig::default())
        .health_checks(store)
        .build()
        .unwrap();
    let server = TestServer::new(app.router).unwrap();

    let response = server.get("/health/ready").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["database"]["status"], "error");

    server.get("/health").await.assert_status_ok();
}
