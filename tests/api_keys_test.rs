mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::TestApp;
use http_body_util::BodyExt;
use imagery_vault::utils::auth::create_jwt;
use serde_json::{Value, json};
use tower::ServiceExt;

fn bearer(test: &TestApp, owner_id: &str) -> String {
    format!(
        "Bearer {}",
        create_jwt(owner_id, &test.state.config.jwt_secret).unwrap()
    )
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(test: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = test.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn stream_status(test: &TestApp, key: &str) -> StatusCode {
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/file/scene.tif?key={}", key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn test_key_lifecycle() {
    let test = TestApp::new().await;
    test.serve.put_object("scene.tif", vec![7u8; 64]);
    let token = bearer(&test, "owner-1");

    // 1. Generate
    let (status, json) = send(
        &test,
        json_request("POST", "/api-keys", Some(&token), json!({"name": "pipeline"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let keys = json["apiKeys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["name"], "pipeline");
    assert_eq!(keys[0]["status"], "ACTIVE");
    assert_eq!(keys[0]["expired"], false);
    let api_key = keys[0]["apiKey"].as_str().unwrap().to_string();

    // 2. The key reads objects
    assert_eq!(stream_status(&test, &api_key).await, StatusCode::OK);

    // 3. Deactivate
    let (status, json) = send(
        &test,
        json_request(
            "PUT",
            "/api-keys/toggle",
            Some(&token),
            json!({"apiKey": api_key}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["apiKeys"][0]["status"], "INACTIVE");
    assert_eq!(stream_status(&test, &api_key).await, StatusCode::FORBIDDEN);

    // 4. Reactivate
    let (status, json) = send(
        &test,
        json_request(
            "PUT",
            "/api-keys/toggle",
            Some(&token),
            json!({"apiKey": api_key}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["apiKeys"][0]["status"], "ACTIVE");
    assert_eq!(stream_status(&test, &api_key).await, StatusCode::OK);
}

#[tokio::test]
async fn test_keys_are_scoped_to_owner() {
    let test = TestApp::new().await;
    let alice = bearer(&test, "alice");
    let bob = bearer(&test, "bob");

    let (_, json) = send(
        &test,
        json_request("POST", "/api-keys", Some(&alice), json!({"apiName": "alice-key"})),
    )
    .await;
    let alice_key = json["apiKeys"][0]["apiKey"].as_str().unwrap().to_string();

    let (status, json) = send(
        &test,
        Request::builder()
            .uri("/api-keys")
            .header("Authorization", &bob)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["apiKeys"].as_array().unwrap().is_empty());

    let (status, json) = send(
        &test,
        json_request(
            "PUT",
            "/api-keys/toggle",
            Some(&bob),
            json!({"apiKey": alice_key}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_toggle_unknown_key() {
    let test = TestApp::new().await;
    let token = bearer(&test, "owner-1");

    let (status, _) = send(
        &test,
        json_request(
            "PUT",
            "/api-keys/toggle",
            Some(&token),
            json!({"apiKey": "does-not-exist"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_key_name() {
    let test = TestApp::new().await;
    let token = bearer(&test, "owner-1");

    for name in ["", "   "] {
        let (status, json) = send(
            &test,
            json_request("POST", "/api-keys", Some(&token), json!({"name": name})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_key_routes_require_token() {
    let test = TestApp::new().await;

    let (status, _) = send(
        &test,
        json_request("POST", "/api-keys", None, json!({"name": "pipeline"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &test,
        json_request(
            "POST",
            "/api-keys",
            Some("Bearer not-a-jwt"),
            json!({"name": "pipeline"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = format!("Bearer {}", create_jwt("owner-1", "wrong-secret").unwrap());
    let (status, _) = send(
        &test,
        Request::builder()
            .uri("/api-keys")
            .header("Authorization", forged)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
