mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::Duration;
use serde_json::json;

use common::{bearer_get, test_app, test_app_with, test_config};
use toolgate_api::config::{AppConfig, RateLimitConfig};

fn tight_limits(per_minute: i64, per_hour: i64) -> AppConfig {
    AppConfig {
        rate_limit: RateLimitConfig {
            per_minute,
            per_hour,
            ..RateLimitConfig::default()
        },
        ..test_config()
    }
}

fn anonymous_get(uri: &str, origin: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-forwarded-for", origin)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn principal_is_limited_after_ceiling_until_next_window() {
    let app = test_app_with(tight_limits(3, 1000)).await;
    let tokens = app.obtain_tokens("user-1", "read").await;
    let access = tokens["access_token"].as_str().unwrap();

    for _ in 0..3 {
        let response = app.send(bearer_get("/api/tools", access)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    }

    let limited = app.send(bearer_get("/api/tools", access)).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers[header::RETRY_AFTER], "50");
    assert_eq!(limited.body["error"], "rate_limited");
    assert_eq!(limited.body["retry_after"], 50);
    assert_eq!(limited.body["limit"], 3);

    app.clock.advance(Duration::seconds(50));
    let next_window = app.send(bearer_get("/api/tools", access)).await;
    assert_eq!(next_window.status, StatusCode::OK);
}

#[tokio::test]
async fn anonymous_callers_are_counted_by_origin() {
    let app = test_app_with(tight_limits(2, 1000)).await;

    for _ in 0..2 {
        let response = app.send(anonymous_get("/api/tools", "10.0.0.1")).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers[header::WWW_AUTHENTICATE], "Bearer");
    }

    let limited = app.send(anonymous_get("/api/tools", "10.0.0.1")).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

    let other = app.send(anonymous_get("/api/tools", "10.0.0.2")).await;
    assert_eq!(other.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn limits_are_tracked_per_principal() {
    let app = test_app_with(tight_limits(1, 1000)).await;
    let tokens = app.obtain_tokens("user-1", "read write").await;
    let access = tokens["access_token"].as_str().unwrap();

    assert_eq!(app.send(bearer_get("/api/tools", access)).await.status, StatusCode::OK);
    assert_eq!(
        app.send(bearer_get("/api/tools", access)).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );

    // A different origin does not reset the principal's budget.
    let mut request = bearer_get("/api/tools", access);
    request
        .headers_mut()
        .insert("x-forwarded-for", "10.9.9.9".parse().unwrap());
    assert_eq!(app.send(request).await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn tools_dispatch_checks_scopes() {
    let app = test_app().await;
    let tokens = app.obtain_tokens("user-1", "read").await;
    let access = tokens["access_token"].as_str().unwrap();

    let listed = app.send(bearer_get("/api/tools", access)).await;
    assert_eq!(listed.status, StatusCode::OK);
    let names: Vec<&str> = listed
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["echo", "whoami"]);

    let call = |name: &str, arguments: serde_json::Value| {
        Request::post(format!("/api/tools/{name}"))
            .header(header::AUTHORIZATION, format!("bearer {access}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "arguments": arguments }).to_string()))
            .unwrap()
    };

    let whoami = app.send(call("whoami", json!({}))).await;
    assert_eq!(whoami.status, StatusCode::OK, "{}", whoami.body);
    assert_eq!(whoami.body["result"]["principal_id"], "user-1");
    assert_eq!(whoami.body["result"]["client_id"], "c1");

    let echo = app.send(call("echo", json!({ "message": "hi" }))).await;
    assert_eq!(echo.status, StatusCode::FORBIDDEN);

    let unknown = app.send(call("shell", json!({}))).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn prune_keeps_current_windows() {
    let app = test_app_with(tight_limits(1, 1000)).await;
    let tokens = app.obtain_tokens("user-1", "read").await;
    let access = tokens["access_token"].as_str().unwrap();

    assert_eq!(app.send(bearer_get("/api/tools", access)).await.status, StatusCode::OK);
    assert_eq!(app.state.rate_limiter.prune().await.unwrap(), 0);
    assert_eq!(
        app.send(bearer_get("/api/tools", access)).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );

    app.clock.advance(Duration::hours(25));
    assert_eq!(app.state.rate_limiter.prune().await.unwrap(), 2);
}
