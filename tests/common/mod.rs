#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

use toolgate_api::{
    api,
    auth::{pkce, scopes::ScopeSet},
    clock::MockClock,
    config::AppConfig,
    models::{AppState, NewClient},
};

pub const OOB: &str = "urn:ietf:wg:oauth:2.0:oob";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const CONSENT_KEY: &str = "test-consent-key";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: MockClock,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Defaults plus a consent key, so the consent step can run.
pub fn test_config() -> AppConfig {
    AppConfig {
        consent_api_key: Some(CONSENT_KEY.to_string()),
        ..AppConfig::default()
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

pub async fn test_app_with(config: AppConfig) -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    // Ten seconds into a minute keeps window arithmetic predictable.
    let clock = MockClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 10).unwrap());
    let state = Arc::new(AppState::new(pool, config, Arc::new(clock.clone())));

    TestApp {
        router: api::router(state.clone()),
        state,
        clock,
    }
}

impl TestApp {
    pub async fn register_client(&self, client_id: &str, redirect_uri: &str, scopes: &[&str]) {
        self.state
            .clients
            .register(NewClient {
                client_id: client_id.to_string(),
                name: format!("{client_id} app"),
                redirect_uris: vec![redirect_uri.to_string()],
                allowed_scopes: ScopeSet::from_vec(scopes.iter().copied()),
            })
            .await
            .unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        self.send(form_request(uri, fields)).await
    }

    /// Posts a consent decision the way the consent UI does.
    pub async fn post_consent(&self, fields: &[(&str, &str)]) -> TestResponse {
        let mut request = form_request("/oauth/authorize", fields);
        request
            .headers_mut()
            .insert("x-consent-key", CONSENT_KEY.parse().unwrap());
        self.send(request).await
    }

    /// Runs the consent step for `c1`-style out-of-band clients and returns
    /// the issued code.
    pub async fn approve_oob(&self, client_id: &str, principal_id: &str, scope: &str) -> String {
        let challenge = pkce::challenge_for(VERIFIER);
        let response = self
            .post_consent(&[
                ("response_type", "code"),
                ("client_id", client_id),
                ("redirect_uri", OOB),
                ("scope", scope),
                ("state", "xyz"),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("principal_id", principal_id),
                ("approved", "true"),
            ])
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        assert_eq!(response.body["state"], "xyz");
        response.body["code"].as_str().unwrap().to_string()
    }

    pub async fn exchange_code(&self, client_id: &str, code: &str) -> TestResponse {
        self.post_form(
            "/oauth/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("code", code),
                ("code_verifier", VERIFIER),
                ("redirect_uri", OOB),
            ],
        )
        .await
    }

    /// Registers `c1` and walks the whole flow, returning the token response.
    pub async fn obtain_tokens(&self, principal_id: &str, scope: &str) -> Value {
        self.register_client("c1", OOB, &["read", "write"]).await;
        let code = self.approve_oob("c1", principal_id, scope).await;
        let response = self.exchange_code("c1", &code).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body
    }
}

pub fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

pub fn query(fields: &[(&str, &str)]) -> String {
    serde_urlencoded::to_string(fields).unwrap()
}

pub fn bearer_get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}
