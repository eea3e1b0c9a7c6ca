//! Router-level tests. The pool connects lazily and every request here is
//! answered before a query would run, so no database is needed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use profile_server::auth::{create_session_token, IdentityProvider, VerifiedIdentity};
use profile_server::error::AppError;
use profile_server::{create_router, Config};
use profile_shared::Role;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-secret";

struct RejectingIdentity;

#[async_trait]
impl IdentityProvider for RejectingIdentity {
    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<String, AppError> {
        Err(AppError::Unauthorized)
    }

    async fn verify_id_token(&self, _id_token: &str) -> Result<VerifiedIdentity, AppError> {
        Err(AppError::Unauthorized)
    }
}

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/profile_test".to_string(),
        session_secret: SECRET.to_string(),
        session_expires_in: 3600,
        port: 0,
        firebase_api_key: "test-key".to_string(),
        firebase_project_id: "test-project".to_string(),
        run_migrations: false,
    }
}

fn app() -> Router {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    create_router(pool, config, Arc::new(RejectingIdentity))
}

fn bearer() -> String {
    let token =
        create_session_token(Uuid::new_v4(), "asha@example.com", Role::User, SECRET, 600).unwrap();
    format!("Bearer {}", token)
}

fn json_request(method: Method, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_login_short_password_is_field_error() {
    let response = app()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            json!({ "email": "asha@example.com", "password": "12345" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["fields"][0]["field"], "password");
    assert_eq!(body["fields"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_login_rejected_by_provider() {
    let response = app()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            json!({ "email": "asha@example.com", "password": "123456" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_requires_session() {
    let response = app()
        .oneshot(json_request(
            Method::PATCH,
            "/api/v1/profile",
            None,
            json!({ "displayName": "Asha" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app()
        .oneshot(json_request(
            Method::GET,
            "/api/v1/auth/me",
            Some("Bearer not-a-token"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_update_reports_every_invalid_field() {
    let auth = bearer();
    let response = app()
        .oneshot(json_request(
            Method::PATCH,
            "/api/v1/profile",
            Some(&auth),
            json!({
                "username": "asha",
                "phoneNumber": "+1-202-555-0123",
                "profilePictureUrl": "definitely not a url",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["phoneNumber", "profilePictureUrl"]);
}

#[tokio::test]
async fn test_profile_update_rejects_unknown_fields() {
    let auth = bearer();
    let response = app()
        .oneshot(json_request(
            Method::PATCH,
            "/api/v1/profile",
            Some(&auth),
            json!({ "role": "admin" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
