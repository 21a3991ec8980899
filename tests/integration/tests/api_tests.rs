//! API Integration Tests
//!
//! These tests require:
//! - Running PostgreSQL instance
//! - Environment variables: DATABASE_URL, SUPABASE_JWT_SECRET, LLM_API_KEY
//!
//! Run with: cargo test -p integration-tests --test api_tests

use integration_tests::{
    assert_json, check_test_env, unique_name, unique_user_id, AddInfoRequest, Envelope,
    ErrorEnvelope, ProfileResponse, TestServer,
};
use reqwest::StatusCode;
use roomkit_client::ClientError;
use serde_json::{json, Value};

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/api/health").await.expect("Request failed");
    let body: Value = assert_json(response, StatusCode::OK).await.unwrap();

    assert_eq!(body["status"], "ok");
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_missing_token_rejected() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/api/user/info").await.unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::UNAUTHORIZED).await.unwrap();

    assert_eq!(body.code, 401);
    assert_eq!(body.error, "MISSING_AUTHORIZATION");
    assert!(body.data.is_null());
}

#[tokio::test]
async fn test_expired_token_rejected() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let token = server.expired_token_for(&unique_user_id()).unwrap();

    let response = server.get_auth("/api/user/info", &token).await.unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::UNAUTHORIZED).await.unwrap();

    assert_eq!(body.error, "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_foreign_secret_rejected() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let forged = roomkit_common::JwtService::new("some-other-secret-that-is-long-enough")
        .issue_token(&unique_user_id(), json!({}), 3600)
        .unwrap();

    let response = server.get_auth("/api/user/info", &forged).await.unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::UNAUTHORIZED).await.unwrap();

    assert_eq!(body.error, "INVALID_TOKEN");
}

// ============================================================================
// Profiles
// ============================================================================

#[tokio::test]
async fn test_profile_lifecycle() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let user_id = unique_user_id();
    let token = server.token_for(&user_id).unwrap();

    // No profile yet
    let response = server.get_auth("/api/user/info", &token).await.unwrap();
    let body: Envelope<ProfileResponse> = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body.code, 200);
    assert!(body.data.is_none());

    // Create
    let request = AddInfoRequest {
        name: unique_name("ann"),
        avatar: Some("https://cdn.example.com/a.png".to_string()),
    };
    let response = server
        .post_auth("/api/user/add_info", &token, &request)
        .await
        .unwrap();
    let body: Envelope<ProfileResponse> = assert_json(response, StatusCode::OK).await.unwrap();
    let profile = body.data.unwrap();
    assert_eq!(profile.id, user_id);
    assert_eq!(profile.name, request.name);

    // Create-only: a second profile for the same user conflicts
    let again = AddInfoRequest {
        name: unique_name("annie"),
        avatar: None,
    };
    let response = server
        .post_auth("/api/user/add_info", &token, &again)
        .await
        .unwrap();
    let conflict: ErrorEnvelope = assert_json(response, StatusCode::CONFLICT).await.unwrap();
    assert_eq!(conflict.code, 409);
    assert_eq!(conflict.error, "PROFILE_ALREADY_EXISTS");

    let response = server.get_auth("/api/user/info", &token).await.unwrap();
    let body: Envelope<ProfileResponse> = assert_json(response, StatusCode::OK).await.unwrap();
    let fetched = body.data.unwrap();
    assert_eq!(fetched.id, user_id);
    assert_eq!(fetched.name, request.name);
    assert!(!body.msg.is_empty());
}

#[tokio::test]
async fn test_profile_name_conflict() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let request = AddInfoRequest::unique();

    let first = server.token_for(&unique_user_id()).unwrap();
    let response = server
        .post_auth("/api/user/add_info", &first, &request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let second = server.token_for(&unique_user_id()).unwrap();
    let response = server
        .post_auth("/api/user/add_info", &second, &request)
        .await
        .unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::CONFLICT).await.unwrap();
    assert_eq!(body.error, "PROFILE_NAME_TAKEN");
}

#[tokio::test]
async fn test_profile_name_too_long() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let token = server.token_for(&unique_user_id()).unwrap();
    let request = AddInfoRequest {
        name: "x".repeat(51),
        avatar: None,
    };

    let response = server
        .post_auth("/api/user/add_info", &token, &request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Through the SDK
// ============================================================================

#[tokio::test]
async fn test_sdk_profile_flow() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let user_id = unique_user_id();
    let sdk = server.sdk_for(&user_id).await.unwrap();

    assert!(sdk.api().user_info().await.unwrap().is_none());

    let name = unique_name("sdk");
    let created = sdk.api().add_user_info(&name, None).await.unwrap();
    assert_eq!(created.id, user_id);
    assert_eq!(created.name, name);

    let fetched = sdk.api().user_info().await.unwrap().unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_sdk_sign_out_blocks_calls() {
    if !check_test_env().await {
        return;
    }

    let server = TestServer::start().await.expect("Failed to start server");
    let sdk = server.sdk_for(&unique_user_id()).await.unwrap();
    sdk.api().user_info().await.unwrap();

    sdk.session().clear().await.unwrap();

    assert!(matches!(
        sdk.api().user_info().await,
        Err(ClientError::NotAuthenticated)
    ));
}
