//! Server setup and initialization
//!
//! Provides the main application builder and server runner.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use roomkit_common::{AppConfig, AppError, JwtService};
use roomkit_db::{create_pool, run_migrations, PgLlmResultRepository, PgProfileRepository};
use roomkit_service::{HttpCompletionUpstream, ServiceContextBuilder};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::middleware::apply_middleware_with_config;
use crate::routes::{create_router, health_routes};
use crate::state::AppState;

/// Build the complete Axum application with all routes and middleware
///
/// # Errors
/// Returns a config error when the middleware settings are unusable
pub fn create_app(state: AppState) -> Result<Router, AppError> {
    let config = state.config();
    let api = apply_middleware_with_config(
        create_router(),
        &config.rate_limit,
        &config.cors,
        config.app.env.is_production(),
    )?;

    Ok(Router::new()
        .merge(health_routes())
        .merge(api)
        .with_state(state))
}

/// Initialize all dependencies and create AppState
pub async fn create_app_state(config: AppConfig) -> Result<AppState, AppError> {
    info!("Connecting to PostgreSQL...");
    let db_config = roomkit_db::DatabaseConfig::from(&config.database);
    let pool = create_pool(&db_config)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    info!("PostgreSQL connection established");

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .map_err(|e| AppError::Database(format!("migration failed: {e}")))?;
    }

    let jwt_service = Arc::new(JwtService::new(&config.supabase.jwt_secret));
    let upstream = Arc::new(HttpCompletionUpstream::new(&config.llm).map_err(AppError::from)?);

    let service_context = ServiceContextBuilder::new()
        .profile_repo(Arc::new(PgProfileRepository::new(pool.clone())))
        .llm_result_repo(Arc::new(PgLlmResultRepository::new(pool)))
        .jwt_service(jwt_service)
        .upstream(upstream)
        .default_model(config.llm.default_model.clone())
        .build()
        .map_err(|e| AppError::Config(e.to_string()))?;

    Ok(AppState::new(service_context, config))
}

/// Run the HTTP server until Ctrl+C or SIGTERM
pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), AppError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

/// Run the complete server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr: SocketAddr = config
        .api
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid API_HOST/API_PORT: {e}")))?;

    let state = create_app_state(config).await?;
    let app = create_app(state)?;

    run_server(app, addr).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use roomkit_common::{
        AppSettings, CorsConfig, DatabaseConfig, Environment, LlmConfig, RateLimitConfig,
        ServerConfig, SupabaseConfig,
    };
    use roomkit_service::testing::TestHarness;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig {
            app: AppSettings {
                name: "roomkit-test".to_string(),
                env: Environment::Development,
            },
            api: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: "postgres://unused".to_string(),
                max_connections: 1,
                min_connections: 0,
                run_migrations: false,
            },
            supabase: SupabaseConfig {
                url: String::new(),
                key: String::new(),
                jwt_secret: "test-secret-key-that-is-long-enough".to_string(),
            },
            llm: LlmConfig {
                api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
                api_key: "sk-test".to_string(),
                default_model: "test-model".to_string(),
                timeout_secs: 5,
            },
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
        }
    }

    struct TestApp {
        app: Router,
        harness: TestHarness,
    }

    impl TestApp {
        fn new() -> Self {
            let harness = TestHarness::new();
            let state = AppState::new(harness.ctx.clone(), test_config());
            let app = create_app(state).unwrap();
            Self { app, harness }
        }

        fn token(&self, user_id: &str) -> String {
            self.harness
                .ctx
                .jwt_service()
                .issue_token(user_id, json!({}), 3600)
                .unwrap()
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, token: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let app = TestApp::new();
        let (status, body) = app.send(get("/api/health", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let app = TestApp::new();
        let (status, body) = app.send(get("/api/user/info", None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let app = TestApp::new();
        let token = app
            .harness
            .ctx
            .jwt_service()
            .issue_token("user-1", json!({}), -3600)
            .unwrap();

        let (status, body) = app.send(get("/api/user/info", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn test_profile_flow() {
        let app = TestApp::new();
        let token = app.token("user-1");

        let (status, body) = app.send(get("/api/user/info", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 200);
        assert!(body["data"].is_null());

        let (status, body) = app
            .send(post(
                "/api/user/add_info",
                &token,
                &json!({ "id": "forged", "name": "alice" }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "user-1");
        assert_eq!(body["data"]["name"], "alice");

        let (_, body) = app.send(get("/api/user/info", Some(&token))).await;
        assert_eq!(body["data"]["name"], "alice");

        let (status, body) = app
            .send(post("/api/user/add_info", &app.token("user-2"), &json!({ "name": "alice" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "PROFILE_NAME_TAKEN");
    }

    #[tokio::test]
    async fn test_add_info_validation() {
        let app = TestApp::new();
        let token = app.token("user-1");

        let (status, body) = app
            .send(post("/api/user/add_info", &token, &json!({ "name": "" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_buffered_completion_accepted() {
        let app = TestApp::new();
        let token = app.token("user-1");

        let (status, body) = app
            .send(post(
                "/functions/v1/llm",
                &token,
                &json!({
                    "messages": [{ "role": "user", "content": "hi" }],
                    "model": "m",
                    "taskId": "task-9"
                }),
            ))
            .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["taskId"], "task-9");
    }

    #[tokio::test]
    async fn test_stream_completion_passthrough() {
        let app = TestApp::new();
        let token = app.token("user-1");
        let request = post(
            "/functions/v1/stream-llm",
            &token,
            &json!({ "messages": [{ "role": "user", "content": "hi" }], "model": "m" }),
        );

        let response = app.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"data: one\n\ndata: two\n\n");
    }

    #[tokio::test]
    async fn test_malformed_completion_body() {
        let app = TestApp::new();
        let token = app.token("user-1");

        let (status, body) = app
            .send(post("/functions/v1/llm", &token, &json!({ "messages": "nope" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_BODY");
    }
}
