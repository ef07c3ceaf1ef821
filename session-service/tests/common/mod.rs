//! Shared setup for session-service integration tests.
//!
//! Everything runs against the in-process store and user directory; the
//! Redis-backed test is opt-in via `REDIS_URL`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use session_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, JwtConfig, RateLimitConfig, RedisConfig, SecurityConfig,
        SessionConfig, SessionServiceConfig, StoreBackend,
    },
    models::{User, UserStatus},
    services::{ClientMeta, InMemoryUserDirectory, SessionManager},
    store::{KeyValueStore, MemoryStore},
    utils::password::{hash_password, Password},
    AppState,
};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct-horse-battery-staple";

pub fn test_config(grace_window_seconds: u64) -> SessionServiceConfig {
    SessionServiceConfig {
        common: service_core::config::Config {
            port: 8080,
            host: "127.0.0.1".to_string(),
        },
        environment: Environment::Dev,
        service_name: "session-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret-0123456789abcdef0123456789".to_string(),
            issuer: "session-service".to_string(),
            access_token_expiry_minutes: 15,
        },
        session: SessionConfig {
            grace_window_seconds,
            lock_backoff_ms: 5,
            ..SessionConfig::default()
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub users: Arc<InMemoryUserDirectory>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_config(test_config(5))
    }

    pub fn with_config(config: SessionServiceConfig) -> Self {
        service_core::observability::logging::init_tracing("session-service-test", "warn", None);

        let store = Arc::new(MemoryStore::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let state = AppState::new(
            config,
            store.clone() as Arc<dyn KeyValueStore>,
            users.clone(),
        );

        Self {
            state,
            store,
            users,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.state.manager
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn add_user(&self, email: &str, status: UserStatus, is_admin: bool) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            status,
            password_hash: hash_password(&Password::new(TEST_PASSWORD.to_string()))
                .expect("Failed to hash password"),
            is_admin,
        };
        self.users.insert(user.clone()).expect("Failed to insert user");
        user
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (u16, Value, Response<Body>) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "198.51.100.10")
            .header(header::USER_AGENT, "integration-test");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, json, Response::from_parts(parts, Body::empty()))
    }
}

pub fn client() -> ClientMeta {
    ClientMeta {
        ip_address: "198.51.100.10".to_string(),
        user_agent: "integration-test".to_string(),
    }
}
