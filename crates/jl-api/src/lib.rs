use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use jl_core::rate_limit::RateLimiter;
use jl_core::validation::ValidationError;
use jl_core::{config, db, http, logging, metrics, migrations, server};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{Pool, Postgres};
use std::net::SocketAddr;
use std::sync::Arc;
use utoipa::ToSchema;

mod auth;
mod likes;
mod openapi;
mod posts;
mod reports;
mod users;

#[cfg(test)]
mod openapi_contract_tests;

pub const SERVICE_NAME: &str = "jl-api";

#[derive(Clone)]
pub struct AppState {
    pool: Pool<Postgres>,
    settings: Arc<ApiSettings>,
    rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>, settings: ApiSettings) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
            rate_limiter: Arc::new(RateLimiter::new()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct ErrorResponse {
    code: &'static str,
    message: String,
    details: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    headers: Vec<(&'static str, String)>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            headers: Vec::new(),
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn with_header(mut self, name: &'static str, value: String) -> Self {
        self.headers.push((name, value));
        self
    }

    fn internal(code: &'static str, err: impl std::fmt::Display) -> Self {
        tracing::error!(code, error = %err, "request failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, "internal error")
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal("DB_ERROR", err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            err.to_string(),
        )
        .with_details(json!({ "field": err.field() }))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        let mut response = (self.status, Json(payload)).into_response();
        for (name, value) in self.headers {
            if let Ok(value) = value.parse::<axum::http::HeaderValue>() {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, ToSchema)]
pub(crate) struct MessageResponse {
    message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(crate) struct HealthStatus {
    status: String,
}

/// Behavior knobs shared by the handlers.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
    pub session_ttl_days: i64,
    pub cookie_secure: bool,
    pub auto_verify_email: bool,
    pub verification_ttl_hours: i64,
    pub auth_rate_limit_per_minute: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3000".to_string(),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
            session_ttl_days: 30,
            cookie_secure: false,
            auto_verify_email: false,
            verification_ttl_hours: 24,
            auth_rate_limit_per_minute: 20,
        }
    }
}

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

pub struct ApiConfig {
    pub addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub migrate_on_start: bool,
    pub settings: ApiSettings,
}

pub fn load_config() -> Result<ApiConfig> {
    let defaults = ApiSettings::default();
    let addr = config::socket_addr_from_env("JOYLET_API_ADDR", "0.0.0.0:8000")?;
    let database_url = config::required_env("DATABASE_URL")?;
    let db_max_connections = config::parse_env("JOYLET_DB_MAX_CONNECTIONS", 10_u32)?;
    let migrate_on_start = config::bool_from_env("JOYLET_MIGRATE_ON_START", true)?;
    let settings = ApiSettings {
        public_base_url: config::parse_env("JOYLET_PUBLIC_BASE_URL", defaults.public_base_url)?,
        allowed_origins: config::list_from_env(
            "JOYLET_CORS_ALLOWED_ORIGINS",
            DEFAULT_ALLOWED_ORIGINS,
        ),
        session_ttl_days: config::parse_env("JOYLET_SESSION_TTL_DAYS", defaults.session_ttl_days)?
            .max(1),
        cookie_secure: config::bool_from_env("JOYLET_COOKIE_SECURE", defaults.cookie_secure)?,
        auto_verify_email: config::bool_from_env(
            "JOYLET_AUTO_VERIFY_EMAIL",
            defaults.auto_verify_email,
        )?,
        verification_ttl_hours: config::parse_env(
            "JOYLET_VERIFICATION_TTL_HOURS",
            defaults.verification_ttl_hours,
        )?
        .max(1),
        auth_rate_limit_per_minute: config::parse_env(
            "JOYLET_AUTH_RATE_LIMIT_PER_MINUTE",
            defaults.auth_rate_limit_per_minute,
        )?,
    };
    Ok(ApiConfig {
        addr,
        database_url,
        db_max_connections,
        migrate_on_start,
        settings,
    })
}

pub async fn run(config: ApiConfig) -> Result<()> {
    logging::init(SERVICE_NAME);
    metrics::init(SERVICE_NAME);

    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    if config.migrate_on_start {
        migrations::run(&pool).await?;
    }

    let allowed_origins = config.settings.allowed_origins.clone();
    let state = AppState::new(pool, config.settings);
    let router = http::apply_standard_layers(router(state), SERVICE_NAME, &allowed_origins);
    server::serve(config.addr, router).await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::me))
        .route("/users/:user_id", get(users::profile))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route(
            "/posts/:post_id",
            get(posts::get_post).delete(posts::delete_post),
        )
        .route("/posts/:post_id/like", post(likes::toggle_like))
        .route("/posts/:post_id/report", post(reports::submit_report))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match db::check_ready(&state.pool).await {
        Ok(_) => (StatusCode::OK, Json(HealthStatus { status: "ok".into() })),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "unavailable".into(),
                }),
            )
        }
    }
}

async fn metrics_endpoint() -> impl IntoResponse {
    metrics::metrics_response(SERVICE_NAME)
}


#[cfg(test)]
mod tests {
    use super::test_support::{lazy_state, send};
    use super::*;

    #[tokio::test]
    async fn healthz_reports_unavailable_without_database() {
        let (status, _, payload) = send(router(lazy_state()), "GET", "/healthz", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload["status"], "unavailable");
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let response = metrics_endpoint().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn validation_errors_use_the_error_envelope() {
        let response = ApiError::from(ValidationError::PostTooLong).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["code"], "VALIDATION_ERROR");
        assert_eq!(payload["details"]["field"], "body");
    }

    #[tokio::test]
    async fn api_error_headers_are_attached() {
        let response = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "slow down")
            .with_header("retry-after", "12".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "12");
    }
}
