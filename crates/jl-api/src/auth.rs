use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use jl_core::credentials::{self, SESSION_COOKIE};
use jl_core::{metrics, validation};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Row, Transaction};
use std::net::SocketAddr;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState, MessageResponse};

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub user: LoginUser,
}

#[derive(Serialize, ToSchema)]
pub struct LoginUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub handle: String,
}

/// The user behind a valid, unexpired, unrevoked session cookie.
#[derive(Clone, Debug)]
pub(crate) struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<MessageResponse>> {
    enforce_auth_rate_limit(&state, "register", addr).await?;

    let email = validation::normalize_email(&payload.email)?;
    validation::validate_password(&payload.password)?;
    let display_name = validation::normalize_display_name(&payload.display_name)?;

    let existing = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(email_taken());
    }

    let password_hash = credentials::hash_password(&payload.password)
        .map_err(|err| ApiError::internal("AUTH_ERROR", err))?;

    let mut tx = state.pool.begin().await?;
    let handle = available_handle(&mut tx, &display_name).await?;
    let user_id = Uuid::new_v4();
    let verified = state.settings.auto_verify_email;

    sqlx::query(
        "INSERT INTO users \
         (id, email, email_verified, password_hash, display_name, handle) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(&email)
    .bind(verified)
    .bind(&password_hash)
    .bind(&display_name)
    .bind(&handle)
    .execute(&mut *tx)
    .await
    .map_err(|err| match unique_constraint(&err) {
        Some("users_email_key") => email_taken(),
        Some("users_handle_key") => handle_taken(),
        _ => ApiError::from(err),
    })?;

    if !verified {
        let token = Uuid::new_v4();
        let expires_at =
            Utc::now() + chrono::Duration::hours(state.settings.verification_ttl_hours);
        sqlx::query(
            "INSERT INTO email_verification_tokens (token, user_id, expires_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        // No mail provider is wired in; the link goes to the log for delivery.
        tracing::info!(
            user_id = %user_id,
            verification_url = %verification_url(&state.settings.public_base_url, token),
            "email verification issued"
        );
        return Ok(Json(MessageResponse::new(
            "Registration successful! Check your email to verify your account.",
        )));
    }

    tx.commit().await?;
    tracing::info!(user_id = %user_id, handle = %handle, "user registered");
    Ok(Json(MessageResponse::new(
        "Registration successful! You can now log in.",
    )))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let mut tx = state.pool.begin().await?;
    let user_id = sqlx::query_scalar::<_, Uuid>(
        "DELETE FROM email_verification_tokens \
         WHERE token = $1 AND expires_at > NOW() \
         RETURNING user_id",
    )
    .bind(payload.token)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(user_id) = user_id else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_TOKEN",
            "Invalid or expired token",
        ));
    };

    sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "email verified");
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    enforce_auth_rate_limit(&state, "login", addr).await?;

    let email = validation::normalize_email(&payload.email)?;
    let row = sqlx::query(
        "SELECT id, email, email_verified, password_hash, display_name, handle \
         FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        credentials::verify_against_placeholder(&payload.password);
        metrics::inc_auth_failure(crate::SERVICE_NAME, "unknown_email");
        return Err(invalid_credentials());
    };

    let password_hash: String = row.try_get("password_hash")?;
    let verified = credentials::verify_password(&payload.password, &password_hash)
        .map_err(|err| ApiError::internal("AUTH_ERROR", err))?;
    if !verified {
        metrics::inc_auth_failure(crate::SERVICE_NAME, "bad_password");
        return Err(invalid_credentials());
    }

    let email_verified: bool = row.try_get("email_verified")?;
    if !email_verified {
        metrics::inc_auth_failure(crate::SERVICE_NAME, "unverified");
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "EMAIL_NOT_VERIFIED",
            "Please verify your email first",
        ));
    }

    let user = LoginUser {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        handle: row.try_get("handle")?,
    };

    let ttl = chrono::Duration::days(state.settings.session_ttl_days);
    let session = credentials::issue_session_token(ttl);
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(&session.token_hash)
    .bind(session.expires_at)
    .execute(&state.pool)
    .await?;

    metrics::inc_auth_success(crate::SERVICE_NAME);
    tracing::info!(user_id = %user.id, "login succeeded");

    let cookie = Cookie::build((SESSION_COOKIE, session.token))
        .http_only(true)
        .secure(state.settings.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::days(state.settings.session_ttl_days))
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    let user = require_user(&state, &jar).await?;

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        sqlx::query("UPDATE sessions SET revoked = TRUE WHERE token_hash = $1")
            .bind(credentials::hash_session_token(cookie.value()))
            .execute(&state.pool)
            .await?;
    }
    tracing::info!(user_id = %user.id, "logged out");

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Json(MessageResponse::new("Logged out successfully"))))
}

/// Resolves the session cookie, if any. A missing or stale session is not an error.
pub(crate) async fn current_user(
    state: &AppState,
    jar: &CookieJar,
) -> ApiResult<Option<CurrentUser>> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    if cookie.value().is_empty() {
        return Ok(None);
    }

    let row = sqlx::query(
        "SELECT u.id, u.email, u.display_name, u.handle, u.created_at \
         FROM sessions s \
         JOIN users u ON u.id = s.user_id \
         WHERE s.token_hash = $1 AND s.expires_at > NOW() AND s.revoked = FALSE",
    )
    .bind(credentials::hash_session_token(cookie.value()))
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(CurrentUser {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        handle: row.try_get("handle")?,
        created_at: row.try_get("created_at")?,
    }))
}

pub(crate) async fn require_user(state: &AppState, jar: &CookieJar) -> ApiResult<CurrentUser> {
    current_user(state, jar).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "AUTH_REQUIRED",
            "Authentication required",
        )
    })
}

async fn enforce_auth_rate_limit(
    state: &AppState,
    action: &str,
    addr: SocketAddr,
) -> ApiResult<()> {
    let limit = state.settings.auth_rate_limit_per_minute;
    if limit == 0 {
        return Ok(());
    }
    let key = format!("{action}:{}", addr.ip());
    let outcome = state
        .rate_limiter
        .check(&key, limit, Duration::from_secs(60))
        .await;
    if !outcome.allowed {
        let retry_after = outcome
            .retry_after
            .map(|dur| dur.as_secs().max(1))
            .unwrap_or(60);
        tracing::warn!(action, ip = %addr.ip(), "auth rate limit exceeded");
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many attempts, try again later",
        )
        .with_header("retry-after", retry_after.to_string()));
    }
    Ok(())
}

/// Derived handle, or the derived handle with a short random suffix when taken.
async fn available_handle(
    tx: &mut Transaction<'_, Postgres>,
    display_name: &str,
) -> ApiResult<String> {
    let base = validation::derive_handle(display_name);
    let mut candidate = base.clone();
    for _ in 0..5 {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE handle = $1)",
        )
        .bind(&candidate)
        .fetch_one(&mut **tx)
        .await?;
        if !taken {
            return Ok(candidate);
        }
        let suffix = Uuid::new_v4().simple().to_string();
        candidate = validation::handle_with_suffix(&base, &suffix[..6]);
    }
    Err(handle_taken())
}

fn unique_constraint(err: &sqlx::Error) -> Option<&str> {
    let db_err = err.as_database_error()?;
    if db_err.is_unique_violation() {
        db_err.constraint()
    } else {
        None
    }
}

fn email_taken() -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "EMAIL_TAKEN",
        "Email already registered",
    )
}

fn handle_taken() -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "HANDLE_TAKEN",
        "Could not allocate a handle, try a different display name",
    )
}

fn invalid_credentials() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "AUTH_FAILED", "Invalid credentials")
}

fn verification_url(base: &str, token: Uuid) -> String {
    format!("{}/verify-email?token={token}", base.trim_end_matches('/'))
}
