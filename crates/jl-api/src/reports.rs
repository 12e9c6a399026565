use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use jl_core::{metrics, validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::require_user;
use crate::{ApiError, ApiResult, AppState};

/// `{}` files a report without a reason.
#[derive(Deserialize, ToSchema)]
pub struct ReportRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    pub report_id: Uuid,
    pub status: String,
}

pub async fn submit_report(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<ReportRequest>,
) -> ApiResult<Json<ReportResponse>> {
    let user = require_user(&state, &jar).await?;
    let reason = validation::normalize_report_reason(payload.reason.as_deref())?;

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1 AND is_deleted = FALSE)",
    )
    .bind(post_id)
    .fetch_one(&state.pool)
    .await?;
    if !exists {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Post not found",
        ));
    }

    let report_id = Uuid::new_v4();
    let status = sqlx::query_scalar::<_, String>(
        "INSERT INTO moderation_reports (id, post_id, reporter_id, reason) \
         VALUES ($1, $2, $3, $4) RETURNING status",
    )
    .bind(report_id)
    .bind(post_id)
    .bind(user.id)
    .bind(reason)
    .fetch_one(&state.pool)
    .await?;

    metrics::inc_reports_submitted(crate::SERVICE_NAME);
    tracing::info!(
        report_id = %report_id,
        post_id = %post_id,
        reporter_id = %user.id,
        "post reported"
    );

    Ok(Json(ReportResponse { report_id, status }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lazy_state, send};
    use axum::routing::post;
    use axum::Router;

    const REPORT_URI: &str = "/posts/6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11/report";

    fn report_app() -> Router {
        Router::new()
            .route("/posts/:post_id/report", post(submit_report))
            .with_state(lazy_state())
    }

    #[tokio::test]
    async fn submit_report_requires_session() {
        let (status, _, _) =
            send(report_app(), "POST", REPORT_URI, Some(r#"{"reason":"spam"}"#), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = send(report_app(), "POST", REPORT_URI, Some("{}"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_report_bodies_are_rejected() {
        let (status, _, _) = send(report_app(), "POST", REPORT_URI, Some("{invalid"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) =
            send(report_app(), "POST", REPORT_URI, Some(r#"{"reason":42}"#), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _, _) = send(report_app(), "POST", REPORT_URI, None, None).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
