use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use jl_core::metrics;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::require_user;
use crate::{ApiError, ApiResult, AppState};

#[derive(Serialize, ToSchema)]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

pub async fn toggle_like(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<LikeResponse>> {
    let user = require_user(&state, &jar).await?;

    let mut tx = state.pool.begin().await?;
    // Row lock serializes concurrent toggles on the same post.
    let visible = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM posts WHERE id = $1 AND is_deleted = FALSE FOR UPDATE",
    )
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?;
    if visible.is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Post not found",
        ));
    }

    let removed = sqlx::query("DELETE FROM likes WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let liked = removed == 0;
    if liked {
        sqlx::query("INSERT INTO likes (post_id, user_id) VALUES ($1, $2)")
            .bind(post_id)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
    }

    let like_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM likes WHERE post_id = $1")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    let action = if liked {
        metrics::LIKE_ACTION_LIKED
    } else {
        metrics::LIKE_ACTION_UNLIKED
    };
    metrics::inc_likes_toggled(crate::SERVICE_NAME, action);
    tracing::debug!(post_id = %post_id, user_id = %user.id, action, "like toggled");

    Ok(Json(LikeResponse { liked, like_count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lazy_state, send};
    use axum::routing::post;
    use axum::Router;

    #[tokio::test]
    async fn toggle_like_requires_session() {
        let app = Router::new()
            .route("/posts/:post_id/like", post(toggle_like))
            .with_state(lazy_state());
        let (status, _, payload) = send(
            app,
            "POST",
            "/posts/6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11/like",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(payload["code"], "AUTH_REQUIRED");
    }
}
