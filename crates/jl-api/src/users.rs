use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::require_user;
use crate::{ApiError, ApiResult, AppState};

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub display_name: String,
    pub handle: String,
    pub created_at: DateTime<Utc>,
    pub post_count: i64,
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Json<MeResponse>> {
    let user = require_user(&state, &jar).await?;
    Ok(Json(MeResponse {
        id: user.id,
        email: user.email,
        display_name: user.display_name,
        handle: user.handle,
        created_at: user.created_at,
    }))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ProfileResponse>> {
    let row = sqlx::query(
        "SELECT u.id, u.display_name, u.handle, u.created_at, \
         (SELECT COUNT(*) FROM posts p \
          WHERE p.author_id = u.id AND p.is_deleted = FALSE) AS post_count \
         FROM users u WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "User not found",
        ));
    };

    Ok(Json(ProfileResponse {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        handle: row.try_get("handle")?,
        created_at: row.try_get("created_at")?,
        post_count: row.try_get("post_count")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lazy_state, send};
    use axum::routing::get;
    use axum::Router;

    #[tokio::test]
    async fn profile_rejects_non_uuid_ids() {
        let app = Router::new()
            .route("/users/:user_id", get(profile))
            .with_state(lazy_state());
        let (status, _, _) = send(app, "GET", "/users/not-a-uuid", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
