use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use jl_core::cursor::FeedCursor;
use jl_core::{metrics, positivity, validation};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{current_user, require_user};
use crate::{ApiError, ApiResult, AppState, MessageResponse};

const DEFAULT_FEED_LIMIT: i64 = 20;
const MAX_FEED_LIMIT: i64 = 100;
const REMOVED_BODY: &str = "[Post removed by author]";

#[derive(Serialize, ToSchema)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub display_name: String,
    pub handle: String,
}

#[derive(Serialize, ToSchema)]
pub struct PostResponse {
    pub id: Uuid,
    pub body: String,
    pub author: Option<AuthorSummary>,
    pub parent_id: Option<Uuid>,
    pub like_count: i64,
    pub reply_count: i64,
    pub user_liked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct PostList {
    pub items: Vec<PostResponse>,
    pub next_cursor: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PostDetail {
    pub post: PostResponse,
    pub replies: Vec<PostResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePostRequest {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedQuery {
    /// Opaque cursor from a previous page's `next_cursor`.
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// Post columns plus counts and the viewer's like flag, all in one statement.
fn post_query(viewer: Option<Uuid>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT p.id, p.body, p.parent_id, p.is_deleted, p.created_at, \
         u.id AS author_id, u.display_name AS author_display_name, u.handle AS author_handle, \
         (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count, \
         (SELECT COUNT(*) FROM posts r \
          WHERE r.parent_id = p.id AND r.is_deleted = FALSE) AS reply_count, ",
    );
    match viewer {
        Some(viewer) => {
            builder.push(
                "EXISTS (SELECT 1 FROM likes lv \
                 WHERE lv.post_id = p.id AND lv.user_id = ",
            );
            builder.push_bind(viewer);
            builder.push(") AS user_liked");
        }
        None => {
            builder.push("FALSE AS user_liked");
        }
    }
    builder.push(" FROM posts p JOIN users u ON u.id = p.author_id");
    builder
}

fn post_from_row(row: &PgRow) -> Result<PostResponse, sqlx::Error> {
    let is_deleted: bool = row.try_get("is_deleted")?;
    let (body, author) = if is_deleted {
        (REMOVED_BODY.to_string(), None)
    } else {
        (
            row.try_get("body")?,
            Some(AuthorSummary {
                id: row.try_get("author_id")?,
                display_name: row.try_get("author_display_name")?,
                handle: row.try_get("author_handle")?,
            }),
        )
    };
    Ok(PostResponse {
        id: row.try_get("id")?,
        body,
        author,
        parent_id: row.try_get("parent_id")?,
        like_count: row.try_get("like_count")?,
        reply_count: row.try_get("reply_count")?,
        user_liked: row.try_get("user_liked")?,
        created_at: row.try_get("created_at")?,
    })
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .clamp(1, MAX_FEED_LIMIT)
}

fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Post not found")
}

pub async fn list_posts(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<PostList>> {
    let viewer = current_user(&state, &jar).await?.map(|user| user.id);
    let limit = clamp_limit(query.limit);
    let cursor = query.cursor.as_deref().and_then(FeedCursor::decode);

    let mut builder = post_query(viewer);
    builder.push(" WHERE p.parent_id IS NULL AND p.is_deleted = FALSE");
    if let Some(cursor) = cursor {
        builder.push(" AND (p.created_at, p.id) < (");
        builder.push_bind(cursor.created_at);
        builder.push(", ");
        builder.push_bind(cursor.id);
        builder.push(")");
    }
    builder.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
    builder.push_bind(limit + 1);

    let rows = builder.build().fetch_all(&state.pool).await?;
    let mut items = rows
        .iter()
        .map(post_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let next_cursor = if items.len() as i64 > limit {
        items.truncate(limit as usize);
        items
            .last()
            .map(|post| FeedCursor::new(post.created_at, post.id).encode())
    } else {
        None
    };

    Ok(Json(PostList { items, next_cursor }))
}

pub async fn create_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<Json<PostResponse>> {
    let user = require_user(&state, &jar).await?;

    if let Err(err) = validation::validate_post_body(&payload.body) {
        metrics::inc_posts_rejected(crate::SERVICE_NAME, "invalid");
        return Err(err.into());
    }
    if let Some(violation) = positivity::find_violation(&payload.body) {
        metrics::inc_posts_rejected(crate::SERVICE_NAME, violation.reason());
        tracing::info!(
            user_id = %user.id,
            reason = violation.reason(),
            "post rejected by positivity filter"
        );
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "NOT_POSITIVE",
            positivity::REJECTION_MESSAGE,
        ));
    }

    if let Some(parent_id) = payload.parent_id {
        let parent_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1 AND is_deleted = FALSE)",
        )
        .bind(parent_id)
        .fetch_one(&state.pool)
        .await?;
        if !parent_exists {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Parent post not found",
            ));
        }
    }

    let post_id = Uuid::new_v4();
    let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
        "INSERT INTO posts (id, author_id, body, parent_id) VALUES ($1, $2, $3, $4) \
         RETURNING created_at",
    )
    .bind(post_id)
    .bind(user.id)
    .bind(&payload.body)
    .bind(payload.parent_id)
    .fetch_one(&state.pool)
    .await?;

    metrics::inc_posts_created(crate::SERVICE_NAME, payload.parent_id.is_some());
    tracing::info!(post_id = %post_id, user_id = %user.id, "post created");

    Ok(Json(PostResponse {
        id: post_id,
        body: payload.body,
        author: Some(AuthorSummary {
            id: user.id,
            display_name: user.display_name,
            handle: user.handle,
        }),
        parent_id: payload.parent_id,
        like_count: 0,
        reply_count: 0,
        user_liked: false,
        created_at,
    }))
}

pub async fn get_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<PostDetail>> {
    let viewer = current_user(&state, &jar).await?.map(|user| user.id);

    let mut builder = post_query(viewer);
    builder.push(" WHERE p.id = ");
    builder.push_bind(post_id);
    let row = builder.build().fetch_optional(&state.pool).await?;
    let Some(row) = row else {
        return Err(not_found());
    };
    let post = post_from_row(&row)?;

    let mut builder = post_query(viewer);
    builder.push(" WHERE p.parent_id = ");
    builder.push_bind(post_id);
    builder.push(" AND p.is_deleted = FALSE ORDER BY p.created_at ASC, p.id ASC");
    let replies = builder
        .build()
        .fetch_all(&state.pool)
        .await?
        .iter()
        .map(post_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(PostDetail { post, replies }))
}

pub async fn delete_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let user = require_user(&state, &jar).await?;

    let author_id = sqlx::query_scalar::<_, Uuid>("SELECT author_id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(&state.pool)
        .await?;
    let Some(author_id) = author_id else {
        return Err(not_found());
    };
    if author_id != user.id {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Not authorized to delete this post",
        ));
    }

    sqlx::query("UPDATE posts SET is_deleted = TRUE WHERE id = $1")
        .bind(post_id)
        .execute(&state.pool)
        .await?;
    tracing::info!(post_id = %post_id, user_id = %user.id, "post deleted");

    Ok(Json(MessageResponse::new("Post deleted")))
}
