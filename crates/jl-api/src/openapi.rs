#![allow(dead_code)]

use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use utoipa::openapi::server::ServerBuilder;
use utoipa::OpenApi;

use crate::auth::{LoginRequest, LoginResponse, LoginUser, RegisterRequest, VerifyEmailRequest};
use crate::likes::LikeResponse;
use crate::posts::{
    AuthorSummary, CreatePostRequest, FeedQuery, PostDetail, PostList, PostResponse,
};
use crate::reports::{ReportRequest, ReportResponse};
use crate::users::{MeResponse, ProfileResponse};
use crate::{ErrorResponse, HealthStatus, MessageResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        healthz_doc,
        metrics_doc,
        openapi_doc,
        register_doc,
        verify_email_doc,
        login_doc,
        logout_doc,
        me_doc,
        profile_doc,
        list_posts_doc,
        create_post_doc,
        get_post_doc,
        delete_post_doc,
        toggle_like_doc,
        report_doc
    ),
    components(schemas(
        HealthStatus,
        ErrorResponse,
        MessageResponse,
        RegisterRequest,
        VerifyEmailRequest,
        LoginRequest,
        LoginResponse,
        LoginUser,
        MeResponse,
        ProfileResponse,
        AuthorSummary,
        PostResponse,
        PostList,
        PostDetail,
        CreatePostRequest,
        LikeResponse,
        ReportRequest,
        ReportResponse
    )),
    tags(
        (name = "jl-api", description = "Joylet positive micro-posting API")
    )
)]
pub struct ApiDoc;

pub fn document(server_url: Option<&str>) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if let Some(url) = server_url {
        doc.servers = Some(vec![ServerBuilder::new().url(url).build()]);
    }
    doc
}

pub fn infer_server_url(headers: &HeaderMap) -> Option<String> {
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|value| value.to_str().ok())?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    Some(format!("{proto}://{host}"))
}

pub(crate) async fn openapi_json(headers: HeaderMap) -> impl IntoResponse {
    Json(document(infer_server_url(&headers).as_deref()))
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, body = HealthStatus), (status = 503, body = HealthStatus))
)]
fn healthz_doc() {}

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, content_type = "text/plain", body = String))
)]
fn metrics_doc() {}

#[utoipa::path(
    get,
    path = "/openapi.json",
    responses((status = 200, content_type = "application/json", body = String))
)]
fn openapi_doc() {}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, body = MessageResponse),
        (status = 400, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
        (status = 429, body = ErrorResponse)
    )
)]
fn register_doc() {}

#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses((status = 200, body = MessageResponse), (status = 400, body = ErrorResponse))
)]
fn verify_email_doc() {}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, body = LoginResponse, description = "Sets the `session` cookie"),
        (status = 401, body = ErrorResponse),
        (status = 429, body = ErrorResponse)
    )
)]
fn login_doc() {}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, body = MessageResponse), (status = 401, body = ErrorResponse))
)]
fn logout_doc() {}

#[utoipa::path(
    get,
    path = "/users/me",
    responses((status = 200, body = MeResponse), (status = 401, body = ErrorResponse))
)]
fn me_doc() {}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    responses((status = 200, body = ProfileResponse), (status = 404, body = ErrorResponse))
)]
fn profile_doc() {}

#[utoipa::path(
    get,
    path = "/posts",
    params(FeedQuery),
    responses((status = 200, body = PostList))
)]
fn list_posts_doc() {}

#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 200, body = PostResponse),
        (status = 400, body = ErrorResponse, description = "Rejected by the positivity filter"),
        (status = 401, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn create_post_doc() {}

#[utoipa::path(
    get,
    path = "/posts/{post_id}",
    params(("post_id" = String, Path, description = "Post identifier")),
    responses((status = 200, body = PostDetail), (status = 404, body = ErrorResponse))
)]
fn get_post_doc() {}

#[utoipa::path(
    delete,
    path = "/posts/{post_id}",
    params(("post_id" = String, Path, description = "Post identifier")),
    responses(
        (status = 200, body = MessageResponse),
        (status = 401, body = ErrorResponse),
        (status = 403, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
fn delete_post_doc() {}

#[utoipa::path(
    post,
    path = "/posts/{post_id}/like",
    params(("post_id" = String, Path, description = "Post identifier")),
    responses(
        (status = 200, body = LikeResponse),
        (status = 401, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
fn toggle_like_doc() {}

#[utoipa::path(
    post,
    path = "/posts/{post_id}/report",
    params(("post_id" = String, Path, description = "Post identifier")),
    request_body = ReportRequest,
    responses(
        (status = 200, body = ReportResponse),
        (status = 401, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
fn report_doc() {}
