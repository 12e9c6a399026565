use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

async fn fetch_document(headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let app = Router::new().route("/openapi.json", get(crate::openapi::openapi_json));
    let mut builder = Request::builder().method("GET").uri("/openapi.json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&body).expect("json body"))
}

#[tokio::test]
async fn openapi_contract_contains_api_paths() {
    let (status, payload) = fetch_document(&[("host", "localhost:8000")]).await;

    assert_eq!(status, StatusCode::OK);
    assert!(payload
        .get("openapi")
        .and_then(Value::as_str)
        .is_some_and(|version| version.starts_with("3.")));
    assert!(payload.pointer("/paths/~1auth~1register/post").is_some());
    assert!(payload.pointer("/paths/~1auth~1login/post").is_some());
    assert!(payload.pointer("/paths/~1users~1me/get").is_some());
    assert!(payload.pointer("/paths/~1posts/get").is_some());
    assert!(payload.pointer("/paths/~1posts/post").is_some());
    assert!(payload.pointer("/paths/~1posts~1{post_id}/delete").is_some());
    assert!(payload.pointer("/paths/~1posts~1{post_id}~1like/post").is_some());
    assert!(payload.pointer("/paths/~1posts~1{post_id}~1report/post").is_some());
    assert!(payload.pointer("/components/schemas/PostResponse").is_some());
}

#[tokio::test]
async fn openapi_server_url_follows_forwarded_headers() {
    let (_, payload) = fetch_document(&[
        ("host", "internal:8000"),
        ("x-forwarded-host", "joylet.example"),
        ("x-forwarded-proto", "https"),
    ])
    .await;

    assert_eq!(
        payload.pointer("/servers/0/url").and_then(Value::as_str),
        Some("https://joylet.example")
    );
}
