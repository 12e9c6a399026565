use axum::extract::MatchedPath;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};

struct Metrics {
    registry: Registry,
    joylet_up: IntGaugeVec,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    auth_success_total: IntCounterVec,
    auth_failure_total: IntCounterVec,
    posts_created_total: IntCounterVec,
    posts_rejected_total: IntCounterVec,
    likes_toggled_total: IntCounterVec,
    reports_submitted_total: IntCounterVec,
}

pub const LIKE_ACTION_LIKED: &str = "liked";
pub const LIKE_ACTION_UNLIKED: &str = "unliked";

const UNMATCHED_ROUTE: &str = "unmatched";

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let joylet_up = IntGaugeVec::new(Opts::new("joylet_up", "Service health"), &["service"])
            .expect("joylet_up metric");

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP request count"),
            &["service", "route", "method", "status"],
        )
        .expect("http_requests_total metric");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["service", "route", "method", "status"],
        )
        .expect("http_request_duration_seconds metric");

        let auth_success_total = IntCounterVec::new(
            Opts::new("auth_success_total", "Successful logins"),
            &["service"],
        )
        .expect("auth_success_total metric");

        let auth_failure_total = IntCounterVec::new(
            Opts::new("auth_failure_total", "Failed logins"),
            &["service", "reason"],
        )
        .expect("auth_failure_total metric");

        let posts_created_total = IntCounterVec::new(
            Opts::new("posts_created_total", "Posts and replies stored"),
            &["service", "kind"],
        )
        .expect("posts_created_total metric");

        let posts_rejected_total = IntCounterVec::new(
            Opts::new("posts_rejected_total", "Posts rejected before storage"),
            &["service", "reason"],
        )
        .expect("posts_rejected_total metric");

        let likes_toggled_total = IntCounterVec::new(
            Opts::new("likes_toggled_total", "Like toggles by resulting state"),
            &["service", "action"],
        )
        .expect("likes_toggled_total metric");

        let reports_submitted_total = IntCounterVec::new(
            Opts::new("reports_submitted_total", "Moderation reports submitted"),
            &["service"],
        )
        .expect("reports_submitted_total metric");

        registry
            .register(Box::new(joylet_up.clone()))
            .expect("register joylet_up");
        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("register http_requests_total");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("register http_request_duration_seconds");
        registry
            .register(Box::new(auth_success_total.clone()))
            .expect("register auth_success_total");
        registry
            .register(Box::new(auth_failure_total.clone()))
            .expect("register auth_failure_total");
        registry
            .register(Box::new(posts_created_total.clone()))
            .expect("register posts_created_total");
        registry
            .register(Box::new(posts_rejected_total.clone()))
            .expect("register posts_rejected_total");
        registry
            .register(Box::new(likes_toggled_total.clone()))
            .expect("register likes_toggled_total");
        registry
            .register(Box::new(reports_submitted_total.clone()))
            .expect("register reports_submitted_total");

        Metrics {
            registry,
            joylet_up,
            http_requests_total,
            http_request_duration_seconds,
            auth_success_total,
            auth_failure_total,
            posts_created_total,
            posts_rejected_total,
            likes_toggled_total,
            reports_submitted_total,
        }
    })
}

pub fn init(service_name: &'static str) {
    metrics().joylet_up.with_label_values(&[service_name]).set(1);
}

pub fn record_http_request(
    service_name: &'static str,
    method: &str,
    route: &str,
    status: u16,
    duration: Duration,
) {
    let status_str = status.to_string();
    let labels = &[service_name, route, method, status_str.as_str()];
    let metrics = metrics();
    metrics.http_requests_total.with_label_values(labels).inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(labels)
        .observe(duration.as_secs_f64());
}

pub fn inc_auth_success(service_name: &'static str) {
    metrics()
        .auth_success_total
        .with_label_values(&[service_name])
        .inc();
}

pub fn inc_auth_failure(service_name: &'static str, reason: &'static str) {
    metrics()
        .auth_failure_total
        .with_label_values(&[service_name, reason])
        .inc();
}

pub fn inc_posts_created(service_name: &'static str, is_reply: bool) {
    let kind = if is_reply { "reply" } else { "post" };
    metrics()
        .posts_created_total
        .with_label_values(&[service_name, kind])
        .inc();
}

pub fn inc_posts_rejected(service_name: &'static str, reason: &'static str) {
    metrics()
        .posts_rejected_total
        .with_label_values(&[service_name, reason])
        .inc();
}

pub fn inc_likes_toggled(service_name: &'static str, action: &'static str) {
    metrics()
        .likes_toggled_total
        .with_label_values(&[service_name, action])
        .inc();
}

pub fn inc_reports_submitted(service_name: &'static str) {
    metrics()
        .reports_submitted_total
        .with_label_values(&[service_name])
        .inc();
}

pub fn metrics_response(service_name: &'static str) -> impl IntoResponse {
    init(service_name);
    let metrics = metrics();
    let metric_families = metrics.registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            "failed to encode metrics".to_string(),
        );
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    (
        StatusCode::OK,
        headers,
        String::from_utf8_lossy(&buffer).to_string(),
    )
}

/// Records request count and latency per route for every response, including
/// errors surfaced by inner services.
#[derive(Clone)]
pub struct MetricsLayer {
    service_name: &'static str,
}

impl MetricsLayer {
    pub fn new(service_name: &'static str) -> Self {
        Self { service_name }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    service_name: &'static str,
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            service_name: self.service_name,
        }
    }
}

impl<S, ReqBody, ResBody> Service<axum::http::Request<ReqBody>> for MetricsService<S>
where
    S: Service<axum::http::Request<ReqBody>, Response = axum::response::Response<ResBody>>
        + Send
        + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = axum::response::Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: axum::http::Request<ReqBody>) -> Self::Future {
        let service_name = self.service_name;
        let method = request.method().to_string();
        let route = route_label(&request);
        let start = Instant::now();
        let fut = self.inner.call(request);
        Box::pin(async move {
            match fut.await {
                Ok(response) => {
                    record_http_request(
                        service_name,
                        &method,
                        &route,
                        response.status().as_u16(),
                        start.elapsed(),
                    );
                    Ok(response)
                }
                Err(err) => {
                    record_http_request(service_name, &method, &route, 500, start.elapsed());
                    Err(err)
                }
            }
        })
    }
}

/// The route template (`/posts/:post_id`) when the router matched one, so label
/// cardinality stays bounded by the route table.
fn route_label<B>(request: &axum::http::Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn metrics_response_sets_content_type() {
        let response = metrics_response("jl-test").into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, "text/plain; version=0.0.4");
    }

    #[tokio::test]
    async fn requests_are_labelled_by_route_template() {
        use axum::body::Body;
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;

        let app = Router::new()
            .route("/posts/:post_id", get(|| async { "ok" }))
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(MetricsLayer::new("jl-route-label-test"));

        for uri in [
            "/posts/6f1c1a52-3a3f-4f7e-9f57-1f0b2b8f0e11",
            "/posts/anything",
            "/no/such/route/1",
            "/no/such/route/2",
        ] {
            app.clone()
                .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
        }

        let matched = metrics()
            .http_requests_total
            .with_label_values(&["jl-route-label-test", "/posts/:post_id", "GET", "200"])
            .get();
        assert_eq!(matched, 2);
        let unmatched = metrics()
            .http_requests_total
            .with_label_values(&["jl-route-label-test", UNMATCHED_ROUTE, "GET", "404"])
            .get();
        assert_eq!(unmatched, 2);
    }
}
