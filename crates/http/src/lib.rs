//! HTTP front-end: one handler serves every virtual host under the service
//! suffix, dispatching between local info/debug routes and the
//! latency-injecting reverse proxy.

use std::net::IpAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use lightlag_metrics::Metrics;
use lightlag_policy::{Admission, RateLimiter, Rejection};
use lightlag_routing::{RouteError, parse_host};

mod pages;
mod proxy;

/// Shared state for the HTTP listener.
#[derive(Debug)]
pub struct HttpContext {
    pub admission: Arc<Admission>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub suffix: String,
    pub fallback_body: String,
    pub client: reqwest::Client,
}

impl HttpContext {
    pub fn new(
        admission: Arc<Admission>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<Metrics>,
        suffix: String,
        fallback_body: String,
    ) -> HttpContext {
        HttpContext {
            admission,
            limiter,
            metrics,
            suffix,
            fallback_body,
            // Per-request timeouts are set from the simulated latency; the
            // client itself carries none.
            client: reqwest::Client::new(),
        }
    }
}

/// Build the application. Every request funnels through [`entry`]; path
/// routing happens after the Host header decides the virtual host.
pub fn app(ctx: Arc<HttpContext>) -> Router {
    Router::new()
        .fallback(entry)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// A metrics-only app for the scrape listener.
pub fn metrics_app(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route(
            "/metrics",
            axum::routing::get(|State(m): State<Arc<Metrics>>| async move { m.render() }),
        )
        .with_state(metrics)
}

/// Serve the front-end on an already-bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    ctx: Arc<HttpContext>,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app(ctx).into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
}

/// Serve the metrics scrape endpoint on an already-bound listener.
pub async fn serve_metrics(
    listener: tokio::net::TcpListener,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    axum::serve(listener, metrics_app(metrics)).await
}

async fn entry(
    State(ctx): State<Arc<HttpContext>>,
    connect_info: Option<ConnectInfo<std::net::SocketAddr>>,
    req: Request<Body>,
) -> Response {
    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]));

    if !ctx.limiter.allow(client_ip) {
        record_rejection(&ctx.metrics, &Rejection::RateLimited, "http");
        return text_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }
    ctx.metrics.http_requests_total.inc();

    let Some(host) = request_host(&req) else {
        return text_response(StatusCode::BAD_REQUEST, "missing Host header");
    };

    let catalog = ctx.admission.ephemeris().catalog();
    let route = match parse_host(&host, &ctx.suffix, catalog, &ctx.fallback_body) {
        Ok(route) => route,
        Err(RouteError::UnknownBody(name)) => {
            debug!(%host, body = %name, "unknown body in host");
            return text_response(StatusCode::NOT_FOUND, format!("unknown body: {name}"));
        }
        Err(e) => return text_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    // Proxy-through target from the hostname, or the explicit fallbacks.
    let destination = route
        .target
        .clone()
        .or_else(|| header_destination(req.headers()))
        .or_else(|| query_destination(req.uri().query()));

    if let (Some(destination), Some(body)) = (destination.as_deref(), route.body.as_deref()) {
        if is_websocket_upgrade(req.headers()) {
            // Frame-level delay injection for WebSocket is not provided.
            return text_response(
                StatusCode::BAD_REQUEST,
                "websocket proxying is not supported",
            );
        }
        let body = body.to_string();
        let destination = destination.to_string();
        return proxy::forward(&ctx, req, &destination, &body).await;
    }

    let path = req.uri().path();
    match path {
        "/health" => pages::health(),
        "/ready" => pages::ready(&ctx),
        "/api/status-data" => pages::status_data(&ctx),
        "/_debug/help" => pages::debug_help(&ctx),
        "/_debug/distances" => pages::debug_distances(&ctx),
        "/_debug/bodies" => pages::debug_bodies(&ctx),
        "/_debug/domains" => pages::debug_domains(&ctx),
        _ => match route.body.as_deref() {
            // A resolvable body with no target gets its info page.
            Some(body) => pages::body_info(&ctx, body),
            None if path == "/" => pages::index(&ctx),
            None => text_response(StatusCode::NOT_FOUND, "no such route"),
        },
    }
}

/// Host from the Host header, falling back to the URI authority.
fn request_host(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
}

fn header_destination(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-destination")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn query_destination(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("destination="))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

pub(crate) fn text_response(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

/// Count a rejection in the matching metric family.
pub(crate) fn record_rejection(metrics: &Metrics, rejection: &Rejection, listener: &str) {
    match rejection {
        Rejection::BelowLatencyFloor { body, .. } => metrics.latency_floor_reject.inc(body),
        Rejection::Occluded { body, .. } => metrics.occlusion_reject.inc(body),
        Rejection::DestinationNotAllowed { .. } => metrics.allowlist_reject.inc(listener),
        Rejection::RateLimited => metrics.rate_limit_reject.inc(listener),
        other => metrics.other_reject.inc(other.reason()),
    }
}

/// Log a policy rejection at INFO with enough context to diagnose later.
pub(crate) fn log_rejection(host: &str, body: &str, rejection: &Rejection) {
    info!(destination = %host, body = %body, %rejection, "request rejected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_destination_extraction() {
        assert_eq!(
            query_destination(Some("a=1&destination=example.com&b=2")),
            Some("example.com".to_string())
        );
        assert_eq!(query_destination(Some("a=1")), None);
        assert_eq!(query_destination(None), None);
    }

    #[test]
    fn websocket_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, "WebSocket".parse().unwrap());
        assert!(is_websocket_upgrade(&headers));
    }
}
