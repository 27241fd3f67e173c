//! The reverse-proxy path: admission, light-time sleeps, origin request,
//! streamed response.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::Response;
use chrono::Utc;
use futures_util::TryStreamExt;
use tracing::debug;

use lightlag_policy::latency_scaled_timeout;

use crate::{HttpContext, log_rejection, record_rejection, text_response};

/// Hop-by-hop headers never forwarded in either direction (RFC 9110 §7.6.1).
const HOP_BY_HOP: &[header::HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A destination split into scheme, host, and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Destination {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

/// Parse `host`, `host:port`, or `scheme://host[:port][/ignored]`.
pub(crate) fn parse_destination(raw: &str) -> Destination {
    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) => (scheme.to_lowercase(), rest),
        None => ("http".to_string(), raw),
    };
    let rest = rest.split('/').next().unwrap_or(rest);

    let default_port = if scheme == "https" { 443 } else { 80 };
    let (host, port) = if let Some(inner) = rest.strip_prefix('[') {
        // "[::1]:8080" or "[::1]"
        let host = inner.split(']').next().unwrap_or(inner).to_string();
        let port = rest
            .rsplit_once("]:")
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(default_port);
        (host, port)
    } else {
        match rest.rsplit_once(':') {
            Some((host, port_str)) if !host.contains(':') => match port_str.parse() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (rest.to_string(), default_port),
            },
            _ => (rest.to_string(), default_port),
        }
    };

    Destination { scheme, host, port }
}

/// Relay one request to its origin with the light-time applied before the
/// request leaves and again before the first response byte returns.
pub(crate) async fn forward(
    ctx: &HttpContext,
    req: Request<Body>,
    destination: &str,
    body_name: &str,
) -> Response {
    let started = Instant::now();
    let dest = parse_destination(destination);

    let admitted = match ctx.admission.check(
        &dest.host,
        dest.port,
        Some(dest.scheme.as_str()),
        body_name,
        false,
        Utc::now(),
    ) {
        Ok(admitted) => admitted,
        Err(rejection) => {
            log_rejection(&dest.host, body_name, &rejection);
            record_rejection(&ctx.metrics, &rejection, "http");
            let status = StatusCode::from_u16(rejection.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return text_response(status, rejection.to_string());
        }
    };

    ctx.metrics.requests_by_body.inc(&admitted.body);
    let latency = admitted.one_way_latency;
    debug!(
        destination = %dest.host,
        body = %admitted.body,
        latency_seconds = latency.as_secs_f64(),
        "proxying request"
    );

    // Outbound light-time. Dropped (and thus cancelled) if the client
    // disconnects while waiting.
    tokio::time::sleep(latency).await;

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!(
        "{}://{}:{}{}",
        dest.scheme, dest.host, dest.port, path_and_query
    );

    let method = req.method().clone();
    let headers = forwardable_headers(req.headers());
    let request_body = reqwest::Body::wrap_stream(
        req.into_body()
            .into_data_stream()
            .map_err(std::io::Error::other),
    );

    let origin_response = ctx
        .client
        .request(method, &url)
        .timeout(latency_scaled_timeout(latency))
        .headers(headers)
        .body(request_body)
        .send()
        .await;

    let origin_response = match origin_response {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            return text_response(StatusCode::GATEWAY_TIMEOUT, format!("origin timeout: {e}"));
        }
        Err(e) => {
            return text_response(StatusCode::BAD_GATEWAY, format!("origin error: {e}"));
        }
    };

    // Return light-time before the first byte is written back.
    tokio::time::sleep(latency).await;

    if let Some(length) = origin_response.content_length() {
        ctx.metrics.bytes_relayed_total.add(length);
    }
    ctx.metrics
        .request_duration_seconds
        .observe(started.elapsed().as_secs_f64());

    let mut builder = Response::builder().status(origin_response.status());
    for (name, value) in forwardable_headers(origin_response.headers()).iter() {
        builder = builder.header(name, value);
    }
    let stream = origin_response.bytes_stream().map_err(std::io::Error::other);
    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| text_response(StatusCode::BAD_GATEWAY, format!("relay error: {e}")))
}

/// Copy of `headers` without hop-by-hop entries, Host, or anything the
/// Connection header itself names.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_lowercase())
        .collect();

    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if name == header::HOST
            || HOP_BY_HOP.contains(name)
            || connection_named.contains(&name.as_str().to_lowercase())
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
