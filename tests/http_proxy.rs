//! End-to-end HTTP front-end tests: local routes, the status API, and the
//! latency-injecting reverse proxy against a canned origin.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lightlag::http::{HttpContext, serve};
use lightlag::policy::RateLimiter;

const ORIGIN_BODY: &[u8] = b"origin says hi";

/// Minimal HTTP/1.1 origin: answers every request with a fixed body.
async fn spawn_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind origin");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                // Read until the end of the request head.
                loop {
                    match stream.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read += n,
                    }
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    ORIGIN_BODY.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(ORIGIN_BODY).await;
                let _ = stream.shutdown().await;
                // Drain whatever the client still sends (e.g. the chunked
                // terminator) so closing does not reset the connection.
                let mut drain = [0u8; 1024];
                while matches!(stream.read(&mut drain).await, Ok(n) if n > 0) {}
            });
        }
    });
    addr
}

fn front_end_context(origin_port: u16, limiter: Arc<RateLimiter>) -> Arc<HttpContext> {
    Arc::new(HttpContext::new(
        common::test_admission(Duration::ZERO, vec![origin_port]),
        limiter,
        common::metrics(),
        common::SUFFIX.to_string(),
        "mars".to_string(),
    ))
}

async fn start_front_end(ctx: Arc<HttpContext>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind front end");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, ctx));
    addr
}

/// Fire one HTTP/1.1 request and return (status, headers, body).
async fn raw_request(addr: SocketAddr, request: String) -> (u16, String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.expect("connect front end");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head");
    let head = String::from_utf8_lossy(&response[..split]).to_string();
    let body = response[split + 4..].to_vec();
    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    (status, head, body)
}

fn get(host: &str, path: &str, extra_headers: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: {host}\r\n{extra_headers}Connection: close\r\n\r\n")
}

#[tokio::test]
async fn proxied_request_returns_origin_body_after_round_trip_delay() {
    let origin = spawn_origin().await;
    let ctx = front_end_context(origin.port(), common::generous_limiter());
    let front = start_front_end(ctx).await;

    let started = Instant::now();
    let (status, _, body) = raw_request(
        front,
        get(
            &format!("testsat.{}", common::SUFFIX),
            "/anything",
            &format!("X-Destination: http://127.0.0.1:{}\r\n", origin.port()),
        ),
    )
    .await;
    let elapsed = started.elapsed().as_secs_f64();

    assert_eq!(status, 200);
    assert_eq!(body, ORIGIN_BODY, "origin body must arrive byte-for-byte");
    let round_trip = 2.0 * common::testsat_latency_seconds();
    assert!(
        elapsed >= round_trip * 0.9,
        "request took {elapsed:.3}s, expected >= {round_trip:.3}s"
    );
}

#[tokio::test]
async fn destination_via_query_parameter_also_proxies() {
    let origin = spawn_origin().await;
    let ctx = front_end_context(origin.port(), common::generous_limiter());
    let front = start_front_end(ctx).await;

    let (status, _, body) = raw_request(
        front,
        get(
            &format!("testsat.{}", common::SUFFIX),
            &format!("/?destination=http://127.0.0.1:{}", origin.port()),
            "",
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, ORIGIN_BODY);
}

#[tokio::test]
async fn disallowed_destination_is_403() {
    let origin = spawn_origin().await;
    let ctx = front_end_context(origin.port(), common::generous_limiter());
    let front = start_front_end(ctx).await;

    let (status, _, body) = raw_request(
        front,
        get(
            &format!("testsat.{}", common::SUFFIX),
            "/",
            "X-Destination: http://definitely-not-allowed.dev\r\n",
        ),
    )
    .await;
    assert_eq!(status, 403);
    assert!(
        String::from_utf8_lossy(&body).contains("allow-list"),
        "body should name the rejection"
    );
}

#[tokio::test]
async fn unknown_body_host_is_404() {
    let ctx = front_end_context(80, common::generous_limiter());
    let front = start_front_end(ctx).await;

    let (status, _, _) = raw_request(
        front,
        get(&format!("vulcan.{}", common::SUFFIX), "/", ""),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn health_and_ready_respond_on_the_suffix_host() {
    let ctx = front_end_context(80, common::generous_limiter());
    let front = start_front_end(ctx).await;

    let (status, _, body) = raw_request(front, get(common::SUFFIX, "/health", "")).await;
    assert_eq!(status, 200);
    assert!(String::from_utf8_lossy(&body).contains("healthy"));

    let (status, _, body) = raw_request(front, get(common::SUFFIX, "/ready", "")).await;
    assert_eq!(status, 200);
    assert!(String::from_utf8_lossy(&body).contains("ready"));
}

#[tokio::test]
async fn status_data_groups_bodies_and_reports_earth_at_zero() {
    let ctx = front_end_context(80, common::generous_limiter());
    let front = start_front_end(ctx).await;

    let (status, _, body) =
        raw_request(front, get(common::SUFFIX, "/api/status-data", "")).await;
    assert_eq!(status, 200);

    let parsed: serde_json::Value = serde_json::from_slice(&body).expect("valid JSON");
    assert!(parsed["timestamp"].is_string());
    let planets = parsed["objects"]["planets"].as_array().expect("planets");
    assert!(planets.len() >= 8);
    let earth = planets
        .iter()
        .find(|p| p["name"] == "earth")
        .expect("earth entry");
    assert_eq!(earth["distance_km"], 0.0);
    assert_eq!(earth["occluded"], false);
    assert_eq!(earth["type"], "planet");

    let moons = parsed["objects"]["moons"].as_array().expect("moons");
    let moon = moons.iter().find(|m| m["name"] == "moon").expect("moon");
    assert_eq!(moon["parentName"], "earth");
    assert!(moon["latency_seconds"].as_f64().unwrap() > 1.0);
}

#[tokio::test]
async fn debug_distances_serves_a_text_table() {
    let ctx = front_end_context(80, common::generous_limiter());
    let front = start_front_end(ctx).await;

    let (status, head, body) =
        raw_request(front, get(common::SUFFIX, "/_debug/distances", "")).await;
    assert_eq!(status, 200);
    assert!(head.to_lowercase().contains("content-type: text/plain"));
    let text = String::from_utf8_lossy(&body).to_string();
    assert!(text.contains("mars"));
    assert!(text.contains("jupiter"));
    assert!(text.contains("visible") || text.contains("occluded"));
}

#[tokio::test]
async fn body_host_without_target_serves_an_info_page() {
    let ctx = front_end_context(80, common::generous_limiter());
    let front = start_front_end(ctx).await;

    let host = format!("moon.earth.{}", common::SUFFIX);
    let (status, _, body) = raw_request(front, get(&host, "/", "")).await;
    assert_eq!(status, 200);
    let html = String::from_utf8_lossy(&body).to_string();
    assert!(html.contains("moon"));
    assert!(html.contains("one-way latency"));
}

#[tokio::test]
async fn requests_beyond_the_burst_are_429() {
    let strict = Arc::new(RateLimiter::new(0.0, 1.0));
    let ctx = front_end_context(80, strict);
    let front = start_front_end(ctx).await;

    let (first, _, _) = raw_request(front, get(common::SUFFIX, "/health", "")).await;
    assert_eq!(first, 200);
    let (second, _, _) = raw_request(front, get(common::SUFFIX, "/health", "")).await;
    assert_eq!(second, 429);
}

#[tokio::test]
async fn websocket_upgrades_are_refused() {
    let origin = spawn_origin().await;
    let ctx = front_end_context(origin.port(), common::generous_limiter());
    let front = start_front_end(ctx).await;

    let (status, _, _) = raw_request(
        front,
        get(
            &format!("testsat.{}", common::SUFFIX),
            "/",
            &format!(
                "X-Destination: http://127.0.0.1:{}\r\nUpgrade: websocket\r\n",
                origin.port()
            ),
        ),
    )
    .await;
    assert_eq!(status, 400);
}
