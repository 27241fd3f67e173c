//! End-to-end SOCKS5 sessions against a live listener, with a near-Earth
//! test body so the light-time sleeps stay sub-second.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use lightlag::metrics::Metrics;
use lightlag::socks::{SocksContext, SocksServer};

fn context(min_latency: Duration) -> (Arc<SocksContext>, Arc<Metrics>) {
    let metrics = common::metrics();
    let ctx = Arc::new(SocksContext {
        admission: common::test_admission(min_latency, Vec::new()),
        limiter: common::generous_limiter(),
        metrics: metrics.clone(),
        suffix: common::SUFFIX.to_string(),
        default_body: "testsat".to_string(),
    });
    (ctx, metrics)
}

async fn start_server(ctx: Arc<SocksContext>, body: Option<&str>) -> SocketAddr {
    let server = SocksServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        body.map(str::to_string),
        ctx,
    )
    .await
    .expect("bind socks listener");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    addr
}

async fn spawn_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind echo");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Greeting + method selection; asserts NO AUTH is chosen.
async fn handshake(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect to socks");
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00], "method selection");
    stream
}

/// Send a request for `command` to an IPv4 destination, return the 10-byte
/// reply.
async fn request(stream: &mut TcpStream, command: u8, ip: [u8; 4], port: u16) -> [u8; 10] {
    let mut req = vec![0x05, command, 0x00, 0x01];
    req.extend_from_slice(&ip);
    req.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&req).await.unwrap();
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
async fn connect_relays_bytes_with_round_trip_delay() {
    let (ctx, _) = context(Duration::ZERO);
    let socks = start_server(ctx, Some("testsat")).await;
    let echo = spawn_tcp_echo().await;

    let mut stream = handshake(socks).await;
    let reply = request(
        &mut stream,
        0x01,
        [127, 0, 0, 1],
        echo.port(),
    )
    .await;
    assert_eq!(reply[1], 0x00, "CONNECT should succeed");

    let payload = b"hello across the void";
    let started = Instant::now();
    stream.write_all(payload).await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).await.unwrap();
    let elapsed = started.elapsed().as_secs_f64();

    assert_eq!(&echoed, payload, "payload must survive byte-for-byte");
    let round_trip = 2.0 * common::testsat_latency_seconds();
    assert!(
        elapsed >= round_trip * 0.9,
        "round trip took {elapsed:.3}s, expected >= {round_trip:.3}s"
    );
}

#[tokio::test]
async fn connect_preserves_stream_order() {
    let (ctx, _) = context(Duration::ZERO);
    let socks = start_server(ctx, Some("testsat")).await;
    let echo = spawn_tcp_echo().await;

    let mut stream = handshake(socks).await;
    let reply = request(&mut stream, 0x01, [127, 0, 0, 1], echo.port()).await;
    assert_eq!(reply[1], 0x00);

    let mut sent = Vec::new();
    for chunk in 0u8..20 {
        let data = vec![chunk; 100];
        stream.write_all(&data).await.unwrap();
        sent.extend_from_slice(&data);
    }
    let mut received = vec![0u8; sent.len()];
    stream.read_exact(&mut received).await.unwrap();
    assert_eq!(received, sent, "byte order must be preserved");
}

#[tokio::test]
async fn latency_floor_rejects_close_bodies_quickly() {
    // testsat is ~50 ms away; a 1 s floor must refuse it without dialing.
    let (ctx, metrics) = context(Duration::from_secs(1));
    let socks = start_server(ctx, Some("testsat")).await;

    let mut stream = handshake(socks).await;
    let started = Instant::now();
    let reply = request(&mut stream, 0x01, [127, 0, 0, 1], 443).await;

    assert_eq!(reply[1], 0x01, "general failure for latency floor");
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "floor rejection must not wait the light-time"
    );
    assert_eq!(metrics.latency_floor_reject.get("testsat"), 1);
}

#[tokio::test]
async fn destinations_off_the_allow_list_get_not_allowed() {
    let (ctx, metrics) = context(Duration::ZERO);
    let socks = start_server(ctx, Some("testsat")).await;

    let mut stream = handshake(socks).await;
    let reply = request(&mut stream, 0x01, [8, 8, 8, 8], 443).await;
    assert_eq!(reply[1], 0x02, "connection not allowed by ruleset");
    assert_eq!(metrics.allowlist_reject.get("socks"), 1);
}

#[tokio::test]
async fn bind_command_is_not_supported() {
    let (ctx, _) = context(Duration::ZERO);
    let socks = start_server(ctx, Some("testsat")).await;

    let mut stream = handshake(socks).await;
    let reply = request(&mut stream, 0x02, [127, 0, 0, 1], 80).await;
    assert_eq!(reply[1], 0x07, "command not supported");
}

async fn spawn_udp_pingpong() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind udp echo");
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let reply: &[u8] = if &buf[..n] == b"ping" { b"pong" } else { &buf[..n] };
            let _ = socket.send_to(reply, from).await;
        }
    });
    addr
}

/// Open a UDP association; returns the control stream (keep it alive!) and
/// the relay address.
async fn open_association(socks: SocketAddr) -> (TcpStream, SocketAddr) {
    let mut control = handshake(socks).await;
    let reply = request(&mut control, 0x03, [0, 0, 0, 0], 0).await;
    assert_eq!(reply[1], 0x00, "UDP ASSOCIATE should succeed");
    assert_eq!(reply[3], 0x01, "relay address should be IPv4");
    let ip = std::net::Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]);
    let port = u16::from_be_bytes([reply[8], reply[9]]);
    (control, SocketAddr::from((ip, port)))
}

fn udp_request(dest: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let SocketAddr::V4(v4) = dest else {
        panic!("test destinations are IPv4")
    };
    let mut out = vec![0x00, 0x00, 0x00, 0x01];
    out.extend_from_slice(&v4.ip().octets());
    out.extend_from_slice(&v4.port().to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[tokio::test]
async fn udp_associate_round_trips_a_datagram() {
    let (ctx, _) = context(Duration::ZERO);
    let socks = start_server(ctx, Some("testsat")).await;
    let echo = spawn_udp_pingpong().await;

    let (_control, relay) = open_association(socks).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let started = Instant::now();
    client
        .send_to(&udp_request(echo, b"ping"), relay)
        .await
        .unwrap();

    let mut buf = [0u8; 2048];
    let (n, from) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("reply within 5s")
        .expect("recv reply");
    let elapsed = started.elapsed().as_secs_f64();

    assert_eq!(from, relay, "reply must come from the relay socket");
    // Header: RSV RSV FRAG ATYP ADDR(4) PORT(2), then payload.
    assert_eq!(&buf[..4], &[0x00, 0x00, 0x00, 0x01]);
    assert_eq!(&buf[4..8], &[127, 0, 0, 1], "ADDR must be the origin");
    assert_eq!(
        u16::from_be_bytes([buf[8], buf[9]]),
        echo.port(),
        "PORT must be the origin's"
    );
    assert_eq!(&buf[10..n], b"pong");

    let round_trip = 2.0 * common::testsat_latency_seconds();
    assert!(
        elapsed >= round_trip * 0.9,
        "datagram round trip took {elapsed:.3}s, expected >= {round_trip:.3}s"
    );
}

#[tokio::test]
async fn closing_control_tears_down_the_relay() {
    let (ctx, _) = context(Duration::ZERO);
    let socks = start_server(ctx, Some("testsat")).await;
    let echo = spawn_udp_pingpong().await;

    let (control, relay) = open_association(socks).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Association works before the control connection closes.
    client
        .send_to(&udp_request(echo, b"ping"), relay)
        .await
        .unwrap();
    let mut buf = [0u8; 2048];
    tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("reply while control is open")
        .expect("recv");

    drop(control);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The relay socket must be gone: no reply inside the 2 s bound.
    client
        .send_to(&udp_request(echo, b"ping"), relay)
        .await
        .unwrap();
    let result =
        tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf)).await;
    assert!(
        result.is_err(),
        "association must stop relaying after control close"
    );
}

#[tokio::test]
async fn datagrams_with_nonzero_frag_are_dropped() {
    let (ctx, metrics) = context(Duration::ZERO);
    let socks = start_server(ctx, Some("testsat")).await;
    let echo = spawn_udp_pingpong().await;

    let (_control, relay) = open_association(socks).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut fragmented = udp_request(echo, b"ping");
    fragmented[2] = 0x01;
    client.send_to(&fragmented, relay).await.unwrap();

    let mut buf = [0u8; 128];
    let result =
        tokio::time::timeout(Duration::from_millis(600), client.recv_from(&mut buf)).await;
    assert!(result.is_err(), "fragmented datagrams are dropped silently");
    assert_eq!(metrics.udp_packets_total.get(), 0);
}
