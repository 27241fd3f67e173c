//! TCP side of the SOCKS5 front-end: accept loop, handshake, CONNECT.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use lightlag_policy::latency_scaled_timeout;

use crate::wire::{self, Address, WireError};
use crate::{SessionError, SocksContext, record_rejection, resolve_destination, udp};

/// Copy-loop buffer size, both directions.
pub(crate) const RELAY_BUFFER: usize = 32 * 1024;

/// One SOCKS5 listener, optionally pinned to a body.
#[derive(Debug)]
pub struct SocksServer {
    listener: TcpListener,
    body: Option<String>,
    ctx: Arc<SocksContext>,
}

impl SocksServer {
    /// Bind a listener. `body` pins every session on this port to one
    /// celestial body (the port-per-body model).
    pub async fn bind(
        addr: SocketAddr,
        body: Option<String>,
        ctx: Arc<SocksContext>,
    ) -> io::Result<SocksServer> {
        let listener = TcpListener::bind(addr).await?;
        Ok(SocksServer {
            listener,
            body,
            ctx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the listener fails; per-session errors are
    /// logged and never bubble up.
    pub async fn run(self) -> io::Result<()> {
        info!(
            addr = %self.listener.local_addr()?,
            body = self.body.as_deref().unwrap_or("(hostname-routed)"),
            "socks5 listener ready"
        );
        loop {
            let (stream, peer) = self.listener.accept().await?;
            if !self.ctx.limiter.allow(peer.ip()) {
                // Rate-limited accepts are dropped without a reply.
                record_rejection(
                    &self.ctx.metrics,
                    &lightlag_policy::Rejection::RateLimited,
                    "socks",
                );
                debug!(%peer, "dropping rate-limited socks accept");
                continue;
            }
            let ctx = self.ctx.clone();
            let body = self.body.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_session(stream, peer, body, ctx).await {
                    debug!(%peer, error = %e, "socks session ended with error");
                }
            });
        }
    }
}

async fn handle_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    fixed_body: Option<String>,
    ctx: Arc<SocksContext>,
) -> Result<(), SessionError> {
    negotiate_method(&mut stream).await?;

    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;
    if header[0] != wire::VERSION {
        return Err(WireError::BadVersion(header[0]).into());
    }
    let command = header[1];

    let (address, port) = match read_address(&mut stream).await {
        Ok(pair) => pair,
        Err(SessionError::Wire(WireError::BadAddressType(atyp))) => {
            reply(&mut stream, wire::REP_ADDRESS_NOT_SUPPORTED).await?;
            return Err(WireError::BadAddressType(atyp).into());
        }
        Err(other) => return Err(other),
    };

    let session_body = fixed_body.unwrap_or_else(|| ctx.default_body.clone());

    match command {
        wire::CMD_CONNECT => {
            handle_connect(stream, peer, session_body, address, port, ctx).await
        }
        wire::CMD_UDP_ASSOCIATE => {
            // DST.ADDR/DST.PORT of the request are read and discarded per
            // RFC 1928; the relay pins the client from its first packet.
            udp::run_association(stream, peer, session_body, ctx).await
        }
        // BIND and anything else
        _ => {
            reply(&mut stream, wire::REP_COMMAND_NOT_SUPPORTED).await?;
            Ok(())
        }
    }
}

/// Greeting + method selection; only NO AUTH (0x00) is offered.
async fn negotiate_method<S>(stream: &mut S) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != wire::VERSION {
        return Err(WireError::BadVersion(head[0]).into());
    }
    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;

    if methods.contains(&wire::METHOD_NO_AUTH) {
        stream
            .write_all(&[wire::VERSION, wire::METHOD_NO_AUTH])
            .await?;
        Ok(())
    } else {
        stream
            .write_all(&[wire::VERSION, wire::METHOD_NO_ACCEPTABLE])
            .await?;
        Err(io::Error::new(io::ErrorKind::Unsupported, "no acceptable auth method").into())
    }
}

/// Read ATYP + DST.ADDR + DST.PORT from the stream.
pub(crate) async fn read_address<S>(stream: &mut S) -> Result<(Address, u16), SessionError>
where
    S: AsyncRead + Unpin,
{
    let atyp = stream.read_u8().await?;
    let address = match atyp {
        wire::ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            Address::Ipv4(octets.into())
        }
        wire::ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            Address::Ipv6(octets.into())
        }
        wire::ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut raw = vec![0u8; len];
            stream.read_exact(&mut raw).await?;
            let name = String::from_utf8(raw).map_err(|_| WireError::BadDomain)?;
            Address::Domain(name)
        }
        other => return Err(WireError::BadAddressType(other).into()),
    };
    let port = stream.read_u16().await?;
    Ok((address, port))
}

async fn handle_connect(
    mut stream: TcpStream,
    peer: SocketAddr,
    session_body: String,
    address: Address,
    port: u16,
    ctx: Arc<SocksContext>,
) -> Result<(), SessionError> {
    let now = Utc::now();

    let resolved = match resolve_destination(&ctx, &session_body, &address) {
        Ok(resolved) => resolved,
        Err(rejection) => {
            info!(%peer, %rejection, "connect refused");
            record_rejection(&ctx.metrics, &rejection, "socks");
            reply(&mut stream, rejection.socks_reply()).await?;
            return Ok(());
        }
    };

    let admitted = match ctx
        .admission
        .check(&resolved.host, port, None, &resolved.body, true, now)
    {
        Ok(admitted) => admitted,
        Err(rejection) => {
            info!(
                %peer,
                destination = %resolved.host,
                body = %resolved.body,
                %rejection,
                "connect rejected"
            );
            record_rejection(&ctx.metrics, &rejection, "socks");
            reply(&mut stream, rejection.socks_reply()).await?;
            return Ok(());
        }
    };

    let latency = admitted.one_way_latency;
    debug!(
        %peer,
        destination = %resolved.host,
        body = %admitted.body,
        latency_seconds = latency.as_secs_f64(),
        "connect admitted"
    );

    // Outbound light-time. The wait is cancelled the moment the client
    // hangs up; bytes the client pipelines meanwhile are stashed for the
    // origin.
    let mut stash = Vec::new();
    if !sleep_watching_peer(&mut stream, latency, &mut stash).await {
        debug!(%peer, "client closed during light-time wait");
        return Ok(());
    }

    let dial_timeout = latency_scaled_timeout(latency);
    let origin =
        match tokio::time::timeout(dial_timeout, TcpStream::connect((resolved.host.as_str(), port)))
            .await
        {
            Ok(Ok(origin)) => origin,
            Ok(Err(e)) => {
                info!(destination = %resolved.host, error = %e, "origin dial failed");
                reply(&mut stream, dial_error_reply(&e)).await?;
                return Ok(());
            }
            Err(_) => {
                info!(destination = %resolved.host, "origin dial timed out");
                reply(&mut stream, wire::REP_HOST_UNREACHABLE).await?;
                return Ok(());
            }
        };

    let bound = origin
        .local_addr()
        .unwrap_or_else(|_| "0.0.0.0:0".parse().expect("static addr"));
    stream
        .write_all(&wire::encode_reply(wire::REP_SUCCESS, bound))
        .await?;

    ctx.metrics.socks_sessions_total.inc();
    ctx.metrics.requests_by_body.inc(&admitted.body);

    let (client_read, client_write) = stream.into_split();
    let (origin_read, origin_write) = origin.into_split();

    let to_origin = copy_with_initial_delay(
        client_read,
        origin_write,
        latency,
        stash,
        &ctx.metrics.bytes_relayed_total,
    );
    let to_client = copy_with_initial_delay(
        origin_read,
        client_write,
        latency,
        Vec::new(),
        &ctx.metrics.bytes_relayed_total,
    );

    // Either side closing tears down both directions.
    tokio::select! {
        r = to_origin => log_copy_end(peer, "client→origin", r),
        r = to_client => log_copy_end(peer, "origin→client", r),
    }
    Ok(())
}

fn log_copy_end(peer: SocketAddr, direction: &str, result: io::Result<u64>) {
    match result {
        Ok(bytes) => debug!(%peer, direction, bytes, "relay closed"),
        Err(e) => debug!(%peer, direction, error = %e, "relay errored"),
    }
}

fn dial_error_reply(error: &io::Error) -> u8 {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => wire::REP_CONNECTION_REFUSED,
        io::ErrorKind::NetworkUnreachable => wire::REP_NETWORK_UNREACHABLE,
        _ => wire::REP_HOST_UNREACHABLE,
    }
}

async fn reply<S>(stream: &mut S, rep: u8) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let bound: SocketAddr = "0.0.0.0:0".parse().expect("static addr");
    stream.write_all(&wire::encode_reply(rep, bound)).await
}

/// Sleep the one-way light-time, watching the peer socket so the wait is
/// cancelled as soon as the client gives up. Bytes received while waiting
/// are stashed. Returns false if the peer closed.
async fn sleep_watching_peer(
    stream: &mut TcpStream,
    delay: Duration,
    stash: &mut Vec<u8>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    let mut buf = [0u8; 4096];
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            read = stream.read(&mut buf) => match read {
                Ok(0) | Err(_) => return false,
                Ok(n) => stash.extend_from_slice(&buf[..n]),
            },
        }
    }
}

/// Half-duplex copy that injects the one-way light-time before the first
/// write, then streams with a 32 KiB buffer.
pub(crate) async fn copy_with_initial_delay<R, W>(
    mut from: R,
    mut to: W,
    delay: Duration,
    pending: Vec<u8>,
    bytes: &lightlag_metrics::Counter,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut delayed = false;

    if !pending.is_empty() {
        tokio::time::sleep(delay).await;
        delayed = true;
        to.write_all(&pending).await?;
        total += pending.len() as u64;
        bytes.add(pending.len() as u64);
    }

    let mut buf = vec![0u8; RELAY_BUFFER];
    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if !delayed {
            tokio::time::sleep(delay).await;
            delayed = true;
        }
        to.write_all(&buf[..n]).await?;
        total += n as u64;
        bytes.add(n as u64);
    }
    if let Err(e) = to.shutdown().await {
        debug!(error = %e, "shutdown after copy failed");
    }
    Ok(total)
}
