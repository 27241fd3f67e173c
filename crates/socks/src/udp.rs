//! UDP ASSOCIATE relay.
//!
//! One association owns a fresh UDP socket plus the client's control TCP
//! connection. The control reader exists only to detect closure: EOF there
//! tears down the socket and the relay loop. The client's UDP source
//! address is pinned from the first packet whose source IP matches the
//! control connection; packets from anyone else before that are dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tracing::{debug, info, trace};

use crate::wire;
use crate::{SessionError, SocksContext, record_rejection, resolve_destination};

/// Maximum UDP datagram we accept.
const MAX_DATAGRAM: usize = 65_535;

pub(crate) async fn run_association(
    mut control: TcpStream,
    peer: SocketAddr,
    session_body: String,
    ctx: Arc<SocksContext>,
) -> Result<(), SessionError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    let udp_port = socket.local_addr()?.port();

    // Clients parse the reply address literally, so advertise the interface
    // they reached us on rather than the wildcard bind address.
    let bound = SocketAddr::new(control.local_addr()?.ip(), udp_port);
    control
        .write_all(&wire::encode_reply(wire::REP_SUCCESS, bound))
        .await?;

    debug!(%peer, relay = %bound, body = %session_body, "udp association open");

    let socket = Arc::new(socket);
    tokio::select! {
        _ = watch_control(&mut control) => {
            debug!(%peer, "control connection closed; tearing down association");
        }
        result = relay_loop(socket.clone(), peer, session_body, ctx) => {
            result?;
        }
    }
    Ok(())
}

/// Drain the control connection until EOF or error.
async fn watch_control(control: &mut TcpStream) {
    let mut buf = [0u8; 512];
    loop {
        match control.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            // No meaningful traffic is defined on the control connection
            // after the reply; ignore anything that shows up.
            Ok(_) => {}
        }
    }
}

async fn relay_loop(
    socket: Arc<UdpSocket>,
    control_peer: SocketAddr,
    session_body: String,
    ctx: Arc<SocksContext>,
) -> Result<(), SessionError> {
    let mut client: Option<SocketAddr> = None;
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let data = &buf[..n];

        match client {
            None => {
                if from.ip() == control_peer.ip() {
                    client = Some(from);
                    trace!(%from, "pinned client udp address");
                    forward_client_packet(&socket, data, &session_body, &ctx);
                } else {
                    trace!(%from, "dropping packet from unknown source before pin");
                }
            }
            Some(pinned) if from == pinned => {
                forward_client_packet(&socket, data, &session_body, &ctx);
            }
            Some(pinned) => {
                forward_origin_reply(&socket, pinned, from, data, &session_body, &ctx);
            }
        }
    }
}

/// Parse, admit, delay, and forward one client datagram to its destination.
/// Malformed headers and policy rejections drop the packet silently (the
/// rejection is still logged and counted).
fn forward_client_packet(
    socket: &Arc<UdpSocket>,
    data: &[u8],
    session_body: &str,
    ctx: &Arc<SocksContext>,
) {
    let datagram = match wire::parse_udp_datagram(data) {
        Ok(datagram) => datagram,
        Err(e) => {
            trace!(error = %e, "dropping malformed udp datagram");
            return;
        }
    };

    let resolved = match resolve_destination(ctx, session_body, &datagram.address) {
        Ok(resolved) => resolved,
        Err(rejection) => {
            info!(%rejection, "dropping udp packet");
            record_rejection(&ctx.metrics, &rejection, "udp");
            return;
        }
    };

    let admitted = match ctx.admission.check(
        &resolved.host,
        datagram.port,
        None,
        &resolved.body,
        true,
        Utc::now(),
    ) {
        Ok(admitted) => admitted,
        Err(rejection) => {
            info!(destination = %resolved.host, %rejection, "dropping udp packet");
            record_rejection(&ctx.metrics, &rejection, "udp");
            return;
        }
    };

    ctx.metrics.udp_packets_total.inc();
    ctx.metrics.bytes_relayed_total.add(datagram.payload.len() as u64);

    let payload = datagram.payload.to_vec();
    let port = datagram.port;
    let host = resolved.host;
    let latency = admitted.one_way_latency;
    let socket = socket.clone();

    // Each packet sleeps its own light-time; late packets may reorder,
    // which is UDP semantics.
    tokio::spawn(async move {
        let dest = match lookup_host((host.as_str(), port)).await {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                debug!(%host, error = %e, "udp destination lookup failed");
                None
            }
        };
        let Some(dest) = dest else { return };
        tokio::time::sleep(latency).await;
        if let Err(e) = socket.send_to(&payload, dest).await {
            debug!(%dest, error = %e, "udp forward failed");
        }
    });
}

/// Wrap an origin reply in the §7 response header and send it (after the
/// light-time) to the pinned client.
fn forward_origin_reply(
    socket: &Arc<UdpSocket>,
    client: SocketAddr,
    source: SocketAddr,
    data: &[u8],
    session_body: &str,
    ctx: &Arc<SocksContext>,
) {
    let latency = match ctx
        .admission
        .ephemeris()
        .cached_entry(session_body, Utc::now())
    {
        Ok(entry) => Duration::from_secs_f64(entry.latency_seconds.max(0.0)),
        Err(e) => {
            debug!(body = session_body, error = %e, "dropping origin reply");
            return;
        }
    };

    ctx.metrics.udp_packets_total.inc();
    ctx.metrics.bytes_relayed_total.add(data.len() as u64);

    let packet = wire::build_udp_datagram(source, data);
    let socket = socket.clone();

    tokio::spawn(async move {
        tokio::time::sleep(latency).await;
        if let Err(e) = socket.send_to(&packet, client).await {
            debug!(%client, error = %e, "udp reply forward failed");
        }
    });
}
