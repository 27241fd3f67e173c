//! SOCKS5 front-end (RFC 1928): CONNECT and UDP ASSOCIATE with per-session
//! light-time delay injection.
//!
//! Two routing models are supported. A listener may be pinned to one body
//! at bind time (port-per-body; DNS strips the hostname before the SOCKS
//! greeting, so the port is the only surviving routing signal), or it uses
//! the configured default body, which a domain-ATYP destination written in
//! the hostname grammar can override per session.

use std::sync::Arc;

use thiserror::Error;

use lightlag_metrics::Metrics;
use lightlag_policy::{Admission, RateLimiter, Rejection};
use lightlag_routing::parse_host;

pub mod wire;

mod server;
mod udp;

pub use server::SocksServer;

/// Shared state for every SOCKS listener.
#[derive(Debug)]
pub struct SocksContext {
    pub admission: Arc<Admission>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    /// Service suffix for grammar-addressed destinations.
    pub suffix: String,
    /// Body used when neither the listener nor the destination names one.
    pub default_body: String,
}

/// Errors that terminate one SOCKS session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] wire::WireError),
}

/// A destination with its simulated body resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedDestination {
    pub host: String,
    pub body: String,
}

/// Extract the real target host and body from a SOCKS destination.
///
/// Domain destinations written in the hostname grammar
/// (`target.body.suffix`) carry their own body; anything else keeps the
/// session body.
pub(crate) fn resolve_destination(
    ctx: &SocksContext,
    session_body: &str,
    address: &wire::Address,
) -> Result<ResolvedDestination, Rejection> {
    let wire::Address::Domain(domain) = address else {
        return Ok(ResolvedDestination {
            host: address.host(),
            body: session_body.to_string(),
        });
    };

    let lower = domain.to_lowercase();
    let suffix = ctx.suffix.to_lowercase();
    let in_grammar = lower == suffix || lower.ends_with(&format!(".{suffix}"));
    if !in_grammar {
        return Ok(ResolvedDestination {
            host: domain.clone(),
            body: session_body.to_string(),
        });
    }

    let catalog = ctx.admission.ephemeris().catalog();
    let route = parse_host(domain, &ctx.suffix, catalog, session_body).map_err(|_| {
        Rejection::UnknownBody {
            name: domain.clone(),
        }
    })?;

    match (route.target, route.body) {
        (Some(target), Some(body)) => Ok(ResolvedDestination { host: target, body }),
        // A bare body (or the bare suffix) names no origin to tunnel to.
        _ => Err(Rejection::DestinationNotAllowed {
            host: domain.clone(),
        }),
    }
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
