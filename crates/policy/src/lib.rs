//! Admission policy for both proxy front-ends.
//!
//! Three gates run in order for every new session or packet: destination
//! allow-list, scheme/port whitelist, then the astronomical gates
//! (occlusion and the latency floor). A per-IP token bucket additionally
//! limits the rate of new sessions. Rejections carry both their SOCKS5
//! reply byte and HTTP status so each front-end maps them uniformly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use lightlag_ephemeris::{Ephemeris, EphemerisError};

mod rate;

pub use rate::RateLimiter;

/// Destinations the proxy relays to out of the box.
const DEFAULT_ALLOWED: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "httpbin.org",
    "wikipedia.org",
    "wikimedia.org",
    "nasa.gov",
    "jpl.nasa.gov",
    "esa.int",
    "localhost",
    "127.0.0.1",
];

/// Errors from loading policy inputs.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read allow-list: {0}")]
    Io(#[from] std::io::Error),
    #[error("allow-list file has no entries")]
    EmptyAllowList,
}

/// Lower-cased destination allow-list with exact and suffix matching.
#[derive(Debug, Clone)]
pub struct AllowList {
    entries: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> AllowList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AllowList {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// The bundled default of well-known destinations.
    pub fn bundled() -> AllowList {
        AllowList::new(DEFAULT_ALLOWED.iter().copied())
    }

    /// Load one-entry-per-line, `#` comments allowed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<AllowList, PolicyError> {
        let contents = std::fs::read_to_string(path)?;
        let list = AllowList::new(
            contents
                .lines()
                .map(|line| line.split('#').next().unwrap_or("").trim())
                .filter(|line| !line.is_empty()),
        );
        if list.entries.is_empty() {
            return Err(PolicyError::EmptyAllowList);
        }
        Ok(list)
    }

    /// Exact match, or the host ends with `.entry`.
    pub fn permits(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.entries
            .iter()
            .any(|entry| host == *entry || host.ends_with(&format!(".{entry}")))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// URL scheme accepted by the HTTP front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Scheme> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Destination port whitelist.
#[derive(Debug, Clone)]
pub struct PortPolicy {
    allowed: Vec<u16>,
    /// SOCKS sessions may dial the port the client asked for even when it
    /// is outside the static set.
    admit_session_port: bool,
}

impl PortPolicy {
    pub fn new(allowed: Vec<u16>, admit_session_port: bool) -> PortPolicy {
        PortPolicy {
            allowed,
            admit_session_port,
        }
    }

    pub fn default_ports() -> Vec<u16> {
        vec![80, 443, 8080, 53]
    }

    pub fn permits(&self, port: u16, socks_session: bool) -> bool {
        if self.allowed.contains(&port) {
            return true;
        }
        socks_session && self.admit_session_port
    }
}

impl Default for PortPolicy {
    fn default() -> Self {
        PortPolicy::new(PortPolicy::default_ports(), true)
    }
}

/// A policy or astronomical rejection, with its wire mappings.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    DestinationNotAllowed { host: String },
    SchemeNotAllowed { scheme: String },
    PortNotAllowed { port: u16 },
    Occluded { body: String, occluder: String },
    BelowLatencyFloor { body: String, latency_seconds: f64 },
    RateLimited,
    UnknownBody { name: String },
    Internal { reason: String },
}

impl Rejection {
    /// SOCKS5 REP byte per RFC 1928.
    pub fn socks_reply(&self) -> u8 {
        match self {
            Rejection::DestinationNotAllowed { .. }
            | Rejection::SchemeNotAllowed { .. }
            | Rejection::PortNotAllowed { .. } => 0x02,
            Rejection::Occluded { .. } => 0x04,
            Rejection::BelowLatencyFloor { .. } => 0x01,
            // Rate-limited SOCKS accepts are dropped, not replied to; the
            // byte only matters if a handler replies anyway.
            Rejection::RateLimited => 0x01,
            Rejection::UnknownBody { .. } => 0x04,
            Rejection::Internal { .. } => 0x01,
        }
    }

    /// HTTP status for the same condition.
    pub fn http_status(&self) -> u16 {
        match self {
            Rejection::DestinationNotAllowed { .. }
            | Rejection::SchemeNotAllowed { .. }
            | Rejection::PortNotAllowed { .. } => 403,
            Rejection::Occluded { .. } => 503,
            Rejection::BelowLatencyFloor { .. } => 403,
            Rejection::RateLimited => 429,
            Rejection::UnknownBody { .. } => 404,
            Rejection::Internal { .. } => 500,
        }
    }

    /// Short reason for logs and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::DestinationNotAllowed { .. } => "destination_not_allowed",
            Rejection::SchemeNotAllowed { .. } => "scheme_not_allowed",
            Rejection::PortNotAllowed { .. } => "port_not_allowed",
            Rejection::Occluded { .. } => "occluded",
            Rejection::BelowLatencyFloor { .. } => "latency_floor",
            Rejection::RateLimited => "rate_limited",
            Rejection::UnknownBody { .. } => "unknown_body",
            Rejection::Internal { .. } => "internal",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::DestinationNotAllowed { host } => {
                write!(f, "destination {host} is not on the allow-list")
            }
            Rejection::SchemeNotAllowed { scheme } => write!(f, "scheme {scheme} not allowed"),
            Rejection::PortNotAllowed { port } => write!(f, "port {port} not allowed"),
            Rejection::Occluded { body, occluder } => {
                write!(f, "{body} is occluded by {occluder}")
            }
            Rejection::BelowLatencyFloor {
                body,
                latency_seconds,
            } => write!(
                f,
                "{body} is too close: {latency_seconds:.3}s one-way latency is below the floor"
            ),
            Rejection::RateLimited => write!(f, "rate limit exceeded"),
            Rejection::UnknownBody { name } => write!(f, "unknown body {name}"),
            Rejection::Internal { reason } => write!(f, "internal error: {reason}"),
        }
    }
}

/// A session that passed every gate.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub body: String,
    pub distance_km: f64,
    pub one_way_latency: Duration,
}

/// The ordered admission gates.
#[derive(Debug)]
pub struct Admission {
    allow_list: AllowList,
    port_policy: PortPolicy,
    min_latency: Duration,
    ephemeris: Arc<Ephemeris>,
}

impl Admission {
    pub fn new(
        allow_list: AllowList,
        port_policy: PortPolicy,
        min_latency: Duration,
        ephemeris: Arc<Ephemeris>,
    ) -> Admission {
        Admission {
            allow_list,
            port_policy,
            min_latency,
            ephemeris,
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn ephemeris(&self) -> &Arc<Ephemeris> {
        &self.ephemeris
    }

    pub fn min_latency(&self) -> Duration {
        self.min_latency
    }

    /// Run the gates for a destination via `body` at `now`.
    ///
    /// `scheme` is `None` for raw SOCKS tunnels; `socks_session` relaxes the
    /// port whitelist to the session's own target port.
    pub fn check(
        &self,
        dest_host: &str,
        dest_port: u16,
        scheme: Option<&str>,
        body: &str,
        socks_session: bool,
        now: DateTime<Utc>,
    ) -> Result<Admitted, Rejection> {
        if !self.allow_list.permits(dest_host) {
            return Err(Rejection::DestinationNotAllowed {
                host: dest_host.to_string(),
            });
        }

        if let Some(raw) = scheme {
            if Scheme::parse(raw).is_none() {
                return Err(Rejection::SchemeNotAllowed {
                    scheme: raw.to_string(),
                });
            }
        }
        if !self.port_policy.permits(dest_port, socks_session) {
            return Err(Rejection::PortNotAllowed { port: dest_port });
        }

        let entry = self
            .ephemeris
            .cached_entry(body, now)
            .map_err(|e| match e {
                EphemerisError::UnknownBody(name) => Rejection::UnknownBody { name },
                other => Rejection::Internal {
                    reason: other.to_string(),
                },
            })?;

        // Occlusion reflects request-time geometry, never the cache.
        match self.ephemeris.occluder_between("earth", body, now) {
            Ok(Some(occluder)) => {
                return Err(Rejection::Occluded {
                    body: body.to_lowercase(),
                    occluder,
                });
            }
            Ok(None) => {}
            Err(e) => {
                return Err(Rejection::Internal {
                    reason: e.to_string(),
                });
            }
        }

        let latency = Duration::from_secs_f64(entry.latency_seconds.max(0.0));
        if latency < self.min_latency {
            return Err(Rejection::BelowLatencyFloor {
                body: body.to_lowercase(),
                latency_seconds: entry.latency_seconds,
            });
        }

        Ok(Admitted {
            body: body.to_lowercase(),
            distance_km: entry.distance_km,
            one_way_latency: latency,
        })
    }
}

/// Dial/read timeout scaled to the simulated latency:
/// `max(30 s, 3·latency)` capped at 24 h.
pub fn latency_scaled_timeout(one_way_latency: Duration) -> Duration {
    let scaled = one_way_latency.saturating_mul(3);
    scaled
        .max(Duration::from_secs(30))
        .min(Duration::from_secs(24 * 3600))
}
