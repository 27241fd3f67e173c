//! Hostname grammar for the proxy front-ends.
//!
//! Labels are read right-to-left after the service suffix:
//!
//! ```text
//! <suffix>                               no body (service itself)
//! <body>.<suffix>                        plain body
//! <moon>.<planet>.<suffix>               moon, if the catalog confirms the parent
//! <target…>.<body>.<suffix>              proxy-through to target via body
//! <target…>.<moon>.<planet>.<suffix>     proxy-through via a moon
//! ```
//!
//! When both readings are possible the moon form wins; the catalog decides.
//! Hosts outside the suffix (bare IPs, foreign domains) resolve to the
//! configured fallback body so direct-to-IP clients still get simulated
//! latency.

use std::net::IpAddr;

use thiserror::Error;

use lightlag_catalog::Catalog;

/// Outcome of parsing an inbound Host header or SOCKS destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoute {
    /// Resolved catalog body (lowercase), or `None` for the bare suffix.
    pub body: Option<String>,
    /// Proxy-through target host, case preserved. `None` when the hostname
    /// names only a body.
    pub target: Option<String>,
}

impl HostRoute {
    /// Re-serialize as a hostname under `suffix`. Inverse of [`parse_host`]
    /// for every route it produces.
    pub fn to_host(&self, suffix: &str) -> String {
        match (&self.target, &self.body) {
            (Some(target), Some(body)) => format!("{target}.{body}.{suffix}"),
            (None, Some(body)) => format!("{body}.{suffix}"),
            _ => suffix.to_string(),
        }
    }
}

/// Errors from hostname parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("unknown body `{0}`")]
    UnknownBody(String),
    #[error("empty hostname")]
    EmptyHost,
}

/// Parse an inbound hostname against the service suffix and catalog.
pub fn parse_host(
    host: &str,
    suffix: &str,
    catalog: &Catalog,
    fallback_body: &str,
) -> Result<HostRoute, RouteError> {
    let host = strip_port(host.trim());
    if host.is_empty() {
        return Err(RouteError::EmptyHost);
    }

    let lower = host.to_lowercase();
    let suffix = suffix.to_lowercase();

    if lower == suffix {
        return Ok(HostRoute {
            body: None,
            target: None,
        });
    }

    let Some(prefix) = lower.strip_suffix(&format!(".{suffix}")) else {
        // Bare IPs and non-suffix domains fall back to the default body.
        return Ok(HostRoute {
            body: Some(fallback_body.to_lowercase()),
            target: None,
        });
    };
    // Case-preserved twin of `prefix` for the target portion. Lowercasing
    // can change byte length on exotic input; fall back to the lowered form.
    let raw_prefix = host.get(..prefix.len()).unwrap_or(prefix);

    let labels: Vec<&str> = prefix.split('.').collect();
    if labels.iter().any(|l| l.is_empty()) {
        return Err(RouteError::UnknownBody(prefix.to_string()));
    }

    match labels.as_slice() {
        [single] => {
            if catalog.contains(single) {
                Ok(HostRoute {
                    body: Some((*single).to_string()),
                    target: None,
                })
            } else {
                Err(RouteError::UnknownBody((*single).to_string()))
            }
        }
        [.., moon, planet] => {
            // Moon interpretation first: the catalog decides.
            if catalog.is_moon_of(moon, planet) {
                let target_labels = labels.len() - 2;
                Ok(HostRoute {
                    body: Some((*moon).to_string()),
                    target: join_target(raw_prefix, target_labels),
                })
            } else if catalog.contains(planet) {
                let target_labels = labels.len() - 1;
                Ok(HostRoute {
                    body: Some((*planet).to_string()),
                    target: join_target(raw_prefix, target_labels),
                })
            } else {
                Err(RouteError::UnknownBody((*planet).to_string()))
            }
        }
        [] => Err(RouteError::EmptyHost),
    }
}

/// First `count` labels of the case-preserved prefix, or `None` for zero.
fn join_target(raw_prefix: &str, count: usize) -> Option<String> {
    if count == 0 {
        return None;
    }
    let labels: Vec<&str> = raw_prefix.split('.').collect();
    Some(labels[..count].join("."))
}

/// Drop a trailing `:port` and IPv6 brackets, returning the bare host.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // "[::1]:8080" or "[::1]"
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        // More than one colon without brackets: bare IPv6 literal.
        Some((head, _)) if !head.contains(':') => head,
        _ => host,
    }
}

/// Whether the (already port-stripped) host is an IP literal.
pub fn is_ip_literal(host: &str) -> bool {
    strip_port(host).parse::<IpAddr>().is_ok()
}
